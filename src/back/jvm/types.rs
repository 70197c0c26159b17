//! JVM type descriptors and the coercions around `Object`-typed storage.

use std::fmt;

use crate::front::types::Type;

use super::asm::Instr;

/// The synthetic pair-support class emitted alongside the program.
pub const PAIR_CLASS: &str = "wacc/lang/Pair";

/// A JVM type.  The display form is its descriptor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum JvmType {
    Int,
    Bool,
    Char,
    Void,
    Array(Box<JvmType>),
    Object(String),
}

impl JvmType {
    /// Lower a WACC type.
    pub fn of(t: &Type) -> JvmType {
        match t {
            Type::Int => JvmType::Int,
            Type::Bool => JvmType::Bool,
            Type::Char => JvmType::Char,
            Type::Str => JvmType::Object("java/lang/String".into()),
            Type::Array { elem, depth } => {
                let mut out = JvmType::of(elem);
                for _ in 0..*depth {
                    out = JvmType::Array(Box::new(out));
                }
                out
            }
            Type::Pair(_) => JvmType::Object(PAIR_CLASS.into()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, JvmType::Int | JvmType::Bool | JvmType::Char)
    }

    /// The argument to `checkcast`: a class name for objects, a
    /// descriptor for arrays.
    pub fn cast_target(&self) -> String {
        match self {
            JvmType::Object(class) => class.clone(),
            JvmType::Array(_) => self.to_string(),
            other => crate::ice!("checkcast of non-reference type {other}"),
        }
    }

    /// The wrapper class boxing this primitive, with the unboxing method
    /// name and descriptor.
    fn wrapper(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            JvmType::Int => ("java/lang/Integer", "intValue", "()I"),
            JvmType::Bool => ("java/lang/Boolean", "booleanValue", "()Z"),
            JvmType::Char => ("java/lang/Character", "charValue", "()C"),
            other => crate::ice!("no wrapper class for {other}"),
        }
    }

    /// Instructions turning a value of this type into an `Object`
    /// (identity for reference types).
    pub fn to_boxed(&self) -> Vec<Instr> {
        if !self.is_primitive() {
            return vec![];
        }
        let (class, _, _) = self.wrapper();
        vec![Instr::Invokestatic {
            method: format!("{class}/valueOf"),
            desc: format!("({self})L{class};"),
        }]
    }

    /// Instructions turning an `Object` into a value of this type:
    /// `checkcast` plus the unboxing call for primitives, a bare
    /// `checkcast` for reference types.
    pub fn to_primitive(&self) -> Vec<Instr> {
        if !self.is_primitive() {
            return vec![Instr::Checkcast(self.cast_target())];
        }
        let (class, unbox, desc) = self.wrapper();
        vec![
            Instr::Checkcast(class.into()),
            Instr::Invokevirtual {
                method: format!("{class}/{unbox}"),
                desc: desc.into(),
            },
        ]
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JvmType::Int => write!(f, "I"),
            JvmType::Bool => write!(f, "Z"),
            JvmType::Char => write!(f, "C"),
            JvmType::Void => write!(f, "V"),
            JvmType::Array(elem) => write!(f, "[{elem}"),
            JvmType::Object(class) => write!(f, "L{class};"),
        }
    }
}

/// A method descriptor from parameter and return types.
pub fn method_descriptor<'a>(
    params: impl IntoIterator<Item = &'a JvmType>,
    ret: &JvmType,
) -> String {
    let mut out = String::from("(");
    for p in params {
        out.push_str(&p.to_string());
    }
    out.push(')');
    out.push_str(&ret.to_string());
    out
}

/// Argument count and whether a value is returned, read off a method
/// descriptor.  All WACC-relevant types are category 1, so the argument
/// count equals the slot count.
pub fn arity(desc: &str) -> (usize, bool) {
    let inner = desc
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .unwrap_or_else(|| crate::ice!("malformed method descriptor {desc}"));
    let (params, ret) = inner;
    let mut chars = params.chars();
    let mut args = 0;
    while let Some(c) = chars.next() {
        match c {
            '[' => continue,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
            }
            _ => {}
        }
        args += 1;
    }
    (args, ret != "V")
}
