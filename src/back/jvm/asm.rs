//! The JVM instruction model: the Jasmin instructions the backend emits.
//!
//! Every instruction knows its operand-stack delta, so a [MethodBuilder]
//! can derive the `.limit stack` of a method while code is appended.  The
//! running depth is tracked linearly; at every join point the emission
//! patterns keep the jumped-in depth no deeper than the fall-in depth, so
//! the tracked maximum never under-approximates the real one.

use derive_more::Display;
use std::fmt;

use crate::back::Line;
use crate::common::{Id, Map};

use super::types;

/// A loadable constant.
#[derive(Clone, PartialEq, Debug)]
pub enum Const {
    Int(i32),
    Str(String),
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(n) => write!(f, "{n}"),
            Const::Str(s) => write!(f, "\"{}\"", escape(s)),
        }
    }
}

/// Comparison suffixes of the `if_icmp<cond>` family.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum CmpKind {
    #[display("eq")]
    Eq,
    #[display("ne")]
    Ne,
    #[display("lt")]
    Lt,
    #[display("le")]
    Le,
    #[display("gt")]
    Gt,
    #[display("ge")]
    Ge,
}

/// One Jasmin instruction.
#[derive(Clone, PartialEq, Debug)]
pub enum Instr {
    Ldc(Const),
    AconstNull,
    Iload(u16),
    Istore(u16),
    Aload(u16),
    Astore(u16),
    Iadd,
    Isub,
    Imul,
    Idiv,
    Irem,
    Ineg,
    Ixor,
    I2c,
    Dup,
    Pop,
    Arraylength,
    /// `newarray <primitive>` for primitive element types.
    Newarray(&'static str),
    /// `anewarray <class-or-descriptor>` for reference element types.
    Anewarray(String),
    Iaload,
    Iastore,
    Baload,
    Bastore,
    Caload,
    Castore,
    Aaload,
    Aastore,
    New(String),
    Checkcast(String),
    Getstatic { field: String, desc: String },
    Putstatic { field: String, desc: String },
    Getfield { field: String, desc: String },
    Putfield { field: String, desc: String },
    Invokestatic { method: String, desc: String },
    Invokevirtual { method: String, desc: String },
    Invokespecial { method: String, desc: String },
    Goto(Id),
    Ifeq(Id),
    Ifne(Id),
    IfIcmp(CmpKind, Id),
    IfAcmpEq(Id),
    IfAcmpNe(Id),
    Ireturn,
    Areturn,
    Return,
}

impl Instr {
    /// Net effect on the operand-stack depth.
    pub fn stack_delta(&self) -> i32 {
        use Instr::*;
        match self {
            Ldc(_) | AconstNull | Iload(_) | Aload(_) | Dup | New(_) => 1,
            Istore(_) | Astore(_) | Pop | Ifeq(_) | Ifne(_) | Ireturn | Areturn => -1,
            Iadd | Isub | Imul | Idiv | Irem | Ixor => -1,
            Ineg | I2c | Arraylength | Newarray(_) | Anewarray(_) | Checkcast(_) => 0,
            Iaload | Baload | Caload | Aaload => -1,
            Iastore | Bastore | Castore | Aastore => -3,
            Getstatic { .. } => 1,
            Putstatic { .. } => -1,
            Getfield { .. } => 0,
            Putfield { .. } => -2,
            Invokestatic { desc, .. } => invoke_delta(desc, 0),
            Invokevirtual { desc, .. } | Invokespecial { desc, .. } => invoke_delta(desc, 1),
            Goto(_) | Return => 0,
            IfIcmp(..) | IfAcmpEq(_) | IfAcmpNe(_) => -2,
        }
    }

    /// The label this instruction jumps to, if any.
    pub fn branch_target(&self) -> Option<Id> {
        use Instr::*;
        match self {
            Goto(l) | Ifeq(l) | Ifne(l) | IfIcmp(_, l) | IfAcmpEq(l) | IfAcmpNe(l) => Some(*l),
            _ => None,
        }
    }
}

fn invoke_delta(desc: &str, receiver: i32) -> i32 {
    let (args, returns) = types::arity(desc);
    (returns as i32) - (args as i32) - receiver
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instr::*;
        match self {
            Ldc(c) => write!(f, "ldc {c}"),
            AconstNull => write!(f, "aconst_null"),
            Iload(slot) => write!(f, "iload {slot}"),
            Istore(slot) => write!(f, "istore {slot}"),
            Aload(slot) => write!(f, "aload {slot}"),
            Astore(slot) => write!(f, "astore {slot}"),
            Iadd => write!(f, "iadd"),
            Isub => write!(f, "isub"),
            Imul => write!(f, "imul"),
            Idiv => write!(f, "idiv"),
            Irem => write!(f, "irem"),
            Ineg => write!(f, "ineg"),
            Ixor => write!(f, "ixor"),
            I2c => write!(f, "i2c"),
            Dup => write!(f, "dup"),
            Pop => write!(f, "pop"),
            Arraylength => write!(f, "arraylength"),
            Newarray(prim) => write!(f, "newarray {prim}"),
            Anewarray(elem) => write!(f, "anewarray {elem}"),
            Iaload => write!(f, "iaload"),
            Iastore => write!(f, "iastore"),
            Baload => write!(f, "baload"),
            Bastore => write!(f, "bastore"),
            Caload => write!(f, "caload"),
            Castore => write!(f, "castore"),
            Aaload => write!(f, "aaload"),
            Aastore => write!(f, "aastore"),
            New(class) => write!(f, "new {class}"),
            Checkcast(class) => write!(f, "checkcast {class}"),
            Getstatic { field, desc } => write!(f, "getstatic {field} {desc}"),
            Putstatic { field, desc } => write!(f, "putstatic {field} {desc}"),
            Getfield { field, desc } => write!(f, "getfield {field} {desc}"),
            Putfield { field, desc } => write!(f, "putfield {field} {desc}"),
            Invokestatic { method, desc } => write!(f, "invokestatic {method}{desc}"),
            Invokevirtual { method, desc } => write!(f, "invokevirtual {method}{desc}"),
            Invokespecial { method, desc } => write!(f, "invokespecial {method}{desc}"),
            Goto(l) => write!(f, "goto {l}"),
            Ifeq(l) => write!(f, "ifeq {l}"),
            Ifne(l) => write!(f, "ifne {l}"),
            IfIcmp(kind, l) => write!(f, "if_icmp{kind} {l}"),
            IfAcmpEq(l) => write!(f, "if_acmpeq {l}"),
            IfAcmpNe(l) => write!(f, "if_acmpne {l}"),
            Ireturn => write!(f, "ireturn"),
            Areturn => write!(f, "areturn"),
            Return => write!(f, "return"),
        }
    }
}

/// Escape a string for a Jasmin `ldc` literal.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

/// Accumulates one method's code, tracking the operand-stack high-water
/// mark and the local-slot count for the `.limit` directives.
pub struct MethodBuilder {
    header: String,
    code: Vec<Line<Instr>>,
    cur_stack: i32,
    max_stack: i32,
    /// Depth at each forward-branch target, recorded at the first branch
    /// to it.  The emission patterns always enter a label no deeper by
    /// fall-through than by jump, so restoring this depth at the label
    /// keeps the tracked maximum exact.
    branch_depths: Map<Id, i32>,
    next_slot: u16,
}

impl MethodBuilder {
    /// Start a method.  `header` is everything after `.method`, e.g.
    /// `public static main([Ljava/lang/String;)V`; `params` is the number
    /// of slots its parameters occupy (all WACC values are category 1).
    pub fn new(header: impl Into<String>, params: u16) -> MethodBuilder {
        MethodBuilder {
            header: header.into(),
            code: Vec::new(),
            cur_stack: 0,
            max_stack: 0,
            branch_depths: Map::new(),
            next_slot: params,
        }
    }

    pub fn push(&mut self, instr: Instr) {
        self.cur_stack += instr.stack_delta();
        if self.cur_stack < 0 {
            crate::ice!("operand stack underflow after {instr}");
        }
        self.max_stack = self.max_stack.max(self.cur_stack);
        if let Some(target) = instr.branch_target() {
            self.branch_depths.entry(target).or_insert(self.cur_stack);
        }
        self.code.push(Line::Instr(instr));
    }

    pub fn extend(&mut self, instrs: impl IntoIterator<Item = Instr>) {
        for instr in instrs {
            self.push(instr);
        }
    }

    pub fn label(&mut self, label: Id) {
        if let Some(depth) = self.branch_depths.get(&label) {
            self.cur_stack = *depth;
        }
        self.code.push(Line::Label(label));
    }

    /// Reserve a fresh local slot.
    pub fn alloc_slot(&mut self) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(".method {}\n", self.header));
        out.push_str(&format!("\t.limit stack {}\n", self.max_stack.max(1)));
        out.push_str(&format!("\t.limit locals {}\n", self.next_slot.max(1)));
        for line in &self.code {
            match line {
                Line::Label(l) => out.push_str(&format!("{l}:\n")),
                Line::Instr(i) => out.push_str(&format!("\t{i}\n")),
                Line::Directive(d) => out.push_str(&format!("\t{d}\n")),
            }
        }
        out.push_str(".end method\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    #[test]
    fn builder_tracks_the_stack_high_water_mark() {
        let mut m = MethodBuilder::new("public static f()I", 0);
        m.push(Instr::Ldc(Const::Int(1)));
        m.push(Instr::Ldc(Const::Int(2)));
        m.push(Instr::Iadd);
        m.push(Instr::Ireturn);
        let text = m.render();
        assert!(text.contains(".limit stack 2"));
        assert!(text.contains(".limit locals 1"));
        assert!(text.ends_with(".end method\n"));
    }

    #[test]
    fn invoke_deltas_follow_the_descriptor() {
        let call = Instr::Invokestatic {
            method: "java/lang/System/exit".into(),
            desc: "(I)V".into(),
        };
        assert_eq!(call.stack_delta(), -1);
        let virt = Instr::Invokevirtual {
            method: "java/io/PrintStream/println".into(),
            desc: "(Ljava/lang/String;)V".into(),
        };
        assert_eq!(virt.stack_delta(), -2);
        let value_of = Instr::Invokestatic {
            method: "java/lang/Integer/valueOf".into(),
            desc: "(I)Ljava/lang/Integer;".into(),
        };
        assert_eq!(value_of.stack_delta(), 0);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn underflow_is_an_internal_error() {
        let mut m = MethodBuilder::new("public static f()V", 0);
        m.push(Instr::Pop);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Instr::Ldc(Const::Int(5)).to_string(), "ldc 5");
        assert_eq!(
            Instr::Ldc(Const::Str("a\"b".into())).to_string(),
            "ldc \"a\\\"b\""
        );
        assert_eq!(Instr::IfIcmp(CmpKind::Lt, id("L3")).to_string(), "if_icmplt L3");
        assert_eq!(Instr::Newarray("int").to_string(), "newarray int");
    }
}
