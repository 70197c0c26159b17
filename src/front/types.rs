//! The WACC type variant.

use std::fmt;

/// Byte size of one stack slot / array element on the ARM target.  All WACC
/// values occupy a full word for uniform indexing.
pub const WORD_SIZE: i32 = 4;

/// A resolved WACC type.
///
/// The erased "any pair" supertype (the type of `null`, and of a pair
/// nested inside another pair) is `Pair(None)`; the generic comparisons
/// that the analyser permits on arrays and pairs go through [Type::is_array]
/// and [Type::is_pair] rather than dedicated supertype variants.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Type {
    Int,
    Bool,
    Char,
    Str,
    /// An array of `depth` dimensions over a scalar element type.
    Array {
        /// The scalar type at the bottom of the nesting.  Never itself an
        /// array.
        elem: Box<Type>,
        /// Number of dimensions, at least 1.
        depth: u32,
    },
    /// A pair with known component types, or the erased pair (`None`).
    Pair(Option<Box<(Type, Type)>>),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Str => write!(f, "string"),
            Type::Array { elem, depth } => {
                write!(f, "{elem}")?;
                for _ in 0..*depth {
                    write!(f, "[]")?;
                }
                Ok(())
            }
            Type::Pair(_) => write!(f, "pair"),
        }
    }
}

impl Type {
    /// A one-dimensional array of `elem`, flattening nested array types
    /// into the `(elem, depth)` form.
    pub fn array_of(elem: Type) -> Type {
        match elem {
            Type::Array { elem, depth } => Type::Array {
                elem,
                depth: depth + 1,
            },
            scalar => Type::Array {
                elem: Box::new(scalar),
                depth: 1,
            },
        }
    }

    /// A pair of two component types.  Nested pair components are erased,
    /// matching WACC's type system.
    pub fn pair_of(fst: Type, snd: Type) -> Type {
        Type::Pair(Some(Box::new((fst.erased(), snd.erased()))))
    }

    /// The erased form of this type when it appears as a pair component.
    fn erased(self) -> Type {
        match self {
            Type::Pair(_) => Type::Pair(None),
            other => other,
        }
    }

    /// The type of an element read from one dimension of this array.
    pub fn element(&self) -> Type {
        match self {
            Type::Array { elem, depth: 1 } => (**elem).clone(),
            Type::Array { elem, depth } => Type::Array {
                elem: elem.clone(),
                depth: depth - 1,
            },
            other => crate::ice!("element of non-array type {other}"),
        }
    }

    /// The component types of a pair with known components.
    pub fn pair_components(&self) -> (&Type, &Type) {
        match self {
            Type::Pair(Some(comps)) => (&comps.0, &comps.1),
            other => crate::ice!("components of non-pair type {other}"),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Type::Pair(_))
    }

    /// Heap-allocated types, whose values are pointers.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Array { .. } | Type::Pair(_))
    }

    /// Byte size of a value of this type on the ARM target.  Everything is
    /// word-sized: scalars occupy a full slot and reference types are
    /// pointers.
    pub fn size(&self) -> i32 {
        WORD_SIZE
    }
}
