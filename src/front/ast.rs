//! The typed abstract syntax tree.
//!
//! Every node arrives from the analyser with its type resolved, so the
//! accessors here ([Expr::ty], [Expr::weight]) derive rather than check.

use derive_more::Display;

use crate::common::Id;
use crate::front::types::Type;

/// A whole WACC program: the user functions followed by the main body.
#[derive(Clone, Debug)]
pub struct Program {
    pub functions: Vec<Function>,
    pub body: Stmt,
}

/// A user-defined, first-order function.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Id,
    pub params: Vec<Variable>,
    pub ret: Type,
    pub body: Stmt,
}

/// A resolved variable: its name is unique along any scope chain that can
/// reach a use of it.  Storage (stack offset, JVM slot) is assigned by the
/// backends' symbol environments, not carried here.
#[derive(Clone, PartialEq, Debug)]
pub struct Variable {
    pub name: Id,
    pub ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Variable {
        Variable {
            name: crate::common::id(name),
            ty,
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum UnaryOp {
    #[display("!")]
    Not,
    #[display("-")]
    Neg,
    #[display("len")]
    Len,
    #[display("ord")]
    Ord,
    #[display("chr")]
    Chr,
}

impl UnaryOp {
    /// The result type of this operator.
    pub fn ty(self) -> Type {
        match self {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg | UnaryOp::Len | UnaryOp::Ord => Type::Int,
            UnaryOp::Chr => Type::Char,
        }
    }

    pub fn all() -> [UnaryOp; 5] {
        use UnaryOp::*;
        [Not, Neg, Len, Ord, Chr]
    }
}

/// Binary operators.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum BinaryOp {
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display(">")]
    Gt,
    #[display(">=")]
    Gte,
    #[display("<")]
    Lt,
    #[display("<=")]
    Lte,
    #[display("==")]
    Eq,
    #[display("!=")]
    Neq,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
}

impl BinaryOp {
    /// The result type of this operator.  Everything that is not integer
    /// arithmetic produces a boolean.
    pub fn ty(self) -> Type {
        use BinaryOp::*;
        match self {
            Mul | Div | Mod | Add | Sub => Type::Int,
            Gt | Gte | Lt | Lte | Eq | Neq | And | Or => Type::Bool,
        }
    }

    pub fn all() -> [BinaryOp; 13] {
        use BinaryOp::*;
        [Mul, Div, Mod, Add, Sub, Gt, Gte, Lt, Lte, Eq, Neq, And, Or]
    }
}

/// A typed expression.
#[derive(Clone, Debug)]
pub enum Expr {
    IntLit(i32),
    BoolLit(bool),
    CharLit(u8),
    StrLit(String),
    NullPairLit,
    Ident(Variable),
    /// `a[i]`, `a[i][j]`, ...: one index per dimension accessed.
    ArrayElem {
        array: Variable,
        indices: Vec<Expr>,
        /// The type of the accessed element.
        ty: Type,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
}

impl Expr {
    pub fn unary(op: UnaryOp, e: Expr) -> Expr {
        Expr::Unary(op, Box::new(e))
    }

    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary(Box::new(lhs), op, Box::new(rhs))
    }

    /// The derived type of this expression.
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntLit(_) => Type::Int,
            Expr::BoolLit(_) => Type::Bool,
            Expr::CharLit(_) => Type::Char,
            Expr::StrLit(_) => Type::Str,
            Expr::NullPairLit => Type::Pair(None),
            Expr::Ident(var) => var.ty.clone(),
            Expr::ArrayElem { ty, .. } => ty.clone(),
            Expr::Unary(op, _) => op.ty(),
            Expr::Binary(_, op, _) => op.ty(),
        }
    }

    /// The Sethi–Ullman weight: the minimum number of registers needed to
    /// evaluate this expression without touching the stack.
    ///
    /// Leaves cost one register.  A unary operator reuses its operand's
    /// register.  A binary operator picks the cheaper of its two possible
    /// evaluation orders (hold the first result in one register while the
    /// second child runs).  An array access needs its base register plus,
    /// per dimension, whatever the index expression needs on top of it.
    pub fn weight(&self) -> usize {
        match self {
            Expr::IntLit(_)
            | Expr::BoolLit(_)
            | Expr::CharLit(_)
            | Expr::StrLit(_)
            | Expr::NullPairLit
            | Expr::Ident(_) => 1,
            Expr::ArrayElem { indices, .. } => {
                let index_max = indices.iter().map(Expr::weight).max().unwrap_or(1);
                (1 + index_max).max(2)
            }
            Expr::Unary(_, e) => e.weight(),
            Expr::Binary(lhs, _, rhs) => {
                let (wl, wr) = (lhs.weight(), rhs.weight());
                let left_first = (wl + 1).max(wr);
                let right_first = wl.max(wr + 1);
                left_first.min(right_first)
            }
        }
    }
}

/// The target of an assignment or a `read`.
#[derive(Clone, Debug)]
pub enum Lhs {
    Var(Variable),
    ArrayElem {
        array: Variable,
        indices: Vec<Expr>,
        ty: Type,
    },
    /// `fst p` or `snd p`.
    PairElem(PairField, Box<Expr>),
}

impl Lhs {
    /// The type of the location being written.
    pub fn ty(&self) -> Type {
        match self {
            Lhs::Var(var) => var.ty.clone(),
            Lhs::ArrayElem { ty, .. } => ty.clone(),
            Lhs::PairElem(field, pair) => field.ty(&pair.ty()),
        }
    }
}

/// Which field of a pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum PairField {
    #[display("fst")]
    Fst,
    #[display("snd")]
    Snd,
}

impl PairField {
    /// Byte offset of this field inside the pair record.
    pub fn offset(self) -> i32 {
        match self {
            PairField::Fst => 0,
            PairField::Snd => crate::front::types::WORD_SIZE,
        }
    }

    /// The type of this field given the pair's type.  Reads through an
    /// erased pair only occur where the analyser has proven the context
    /// cannot depend on the component type.
    pub fn ty(self, pair: &Type) -> Type {
        match pair {
            Type::Pair(Some(comps)) => match self {
                PairField::Fst => comps.0.clone(),
                PairField::Snd => comps.1.clone(),
            },
            _ => Type::Pair(None),
        }
    }
}

/// The right-hand side of a declaration or assignment.
#[derive(Clone, Debug)]
pub enum Rhs {
    Expr(Expr),
    /// `[e1, e2, ...]` with the type of the resulting array.
    ArrayLit(Vec<Expr>, Type),
    NewPair(Expr, Expr),
    PairElem(PairField, Box<Expr>),
    /// `call f(args)` with the callee's return type.
    Call {
        name: Id,
        args: Vec<Expr>,
        ret: Type,
    },
}

/// A typed statement.
#[derive(Clone, Debug)]
pub enum Stmt {
    Skip,
    Decl(Variable, Rhs),
    Assign(Lhs, Rhs),
    Read(Lhs),
    Free(Expr),
    Return(Expr),
    Exit(Expr),
    Print(Expr, /* newline: */ bool),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    /// A nested `begin .. end` block opening a fresh scope.
    Block(Box<Stmt>),
    Seq(Box<Stmt>, Box<Stmt>),
    /// A call for its side effects only; the result is discarded.
    Call {
        name: Id,
        args: Vec<Expr>,
        ret: Type,
    },
}

impl Stmt {
    /// Chain statements left to right.
    pub fn seq(stmts: impl IntoIterator<Item = Stmt>) -> Stmt {
        let mut iter = stmts.into_iter();
        let first = iter.next().unwrap_or(Stmt::Skip);
        iter.fold(first, |acc, s| Stmt::Seq(Box::new(acc), Box::new(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i32) -> Expr {
        Expr::IntLit(n)
    }

    #[test]
    fn leaves_weigh_one() {
        assert_eq!(int(1).weight(), 1);
        assert_eq!(Expr::StrLit("hi".into()).weight(), 1);
        assert_eq!(Expr::Ident(Variable::new("x", Type::Int)).weight(), 1);
    }

    #[test]
    fn unary_reuses_the_operand_register() {
        let e = Expr::unary(UnaryOp::Neg, Expr::binary(int(1), BinaryOp::Add, int(2)));
        assert_eq!(e.weight(), 2);
    }

    #[test]
    fn balanced_trees_grow_logarithmically() {
        // (1 + 2) needs 2; ((1 + 2) + (3 + 4)) needs 3.
        let a = Expr::binary(int(1), BinaryOp::Add, int(2));
        let b = Expr::binary(int(3), BinaryOp::Add, int(4));
        assert_eq!(a.weight(), 2);
        assert_eq!(Expr::binary(a, BinaryOp::Add, b).weight(), 3);
    }

    #[test]
    fn combs_stay_flat() {
        // ((((1 + 2) + 3) + 4) + 5: the lighter child always comes second.
        let mut e = int(1);
        for n in 2..=5 {
            e = Expr::binary(e, BinaryOp::Add, int(n));
        }
        assert_eq!(e.weight(), 2);
    }

    #[test]
    fn array_access_counts_its_index() {
        let a = Variable::new("a", Type::array_of(Type::Int));
        let simple = Expr::ArrayElem {
            array: a.clone(),
            indices: vec![int(0)],
            ty: Type::Int,
        };
        assert_eq!(simple.weight(), 2);

        let heavy_index = Expr::binary(
            Expr::binary(int(1), BinaryOp::Add, int(2)),
            BinaryOp::Add,
            Expr::binary(int(3), BinaryOp::Add, int(4)),
        );
        let compound = Expr::ArrayElem {
            array: a,
            indices: vec![heavy_index],
            ty: Type::Int,
        };
        assert_eq!(compound.weight(), 4);
    }

    #[test]
    fn boolean_operators_produce_bool() {
        // Regression: comparison and logical operators type as bool, never int.
        for op in [
            BinaryOp::Gt,
            BinaryOp::Gte,
            BinaryOp::Lt,
            BinaryOp::Lte,
            BinaryOp::Eq,
            BinaryOp::Neq,
            BinaryOp::And,
            BinaryOp::Or,
        ] {
            assert_eq!(op.ty(), Type::Bool, "{op} must produce bool");
        }
    }

    #[test]
    fn lte_displays_as_less_equal() {
        // Regression: <= must not render as >=.
        assert_eq!(BinaryOp::Lte.to_string(), "<=");
        assert_eq!(BinaryOp::Gte.to_string(), ">=");
    }

    #[test]
    fn every_operator_has_a_type_and_a_face() {
        for op in BinaryOp::all() {
            assert!(matches!(op.ty(), Type::Int | Type::Bool));
            assert!(!op.to_string().is_empty());
        }
        for op in UnaryOp::all() {
            assert!(matches!(op.ty(), Type::Int | Type::Bool | Type::Char));
            assert!(!op.to_string().is_empty());
        }
    }
}
