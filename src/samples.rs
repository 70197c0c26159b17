//! Bundled WACC programs as constructed ASTs, for the driver binary and
//! the backend tests.  Each corresponds to a small source program; the
//! front-end that would parse them lives upstream.

use crate::common::id;
use crate::front::ast::*;
use crate::front::types::Type;

fn int(n: i32) -> Expr {
    Expr::IntLit(n)
}

fn var(v: &Variable) -> Expr {
    Expr::Ident(v.clone())
}

/// `begin int x = 1 + 2 * 3 ; exit x end`
fn exprs() -> Program {
    let x = Variable::new("x", Type::Int);
    let sum = Expr::binary(
        int(1),
        BinaryOp::Add,
        Expr::binary(int(2), BinaryOp::Mul, int(3)),
    );
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(x.clone(), Rhs::Expr(sum)),
            Stmt::Exit(var(&x)),
        ]),
    }
}

/// `begin int[] a = [1, 2, 3] ; int y = a[0] ; exit y end`
fn arrays() -> Program {
    let a = Variable::new("a", Type::array_of(Type::Int));
    let y = Variable::new("y", Type::Int);
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(
                a.clone(),
                Rhs::ArrayLit(vec![int(1), int(2), int(3)], Type::array_of(Type::Int)),
            ),
            Stmt::Decl(
                y.clone(),
                Rhs::Expr(Expr::ArrayElem {
                    array: a,
                    indices: vec![int(0)],
                    ty: Type::Int,
                }),
            ),
            Stmt::Exit(var(&y)),
        ]),
    }
}

/// `begin int x = 2147483647 ; x = x + 1 ; exit 0 end`
fn overflow() -> Program {
    let x = Variable::new("x", Type::Int);
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(x.clone(), Rhs::Expr(int(i32::MAX))),
            Stmt::Assign(
                Lhs::Var(x.clone()),
                Rhs::Expr(Expr::binary(var(&x), BinaryOp::Add, int(1))),
            ),
            Stmt::Exit(int(0)),
        ]),
    }
}

/// `begin pair(int, int) p = newpair(1, 2) ; free p ; exit 0 end`
fn pairs() -> Program {
    let p = Variable::new("p", Type::pair_of(Type::Int, Type::Int));
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(p.clone(), Rhs::NewPair(int(1), int(2))),
            Stmt::Free(var(&p)),
            Stmt::Exit(int(0)),
        ]),
    }
}

/// `begin while true do skip done ; exit 0 end`
fn forever() -> Program {
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::While {
                cond: Expr::BoolLit(true),
                body: Box::new(Stmt::Skip),
            },
            Stmt::Exit(int(0)),
        ]),
    }
}

/// `begin print "hello" ; println "hello" ; exit 0 end`
fn strings() -> Program {
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Print(Expr::StrLit("hello".into()), false),
            Stmt::Print(Expr::StrLit("hello".into()), true),
            Stmt::Exit(int(0)),
        ]),
    }
}

/// ```text
/// begin
///   int double(int n) is return n + n end
///   int y = call double(21) ;
///   exit y
/// end
/// ```
fn functions() -> Program {
    let n = Variable::new("n", Type::Int);
    let y = Variable::new("y", Type::Int);
    let double = Function {
        name: id("double"),
        params: vec![n.clone()],
        ret: Type::Int,
        body: Stmt::Return(Expr::binary(var(&n), BinaryOp::Add, var(&n))),
    };
    Program {
        functions: vec![double],
        body: Stmt::seq([
            Stmt::Decl(
                y.clone(),
                Rhs::Call {
                    name: id("double"),
                    args: vec![int(21)],
                    ret: Type::Int,
                },
            ),
            Stmt::Exit(var(&y)),
        ]),
    }
}

/// `begin int x = 0 ; read x ; println x ; exit 0 end`
fn io() -> Program {
    let x = Variable::new("x", Type::Int);
    Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(x.clone(), Rhs::Expr(int(0))),
            Stmt::Read(Lhs::Var(x.clone())),
            Stmt::Print(var(&x), true),
            Stmt::Exit(int(0)),
        ]),
    }
}

/// All bundled samples, by name.
pub fn all() -> Vec<(&'static str, Program)> {
    vec![
        ("exprs", exprs()),
        ("arrays", arrays()),
        ("overflow", overflow()),
        ("pairs", pairs()),
        ("forever", forever()),
        ("strings", strings()),
        ("functions", functions()),
        ("io", io()),
    ]
}

/// Look up one sample by name.
pub fn get(name: &str) -> Option<Program> {
    all().into_iter()
        .find(|(n, _)| *n == name)
        .map(|(_, program)| program)
}
