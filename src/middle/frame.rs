//! Per-scope stack-frame layout.
//!
//! Each scope reserves one word per declared variable.  Offsets are handed
//! out in declaration order from the top of the scope's region, so the
//! first declaration sits at the highest offset.  A variable's distance
//! from the live stack pointer is its offset within its defining scope
//! plus the sizes of every scope entered since, plus whatever transient
//! shift the code generator has applied (spilled operands, pushed call
//! arguments).

use crate::common::{Id, Map};
use crate::front::ast::{Function, Stmt, Variable};
use crate::front::types::WORD_SIZE;

/// One lexical scope's worth of frame layout.
#[derive(Debug)]
enum Scope {
    /// Locals live below the stack pointer at scope entry.
    Locals { size: i32, offsets: Map<Id, i32> },
    /// Parameters live above the saved link register of the current frame.
    Params { offsets: Map<Id, i32> },
}

/// The scope chain for one function (or the main body).
#[derive(Debug, Default)]
pub struct Env {
    /// Innermost scope last.
    scopes: Vec<Scope>,
}

impl Env {
    /// An environment for a function: its parameters sit above the saved
    /// link register, first parameter nearest to it.
    pub fn for_function(f: &Function) -> Env {
        let mut offsets = Map::new();
        // Offset 0 is the saved lr itself; parameters start one word up.
        let mut offset = WORD_SIZE;
        for param in &f.params {
            offsets.insert(param.name, offset);
            offset += param.ty.size();
        }
        Env {
            scopes: vec![Scope::Params { offsets }],
        }
    }

    /// An environment for the main body, which has no parameters.
    pub fn for_main() -> Env {
        Env::default()
    }

    /// Enter the scope of `body`, returning the byte size of its region
    /// (the amount the caller must subtract from the stack pointer).
    pub fn enter(&mut self, body: &Stmt) -> i32 {
        let vars = declarations(body);
        let size = vars.iter().map(|v| v.ty.size()).sum();
        let mut offsets = Map::new();
        let mut offset = size;
        for var in vars {
            offset -= var.ty.size();
            offsets.insert(var.name, offset);
        }
        self.scopes.push(Scope::Locals { size, offsets });
        size
    }

    /// Leave the innermost scope, returning its byte size.
    pub fn exit(&mut self) -> i32 {
        match self.scopes.pop() {
            Some(Scope::Locals { size, .. }) => size,
            _ => crate::ice!("scope exit without a matching entry"),
        }
    }

    /// Total bytes of local scopes currently entered.  This is what an
    /// early `return` must unwind before popping the frame.
    pub fn local_depth(&self) -> i32 {
        self.scopes
            .iter()
            .map(|s| match s {
                Scope::Locals { size, .. } => *size,
                Scope::Params { .. } => 0,
            })
            .sum()
    }

    /// Offset of `name` from the current stack pointer, before any
    /// transient codegen shift.
    pub fn slot(&self, name: Id) -> i32 {
        let mut below = 0;
        for scope in self.scopes.iter().rev() {
            match scope {
                Scope::Locals { size, offsets } => {
                    if let Some(offset) = offsets.get(&name) {
                        return below + offset;
                    }
                    below += size;
                }
                Scope::Params { offsets } => {
                    if let Some(offset) = offsets.get(&name) {
                        return below + offset;
                    }
                }
            }
        }
        crate::ice!("unresolved variable {name} reached code generation")
    }
}

/// The variables declared directly in `body` (not inside nested scopes,
/// which reserve their own regions on entry).
fn declarations(body: &Stmt) -> Vec<&Variable> {
    fn walk<'a>(s: &'a Stmt, out: &mut Vec<&'a Variable>) {
        match s {
            Stmt::Decl(var, _) => out.push(var),
            Stmt::Seq(a, b) => {
                walk(a, out);
                walk(b, out);
            }
            // Everything else either opens its own scope (if/while/block)
            // or declares nothing.
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(body, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::front::ast::Rhs;
    use crate::front::types::Type;
    use crate::front::Expr;

    fn decl(name: &str) -> Stmt {
        Stmt::Decl(Variable::new(name, Type::Int), Rhs::Expr(Expr::IntLit(0)))
    }

    #[test]
    fn first_declaration_sits_at_the_top() {
        let body = Stmt::seq([decl("x"), decl("y")]);
        let mut env = Env::for_main();
        assert_eq!(env.enter(&body), 8);
        assert_eq!(env.slot(id("x")), 4);
        assert_eq!(env.slot(id("y")), 0);
    }

    #[test]
    fn inner_scopes_shift_outer_slots() {
        let outer = Stmt::seq([decl("x")]);
        let inner = Stmt::seq([decl("a"), decl("b")]);
        let mut env = Env::for_main();
        env.enter(&outer);
        assert_eq!(env.slot(id("x")), 0);
        env.enter(&inner);
        assert_eq!(env.slot(id("x")), 8);
        assert_eq!(env.slot(id("a")), 4);
        assert_eq!(env.exit(), 8);
        assert_eq!(env.slot(id("x")), 0);
    }

    #[test]
    fn shadowing_resolves_to_the_innermost_scope() {
        let outer = Stmt::seq([decl("x")]);
        let inner = Stmt::seq([decl("x")]);
        let mut env = Env::for_main();
        env.enter(&outer);
        env.enter(&inner);
        assert_eq!(env.slot(id("x")), 0);
    }

    #[test]
    fn parameters_live_above_the_saved_link_register() {
        let f = Function {
            name: id("f"),
            params: vec![
                Variable::new("p", Type::Int),
                Variable::new("q", Type::Int),
            ],
            ret: Type::Int,
            body: Stmt::Skip,
        };
        let mut env = Env::for_function(&f);
        let locals = Stmt::seq([decl("x")]);
        env.enter(&locals);
        // One local word, one saved lr word, then the parameters.
        assert_eq!(env.slot(id("p")), 8);
        assert_eq!(env.slot(id("q")), 12);
        assert_eq!(env.slot(id("x")), 0);
    }
}
