//! The 32-bit ARM backend.
//!
//! Lowering walks the typed AST once, function by function, appending to
//! an assembly [Fragment]; the runtime routines the code marked as needed
//! are closed over their dependencies and appended once each; the result
//! renders to GAS syntax.
//!
//! Register allocation is fused into expression lowering (there is no
//! separate allocator): every expression carries its Sethi–Ullman weight,
//! and code generation threads an ordered list of free registers, falling
//! back to the stack only when the list runs dry.  See [expr] for the
//! details, [stmt] for statements, [runtime] for the support routines.

pub mod asm;
mod expr;
pub mod pool;
pub mod runtime;
mod stmt;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::back::{Fragment, LabelAlloc, Line};
use crate::common::id;
use crate::front::ast::{Function, Program, Stmt};
use crate::middle::Env;

use asm::{Instruction, Reg};
use pool::StrPool;
use runtime::Helper;

/// The ARM flavour of the fragment algebra.
pub type Frag = Fragment<Instruction, Helper>;

/// Mutable state for one compilation: the label counter, the string pool
/// and the transient stack shift of in-flight spills.
pub struct ArmGen {
    labels: LabelAlloc,
    pool: StrPool,
    sp_shift: i32,
}

impl ArmGen {
    pub fn new() -> ArmGen {
        ArmGen {
            labels: LabelAlloc::new(),
            pool: StrPool::new(),
            sp_shift: 0,
        }
    }

    fn function(&mut self, f: &Function, out: &mut Frag) {
        debug!(name = %f.name, "lowering function");
        out.label(stmt::function_label(f.name));
        out.push(Instruction::Push(vec![Reg::Lr]));
        let mut env = Env::for_function(f);
        self.scoped(&f.body, &mut env, out);
        // The analyser guarantees every path through the body already
        // returned or exited; this epilogue is never reached.
        out.push(Instruction::Pop(vec![Reg::Pc]));
        out.directive(".ltorg");
    }

    fn main_body(&mut self, body: &Stmt, out: &mut Frag) {
        debug!("lowering main");
        out.label(id("main"));
        out.push(Instruction::Push(vec![Reg::Lr]));
        let mut env = Env::for_main();
        self.scoped(body, &mut env, out);
        out.push(Instruction::mov_imm(Reg::R0, 0));
        out.push(Instruction::Pop(vec![Reg::Pc]));
        out.directive(".ltorg");
    }
}

impl Default for ArmGen {
    fn default() -> Self {
        ArmGen::new()
    }
}

/// Lower a whole program to one fragment: user functions, `main`, then
/// the closed set of runtime routines.
pub fn lower(program: &Program) -> Frag {
    let mut gen = ArmGen::new();
    let mut out = Frag::new();
    for f in &program.functions {
        gen.function(f, &mut out);
    }
    gen.main_body(&program.body, &mut out);

    let needed = runtime::closure(&out.helpers);
    for helper in &needed {
        let fragment = helper.fragment(&mut gen.pool);
        out.append(fragment);
    }
    out
}

/// Render a fragment to GAS-syntax assembly text.
pub fn render(frag: &Frag) -> String {
    let mut out = String::new();
    if !frag.data.is_empty() {
        out.push_str(".data\n");
        for record in &frag.data {
            out.push('\n');
            out.push_str(&format!("{}:\n", record.label));
            for line in &record.lines {
                out.push_str(&format!("\t{line}\n"));
            }
        }
        out.push('\n');
    }
    out.push_str(".text\n\n.global main\n");
    for line in &frag.code {
        match line {
            Line::Label(label) => out.push_str(&format!("{label}:\n")),
            Line::Instr(instr) => out.push_str(&format!("\t{instr}\n")),
            Line::Directive(directive) => out.push_str(&format!("\t{directive}\n")),
        }
    }
    out
}

/// Compile a program to ARM assembly text.
pub fn compile(program: &Program) -> String {
    render(&lower(program))
}
