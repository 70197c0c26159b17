//! Statement lowering.
//!
//! Statements always start with the full register pool; expressions
//! within them consume a suffix of it.  Scope entry and every exit edge
//! adjust the stack pointer symmetrically, so the net shift over any
//! entry-to-exit path is zero.

use crate::common::{id, Id};
use crate::front::ast::{Expr, Lhs, PairField, Rhs, Stmt};
use crate::front::types::{Type, WORD_SIZE};
use crate::middle::Env;

use super::asm::{AddrMode2, Cond, DataOp, Instruction, Offset2, Operand2, Reg};
use super::runtime::Helper;
use super::{ArmGen, Frag};

use Instruction as I;

/// Label of a user function.
pub(super) fn function_label(name: Id) -> Id {
    id(format!("f_{name}"))
}

impl ArmGen {
    pub(super) fn stmt(&mut self, s: &Stmt, env: &mut Env, out: &mut Frag) {
        let regs = &Reg::POOL[..];
        let dst = regs[0];
        match s {
            Stmt::Skip => {}
            Stmt::Decl(var, rhs) => {
                self.rhs(rhs, regs, env, out);
                self.store_var(var.name, env, dst, out);
            }
            Stmt::Assign(lhs, rhs) => {
                self.rhs(rhs, regs, env, out);
                self.assign(lhs, dst, &regs[1..], env, out);
            }
            Stmt::Read(lhs) => {
                self.lvalue_address(lhs, regs, env, out);
                out.push(I::mov(Reg::R0, dst));
                let helper = match lhs.ty() {
                    Type::Int => Helper::ReadInt,
                    Type::Char => Helper::ReadChar,
                    other => crate::ice!("read into a value of type {other}"),
                };
                out.require(helper);
                out.push(I::bl(helper.label()));
            }
            Stmt::Free(e) => {
                self.expr(e, regs, env, out);
                out.push(I::mov(Reg::R0, dst));
                if e.ty().is_pair() {
                    out.require(Helper::FreePair);
                    out.push(I::bl(Helper::FreePair.label()));
                } else {
                    out.require(Helper::CheckNullPointer);
                    out.push(I::bl(Helper::CheckNullPointer.label()));
                    out.push(I::bl(id("free")));
                }
            }
            Stmt::Return(e) => {
                self.expr(e, regs, env, out);
                out.push(I::mov(Reg::R0, dst));
                self.add_sp(env.local_depth(), out);
                out.push(I::Pop(vec![Reg::Pc]));
            }
            Stmt::Exit(e) => {
                self.expr(e, regs, env, out);
                out.push(I::mov(Reg::R0, dst));
                self.add_sp(env.local_depth(), out);
                out.push(I::bl(id("exit")));
            }
            Stmt::Print(e, newline) => {
                self.expr(e, regs, env, out);
                out.push(I::mov(Reg::R0, dst));
                match e.ty() {
                    Type::Int => self.call_helper(Helper::PrintInt, out),
                    Type::Bool => self.call_helper(Helper::PrintBool, out),
                    Type::Char => out.push(I::bl(id("putchar"))),
                    Type::Str => self.call_helper(Helper::PrintString, out),
                    Type::Array { .. } | Type::Pair(_) => {
                        self.call_helper(Helper::PrintRef, out)
                    }
                }
                if *newline {
                    self.call_helper(Helper::PrintLn, out);
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, regs, env, out);
                let else_label = self.labels.fresh();
                let end_label = self.labels.fresh();
                out.push(I::cmp_imm(dst, 0));
                out.push(I::branch_cond(Cond::Eq, else_label));
                self.scoped(then, env, out);
                out.push(I::branch(end_label));
                out.label(else_label);
                self.scoped(otherwise, env, out);
                out.label(end_label);
            }
            Stmt::While { cond, body } => {
                // A constant-true guard needs no check and no exit label.
                if matches!(*cond, Expr::BoolLit(true)) {
                    let head = self.labels.fresh();
                    out.label(head);
                    self.scoped(body, env, out);
                    out.push(I::branch(head));
                    return;
                }
                let head = self.labels.fresh();
                let end = self.labels.fresh();
                out.label(head);
                self.expr(cond, regs, env, out);
                out.push(I::cmp_imm(dst, 0));
                out.push(I::branch_cond(Cond::Eq, end));
                self.scoped(body, env, out);
                out.push(I::branch(head));
                out.label(end);
            }
            Stmt::Block(inner) => self.scoped(inner, env, out),
            Stmt::Seq(a, b) => {
                self.stmt(a, env, out);
                self.stmt(b, env, out);
            }
            Stmt::Call { name, args, .. } => {
                self.call(*name, args, regs, env, out);
            }
        }
    }

    /// Evaluate a right-hand side into `regs[0]`.
    fn rhs(&mut self, rhs: &Rhs, regs: &[Reg], env: &Env, out: &mut Frag) {
        let dst = regs[0];
        match rhs {
            Rhs::Expr(e) => self.expr(e, regs, env, out),
            Rhs::ArrayLit(elems, _) => {
                let bytes = WORD_SIZE + WORD_SIZE * elems.len() as i32;
                out.push(I::ldr_imm(Reg::R0, bytes));
                out.push(I::bl(id("malloc")));
                out.push(I::mov(dst, Reg::R0));
                let next = regs[1];
                for (i, elem) in elems.iter().enumerate() {
                    self.expr(elem, &regs[1..], env, out);
                    out.push(I::str(
                        next,
                        AddrMode2::at(dst, WORD_SIZE + WORD_SIZE * i as i32),
                    ));
                }
                out.push(I::ldr_imm(next, elems.len() as i32));
                out.push(I::str(next, AddrMode2::at(dst, 0)));
            }
            Rhs::NewPair(fst, snd) => {
                out.push(I::ldr_imm(Reg::R0, 2 * WORD_SIZE));
                out.push(I::bl(id("malloc")));
                out.push(I::mov(dst, Reg::R0));
                let next = regs[1];
                for (elem, offset) in [(fst, 0), (snd, WORD_SIZE)] {
                    self.expr(elem, &regs[1..], env, out);
                    out.push(I::ldr_imm(Reg::R0, WORD_SIZE));
                    out.push(I::bl(id("malloc")));
                    out.push(I::str(next, AddrMode2::at(Reg::R0, 0)));
                    out.push(I::str(Reg::R0, AddrMode2::at(dst, offset)));
                }
            }
            Rhs::PairElem(field, pair) => {
                self.expr(pair, regs, env, out);
                self.pair_field_address(*field, dst, out);
                out.push(I::ldr(dst, AddrMode2::at(dst, 0)));
            }
            Rhs::Call { name, args, .. } => self.call(*name, args, regs, env, out),
        }
    }

    /// Store the evaluated value in `value` into `lhs`, using `regs` for
    /// address computation.
    fn assign(&mut self, lhs: &Lhs, value: Reg, regs: &[Reg], env: &Env, out: &mut Frag) {
        match lhs {
            Lhs::Var(var) => self.store_var(var.name, env, value, out),
            Lhs::ArrayElem { array, indices, .. } => {
                self.array_address(array, indices, regs, env, out);
                out.push(I::str(value, AddrMode2::at(regs[0], 0)));
            }
            Lhs::PairElem(field, pair) => {
                self.expr(pair, regs, env, out);
                self.pair_field_address(*field, regs[0], out);
                out.push(I::str(value, AddrMode2::at(regs[0], 0)));
            }
        }
    }

    /// Leave the address of an lvalue's cell in `regs[0]` (for `read`).
    fn lvalue_address(&mut self, lhs: &Lhs, regs: &[Reg], env: &Env, out: &mut Frag) {
        match lhs {
            Lhs::Var(var) => self.slot_address(var.name, env, regs[0], out),
            Lhs::ArrayElem { array, indices, .. } => {
                self.array_address(array, indices, regs, env, out)
            }
            Lhs::PairElem(field, pair) => {
                self.expr(pair, regs, env, out);
                self.pair_field_address(*field, regs[0], out);
            }
        }
    }

    /// Null-check the pair pointer in `reg` and replace it with the
    /// address of the requested element cell.
    fn pair_field_address(&mut self, field: PairField, reg: Reg, out: &mut Frag) {
        out.push(I::mov(Reg::R0, reg));
        out.require(Helper::CheckNullPointer);
        out.push(I::bl(Helper::CheckNullPointer.label()));
        out.push(I::ldr(reg, AddrMode2::at(reg, field.offset())));
    }

    /// Call `f_<name>`: arguments pushed right to left, result moved from
    /// r0 into `regs[0]`.
    fn call(&mut self, name: Id, args: &[Expr], regs: &[Reg], env: &Env, out: &mut Frag) {
        let mut pushed = 0;
        for arg in args.iter().rev() {
            self.expr(arg, regs, env, out);
            out.push(I::str(
                regs[0],
                AddrMode2::PreIndexed(Reg::Sp, Offset2::imm(-WORD_SIZE)),
            ));
            self.sp_shift += WORD_SIZE;
            pushed += WORD_SIZE;
        }
        out.push(I::bl(function_label(name)));
        if pushed > 0 {
            self.add_sp(pushed, out);
            self.sp_shift -= pushed;
        }
        out.push(I::mov(regs[0], Reg::R0));
    }

    fn call_helper(&mut self, helper: Helper, out: &mut Frag) {
        out.require(helper);
        out.push(I::bl(helper.label()));
    }

    /// Lower `body` in a scope of its own: reserve its frame region on
    /// entry and release it on the way out.
    pub(super) fn scoped(&mut self, body: &Stmt, env: &mut Env, out: &mut Frag) {
        let size = env.enter(body);
        self.sub_sp(size, out);
        self.stmt(body, env, out);
        self.add_sp(size, out);
        env.exit();
    }

    /// `SUB sp, sp, #n`, split into rotated-immediate-sized chunks.
    pub(super) fn sub_sp(&mut self, n: i32, out: &mut Frag) {
        let mut rest = n;
        while rest > 0 {
            let chunk = rest.min(1024);
            out.push(I::data(DataOp::Sub, Reg::Sp, Reg::Sp, Operand2::imm(chunk)));
            rest -= chunk;
        }
    }

    /// `ADD sp, sp, #n`, split into rotated-immediate-sized chunks.
    pub(super) fn add_sp(&mut self, n: i32, out: &mut Frag) {
        let mut rest = n;
        while rest > 0 {
            let chunk = rest.min(1024);
            out.push(I::data(DataOp::Add, Reg::Sp, Reg::Sp, Operand2::imm(chunk)));
            rest -= chunk;
        }
    }
}
