//! Expression lowering.
//!
//! Code generation threads a register list `regs`: the free registers in
//! priority order, head first.  The head is always the destination.  A
//! binary node evaluates its heavier child first (holding the result while
//! the lighter child runs in the remaining registers); once a single free
//! register is left, evaluation degrades to a stack machine that spills
//! through [Reg::LAST].

use tracing::trace;

use crate::common::Id;
use crate::front::ast::{BinaryOp, Expr, UnaryOp, Variable};
use crate::middle::Env;

use super::asm::{AddrMode2, Cond, DataOp, Instruction, Operand2, Reg, Shift};
use super::runtime::Helper;
use super::{ArmGen, Frag};

use Instruction as I;

impl ArmGen {
    /// Evaluate `e` into `regs[0]`, using only `regs` (and the stack once
    /// they run out).
    pub(super) fn expr(&mut self, e: &Expr, regs: &[Reg], env: &Env, out: &mut Frag) {
        let dst = regs[0];
        match e {
            Expr::IntLit(n) => out.push(I::ldr_imm(dst, *n)),
            Expr::BoolLit(b) => out.push(I::mov_imm(dst, *b as i32)),
            Expr::CharLit(c) => out.push(I::mov_imm(dst, *c as i32)),
            Expr::StrLit(s) => {
                let label = self.pool.intern(out, s);
                out.push(I::ldr_label(dst, label));
            }
            Expr::NullPairLit => out.push(I::ldr_imm(dst, 0)),
            Expr::Ident(var) => self.load_var(var.name, env, dst, out),
            Expr::ArrayElem { array, indices, .. } => {
                self.array_address(array, indices, regs, env, out);
                out.push(I::ldr(dst, AddrMode2::at(dst, 0)));
            }
            Expr::Unary(op, e) => {
                self.expr(e, regs, env, out);
                self.unary(*op, dst, out);
            }
            Expr::Binary(lhs, op, rhs) => self.binary(lhs, *op, rhs, regs, env, out),
        }
    }

    fn unary(&mut self, op: UnaryOp, dst: Reg, out: &mut Frag) {
        match op {
            UnaryOp::Not => out.push(I::data(DataOp::Eor, dst, dst, Operand2::imm(1))),
            UnaryOp::Neg => {
                out.push(I::data_flags(DataOp::Rsb, dst, dst, Operand2::imm(0)));
                out.require(Helper::ThrowOverflow);
                out.push(I::bl_cond(Cond::Vs, Helper::ThrowOverflow.label()));
            }
            // The length word sits at the front of the array block.
            UnaryOp::Len => out.push(I::ldr(dst, AddrMode2::at(dst, 0))),
            // ord and chr only change the static type.
            UnaryOp::Ord | UnaryOp::Chr => {}
        }
    }

    fn binary(
        &mut self,
        lhs: &Expr,
        op: BinaryOp,
        rhs: &Expr,
        regs: &[Reg],
        env: &Env,
        out: &mut Frag,
    ) {
        // The logical operators evaluate their second operand only
        // conditionally, so they cannot go through the plain two-register
        // schema below.
        if let BinaryOp::And | BinaryOp::Or = op {
            return self.short_circuit(lhs, op, rhs, regs, env, out);
        }

        let dst = regs[0];
        match regs {
            [] => crate::ice!("expression lowering ran out of registers"),
            [only] => {
                // Stack machine: rhs first, spilled while lhs runs.
                trace!(%op, "spilling through the stack");
                self.expr(rhs, regs, env, out);
                out.push(I::Push(vec![*only]));
                self.sp_shift += 4;
                self.expr(lhs, regs, env, out);
                out.push(I::Pop(vec![Reg::LAST]));
                self.sp_shift -= 4;
                self.apply(op, dst, dst, Reg::LAST, out);
            }
            [_, next, ..] => {
                if rhs.weight() > lhs.weight() {
                    self.expr(rhs, regs, env, out);
                    self.expr(lhs, &regs[1..], env, out);
                    self.apply(op, dst, *next, dst, out);
                } else {
                    self.expr(lhs, regs, env, out);
                    self.expr(rhs, &regs[1..], env, out);
                    self.apply(op, dst, dst, *next, out);
                }
            }
        }
    }

    /// Apply `op` to evaluated operands: `dst <- lhs op rhs`.
    fn apply(&mut self, op: BinaryOp, dst: Reg, lhs: Reg, rhs: Reg, out: &mut Frag) {
        use BinaryOp::*;
        match op {
            Add | Sub => {
                let data_op = if op == Add { DataOp::Add } else { DataOp::Sub };
                out.push(I::data_flags(data_op, dst, lhs, Operand2::Reg(rhs)));
                out.require(Helper::ThrowOverflow);
                out.push(I::bl_cond(Cond::Vs, Helper::ThrowOverflow.label()));
            }
            Mul => {
                // 64-bit multiply; the upper word must be the sign
                // extension of the lower or the product overflowed.
                let hi = if lhs == dst { rhs } else { lhs };
                out.push(I::Smull { lo: dst, hi, lhs, rhs });
                out.push(I::Cmp {
                    lhs: hi,
                    op2: Operand2::Shifted(dst, Shift::Asr, 31),
                });
                out.require(Helper::ThrowOverflow);
                out.push(I::bl_cond(Cond::Ne, Helper::ThrowOverflow.label()));
            }
            Div | Mod => {
                out.push(I::mov(Reg::R0, lhs));
                out.push(I::mov(Reg::R1, rhs));
                out.require(Helper::CheckDivZero);
                out.push(I::bl(Helper::CheckDivZero.label()));
                if op == Div {
                    out.push(I::bl(crate::common::id("__aeabi_idiv")));
                    out.push(I::mov(dst, Reg::R0));
                } else {
                    out.push(I::bl(crate::common::id("__aeabi_idivmod")));
                    out.push(I::mov(dst, Reg::R1));
                }
            }
            Gt | Gte | Lt | Lte | Eq | Neq => {
                let cond = match op {
                    Gt => Cond::Gt,
                    Gte => Cond::Ge,
                    Lt => Cond::Lt,
                    Lte => Cond::Le,
                    Eq => Cond::Eq,
                    Neq => Cond::Ne,
                    _ => unreachable!(),
                };
                out.push(I::Cmp {
                    lhs,
                    op2: Operand2::Reg(rhs),
                });
                out.push(I::mov_cond(cond, dst, 1));
                out.push(I::mov_cond(cond.negate(), dst, 0));
            }
            And | Or => unreachable!("short-circuited before apply"),
        }
    }

    /// `&&`/`||`: evaluate the left operand, then branch over the right
    /// one when it already decides the result.
    fn short_circuit(
        &mut self,
        lhs: &Expr,
        op: BinaryOp,
        rhs: &Expr,
        regs: &[Reg],
        env: &Env,
        out: &mut Frag,
    ) {
        let dst = regs[0];
        self.expr(lhs, regs, env, out);
        let skip = self.labels.fresh();
        let decided = if op == BinaryOp::And { 0 } else { 1 };
        out.push(I::cmp_imm(dst, decided));
        out.push(I::branch_cond(Cond::Eq, skip));
        self.expr(rhs, regs, env, out);
        out.label(skip);
    }

    /// Leave the address of `array[indices...]` in `regs[0]`, bounds-
    /// checking every dimension.
    pub(super) fn array_address(
        &mut self,
        array: &Variable,
        indices: &[Expr],
        regs: &[Reg],
        env: &Env,
        out: &mut Frag,
    ) {
        let dst = regs[0];
        self.slot_address(array.name, env, dst, out);
        for index in indices {
            if regs.len() == 1 {
                // No register left for the index: spill the address.
                out.push(I::Push(vec![dst]));
                self.sp_shift += 4;
                self.expr(index, regs, env, out);
                out.push(I::Pop(vec![Reg::LAST]));
                self.sp_shift -= 4;
                self.index_step(Reg::LAST, dst, out);
                out.push(I::mov(dst, Reg::LAST));
            } else {
                let next = regs[1];
                self.expr(index, &regs[1..], env, out);
                self.index_step(dst, next, out);
            }
        }
    }

    /// One dimension of array indexing: `addr` holds the address of an
    /// array pointer, `index` the evaluated index.  Leaves the address of
    /// the selected element back in `addr`.
    fn index_step(&mut self, addr: Reg, index: Reg, out: &mut Frag) {
        out.push(I::ldr(addr, AddrMode2::at(addr, 0)));
        out.push(I::mov(Reg::R0, index));
        out.push(I::mov(Reg::R1, addr));
        out.require(Helper::CheckArrayBounds);
        out.push(I::bl(Helper::CheckArrayBounds.label()));
        out.push(I::data(DataOp::Add, addr, addr, Operand2::imm(4)));
        out.push(I::data(
            DataOp::Add,
            addr,
            addr,
            Operand2::Shifted(index, Shift::Lsl, 2),
        ));
    }

    /// Load a variable's value into `dst`.
    pub(super) fn load_var(&mut self, name: Id, env: &Env, dst: Reg, out: &mut Frag) {
        let slot = env.slot(name) + self.sp_shift;
        if slot <= 4095 {
            out.push(I::ldr(dst, AddrMode2::at(Reg::Sp, slot)));
        } else {
            out.push(I::ldr_imm(dst, slot));
            out.push(I::data(DataOp::Add, dst, Reg::Sp, Operand2::Reg(dst)));
            out.push(I::ldr(dst, AddrMode2::at(dst, 0)));
        }
    }

    /// Store `src` into a variable's slot.
    pub(super) fn store_var(&mut self, name: Id, env: &Env, src: Reg, out: &mut Frag) {
        let slot = env.slot(name) + self.sp_shift;
        if slot <= 4095 {
            out.push(I::str(src, AddrMode2::at(Reg::Sp, slot)));
        } else {
            out.push(I::ldr_imm(Reg::LAST, slot));
            out.push(I::data(
                DataOp::Add,
                Reg::LAST,
                Reg::Sp,
                Operand2::Reg(Reg::LAST),
            ));
            out.push(I::str(src, AddrMode2::at(Reg::LAST, 0)));
        }
    }

    /// Leave the address of a variable's slot in `dst`.
    pub(super) fn slot_address(&mut self, name: Id, env: &Env, dst: Reg, out: &mut Frag) {
        let slot = env.slot(name) + self.sp_shift;
        self.add_imm(dst, Reg::Sp, slot, out);
    }

    /// `dst <- base + n` for an arbitrary non-negative `n`, chunked to
    /// stay within the rotated-immediate reach.
    pub(super) fn add_imm(&mut self, dst: Reg, base: Reg, n: i32, out: &mut Frag) {
        debug_assert!(n >= 0);
        let mut chunk = n.min(1024);
        out.push(I::data(DataOp::Add, dst, base, Operand2::imm(chunk)));
        let mut rest = n - chunk;
        while rest > 0 {
            chunk = rest.min(1024);
            out.push(I::data(DataOp::Add, dst, dst, Operand2::imm(chunk)));
            rest -= chunk;
        }
    }
}
