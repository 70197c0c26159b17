//! The ARM instruction model.
//!
//! Instructions are parameterised over condition codes, a set-flags bit,
//! operand registers and Operand-2 values, and render to GAS syntax via
//! [std::fmt::Display].  Loads and stores take an [AddrMode2], the closed
//! nine-case addressing-mode grammar of the ARM reference ({offset,
//! pre-indexed, post-indexed} x {zero, immediate, signed register}) plus
//! the two synthetic literal-pool forms `=imm32` and `=label` that the
//! assembler expands into pool references.

use derive_more::Display;
use std::fmt;

use crate::common::Id;

/// A machine register.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[allow(missing_docs)]
pub enum Reg {
    #[display("r0")]
    R0,
    #[display("r1")]
    R1,
    #[display("r2")]
    R2,
    #[display("r3")]
    R3,
    #[display("r4")]
    R4,
    #[display("r5")]
    R5,
    #[display("r6")]
    R6,
    #[display("r7")]
    R7,
    #[display("r8")]
    R8,
    #[display("r9")]
    R9,
    #[display("r10")]
    R10,
    #[display("r11")]
    R11,
    #[display("r12")]
    R12,
    #[display("sp")]
    Sp,
    #[display("lr")]
    Lr,
    #[display("pc")]
    Pc,
}

impl Reg {
    /// The registers available to expression evaluation, in priority
    /// order.  Code generation threads a suffix of this list; the head is
    /// always the destination.
    pub const POOL: [Reg; 8] = [
        Reg::R4,
        Reg::R5,
        Reg::R6,
        Reg::R7,
        Reg::R8,
        Reg::R9,
        Reg::R10,
        Reg::R11,
    ];

    /// The reserved spill register.  Never a member of [Reg::POOL]; the
    /// stack-machine fallback pops into it, and over-long slot offsets
    /// borrow it as an address scratch.
    pub const LAST: Reg = Reg::R12;
}

/// A condition code, suffixed onto mnemonics ([Cond::Al] renders empty).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Cond {
    #[display("")]
    Al,
    #[display("EQ")]
    Eq,
    #[display("NE")]
    Ne,
    #[display("LT")]
    Lt,
    #[display("LE")]
    Le,
    #[display("GT")]
    Gt,
    #[display("GE")]
    Ge,
    /// Overflow set.
    #[display("VS")]
    Vs,
    /// Carry set (unsigned higher-or-same).
    #[display("CS")]
    Cs,
}

impl Cond {
    /// The opposite condition, for the `MOVcond #1 / MOVnotcond #0`
    /// comparison idiom.
    pub fn negate(self) -> Cond {
        use Cond::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Ge => Lt,
            Le => Gt,
            Gt => Le,
            Al | Vs | Cs => crate::ice!("condition {self:?} has no negation here"),
        }
    }
}

/// An 8-bit-rotated data-processing immediate: the encoded constant is
/// `value` rotated right by `rotation` (even, in `0..=30`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Immed8r {
    value: u8,
    rotation: u8,
}

impl Immed8r {
    /// Encode a 32-bit constant, if it is expressible.
    pub fn encode(n: u32) -> Option<Immed8r> {
        (0..32).step_by(2).find_map(|rotation| {
            let rotated = n.rotate_left(rotation);
            (rotated <= 0xFF).then_some(Immed8r {
                value: rotated as u8,
                rotation: rotation as u8,
            })
        })
    }

    /// The encoded 32-bit constant.
    pub fn value(self) -> u32 {
        (self.value as u32).rotate_right(self.rotation as u32)
    }
}

/// A barrel-shifter operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Shift {
    #[display("LSL")]
    Lsl,
    #[display("LSR")]
    Lsr,
    #[display("ASR")]
    Asr,
    #[display("ROR")]
    Ror,
}

/// The flexible second operand of data-processing instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand2 {
    Imm(Immed8r),
    Reg(Reg),
    Shifted(Reg, Shift, u8),
}

impl Operand2 {
    /// An immediate operand.  The constant must be encodable; call sites
    /// only pass small constants or pre-chunked stack adjustments.
    pub fn imm(n: i32) -> Operand2 {
        match Immed8r::encode(n as u32) {
            Some(imm) => Operand2::Imm(imm),
            None => crate::ice!("constant {n} is not an 8-bit-rotated immediate"),
        }
    }
}

impl fmt::Display for Operand2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand2::Imm(imm) => write!(f, "#{}", imm.value() as i32),
            Operand2::Reg(r) => write!(f, "{r}"),
            Operand2::Shifted(r, shift, amount) => write!(f, "{r}, {shift} #{amount}"),
        }
    }
}

/// Sign of a register offset in an addressing mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Sign {
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
}

/// The offset part of an indexed addressing mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Offset2 {
    Zero,
    /// A 12-bit immediate byte offset, either sign.
    Imm(i32),
    Reg(Sign, Reg),
}

impl Offset2 {
    /// An immediate offset, normalising zero to [Offset2::Zero].
    pub fn imm(n: i32) -> Offset2 {
        if n == 0 {
            Offset2::Zero
        } else if (-4095..=4095).contains(&n) {
            Offset2::Imm(n)
        } else {
            crate::ice!("offset {n} exceeds the 12-bit addressing range")
        }
    }
}

/// An Addr-Mode-2 value: how `LDR`/`STR` address memory.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddrMode2 {
    /// `[rn {, offset}]`: base plus offset, base unchanged.
    Offset(Reg, Offset2),
    /// `[rn {, offset}]!`: base plus offset, written back to the base.
    PreIndexed(Reg, Offset2),
    /// `[rn], offset`: base as-is, offset written back afterwards.
    PostIndexed(Reg, Offset2),
    /// `=imm32`, a literal-pool load source.
    PoolImm(i32),
    /// `=label`, a literal-pool address-of-label load source.
    PoolLabel(Id),
}

impl AddrMode2 {
    /// Plain `[rn, #offset]` addressing, zero-normalised.
    pub fn at(base: Reg, offset: i32) -> AddrMode2 {
        AddrMode2::Offset(base, Offset2::imm(offset))
    }
}

impl fmt::Display for AddrMode2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indexed = |f: &mut fmt::Formatter<'_>, base: &Reg, offset: &Offset2| match offset {
            Offset2::Zero => write!(f, "[{base}]"),
            Offset2::Imm(n) => write!(f, "[{base}, #{n}]"),
            Offset2::Reg(sign, r) => write!(f, "[{base}, {sign}{r}]"),
        };
        match self {
            AddrMode2::Offset(base, offset) => indexed(f, base, offset),
            AddrMode2::PreIndexed(base, offset) => {
                indexed(f, base, offset)?;
                write!(f, "!")
            }
            AddrMode2::PostIndexed(base, offset) => match offset {
                Offset2::Zero => write!(f, "[{base}], #0"),
                Offset2::Imm(n) => write!(f, "[{base}], #{n}"),
                Offset2::Reg(sign, r) => write!(f, "[{base}], {sign}{r}"),
            },
            AddrMode2::PoolImm(n) => write!(f, "={n}"),
            AddrMode2::PoolLabel(l) => write!(f, "={l}"),
        }
    }
}

/// Data-processing opcodes sharing the `op{cond}{S} rd, rn, op2` shape.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum DataOp {
    #[display("ADD")]
    Add,
    #[display("SUB")]
    Sub,
    /// Reverse subtract, for unary negation.
    #[display("RSB")]
    Rsb,
    #[display("AND")]
    And,
    #[display("ORR")]
    Orr,
    #[display("EOR")]
    Eor,
}

/// An ARM instruction.
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    /// A data-processing instruction: `dst <- lhs op op2`.
    Data {
        op: DataOp,
        cond: Cond,
        set_flags: bool,
        dst: Reg,
        lhs: Reg,
        op2: Operand2,
    },
    Mov {
        cond: Cond,
        dst: Reg,
        op2: Operand2,
    },
    Cmp {
        lhs: Reg,
        op2: Operand2,
    },
    /// Signed 64-bit multiply: `hi:lo <- lhs * rhs`.
    Smull {
        lo: Reg,
        hi: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    Ldr {
        cond: Cond,
        dst: Reg,
        addr: AddrMode2,
    },
    Str {
        src: Reg,
        addr: AddrMode2,
    },
    Push(Vec<Reg>),
    Pop(Vec<Reg>),
    /// `B`/`BL` with an optional condition.
    Branch {
        cond: Cond,
        link: bool,
        target: Id,
    },
}

impl Instruction {
    /// `dst <- lhs op op2`, unconditional, flags untouched.
    pub fn data(op: DataOp, dst: Reg, lhs: Reg, op2: Operand2) -> Instruction {
        Instruction::Data {
            op,
            cond: Cond::Al,
            set_flags: false,
            dst,
            lhs,
            op2,
        }
    }

    /// `dst <- lhs op op2`, setting the condition flags.
    pub fn data_flags(op: DataOp, dst: Reg, lhs: Reg, op2: Operand2) -> Instruction {
        Instruction::Data {
            op,
            cond: Cond::Al,
            set_flags: true,
            dst,
            lhs,
            op2,
        }
    }

    /// A register-to-register move.
    pub fn mov(dst: Reg, src: Reg) -> Instruction {
        Instruction::Mov {
            cond: Cond::Al,
            dst,
            op2: Operand2::Reg(src),
        }
    }

    /// Move a small constant into a register.
    pub fn mov_imm(dst: Reg, n: i32) -> Instruction {
        Instruction::Mov {
            cond: Cond::Al,
            dst,
            op2: Operand2::imm(n),
        }
    }

    /// Move a small constant under a condition.
    pub fn mov_cond(cond: Cond, dst: Reg, n: i32) -> Instruction {
        Instruction::Mov {
            cond,
            dst,
            op2: Operand2::imm(n),
        }
    }

    pub fn cmp_imm(lhs: Reg, n: i32) -> Instruction {
        Instruction::Cmp {
            lhs,
            op2: Operand2::imm(n),
        }
    }

    pub fn ldr(dst: Reg, addr: AddrMode2) -> Instruction {
        Instruction::Ldr {
            cond: Cond::Al,
            dst,
            addr,
        }
    }

    /// Load any 32-bit constant through the literal pool.
    pub fn ldr_imm(dst: Reg, n: i32) -> Instruction {
        Instruction::ldr(dst, AddrMode2::PoolImm(n))
    }

    /// Load the address of a data label through the literal pool.
    pub fn ldr_label(dst: Reg, label: Id) -> Instruction {
        Instruction::ldr(dst, AddrMode2::PoolLabel(label))
    }

    pub fn str(src: Reg, addr: AddrMode2) -> Instruction {
        Instruction::Str { src, addr }
    }

    pub fn branch(target: Id) -> Instruction {
        Instruction::Branch {
            cond: Cond::Al,
            link: false,
            target,
        }
    }

    pub fn branch_cond(cond: Cond, target: Id) -> Instruction {
        Instruction::Branch {
            cond,
            link: false,
            target,
        }
    }

    /// Branch-with-link (a call).
    pub fn bl(target: Id) -> Instruction {
        Instruction::Branch {
            cond: Cond::Al,
            link: true,
            target,
        }
    }

    pub fn bl_cond(cond: Cond, target: Id) -> Instruction {
        Instruction::Branch {
            cond,
            link: true,
            target,
        }
    }

    /// The label this instruction branches to, if any.
    pub fn branch_target(&self) -> Option<Id> {
        match self {
            Instruction::Branch { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// The data label this instruction loads through the literal pool, if
    /// any.
    pub fn pool_label(&self) -> Option<Id> {
        match self {
            Instruction::Ldr {
                addr: AddrMode2::PoolLabel(l),
                ..
            } => Some(*l),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        let list = |regs: &[Reg]| {
            regs.iter()
                .map(Reg::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self {
            Data {
                op,
                cond,
                set_flags,
                dst,
                lhs,
                op2,
            } => {
                let s = if *set_flags { "S" } else { "" };
                write!(f, "{op}{cond}{s} {dst}, {lhs}, {op2}")
            }
            Mov { cond, dst, op2 } => write!(f, "MOV{cond} {dst}, {op2}"),
            Cmp { lhs, op2 } => write!(f, "CMP {lhs}, {op2}"),
            Smull { lo, hi, lhs, rhs } => write!(f, "SMULL {lo}, {hi}, {lhs}, {rhs}"),
            Ldr { cond, dst, addr } => write!(f, "LDR{cond} {dst}, {addr}"),
            Str { src, addr } => write!(f, "STR {src}, {addr}"),
            Push(regs) => write!(f, "PUSH {{{}}}", list(regs)),
            Pop(regs) => write!(f, "POP {{{}}}", list(regs)),
            Branch { cond, link, target } => {
                let l = if *link { "L" } else { "" };
                write!(f, "B{l}{cond} {target}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    #[test]
    fn immed8r_encodes_rotated_constants() {
        for n in [0u32, 1, 255, 256, 1020, 1024, 0xFF000000, 0x3FC] {
            let imm = Immed8r::encode(n).unwrap_or_else(|| panic!("{n} should encode"));
            assert_eq!(imm.value(), n);
        }
        assert_eq!(Immed8r::encode(257), None);
        assert_eq!(Immed8r::encode(0x101), None);
        assert_eq!(Immed8r::encode(0xFF1), None);
    }

    #[test]
    fn display_covers_the_reference_forms() {
        assert_eq!(
            Instruction::ldr(Reg::R4, AddrMode2::at(Reg::Sp, 4)).to_string(),
            "LDR r4, [sp, #4]"
        );
        assert_eq!(
            Instruction::ldr(Reg::R4, AddrMode2::at(Reg::Sp, 0)).to_string(),
            "LDR r4, [sp]"
        );
        assert_eq!(
            Instruction::ldr_label(Reg::R4, id("msg_0")).to_string(),
            "LDR r4, =msg_0"
        );
        assert_eq!(
            Instruction::str(Reg::R4, AddrMode2::PreIndexed(Reg::Sp, Offset2::imm(-4)))
                .to_string(),
            "STR r4, [sp, #-4]!"
        );
        assert_eq!(
            Instruction::data_flags(DataOp::Add, Reg::R4, Reg::R4, Operand2::Reg(Reg::R5))
                .to_string(),
            "ADDS r4, r4, r5"
        );
        assert_eq!(
            Instruction::data(
                DataOp::Add,
                Reg::R4,
                Reg::R4,
                Operand2::Shifted(Reg::R5, Shift::Lsl, 2)
            )
            .to_string(),
            "ADD r4, r4, r5, LSL #2"
        );
        assert_eq!(
            Instruction::Cmp {
                lhs: Reg::R5,
                op2: Operand2::Shifted(Reg::R4, Shift::Asr, 31)
            }
            .to_string(),
            "CMP r5, r4, ASR #31"
        );
        assert_eq!(
            Instruction::bl_cond(Cond::Vs, id("p_throw_overflow_error")).to_string(),
            "BLVS p_throw_overflow_error"
        );
        assert_eq!(
            Instruction::Pop(vec![Reg::Pc]).to_string(),
            "POP {pc}"
        );
        assert_eq!(
            Instruction::mov_cond(Cond::Eq, Reg::R4, 1).to_string(),
            "MOVEQ r4, #1"
        );
    }

    #[test]
    fn pool_is_disjoint_from_last() {
        assert!(!Reg::POOL.contains(&Reg::LAST));
    }
}
