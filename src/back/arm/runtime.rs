//! The runtime-support routines.
//!
//! Each routine is a named fragment plus the set of other routines it
//! relies on.  Code generation only marks what it needs; emission takes
//! the transitive closure of those marks and renders every routine in it
//! exactly once.

use derive_more::Display;

use crate::common::{id, Id, Set};

use super::asm::{AddrMode2, Cond, DataOp, Instruction, Operand2, Reg};
use super::pool::StrPool;
use super::Frag;

/// A runtime-support routine.  The display form is its label.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display)]
pub enum Helper {
    #[display("p_print_int")]
    PrintInt,
    #[display("p_print_bool")]
    PrintBool,
    #[display("p_print_string")]
    PrintString,
    #[display("p_print_reference")]
    PrintRef,
    #[display("p_print_ln")]
    PrintLn,
    #[display("p_read_int")]
    ReadInt,
    #[display("p_read_char")]
    ReadChar,
    #[display("p_check_divide_by_zero")]
    CheckDivZero,
    #[display("p_check_array_bounds")]
    CheckArrayBounds,
    #[display("p_check_null_pointer")]
    CheckNullPointer,
    #[display("p_free_pair")]
    FreePair,
    #[display("p_throw_overflow_error")]
    ThrowOverflow,
    #[display("p_throw_runtime_error")]
    ThrowRuntime,
}

impl Helper {
    pub fn label(self) -> Id {
        id(self.to_string())
    }

    /// The routines this one branches to.
    pub fn deps(self) -> &'static [Helper] {
        use Helper::*;
        match self {
            PrintInt | PrintBool | PrintString | PrintRef | PrintLn | ReadInt | ReadChar => &[],
            CheckDivZero | CheckArrayBounds | CheckNullPointer | FreePair | ThrowOverflow => {
                &[ThrowRuntime]
            }
            ThrowRuntime => &[PrintString],
        }
    }

    /// This routine's code, with its message strings interned into the
    /// shared pool.
    pub fn fragment(self, pool: &mut StrPool) -> Frag {
        use Helper::*;
        use Instruction as I;
        use Reg::*;

        let mut out = Frag::new();
        out.label(self.label());
        for dep in self.deps() {
            out.require(*dep);
        }

        // A printf-family epilogue: format string address in r0 (skipping
        // the length word), arguments placed, then flush stdout.
        let call_printf = |out: &mut Frag| {
            out.push(I::data(DataOp::Add, R0, R0, Operand2::imm(4)));
            out.push(I::bl(id("printf")));
            out.push(I::mov_imm(R0, 0));
            out.push(I::bl(id("fflush")));
        };

        match self {
            PrintInt => {
                out.push(I::Push(vec![Lr]));
                out.push(I::mov(R1, R0));
                let fmt = pool.intern(&mut out, "%d\0");
                out.push(I::ldr_label(R0, fmt));
                call_printf(&mut out);
                out.push(I::Pop(vec![Pc]));
            }
            PrintBool => {
                out.push(I::Push(vec![Lr]));
                out.push(I::cmp_imm(R0, 0));
                let yes = pool.intern(&mut out, "true\0");
                let no = pool.intern(&mut out, "false\0");
                out.push(I::Ldr {
                    cond: Cond::Ne,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(yes),
                });
                out.push(I::Ldr {
                    cond: Cond::Eq,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(no),
                });
                call_printf(&mut out);
                out.push(I::Pop(vec![Pc]));
            }
            PrintString => {
                out.push(I::Push(vec![Lr]));
                out.push(I::ldr(R1, AddrMode2::at(R0, 0)));
                out.push(I::data(DataOp::Add, R2, R0, Operand2::imm(4)));
                let fmt = pool.intern(&mut out, "%.*s\0");
                out.push(I::ldr_label(R0, fmt));
                call_printf(&mut out);
                out.push(I::Pop(vec![Pc]));
            }
            PrintRef => {
                out.push(I::Push(vec![Lr]));
                out.push(I::mov(R1, R0));
                let fmt = pool.intern(&mut out, "%p\0");
                out.push(I::ldr_label(R0, fmt));
                call_printf(&mut out);
                out.push(I::Pop(vec![Pc]));
            }
            PrintLn => {
                out.push(I::Push(vec![Lr]));
                let empty = pool.intern(&mut out, "\0");
                out.push(I::ldr_label(R0, empty));
                out.push(I::data(DataOp::Add, R0, R0, Operand2::imm(4)));
                out.push(I::bl(id("puts")));
                out.push(I::mov_imm(R0, 0));
                out.push(I::bl(id("fflush")));
                out.push(I::Pop(vec![Pc]));
            }
            ReadInt | ReadChar => {
                out.push(I::Push(vec![Lr]));
                out.push(I::mov(R1, R0));
                let fmt = pool.intern(
                    &mut out,
                    if self == ReadInt { " %d\0" } else { " %c\0" },
                );
                out.push(I::ldr_label(R0, fmt));
                out.push(I::data(DataOp::Add, R0, R0, Operand2::imm(4)));
                out.push(I::bl(id("scanf")));
                out.push(I::Pop(vec![Pc]));
            }
            CheckDivZero => {
                out.push(I::Push(vec![Lr]));
                out.push(I::cmp_imm(R1, 0));
                let msg = pool.intern(&mut out, "DivideByZeroError: divide or modulo by zero\n\0");
                out.push(I::Ldr {
                    cond: Cond::Eq,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(msg),
                });
                out.push(I::bl_cond(Cond::Eq, ThrowRuntime.label()));
                out.push(I::Pop(vec![Pc]));
            }
            CheckNullPointer => {
                out.push(I::Push(vec![Lr]));
                out.push(I::cmp_imm(R0, 0));
                let msg = pool.intern(&mut out, "NullReferenceError: dereference a null reference\n\0");
                out.push(I::Ldr {
                    cond: Cond::Eq,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(msg),
                });
                out.push(I::bl_cond(Cond::Eq, ThrowRuntime.label()));
                out.push(I::Pop(vec![Pc]));
            }
            CheckArrayBounds => {
                out.push(I::Push(vec![Lr]));
                out.push(I::cmp_imm(R0, 0));
                let neg = pool.intern(&mut out, "ArrayIndexOutOfBoundsError: negative index\n\0");
                out.push(I::Ldr {
                    cond: Cond::Lt,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(neg),
                });
                out.push(I::bl_cond(Cond::Lt, ThrowRuntime.label()));
                out.push(I::ldr(R1, AddrMode2::at(R1, 0)));
                out.push(I::Cmp {
                    lhs: R0,
                    op2: Operand2::Reg(R1),
                });
                let large = pool.intern(&mut out, "ArrayIndexOutOfBoundsError: index too large\n\0");
                out.push(I::Ldr {
                    cond: Cond::Cs,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(large),
                });
                out.push(I::bl_cond(Cond::Cs, ThrowRuntime.label()));
                out.push(I::Pop(vec![Pc]));
            }
            FreePair => {
                out.push(I::Push(vec![Lr]));
                out.push(I::cmp_imm(R0, 0));
                let msg = pool.intern(&mut out, "NullReferenceError: dereference a null reference\n\0");
                out.push(I::Ldr {
                    cond: Cond::Eq,
                    dst: R0,
                    addr: AddrMode2::PoolLabel(msg),
                });
                out.push(I::branch_cond(Cond::Eq, ThrowRuntime.label()));
                out.push(I::Push(vec![R0]));
                out.push(I::ldr(R0, AddrMode2::at(R0, 0)));
                out.push(I::bl(id("free")));
                out.push(I::ldr(R0, AddrMode2::at(Sp, 0)));
                out.push(I::ldr(R0, AddrMode2::at(R0, 4)));
                out.push(I::bl(id("free")));
                out.push(I::Pop(vec![R0]));
                out.push(I::bl(id("free")));
                out.push(I::Pop(vec![Pc]));
            }
            ThrowOverflow => {
                let msg = pool.intern(
                    &mut out,
                    "OverflowError: the result is too small/large to store in a 4-byte signed-integer.\n\0",
                );
                out.push(I::ldr_label(R0, msg));
                out.push(I::bl(ThrowRuntime.label()));
            }
            ThrowRuntime => {
                out.push(I::bl(PrintString.label()));
                out.push(I::ldr_imm(R0, -1));
                out.push(I::bl(id("exit")));
            }
        }
        out
    }
}

/// The transitive closure of a helper set under its dependency relation.
pub fn closure(marked: &Set<Helper>) -> Set<Helper> {
    let mut closed = Set::new();
    let mut work: Vec<Helper> = marked.iter().copied().collect();
    while let Some(helper) = work.pop() {
        if closed.insert(helper) {
            work.extend(helper.deps());
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_is_closed_under_deps() {
        let mut marked = Set::new();
        marked.insert(Helper::ThrowOverflow);
        let closed = closure(&marked);
        assert!(closed.contains(&Helper::ThrowOverflow));
        assert!(closed.contains(&Helper::ThrowRuntime));
        assert!(closed.contains(&Helper::PrintString));
        for helper in &closed {
            for dep in helper.deps() {
                assert!(closed.contains(dep), "{helper} dep {dep} missing");
            }
        }
    }

    #[test]
    fn closure_of_leaf_helpers_is_itself() {
        let mut marked = Set::new();
        marked.insert(Helper::PrintInt);
        marked.insert(Helper::PrintLn);
        assert_eq!(closure(&marked), marked);
    }

    #[test]
    fn every_fragment_defines_exactly_its_label() {
        let mut pool = StrPool::new();
        for helper in [
            Helper::PrintInt,
            Helper::PrintBool,
            Helper::PrintString,
            Helper::PrintRef,
            Helper::PrintLn,
            Helper::ReadInt,
            Helper::ReadChar,
            Helper::CheckDivZero,
            Helper::CheckArrayBounds,
            Helper::CheckNullPointer,
            Helper::FreePair,
            Helper::ThrowOverflow,
            Helper::ThrowRuntime,
        ] {
            let frag = helper.fragment(&mut pool);
            let labels: Vec<_> = frag.defined_labels().collect();
            assert_eq!(labels, vec![helper.label()]);
        }
    }
}
