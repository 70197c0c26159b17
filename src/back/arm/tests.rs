//! ARM backend tests: the universal properties of the emitted assembly
//! and the end-to-end scenarios over the bundled samples.

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use regex::Regex;
use rstest::rstest;

use crate::back::Line;
use crate::common::{id, Id, Set};
use crate::front::ast::*;
use crate::front::types::Type;
use crate::middle::Env;
use crate::samples;

use super::asm::*;
use super::{lower, render, ArmGen, Frag};

fn int(n: i32) -> Expr {
    Expr::IntLit(n)
}

fn var(v: &Variable) -> Expr {
    Expr::Ident(v.clone())
}

/// Lower `e` with the first `nregs` pool registers available.
fn lower_expr(e: &Expr, nregs: usize) -> Frag {
    let mut gen = ArmGen::new();
    let env = Env::for_main();
    let mut out = Frag::new();
    gen.expr(e, &Reg::POOL[..nregs], &env, &mut out);
    out
}

/// Lower one statement inside its own scope, main-style.
fn lower_stmt(s: &Stmt) -> Frag {
    let mut gen = ArmGen::new();
    let mut env = Env::for_main();
    let mut out = Frag::new();
    gen.scoped(s, &mut env, &mut out);
    out
}

fn arm_text(p: &Program) -> String {
    render(&lower(p))
}

/// The slice of rendered output between `main:` and its `.ltorg`.
fn main_section(text: &str) -> &str {
    let start = text.find("main:").expect("main label");
    let end = text[start..].find(".ltorg").expect("main .ltorg");
    &text[start..start + end]
}

fn count_pushes(frag: &Frag) -> usize {
    frag.instrs()
        .filter(|i| matches!(i, Instruction::Push(_)))
        .count()
}

/// Net stack-pointer movement of one instruction.
fn sp_delta(i: &Instruction) -> i32 {
    match i {
        Instruction::Push(regs) => -4 * regs.len() as i32,
        Instruction::Pop(regs) => 4 * regs.len() as i32,
        Instruction::Data {
            op,
            dst: Reg::Sp,
            lhs: Reg::Sp,
            op2: Operand2::Imm(imm),
            ..
        } => match op {
            DataOp::Sub => -(imm.value() as i32),
            DataOp::Add => imm.value() as i32,
            _ => 0,
        },
        Instruction::Str {
            addr: AddrMode2::PreIndexed(Reg::Sp, Offset2::Imm(n)),
            ..
        } => *n,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Property 1: weights.

/// A random integer expression of bounded depth.
#[derive(Clone, Debug)]
struct IntExpr(Expr);

fn int_expr(g: &mut Gen, depth: usize) -> Expr {
    let leaf = depth == 0 || *g.choose(&[0, 1, 2, 3]).unwrap() == 0;
    if leaf {
        Expr::IntLit(i8::arbitrary(g) as i32)
    } else if *g.choose(&[0, 1, 2, 3]).unwrap() == 1 {
        Expr::unary(UnaryOp::Neg, int_expr(g, depth - 1))
    } else {
        let op = *g.choose(&[BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul]).unwrap();
        Expr::binary(int_expr(g, depth - 1), op, int_expr(g, depth - 1))
    }
}

impl Arbitrary for IntExpr {
    fn arbitrary(g: &mut Gen) -> IntExpr {
        IntExpr(int_expr(g, 4))
    }
}

#[quickcheck]
fn weight_many_registers_mean_no_spills(e: IntExpr) {
    let w = e.0.weight();
    assert!(w >= 1);
    if w <= Reg::POOL.len() {
        let frag = lower_expr(&e.0, w);
        assert_eq!(count_pushes(&frag), 0, "weight {w} registers must suffice");
    }
}

#[quickcheck]
fn spills_always_come_in_balanced_pairs(e: IntExpr) {
    for nregs in 1..=Reg::POOL.len() {
        let frag = lower_expr(&e.0, nregs);
        let pops = frag
            .instrs()
            .filter(|i| matches!(i, Instruction::Pop(_)))
            .count();
        assert_eq!(count_pushes(&frag), pops);
        assert_eq!(frag.instrs().map(sp_delta).sum::<i32>(), 0);
    }
}

/// A balanced tree of additions, `depth` levels deep.
fn balanced(depth: usize) -> Expr {
    if depth == 0 {
        int(1)
    } else {
        Expr::binary(balanced(depth - 1), BinaryOp::Add, balanced(depth - 1))
    }
}

#[test]
fn balanced_trees_weigh_depth_plus_one() {
    for depth in 0..6 {
        assert_eq!(balanced(depth).weight(), depth + 1);
    }
}

#[rstest]
#[case(3)]
#[case(4)]
#[case(5)]
fn one_register_short_costs_one_spill(#[case] depth: usize) {
    let e = balanced(depth);
    let w = e.weight();
    assert_eq!(count_pushes(&lower_expr(&e, w)), 0);
    assert_eq!(count_pushes(&lower_expr(&e, w - 1)), 1);
}

#[test]
fn single_register_lowering_spills_everywhere() {
    // With one register a depth-d balanced tree pays a spill per inner
    // node: 2^d - 1 of them.
    let e = balanced(3);
    assert_eq!(count_pushes(&lower_expr(&e, 1)), 7);
}

// ---------------------------------------------------------------------------
// Property 2: stack-shift balance.

fn spilling_expr() -> Expr {
    // Deeper than the pool, to force PUSH/POP traffic.
    balanced(Reg::POOL.len())
}

#[rstest]
#[case::decl(Stmt::Decl(Variable::new("x", Type::Int), Rhs::Expr(int(1))))]
#[case::spill(Stmt::Decl(Variable::new("x", Type::Int), Rhs::Expr(spilling_expr())))]
#[case::block(Stmt::Block(Box::new(Stmt::seq([
    Stmt::Decl(Variable::new("x", Type::Int), Rhs::Expr(int(1))),
    Stmt::Decl(Variable::new("y", Type::Int), Rhs::Expr(int(2))),
]))))]
#[case::branches(Stmt::If {
    cond: Expr::binary(int(1), BinaryOp::Lt, int(2)),
    then: Box::new(Stmt::Decl(Variable::new("a", Type::Int), Rhs::Expr(int(1)))),
    otherwise: Box::new(Stmt::Decl(Variable::new("b", Type::Int), Rhs::Expr(int(2)))),
})]
#[case::looped(Stmt::While {
    cond: Expr::binary(int(1), BinaryOp::Lt, int(2)),
    body: Box::new(Stmt::Decl(Variable::new("i", Type::Int), Rhs::Expr(int(0)))),
})]
#[case::call(Stmt::Call {
    name: id("f"),
    args: vec![int(1), int(2), int(3)],
    ret: Type::Int,
})]
fn statements_leave_the_stack_pointer_where_it_was(#[case] s: Stmt) {
    let frag = lower_stmt(&s);
    assert_eq!(frag.instrs().map(sp_delta).sum::<i32>(), 0);
}

// ---------------------------------------------------------------------------
// Properties 3 and 4: labels and helper closure, over every sample.

/// Branch targets outside the program: libc and the ABI division runtime.
fn external(label: Id) -> bool {
    [
        "malloc", "free", "exit", "printf", "fflush", "puts", "scanf", "putchar",
        "__aeabi_idiv", "__aeabi_idivmod",
    ]
    .contains(&label.as_str())
}

#[test]
fn labels_are_unique_and_every_branch_resolves() {
    for (name, program) in samples::all() {
        let frag = lower(&program);
        let defined: Vec<Id> = frag.defined_labels().collect();
        let defined_set: Set<Id> = defined.iter().copied().collect();
        assert_eq!(defined.len(), defined_set.len(), "{name}: duplicate label");

        let data_labels: Set<Id> = frag.data.iter().map(|r| r.label).collect();
        for instr in frag.instrs() {
            if let Some(target) = instr.branch_target() {
                assert!(
                    defined_set.contains(&target) || external(target),
                    "{name}: branch to undefined label {target}"
                );
            }
            if let Some(label) = instr.pool_label() {
                assert!(
                    data_labels.contains(&label),
                    "{name}: pool reference to undefined data label {label}"
                );
            }
        }

        // Numbered labels exist only because a branch targets them.
        let used: Set<Id> = frag.instrs().filter_map(|i| i.branch_target()).collect();
        for label in &defined_set {
            let text = label.as_str();
            if text.starts_with('L') && text[1..].chars().all(|c| c.is_ascii_digit()) {
                assert!(used.contains(label), "{name}: orphaned label {label}");
            }
        }
    }
}

#[test]
fn emitted_helper_sets_are_closed_and_defined() {
    for (name, program) in samples::all() {
        let frag = lower(&program);
        let defined: Set<Id> = frag.defined_labels().collect();
        for helper in &frag.helpers {
            for dep in helper.deps() {
                assert!(
                    frag.helpers.contains(dep),
                    "{name}: helper set misses {dep} needed by {helper}"
                );
            }
            assert!(
                defined.contains(&helper.label()),
                "{name}: required helper {helper} was not emitted"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Property 6: addressing-mode round trip.

fn parse_reg(s: &str) -> Reg {
    use Reg::*;
    match s {
        "r0" => R0,
        "r1" => R1,
        "r2" => R2,
        "r3" => R3,
        "r4" => R4,
        "r5" => R5,
        "r6" => R6,
        "r7" => R7,
        "r8" => R8,
        "r9" => R9,
        "r10" => R10,
        "r11" => R11,
        "r12" => R12,
        "sp" => Sp,
        "lr" => Lr,
        "pc" => Pc,
        other => panic!("unknown register {other}"),
    }
}

fn parse_sign(s: &str) -> Sign {
    if s == "-" {
        Sign::Minus
    } else {
        Sign::Plus
    }
}

/// The reference parser for the Addr-Mode-2 grammar, used only to check
/// that printing is invertible.
fn parse_addr(s: &str) -> AddrMode2 {
    let pool_imm = Regex::new(r"^=(-?\d+)$").unwrap();
    let pool_label = Regex::new(r"^=([A-Za-z_][A-Za-z0-9_]*)$").unwrap();
    let indexed = Regex::new(r"^\[(\w+)(?:, (?:#(-?\d+)|([+-])(\w+)))?\](!?)$").unwrap();
    let post = Regex::new(r"^\[(\w+)\], (?:#(-?\d+)|([+-])(\w+))$").unwrap();

    if let Some(c) = pool_imm.captures(s) {
        return AddrMode2::PoolImm(c[1].parse().unwrap());
    }
    if let Some(c) = pool_label.captures(s) {
        return AddrMode2::PoolLabel(id(&c[1]));
    }
    if let Some(c) = post.captures(s) {
        let base = parse_reg(&c[1]);
        let offset = match (c.get(2), c.get(3), c.get(4)) {
            (Some(n), _, _) => Offset2::imm(n.as_str().parse().unwrap()),
            (_, Some(sign), Some(reg)) => {
                Offset2::Reg(parse_sign(sign.as_str()), parse_reg(reg.as_str()))
            }
            _ => unreachable!(),
        };
        return AddrMode2::PostIndexed(base, offset);
    }
    if let Some(c) = indexed.captures(s) {
        let base = parse_reg(&c[1]);
        let offset = match (c.get(2), c.get(3), c.get(4)) {
            (Some(n), _, _) => Offset2::imm(n.as_str().parse().unwrap()),
            (_, Some(sign), Some(reg)) => {
                Offset2::Reg(parse_sign(sign.as_str()), parse_reg(reg.as_str()))
            }
            _ => Offset2::Zero,
        };
        return if c[5].is_empty() {
            AddrMode2::Offset(base, offset)
        } else {
            AddrMode2::PreIndexed(base, offset)
        };
    }
    panic!("unparseable addressing mode {s:?}");
}

#[derive(Clone, Debug)]
struct ArbAddr(AddrMode2);

impl Arbitrary for ArbAddr {
    fn arbitrary(g: &mut Gen) -> ArbAddr {
        let base = *g.choose(&[Reg::R0, Reg::R4, Reg::R11, Reg::Sp]).unwrap();
        let offset = match *g.choose(&[0, 1, 2]).unwrap() {
            0 => Offset2::Zero,
            1 => {
                let n = (i16::arbitrary(g) as i32 % 4095).abs().max(1);
                let sign = if bool::arbitrary(g) { -1 } else { 1 };
                Offset2::imm(sign * n)
            }
            _ => {
                let sign = if bool::arbitrary(g) { Sign::Plus } else { Sign::Minus };
                Offset2::Reg(sign, *g.choose(&[Reg::R1, Reg::R5, Reg::R12]).unwrap())
            }
        };
        let addr = match *g.choose(&[0, 1, 2, 3, 4]).unwrap() {
            0 => AddrMode2::Offset(base, offset),
            1 => AddrMode2::PreIndexed(base, offset),
            2 => AddrMode2::PostIndexed(base, offset),
            3 => AddrMode2::PoolImm(i32::arbitrary(g)),
            _ => AddrMode2::PoolLabel(*g.choose(&[id("msg_0"), id("L3"), id("p_print_int")]).unwrap()),
        };
        ArbAddr(addr)
    }
}

#[quickcheck]
fn addressing_modes_round_trip(addr: ArbAddr) {
    assert_eq!(parse_addr(&addr.0.to_string()), addr.0);
}

#[test]
fn the_nine_indexed_cases_round_trip() {
    let offsets = [
        Offset2::Zero,
        Offset2::imm(40),
        Offset2::Reg(Sign::Minus, Reg::R5),
    ];
    let mut seen = Vec::new();
    for offset in offsets {
        for addr in [
            AddrMode2::Offset(Reg::R4, offset),
            AddrMode2::PreIndexed(Reg::R4, offset),
            AddrMode2::PostIndexed(Reg::R4, offset),
        ] {
            let text = addr.to_string();
            assert_eq!(parse_addr(&text), addr, "{text}");
            seen.push(text);
        }
    }
    // All nine textual forms are distinct.
    let unique: Set<String> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), 9);
}

// ---------------------------------------------------------------------------
// Every operator lowers (no "not implemented" remains).

#[rstest]
#[case(BinaryOp::Mul)]
#[case(BinaryOp::Div)]
#[case(BinaryOp::Mod)]
#[case(BinaryOp::Add)]
#[case(BinaryOp::Sub)]
#[case(BinaryOp::Gt)]
#[case(BinaryOp::Gte)]
#[case(BinaryOp::Lt)]
#[case(BinaryOp::Lte)]
#[case(BinaryOp::Eq)]
#[case(BinaryOp::Neq)]
#[case(BinaryOp::And)]
#[case(BinaryOp::Or)]
fn every_binary_operator_lowers(#[case] op: BinaryOp) {
    let operand = |g: bool| {
        if g {
            Expr::BoolLit(true)
        } else {
            int(7)
        }
    };
    let logical = matches!(op, BinaryOp::And | BinaryOp::Or);
    let e = Expr::binary(operand(logical), op, operand(logical));
    let frag = lower_expr(&e, Reg::POOL.len());
    assert!(frag.code.iter().any(|l| matches!(l, Line::Instr(_))));
}

#[rstest]
#[case(UnaryOp::Not)]
#[case(UnaryOp::Neg)]
#[case(UnaryOp::Ord)]
#[case(UnaryOp::Chr)]
fn every_scalar_unary_operator_lowers(#[case] op: UnaryOp) {
    let operand = match op {
        UnaryOp::Not => Expr::BoolLit(false),
        UnaryOp::Neg | UnaryOp::Chr => int(7),
        _ => Expr::CharLit(b'a'),
    };
    lower_expr(&Expr::unary(op, operand), Reg::POOL.len());
}

#[test]
fn len_lowers_to_a_length_word_load() {
    let a = Variable::new("a", Type::array_of(Type::Int));
    let program = Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(a.clone(), Rhs::ArrayLit(vec![int(1)], Type::array_of(Type::Int))),
            Stmt::Exit(Expr::unary(UnaryOp::Len, var(&a))),
        ]),
    };
    let text = arm_text(&program);
    assert!(text.contains("LDR r4, [sp]"));
    assert!(text.contains("LDR r4, [r4]"));
}

// ---------------------------------------------------------------------------
// End-to-end scenarios.

fn count(haystack: &str, pattern: &str) -> usize {
    Regex::new(pattern).unwrap().find_iter(haystack).count()
}

#[test]
fn scenario_weighted_expression_stays_in_registers() {
    let text = arm_text(&samples::get("exprs").unwrap());
    let main = main_section(&text);
    assert_eq!(count(main, r"\bSMULL\b"), 1);
    assert_eq!(count(main, r"\bADDS\b"), 1);
    // The only push is the frame's PUSH {lr}.
    assert_eq!(count(main, r"\bPUSH\b"), 1);
    assert!(main.contains("MOV r0, r4"));
    assert!(main.contains("BL exit"));
}

#[test]
fn scenario_array_allocation_and_bounds_checks() {
    let text = arm_text(&samples::get("arrays").unwrap());
    // Length word plus three elements.
    assert!(text.contains("LDR r0, =16"));
    assert!(text.contains("BL malloc"));
    assert!(text.contains("BL p_check_array_bounds"));
    assert_eq!(count(&text, r"(?m)^p_check_array_bounds:$"), 1);
}

#[test]
fn scenario_overflow_checks_attach_to_adds() {
    let text = arm_text(&samples::get("overflow").unwrap());
    assert!(Regex::new(r"ADDS r4, r4, r5\n\tBLVS p_throw_overflow_error")
        .unwrap()
        .is_match(&text));
    assert_eq!(count(&text, r"(?m)^p_throw_overflow_error:$"), 1);
}

#[test]
fn scenario_pairs_allocate_record_and_cells() {
    let text = arm_text(&samples::get("pairs").unwrap());
    assert!(text.contains("LDR r0, =8"));
    // Record allocation plus one cell per element.
    assert_eq!(count(&text, r"\bBL malloc\b"), 3);
    assert_eq!(count(&text, r"LDR r0, =4\n\tBL malloc"), 2);
    assert!(text.contains("BL p_free_pair"));
    assert_eq!(count(&text, r"(?m)^p_free_pair:$"), 1);
}

#[test]
fn scenario_endless_loop_is_one_label_and_flat() {
    let text = arm_text(&samples::get("forever").unwrap());
    let defined: Vec<&str> = Regex::new(r"(?m)^(L\d+):$")
        .unwrap()
        .captures_iter(&text)
        .map(|c| c.get(1).unwrap().as_str())
        .collect();
    assert_eq!(defined, vec!["L0"]);
    assert!(text.contains("B L0"));
    assert!(!text.contains("SUB sp"));
}

#[test]
fn scenario_repeated_string_shares_one_data_entry() {
    let text = arm_text(&samples::get("strings").unwrap());
    assert_eq!(count(&text, r#"\.ascii "hello""#), 1);
    assert_eq!(count(&text, r"LDR r4, =msg_0"), 2);
}

#[test]
fn scenario_function_calls_push_arguments_and_unwind() {
    let text = arm_text(&samples::get("functions").unwrap());
    assert!(text.contains("f_double:"));
    assert!(text.contains("STR r4, [sp, #-4]!"));
    assert!(text.contains("BL f_double"));
    assert!(Regex::new(r"BL f_double\n\tADD sp, sp, #4").unwrap().is_match(&text));
}

#[test]
fn scenario_read_goes_through_the_runtime() {
    let text = arm_text(&samples::get("io").unwrap());
    assert!(text.contains("ADD r4, sp, #0") || text.contains("ADD r4, sp, #"));
    assert!(text.contains("BL p_read_int"));
    assert_eq!(count(&text, r"(?m)^p_read_int:$"), 1);
    assert!(text.contains("BL p_print_int"));
    assert!(text.contains("BL p_print_ln"));
}

// ---------------------------------------------------------------------------
// Output framing.

#[test]
fn rendered_output_is_framed_like_the_reference() {
    let text = arm_text(&samples::get("strings").unwrap());
    assert!(text.starts_with(".data\n"));
    assert!(text.contains("\n.text\n"));
    assert!(text.contains("\n.global main\n"));
    assert!(text.contains("main:\n\tPUSH {lr}\n"));
    assert!(Regex::new(r"MOV r0, #0\n\tPOP \{pc\}\n\t.ltorg\n").unwrap().is_match(&text));
}

#[test]
fn programs_without_data_skip_the_data_section() {
    let text = arm_text(&samples::get("forever").unwrap());
    assert!(!text.contains(".data"));
    assert!(text.starts_with(".text\n"));
}

// ---------------------------------------------------------------------------
// Short-circuit shape.

#[test]
fn logical_operators_branch_over_their_second_operand() {
    let e = Expr::binary(Expr::BoolLit(false), BinaryOp::And, Expr::BoolLit(true));
    let frag = lower_expr(&e, Reg::POOL.len());
    let code: Vec<String> = frag
        .code
        .iter()
        .map(|l| match l {
            Line::Instr(i) => i.to_string(),
            Line::Label(l) => format!("{l}:"),
            Line::Directive(d) => d.to_string(),
        })
        .collect();
    assert_eq!(
        code,
        vec![
            "MOV r4, #0",
            "CMP r4, #0",
            "BEQ L0",
            "MOV r4, #1",
            "L0:",
        ]
    );

    let e = Expr::binary(Expr::BoolLit(true), BinaryOp::Or, Expr::BoolLit(false));
    let frag = lower_expr(&e, Reg::POOL.len());
    assert!(frag
        .instrs()
        .any(|i| i.to_string() == "CMP r4, #1"));
}

// ---------------------------------------------------------------------------
// Division runtime wiring.

#[test]
fn division_goes_through_the_abi_runtime() {
    let x = Variable::new("x", Type::Int);
    let program = Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(x.clone(), Rhs::Expr(Expr::binary(int(7), BinaryOp::Div, int(2)))),
            Stmt::Assign(
                Lhs::Var(x.clone()),
                Rhs::Expr(Expr::binary(var(&x), BinaryOp::Mod, int(3))),
            ),
            Stmt::Exit(var(&x)),
        ]),
    };
    let text = arm_text(&program);
    assert!(Regex::new(r"BL p_check_divide_by_zero\n\tBL __aeabi_idiv\n\tMOV r4, r0")
        .unwrap()
        .is_match(&text));
    assert!(Regex::new(r"BL p_check_divide_by_zero\n\tBL __aeabi_idivmod\n\tMOV r4, r1")
        .unwrap()
        .is_match(&text));
    assert_eq!(count(&text, r"(?m)^p_check_divide_by_zero:$"), 1);
}

// ---------------------------------------------------------------------------
// Pair field accesses null-check and double-indirect.

#[test]
fn pair_field_reads_null_check_then_indirect_twice() {
    let p = Variable::new("p", Type::pair_of(Type::Int, Type::Int));
    let y = Variable::new("y", Type::Int);
    let program = Program {
        functions: vec![],
        body: Stmt::seq([
            Stmt::Decl(p.clone(), Rhs::NewPair(int(1), int(2))),
            Stmt::Decl(y.clone(), Rhs::PairElem(PairField::Snd, Box::new(var(&p)))),
            Stmt::Assign(
                Lhs::PairElem(PairField::Fst, Box::new(var(&p))),
                Rhs::Expr(int(9)),
            ),
            Stmt::Exit(var(&y)),
        ]),
    };
    let text = arm_text(&program);
    assert!(Regex::new(r"BL p_check_null_pointer\n\tLDR r4, \[r4, #4\]\n\tLDR r4, \[r4\]")
        .unwrap()
        .is_match(&text));
    assert!(Regex::new(r"BL p_check_null_pointer\n\tLDR r5, \[r5\]\n\tSTR r4, \[r5\]")
        .unwrap()
        .is_match(&text));
}
