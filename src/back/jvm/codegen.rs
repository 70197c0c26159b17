//! Lowering onto the JVM operand stack.
//!
//! Expressions lower post-order: each operator pops its arity and pushes
//! its result.  Pair fields are the only `Object`-typed storage, so every
//! read from one unboxes (or casts) to the static type and every write
//! boxes first.  Local slots come from a simple counter; all WACC values
//! are category 1.

use tracing::debug;

use crate::back::LabelAlloc;
use crate::common::{Id, Map};
use crate::front::ast::{BinaryOp, Expr, Function, Lhs, Rhs, Stmt, UnaryOp, Variable};
use crate::front::types::Type;

use super::asm::{CmpKind, Const, Instr, MethodBuilder};
use super::types::{method_descriptor, JvmType, PAIR_CLASS};
use super::PROGRAM_CLASS;

use Instr as I;

/// Jasmin method name of a user function.
fn method_name(name: Id) -> String {
    format!("f_{name}")
}

/// Mutable state for one JVM compilation.
pub(super) struct JvmGen {
    labels: LabelAlloc,
    scopes: Vec<Map<Id, u16>>,
    /// Whether the synthetic pair class must be emitted alongside.
    pub(super) uses_pairs: bool,
    /// Whether the shared `Scanner` field and its `<clinit>` are needed.
    pub(super) uses_read: bool,
}

impl JvmGen {
    pub(super) fn new() -> JvmGen {
        JvmGen {
            labels: LabelAlloc::new(),
            scopes: Vec::new(),
            uses_pairs: false,
            uses_read: false,
        }
    }

    pub(super) fn function(&mut self, f: &Function) -> MethodBuilder {
        debug!(name = %f.name, "lowering function");
        let params: Vec<JvmType> = f.params.iter().map(|p| JvmType::of(&p.ty)).collect();
        let ret = JvmType::of(&f.ret);
        if f.params.iter().any(|p| p.ty.is_pair()) || f.ret.is_pair() {
            self.uses_pairs = true;
        }
        let desc = method_descriptor(params.iter(), &ret);
        let mut m = MethodBuilder::new(
            format!("public static {}{desc}", method_name(f.name)),
            f.params.len() as u16,
        );
        self.scopes = vec![f
            .params
            .iter()
            .enumerate()
            .map(|(slot, p)| (p.name, slot as u16))
            .collect()];
        self.stmt(&f.body, &mut m);
        // Every path through the body already returned or exited; this
        // backstop only satisfies the bytecode verifier.
        if ret.is_primitive() {
            m.push(I::Ldc(Const::Int(0)));
            m.push(I::Ireturn);
        } else {
            m.push(I::AconstNull);
            m.push(I::Areturn);
        }
        m
    }

    pub(super) fn main(&mut self, body: &Stmt) -> MethodBuilder {
        debug!("lowering main");
        let mut m = MethodBuilder::new("public static main([Ljava/lang/String;)V", 1);
        self.scopes = vec![Map::new()];
        self.stmt(body, &mut m);
        m.push(I::Return);
        m
    }

    fn stmt(&mut self, s: &Stmt, m: &mut MethodBuilder) {
        match s {
            Stmt::Skip => {}
            Stmt::Decl(var, rhs) => {
                self.rhs(rhs, m);
                let slot = m.alloc_slot();
                self.scopes
                    .last_mut()
                    .unwrap_or_else(|| crate::ice!("declaration outside any scope"))
                    .insert(var.name, slot);
                self.store_slot(slot, &var.ty, m);
            }
            Stmt::Assign(lhs, rhs) => {
                self.store_lhs_with(lhs, m, |gen, m| gen.rhs(rhs, m));
            }
            Stmt::Read(lhs) => {
                self.uses_read = true;
                let ty = lhs.ty();
                self.store_lhs_with(lhs, m, |gen, m| gen.read_value(&ty, m));
            }
            Stmt::Free(e) => {
                // The target has a garbage collector; the reference is
                // just dropped.
                self.expr(e, m);
                m.push(I::Pop);
            }
            Stmt::Return(e) => {
                self.expr(e, m);
                if JvmType::of(&e.ty()).is_primitive() {
                    m.push(I::Ireturn);
                } else {
                    m.push(I::Areturn);
                }
            }
            Stmt::Exit(e) => {
                self.expr(e, m);
                m.push(I::Invokestatic {
                    method: "java/lang/System/exit".into(),
                    desc: "(I)V".into(),
                });
            }
            Stmt::Print(e, newline) => {
                m.push(I::Getstatic {
                    field: "java/lang/System/out".into(),
                    desc: "Ljava/io/PrintStream;".into(),
                });
                self.expr(e, m);
                let arg = match e.ty() {
                    Type::Int => "(I)V",
                    Type::Bool => "(Z)V",
                    Type::Char => "(C)V",
                    Type::Str => "(Ljava/lang/String;)V",
                    Type::Array { .. } | Type::Pair(_) => "(Ljava/lang/Object;)V",
                };
                let method = if *newline { "println" } else { "print" };
                m.push(I::Invokevirtual {
                    method: format!("java/io/PrintStream/{method}"),
                    desc: arg.into(),
                });
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.labels.fresh();
                let end_label = self.labels.fresh();
                self.expr(cond, m);
                m.push(I::Ifeq(else_label));
                self.scoped(then, m);
                m.push(I::Goto(end_label));
                m.label(else_label);
                self.scoped(otherwise, m);
                m.label(end_label);
            }
            Stmt::While { cond, body } => {
                let head = self.labels.fresh();
                let end = self.labels.fresh();
                m.label(head);
                self.expr(cond, m);
                m.push(I::Ifeq(end));
                self.scoped(body, m);
                m.push(I::Goto(head));
                m.label(end);
            }
            Stmt::Block(inner) => self.scoped(inner, m),
            Stmt::Seq(a, b) => {
                self.stmt(a, m);
                self.stmt(b, m);
            }
            Stmt::Call { name, args, ret } => {
                self.call(*name, args, ret, m);
                m.push(I::Pop);
            }
        }
    }

    fn scoped(&mut self, body: &Stmt, m: &mut MethodBuilder) {
        self.scopes.push(Map::new());
        self.stmt(body, m);
        self.scopes.pop();
    }

    fn rhs(&mut self, rhs: &Rhs, m: &mut MethodBuilder) {
        match rhs {
            Rhs::Expr(e) => self.expr(e, m),
            Rhs::ArrayLit(elems, ty) => {
                let elem = JvmType::of(&ty.element());
                m.push(I::Ldc(Const::Int(elems.len() as i32)));
                if elem.is_primitive() {
                    m.push(I::Newarray(primitive_name(&elem)));
                } else {
                    m.push(I::Anewarray(elem.cast_target()));
                }
                for (i, e) in elems.iter().enumerate() {
                    m.push(I::Dup);
                    m.push(I::Ldc(Const::Int(i as i32)));
                    self.expr(e, m);
                    m.push(element_store(&elem));
                }
            }
            Rhs::NewPair(fst, snd) => {
                self.uses_pairs = true;
                m.push(I::New(PAIR_CLASS.into()));
                m.push(I::Dup);
                self.expr(fst, m);
                m.extend(JvmType::of(&fst.ty()).to_boxed());
                self.expr(snd, m);
                m.extend(JvmType::of(&snd.ty()).to_boxed());
                m.push(I::Invokespecial {
                    method: format!("{PAIR_CLASS}/<init>"),
                    desc: "(Ljava/lang/Object;Ljava/lang/Object;)V".into(),
                });
            }
            Rhs::PairElem(field, pair) => {
                self.uses_pairs = true;
                self.expr(pair, m);
                m.push(I::Getfield {
                    field: format!("{PAIR_CLASS}/{field}"),
                    desc: "Ljava/lang/Object;".into(),
                });
                m.extend(JvmType::of(&field.ty(&pair.ty())).to_primitive());
            }
            Rhs::Call { name, args, ret } => self.call(*name, args, ret, m),
        }
    }

    fn call(&mut self, name: Id, args: &[Expr], ret: &Type, m: &mut MethodBuilder) {
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            self.expr(arg, m);
            if arg.ty().is_pair() {
                self.uses_pairs = true;
            }
            params.push(JvmType::of(&arg.ty()));
        }
        if ret.is_pair() {
            self.uses_pairs = true;
        }
        m.push(I::Invokestatic {
            method: format!("{PROGRAM_CLASS}/{}", method_name(name)),
            desc: method_descriptor(params.iter(), &JvmType::of(ret)),
        });
    }

    /// Push the read-a-value sequence for `read` targets.
    fn read_value(&mut self, ty: &Type, m: &mut MethodBuilder) {
        m.push(I::Getstatic {
            field: format!("{PROGRAM_CLASS}/_in"),
            desc: "Ljava/util/Scanner;".into(),
        });
        match ty {
            Type::Int => m.push(I::Invokevirtual {
                method: "java/util/Scanner/nextInt".into(),
                desc: "()I".into(),
            }),
            Type::Char => {
                m.push(I::Invokevirtual {
                    method: "java/util/Scanner/next".into(),
                    desc: "()Ljava/lang/String;".into(),
                });
                m.push(I::Ldc(Const::Int(0)));
                m.push(I::Invokevirtual {
                    method: "java/lang/String/charAt".into(),
                    desc: "(I)C".into(),
                });
            }
            other => crate::ice!("read into a value of type {other}"),
        }
    }

    /// Store a value into `lhs`; `push_value` emits the code that leaves
    /// the value on the stack, sequenced after any addressing operands.
    fn store_lhs_with(
        &mut self,
        lhs: &Lhs,
        m: &mut MethodBuilder,
        push_value: impl FnOnce(&mut Self, &mut MethodBuilder),
    ) {
        match lhs {
            Lhs::Var(var) => {
                push_value(self, m);
                let slot = self.slot(var.name);
                self.store_slot(slot, &var.ty, m);
            }
            Lhs::ArrayElem {
                array,
                indices,
                ty,
            } => {
                self.array_up_to_last_index(array, indices, m);
                push_value(self, m);
                m.push(element_store(&JvmType::of(ty)));
            }
            Lhs::PairElem(field, pair) => {
                self.uses_pairs = true;
                self.expr(pair, m);
                push_value(self, m);
                m.extend(JvmType::of(&lhs.ty()).to_boxed());
                m.push(I::Putfield {
                    field: format!("{PAIR_CLASS}/{field}"),
                    desc: "Ljava/lang/Object;".into(),
                });
            }
        }
    }

    fn expr(&mut self, e: &Expr, m: &mut MethodBuilder) {
        match e {
            Expr::IntLit(n) => m.push(I::Ldc(Const::Int(*n))),
            Expr::BoolLit(b) => m.push(I::Ldc(Const::Int(*b as i32))),
            Expr::CharLit(c) => m.push(I::Ldc(Const::Int(*c as i32))),
            Expr::StrLit(s) => m.push(I::Ldc(Const::Str(s.clone()))),
            Expr::NullPairLit => m.push(I::AconstNull),
            Expr::Ident(var) => {
                let slot = self.slot(var.name);
                self.load_slot(slot, &var.ty, m);
            }
            Expr::ArrayElem { array, indices, ty } => {
                self.array_up_to_last_index(array, indices, m);
                m.push(element_load(&JvmType::of(ty)));
            }
            Expr::Unary(op, e) => {
                self.expr(e, m);
                match op {
                    UnaryOp::Not => {
                        m.push(I::Ldc(Const::Int(1)));
                        m.push(I::Ixor);
                    }
                    UnaryOp::Neg => m.push(I::Ineg),
                    UnaryOp::Len => m.push(I::Arraylength),
                    UnaryOp::Ord => {}
                    UnaryOp::Chr => m.push(I::I2c),
                }
            }
            Expr::Binary(lhs, op, rhs) => self.binary(lhs, *op, rhs, m),
        }
    }

    fn binary(&mut self, lhs: &Expr, op: BinaryOp, rhs: &Expr, m: &mut MethodBuilder) {
        use BinaryOp::*;
        match op {
            Add | Sub | Mul | Div | Mod => {
                self.expr(lhs, m);
                self.expr(rhs, m);
                m.push(match op {
                    Add => I::Iadd,
                    Sub => I::Isub,
                    Mul => I::Imul,
                    Div => I::Idiv,
                    _ => I::Irem,
                });
            }
            Gt | Gte | Lt | Lte | Eq | Neq => {
                self.expr(lhs, m);
                self.expr(rhs, m);
                let yes = self.labels.fresh();
                let done = self.labels.fresh();
                let reference = !JvmType::of(&lhs.ty()).is_primitive();
                let jump = match (op, reference) {
                    (Eq, true) => I::IfAcmpEq(yes),
                    (Neq, true) => I::IfAcmpNe(yes),
                    (Eq, false) => I::IfIcmp(CmpKind::Eq, yes),
                    (Neq, false) => I::IfIcmp(CmpKind::Ne, yes),
                    (Gt, _) => I::IfIcmp(CmpKind::Gt, yes),
                    (Gte, _) => I::IfIcmp(CmpKind::Ge, yes),
                    (Lt, _) => I::IfIcmp(CmpKind::Lt, yes),
                    (Lte, _) => I::IfIcmp(CmpKind::Le, yes),
                    _ => unreachable!(),
                };
                m.push(jump);
                m.push(I::Ldc(Const::Int(0)));
                m.push(I::Goto(done));
                m.label(yes);
                m.push(I::Ldc(Const::Int(1)));
                m.label(done);
            }
            And | Or => {
                let decided = self.labels.fresh();
                let done = self.labels.fresh();
                self.expr(lhs, m);
                let short = if op == And {
                    I::Ifeq(decided)
                } else {
                    I::Ifne(decided)
                };
                m.push(short.clone());
                self.expr(rhs, m);
                m.push(short);
                m.push(I::Ldc(Const::Int(if op == And { 1 } else { 0 })));
                m.push(I::Goto(done));
                m.label(decided);
                m.push(I::Ldc(Const::Int(if op == And { 0 } else { 1 })));
                m.label(done);
            }
        }
    }

    /// Push the innermost array reference and the final index: the
    /// receiver state every element load/store starts from.  Intermediate
    /// dimensions are reference arrays.
    fn array_up_to_last_index(&mut self, array: &Variable, indices: &[Expr], m: &mut MethodBuilder) {
        let (last, outer) = indices
            .split_last()
            .unwrap_or_else(|| crate::ice!("array access without indices"));
        let slot = self.slot(array.name);
        m.push(I::Aload(slot));
        for index in outer {
            self.expr(index, m);
            m.push(I::Aaload);
        }
        self.expr(last, m);
    }

    fn slot(&self, name: Id) -> u16 {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name))
            .copied()
            .unwrap_or_else(|| crate::ice!("unresolved variable {name} reached code generation"))
    }

    fn load_slot(&self, slot: u16, ty: &Type, m: &mut MethodBuilder) {
        if JvmType::of(ty).is_primitive() {
            m.push(I::Iload(slot));
        } else {
            m.push(I::Aload(slot));
        }
    }

    fn store_slot(&self, slot: u16, ty: &Type, m: &mut MethodBuilder) {
        if JvmType::of(ty).is_primitive() {
            m.push(I::Istore(slot));
        } else {
            m.push(I::Astore(slot));
        }
    }
}

fn primitive_name(ty: &JvmType) -> &'static str {
    match ty {
        JvmType::Int => "int",
        JvmType::Bool => "boolean",
        JvmType::Char => "char",
        other => crate::ice!("no primitive array kind for {other}"),
    }
}

fn element_load(elem: &JvmType) -> Instr {
    match elem {
        JvmType::Int => I::Iaload,
        JvmType::Bool => I::Baload,
        JvmType::Char => I::Caload,
        _ => I::Aaload,
    }
}

fn element_store(elem: &JvmType) -> Instr {
    match elem {
        JvmType::Int => I::Iastore,
        JvmType::Bool => I::Bastore,
        JvmType::Char => I::Castore,
        _ => I::Aastore,
    }
}
