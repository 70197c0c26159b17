//! The JVM backend: a Jasmin-syntax class file per program, plus the
//! pair-support class when the program uses pairs.

pub mod asm;
mod codegen;
pub mod types;


use crate::front::ast::Program;

use asm::{Instr, MethodBuilder};
use codegen::JvmGen;

/// The class every WACC program compiles into.
pub const PROGRAM_CLASS: &str = "WaccProgram";

/// The rendered Jasmin output: the program class and, if pairs are used,
/// the sibling `wacc/lang/Pair` class.
pub struct Output {
    pub program: String,
    pub pair: Option<String>,
}

/// Compile a program to Jasmin text.
pub fn compile(program: &Program) -> Output {
    let mut gen = JvmGen::new();
    let mut methods: Vec<MethodBuilder> =
        program.functions.iter().map(|f| gen.function(f)).collect();
    methods.push(gen.main(&program.body));

    let mut out = String::new();
    out.push_str(&format!(".class public {PROGRAM_CLASS}\n"));
    out.push_str(".super java/lang/Object\n");
    if gen.uses_read {
        out.push('\n');
        out.push_str(".field private static _in Ljava/util/Scanner;\n");
    }
    out.push('\n');
    out.push_str(&default_init().render());
    if gen.uses_read {
        out.push('\n');
        out.push_str(&scanner_clinit().render());
    }
    for method in &methods {
        out.push('\n');
        out.push_str(&method.render());
    }

    Output {
        program: out,
        pair: gen.uses_pairs.then(|| PAIR_CLASS_FILE.to_string()),
    }
}

/// The no-op instance constructor the class format expects.
fn default_init() -> MethodBuilder {
    let mut m = MethodBuilder::new("public <init>()V", 1);
    m.push(Instr::Aload(0));
    m.push(Instr::Invokespecial {
        method: "java/lang/Object/<init>".into(),
        desc: "()V".into(),
    });
    m.push(Instr::Return);
    m
}

/// Initialise the shared `Scanner` once, at class-load time.
fn scanner_clinit() -> MethodBuilder {
    let mut m = MethodBuilder::new("static <clinit>()V", 0);
    m.push(Instr::New("java/util/Scanner".into()));
    m.push(Instr::Dup);
    m.push(Instr::Getstatic {
        field: "java/lang/System/in".into(),
        desc: "Ljava/io/InputStream;".into(),
    });
    m.push(Instr::Invokespecial {
        method: "java/util/Scanner/<init>".into(),
        desc: "(Ljava/io/InputStream;)V".into(),
    });
    m.push(Instr::Putstatic {
        field: format!("{PROGRAM_CLASS}/_in"),
        desc: "Ljava/util/Scanner;".into(),
    });
    m.push(Instr::Return);
    m
}

/// The pair-support class: a heap record of two `Object` fields.
const PAIR_CLASS_FILE: &str = "\
.class public wacc/lang/Pair
.super java/lang/Object

.field public fst Ljava/lang/Object;
.field public snd Ljava/lang/Object;

.method public <init>(Ljava/lang/Object;Ljava/lang/Object;)V
\t.limit stack 2
\t.limit locals 3
\taload 0
\tinvokespecial java/lang/Object/<init>()V
\taload 0
\taload 1
\tputfield wacc/lang/Pair/fst Ljava/lang/Object;
\taload 0
\taload 2
\tputfield wacc/lang/Pair/snd Ljava/lang/Object;
\treturn
.end method
";
