//! The driver: walks a [Program] through both backends and writes the
//! output files.
//!
//! The backends share only the immutable AST; each gets a fresh label
//! counter.  Files are written only after both have rendered, so a
//! failure never leaves partial output behind.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::back::{arm, jvm};
use crate::front::ast::Program;

/// Driver-level failures.  Internal consistency violations abort instead;
/// see [crate::ice].
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
    /// A construct one of the backends does not support.  No construct of
    /// the current language hits this; it exists for forward evolution.
    #[error("construct not supported by the {target} backend: {construct}")]
    Unsupported {
        target: &'static str,
        construct: String,
    },
}

/// Both backends' rendered output.
pub struct Compiled {
    pub arm: String,
    pub jvm: jvm::Output,
}

/// Run both backends over `program`.
pub fn compile(program: &Program) -> Compiled {
    debug!(functions = program.functions.len(), "running ARM backend");
    let arm = arm::compile(program);
    debug!("running JVM backend");
    let jvm = jvm::compile(program);
    Compiled { arm, jvm }
}

/// Write `<name>.s`, `WaccProgram.j` and, when pairs are used,
/// `wacc/lang/Pair.j` under `dir`.  Returns the paths written.
pub fn write(compiled: &Compiled, name: &str, dir: &Path) -> Result<Vec<PathBuf>, Error> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let asm_path = dir.join(format!("{name}.s"));
    fs::write(&asm_path, &compiled.arm)?;
    written.push(asm_path);

    let class_path = dir.join(format!("{}.j", jvm::PROGRAM_CLASS));
    fs::write(&class_path, &compiled.jvm.program)?;
    written.push(class_path);

    if let Some(pair) = &compiled.jvm.pair {
        let pair_dir = dir.join("wacc/lang");
        fs::create_dir_all(&pair_dir)?;
        let pair_path = pair_dir.join("Pair.j");
        fs::write(&pair_path, pair)?;
        written.push(pair_path);
    }

    Ok(written)
}
