//! The compiler driver binary.  Compiles one of the bundled sample
//! programs (the front-end that would parse WACC source lives upstream)
//! and writes the ARM and Jasmin output files, or prints one backend's
//! output to stdout.
//!
//! run with `--help` for more info.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use wacc::{driver, samples};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the bundled sample program to compile (see --list)
    sample: Option<String>,
    /// list the bundled sample programs
    #[arg(short, long)]
    list: bool,
    /// print one backend's output to stdout instead of writing files
    #[arg(value_enum, short, long)]
    emit: Option<Emit>,
    /// directory for the output files
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Emit {
    /// the ARM assembly
    Arm,
    /// the Jasmin class file(s)
    Jvm,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.list {
        for (name, _) in samples::all() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let Some(name) = args.sample else {
        eprintln!("no sample given; try --list");
        return ExitCode::from(2);
    };
    let Some(program) = samples::get(&name) else {
        eprintln!("unknown sample {name:?}; try --list");
        return ExitCode::from(2);
    };

    let compiled = driver::compile(&program);

    match args.emit {
        Some(Emit::Arm) => print!("{}", compiled.arm),
        Some(Emit::Jvm) => {
            print!("{}", compiled.jvm.program);
            if let Some(pair) = &compiled.jvm.pair {
                println!();
                print!("{pair}");
            }
        }
        None => match driver::write(&compiled, &name, &args.out_dir) {
            Ok(written) => {
                for path in written {
                    println!("{}", path.display());
                }
            }
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
    }
    ExitCode::SUCCESS
}
