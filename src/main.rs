//! Command-line front-end for the hiss assembler and interpreter.
//!
//! # Usage
//!
//! ```text
//! hiss asm <file.hissa>         # write <file.hissc> next to the source
//! hiss run <file.hissc>         # execute, printing program output to stdout
//! ```
//!
//! Exits 0 on success. On any error a diagnostic is written to stderr and the
//! process exits non-zero; assembly failures get a compiler-style report
//! pointing into the source.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hiss::assembler::{assemble_source, render_diagnostic};
use hiss::machine::Machine;
use hiss::module::Module;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[clap(version, about = "Assembler and interpreter for hiss bytecode modules")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Assemble a source file into a binary module.
    Asm {
        /// Path to the assembly source.
        path: PathBuf,
        /// Output path; defaults to the source path with a `.hissc` extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load and execute a compiled module.
    Run {
        /// Path to the compiled module.
        path: PathBuf,
        /// Write a machine-state dump to stderr after the run.
        #[arg(long)]
        dump: bool,
    },
}

fn main() {
    if let Err(err) = exec(Cli::parse()) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn exec(cli: Cli) -> Result<()> {
    match cli.cmd {
        Cmd::Asm { path, output } => cmd_asm(path, output),
        Cmd::Run { path, dump } => cmd_run(path, dump),
    }
}

fn cmd_asm(path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let source = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let bytes = match assemble_source(&source) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprint!("{}", render_diagnostic(&path.display().to_string(), &source, &err));
            bail!("assembly of {} failed", path.display());
        }
    };
    let output = output.unwrap_or_else(|| path.with_extension("hissc"));
    fs::write(&output, bytes).with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

fn cmd_run(path: PathBuf, dump: bool) -> Result<()> {
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let module = Module::read(&bytes).with_context(|| format!("loading {}", path.display()))?;
    let mut machine = Machine::init(&module)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = machine.run(&mut out);
    out.flush().context("flushing stdout")?;

    if dump {
        let stderr = io::stderr();
        machine.dump(&mut stderr.lock()).context("writing dump")?;
    }

    result.context("execution failed")?;
    Ok(())
}
