//! tessel-dis - disassembler for TCU program binaries
//!
//! # Usage
//!
//! ```bash
//! # Disassemble a program to stdout
//! tessel-dis arch.json program.bin
//!
//! # Also print the derived instruction layout
//! tessel-dis -v arch.json program.bin
//!
//! # Append a cycle/energy cost table
//! tessel-dis -s arch.json program.bin
//! ```
//!
//! # Exit Codes
//!
//! - 0: disassembled successfully
//! - 1: decode or IO failure
//! - 2: invalid arguments

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::ExitCode;
use tessel::estimate::LirEstimator;
use tessel::lir::{LirBroadcast, LirParser, LirPrinter, LirSink};
use tessel::{Arch, Estimator, InstructionLayout, Stats};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut verbose = false;
    let mut with_stats = false;
    let mut paths = Vec::new();

    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = true,
            "-s" | "--stats" => with_stats = true,
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {}", other);
                print_usage();
                return ExitCode::from(2);
            }
            path => paths.push(path.to_string()),
        }
    }

    if paths.len() != 2 {
        print_usage();
        return ExitCode::from(2);
    }

    match run(&paths[0], &paths[1], verbose, with_stats) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("Usage: tessel-dis [-v] [-s] <arch.json> <program.bin>");
}

fn run(arch_path: &str, program_path: &str, verbose: bool, with_stats: bool) -> Result<()> {
    let arch_json = std::fs::read_to_string(arch_path)
        .with_context(|| format!("reading architecture file {}", arch_path))?;
    let arch: Arch =
        serde_json::from_str(&arch_json).with_context(|| format!("parsing {}", arch_path))?;
    let layout = InstructionLayout::from_arch(&arch)?;

    let program = std::fs::read(program_path)
        .with_context(|| format!("reading program file {}", program_path))?;
    if program.len() % layout.instruction_bytes != 0 {
        bail!(
            "program length {} is not a multiple of the {}-byte instruction size",
            program.len(),
            layout.instruction_bytes
        );
    }
    let count = program.len() / layout.instruction_bytes;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if verbose {
        writeln!(out, "; {}", layout.describe().replace('\n', "\r\n; "))?;
    }

    let mut printer = LirPrinter::new(&mut out);
    let mut stats = Stats::default();
    let mut cost = LirEstimator::new(Estimator::new(&arch), &mut stats);

    let mut parser = LirParser::new(&program[..], layout, count);
    while parser.has_next() {
        let mut sinks: Vec<&mut dyn LirSink> = vec![&mut printer];
        if with_stats {
            sinks.push(&mut cost);
        }
        let mut fanout = LirBroadcast::new(sinks);
        parser.parse_next(&mut fanout)?;
    }
    drop(cost);
    drop(printer);

    if with_stats {
        writeln!(out, "\n{}", stats)?;
    }
    Ok(())
}
