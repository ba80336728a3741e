// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! gtdrive-doctor - diagnose loading and stepping of GT-DriveController FMUs.
//!
//! Usage:
//!   gtdrive-doctor inspect binaries/linux64/gtdrive_fmi.so
//!   gtdrive-doctor probe binaries/win64/gtdrive_fmi.dll --isolated
//!   gtdrive-doctor run GT-DriveController.fmu --steps 100 --json
//!
//! Exit codes: 0 ok, 1 usage or I/O error, 2 run failure, 3 missing
//! dependency, 4 architecture mismatch, 5 missing symbols, 6 invalid image.

mod bundle;
mod cycle;
mod probe;
mod report;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bundle::Bundle;
use crate::cycle::{CycleError, CycleOptions};
use crate::report::Report;

#[derive(Parser, Debug)]
#[command(name = "gtdrive-doctor")]
#[command(about = "Diagnose loading and stepping of GT-DriveController FMUs")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print a JSON report instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log filter (trace, debug, info, warn, error or a directive list)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the machine architecture from a library header
    Inspect {
        /// Shared library (PE, ELF or Mach-O)
        library: PathBuf,
    },
    /// Load a library and check the FMI 2.0 symbol table
    Probe {
        /// Shared library to load
        library: PathBuf,

        /// Copy the library alone into an empty directory first
        #[arg(long)]
        isolated: bool,
    },
    /// Run instantiate, setup, N steps and terminate against an FMU
    Run {
        /// `.fmu` archive or unpacked FMU directory
        bundle: PathBuf,

        /// Number of doStep calls
        #[arg(short = 'n', long, default_value = "10")]
        steps: u32,

        /// Communication step size in seconds
        #[arg(long, default_value = "0.01")]
        step_size: f64,
    },
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match execute(&args.command) {
        Ok(report) => {
            if let Err(e) = emit(&report, args.json) {
                eprintln!("{}: {:#}", "Error".red().bold(), e);
                std::process::exit(1);
            }
            report.exit_code()
        }
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

fn execute(command: &Command) -> anyhow::Result<Report> {
    match command {
        Command::Inspect { library } => Ok(probe::inspect(library)),
        Command::Probe { library, isolated } => probe::probe(library, *isolated),
        Command::Run {
            bundle,
            steps,
            step_size,
        } => {
            anyhow::ensure!(
                step_size.is_finite() && *step_size > 0.0,
                "step size must be positive, got {}",
                step_size
            );
            run(
                bundle,
                CycleOptions {
                    steps: *steps,
                    step_size: *step_size,
                },
            )
        }
    }
}

fn run(path: &Path, options: CycleOptions) -> anyhow::Result<Report> {
    let mut report = Report::new("run", path.display().to_string());
    let bundle = Bundle::open(path).with_context(|| format!("opening {}", path.display()))?;
    let description = bundle.description();
    report
        .fact("model", &description.model_name)
        .fact("guid", &description.guid)
        .fact("declared fmi version", &description.fmi_version)
        .fact("library", bundle.library_path().display());
    info!("running {} steps of {} s", options.steps, options.step_size);

    match cycle::run(&bundle, options) {
        Ok(outcome) => {
            report
                .fact("reported fmi version", &outcome.fmi_version)
                .fact("steps", outcome.steps)
                .fact("degraded steps", outcome.degraded_steps);
            for (name, value) in &outcome.reals {
                report.fact(name.clone(), value);
            }
            for (name, value) in &outcome.integers {
                report.fact(name.clone(), value);
            }
        }
        Err(CycleError::Load(err)) => {
            report.fail(&err);
        }
        Err(err) => {
            report.fail_with(err.kind(), err.to_string());
        }
    }
    Ok(report)
}

fn emit(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print_human();
    }
    Ok(())
}
