// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod runner;

use clap::{Parser, Subcommand};
use runner::{BenchRunner, StepFailure};
use rvperiph_config::{load_bench, BenchManifest};
use rvperiph_core::bus::PeripheralBus;
use rvperiph_core::snapshot::BusSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "rvperiph device bench", long_about = None)]
struct Cli {
    /// Enable register-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a bench script (YAML) and report pass/fail.
    Run(RunArgs),

    /// Validate a bench manifest and build its devices without running anything.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the bench script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Print the result record as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Disable UART stdout echo (still captured for assertions/artifacts)
    #[arg(long)]
    no_uart_stdout: bool,

    /// Directory to write run artifacts (result.json, uart.log, snapshot.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Restore device state from a bus snapshot (JSON) before the first step
    #[arg(long)]
    restore: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to the bench manifest (YAML)
    #[arg(short, long)]
    manifest: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    steps_executed: u64,
    failures: Vec<StepFailure>,
    uart_tx: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    config: RunConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunConfig {
    script: PathBuf,
    bench: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag.
    // stdout is reserved for UART echo and the --json record.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_bench(args),
        Commands::Check(args) => check_manifest(args),
    }
}

fn check_manifest(args: CheckArgs) -> ExitCode {
    let manifest = match BenchManifest::from_file(&args.manifest) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match PeripheralBus::from_config(&manifest) {
        Ok(bus) => {
            for p in &bus.peripherals {
                println!(
                    "{:<12} {:#010x} size={:#x} irq={}",
                    p.name,
                    p.base,
                    p.size,
                    p.irq.map(|i| i.to_string()).unwrap_or_else(|| "-".into())
                );
            }
            info!("Manifest '{}' OK", manifest.name);
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn load_snapshot(path: &Path) -> anyhow::Result<BusSnapshot> {
    use anyhow::Context;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse snapshot {:?}", path))
}

fn run_bench(args: RunArgs) -> ExitCode {
    let uart_tx = Arc::new(Mutex::new(Vec::new()));

    let (script, manifest) = match load_bench(&args.script) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            report(&args, None, "error", 0, vec![], &uart_tx, Some(msg), None);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let bench = Some(manifest.name.as_str());

    let mut bus = match PeripheralBus::from_config(&manifest) {
        Ok(bus) => bus,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            report(&args, bench, "error", 0, vec![], &uart_tx, Some(msg), None);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let echo_stdout = !(args.no_uart_stdout || args.json);
    bus.attach_uart_tx_sink(uart_tx.clone(), echo_stdout);

    if let Some(path) = &args.restore {
        let restored = load_snapshot(path)
            .and_then(|snap| bus.restore(&snap).map_err(anyhow::Error::from));
        if let Err(e) = restored {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            report(&args, bench, "error", 0, vec![], &uart_tx, Some(msg), None);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
        info!("Restored device state from {:?}", path);
    }

    info!(
        "Running {} step(s) against bench '{}'",
        script.steps.len(),
        manifest.name
    );
    let outcome = BenchRunner::new(&mut bus, uart_tx.clone()).run(&script.steps);
    let snapshot = bus.snapshot();

    match outcome {
        Ok(run) => {
            let (status, code) = if run.failures.is_empty() {
                ("pass", EXIT_PASS)
            } else {
                ("fail", EXIT_ASSERT_FAIL)
            };
            info!(
                "{}: {} step(s), {} failure(s)",
                status.to_uppercase(),
                run.steps_executed,
                run.failures.len()
            );
            report(
                &args,
                bench,
                status,
                run.steps_executed,
                run.failures,
                &uart_tx,
                None,
                Some(&snapshot),
            );
            ExitCode::from(code)
        }
        Err(e) => {
            let msg = e.to_string();
            error!("{}", msg);
            report(
                &args,
                bench,
                "error",
                e.step as u64,
                vec![],
                &uart_tx,
                Some(msg),
                Some(&snapshot),
            );
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn report(
    args: &RunArgs,
    bench: Option<&str>,
    status: &str,
    steps_executed: u64,
    failures: Vec<StepFailure>,
    uart_tx: &Arc<Mutex<Vec<u8>>>,
    message: Option<String>,
    snapshot: Option<&BusSnapshot>,
) {
    let uart_bytes = uart_tx.lock().map(|g| g.clone()).unwrap_or_default();
    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        steps_executed,
        failures,
        uart_tx: String::from_utf8_lossy(&uart_bytes).into_owned(),
        message,
        config: RunConfig {
            script: args.script.clone(),
            bench: bench.map(str::to_string),
        },
    };

    if args.json {
        match serde_json::to_string_pretty(&result) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    }

    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    // result.json
    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, &result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }

    // uart.log
    if let Err(e) = std::fs::write(output_dir.join("uart.log"), &uart_bytes) {
        error!("Failed to write uart.log: {}", e);
    }

    if let Some(snapshot) = snapshot {
        let snapshot_path = output_dir.join("snapshot.json");
        match std::fs::File::create(&snapshot_path) {
            Ok(f) => {
                if let Err(e) = serde_json::to_writer_pretty(f, snapshot) {
                    error!("Failed to write snapshot.json: {}", e);
                }
            }
            Err(e) => error!("Failed to create snapshot.json: {}", e),
        }
    }
}
