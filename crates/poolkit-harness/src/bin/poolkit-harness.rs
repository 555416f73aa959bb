//! CLI entrypoint for the poolkit scenario harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use poolkit_harness::{
    HarnessError, Outcome, ReportEmitter, ScenarioConfig, ScenarioReport, run_all, run_churn,
    run_contention, run_exhaustion, run_table_sweep,
};

/// Scenario and stress tooling for the poolkit allocator.
#[derive(Debug, Parser)]
#[command(name = "poolkit-harness")]
#[command(about = "Runs allocator workloads and emits JSONL reports")]
struct Cli {
    /// Append reports to this file instead of stdout.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Workload seed.
    #[arg(long, global = true, default_value_t = 1)]
    seed: u64,

    /// Operation budget (per thread for contention).
    #[arg(long, global = true, default_value_t = 10_000)]
    ops: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Alternating allocate/free churn on one node resource.
    Churn {
        /// Partition size in bytes.
        #[arg(long, default_value_t = 64)]
        partition_size: usize,
    },
    /// Raise demand one block at a time and audit growth accounting.
    Exhaustion,
    /// Multi-thread churn on one shared node resource.
    Contention {
        /// Worker thread count.
        #[arg(long, default_value_t = 4)]
        threads: u64,
        /// Partition size in bytes.
        #[arg(long, default_value_t = 64)]
        partition_size: usize,
    },
    /// Sweep request sizes across every size class and the OS fallback.
    TableSweep,
    /// Run every scenario with the shared configuration.
    All,
}

fn run(cli: &Cli) -> Result<Vec<ScenarioReport>, HarnessError> {
    let mut config = ScenarioConfig {
        seed: cli.seed,
        ops: cli.ops,
        ..ScenarioConfig::default()
    };

    let reports = match cli.command {
        Command::Churn { partition_size } => {
            config.partition_size = partition_size;
            vec![run_churn(&config)?]
        }
        Command::Exhaustion => vec![run_exhaustion(&config)?],
        Command::Contention {
            threads,
            partition_size,
        } => {
            config.threads = threads;
            config.partition_size = partition_size;
            vec![run_contention(&config)?]
        }
        Command::TableSweep => vec![run_table_sweep(&config)?],
        Command::All => run_all(&config)?,
    };

    let mut emitter = match &cli.output {
        Some(path) => ReportEmitter::file(path)?,
        None => ReportEmitter::stdout(),
    };
    for report in &reports {
        emitter.emit(report)?;
    }
    Ok(reports)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(reports) => {
            if reports.iter().all(|r| r.outcome == Outcome::Pass) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("poolkit-harness: {err}");
            ExitCode::FAILURE
        }
    }
}
