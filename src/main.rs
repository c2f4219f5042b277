//! Heap Trace Studio CLI
//!
//! Rebuilds the heap object graph of an instrumented JVM from its
//! allocation trace and writes snapshots and summaries.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use heap_trace_studio::commands::{
    display_events, display_version, execute_rebuild, inspect_snapshot_file, validate_args, RebuildArgs,
};

/// Heap Trace Studio - heap reconstruction from JVM allocation traces
#[derive(Parser, Debug)]
#[command(name = "heap-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the heap from a trace
    Rebuild {
        /// Trace file
        #[arg(short, long, env = "HEAP_TRACE_FILE")]
        trace: PathBuf,

        /// Symbols file (JSON or TOML)
        #[arg(short, long, env = "HEAP_TRACE_SYMBOLS")]
        symbols: PathBuf,

        /// Output path for the binary heap snapshot
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Output path for the JSON heap summary
        #[arg(long)]
        summary_json: Option<PathBuf>,

        /// Number of decoder workers
        #[arg(long)]
        threads: Option<usize>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Validate a heap snapshot and print its contents
    Inspect {
        /// Path to the snapshot file
        #[arg(short, long)]
        file: PathBuf,

        /// Symbols file, for type lookups
        #[arg(short, long)]
        symbols: Option<PathBuf>,
    },

    /// List the trace event vocabulary
    Events,

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Rebuild {
            trace,
            symbols,
            snapshot,
            summary_json,
            threads,
            summary,
        } => {
            let args = RebuildArgs {
                trace,
                symbols,
                snapshot,
                summary_json,
                threads,
                print_summary: summary,
            };

            validate_args(&args)?;
            execute_rebuild(args)?;
        }

        Commands::Inspect { file, symbols } => {
            inspect_snapshot_file(&file, symbols.as_deref())?;
        }

        Commands::Events => display_events(),

        Commands::Version => display_version(),
    }

    Ok(())
}
