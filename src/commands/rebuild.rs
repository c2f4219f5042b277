//! Rebuild command implementation.
//!
//! The rebuild command:
//! 1. Loads the symbols file
//! 2. Parses the trace into a heap model
//! 3. Writes the snapshot and the JSON summary

use crate::commands::models::RebuildArgs;
use crate::output::{summarize, write_summary, HeapSummary};
use crate::reconstruct::{ParserConfig, TraceParser};
use crate::snapshot::write_snapshot;
use crate::symbols::load_symbols;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Upper bound for `--threads`
const MAX_THREADS: usize = 1024;

/// Execute the rebuild command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Rebuild command arguments
///
/// # Returns
/// The summary of the reconstructed heap
///
/// # Errors
/// * Symbols file missing or malformed
/// * Trace decoding and reconstruction errors
/// * File write errors
pub fn execute_rebuild(args: RebuildArgs) -> Result<HeapSummary> {
    let start_time = Instant::now();

    info!("Rebuilding heap from trace: {}", args.trace.display());

    info!("Step 1/3: Loading symbols...");
    let symbols = load_symbols(&args.symbols)
        .with_context(|| format!("Failed to load symbols from {}", args.symbols.display()))?;

    let mut config = ParserConfig::default();
    if let Some(threads) = args.threads {
        config.parallelism = threads;
    }
    debug!("Parser config: {:?}", config);

    info!("Step 2/3: Parsing trace with {} workers...", config.parallelism);
    let outcome = TraceParser::new(Arc::new(symbols), config)
        .parse_file(&args.trace)
        .with_context(|| format!("Failed to rebuild heap from {}", args.trace.display()))?;

    info!("Step 3/3: Writing output files...");
    if let Some(path) = &args.snapshot {
        write_snapshot(&outcome.heap, path).context("Failed to write heap snapshot")?;
        info!("✓ Snapshot written to: {}", path.display());
    }

    let summary = summarize(&outcome.heap, Some(&outcome.stats));
    if let Some(path) = &args.summary_json {
        write_summary(&summary, path).context("Failed to write heap summary JSON")?;
        info!("✓ Summary written to: {}", path.display());
    }

    if args.print_summary {
        print_summary(&summary);
    }

    info!("Rebuild completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(summary)
}

/// Validate rebuild arguments
///
/// **Public** - can be called before execute_rebuild for early validation
pub fn validate_args(args: &RebuildArgs) -> Result<()> {
    if args.trace.as_os_str().is_empty() {
        anyhow::bail!("Trace path cannot be empty");
    }
    if !args.trace.is_file() {
        anyhow::bail!("Trace file not found: {}", args.trace.display());
    }
    if !args.symbols.is_file() {
        anyhow::bail!("Symbols file not found: {}", args.symbols.display());
    }

    match args.threads {
        Some(0) => anyhow::bail!("threads must be greater than 0"),
        Some(n) if n > MAX_THREADS => anyhow::bail!("threads is too large (max {})", MAX_THREADS),
        _ => {}
    }

    for output in [&args.snapshot, &args.summary_json].into_iter().flatten() {
        check_output(output)?;
    }
    Ok(())
}

/// **Private** - outputs may not exist yet but must not be directories
fn check_output(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        anyhow::bail!("Output path cannot be empty");
    }
    if path.is_dir() {
        anyhow::bail!("Output path is a directory: {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &HeapSummary) {
    println!("\n{}", "=".repeat(80));
    println!("HEAP SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Last GC:     #{} ({:?}, {})", summary.gc.id, summary.gc.gc_type, summary.gc.cause.name);
    println!("Objects:     {}", summary.objects);
    println!("Bytes:       {}", summary.bytes);
    println!("Roots:       {}", summary.roots);
    println!("Threads:     {}", summary.threads);
    println!("Unresolved:  {}", summary.unresolved);
    println!();
    for space in &summary.spaces {
        println!(
            "  {:<12} {:<9} 0x{:012x} {:>8} objects {:>12} bytes {:>5} labs",
            space.name,
            space.kind.as_deref().unwrap_or("-"),
            space.start,
            space.objects,
            space.bytes,
            space.labs
        );
    }
    println!("{}", "=".repeat(80));
}
