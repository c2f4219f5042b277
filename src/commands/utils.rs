use crate::heap::HeapQuery;
use crate::output::summarize;
use crate::parser::ALL_EVENTS;
use crate::snapshot::read_snapshot;
use crate::symbols::{load_symbols, Symbols};
use crate::utils::config::{SCHEMA_VERSION, SNAPSHOT_VERSION};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Read a snapshot back and print what it holds
///
/// Without a symbols file, type names are not available but the structure
/// is still validated.
pub fn inspect_snapshot_file(file_path: &Path, symbols: Option<&Path>) -> Result<()> {
    println!("Inspecting snapshot: {}", file_path.display());

    let symbols = match symbols {
        Some(path) => load_symbols(path).with_context(|| format!("Failed to load symbols from {}", path.display()))?,
        None => Symbols::default(),
    };
    let heap = read_snapshot(file_path, Arc::new(symbols)).context("Failed to read heap snapshot")?;
    let summary = summarize(&heap, None);

    println!("✓ Valid heap snapshot");
    println!("  GC: #{} ({:?}, {})", summary.gc.id, summary.gc.gc_type, summary.gc.cause.name);
    println!("  Objects: {}", heap.object_count());
    println!("  Bytes: {}", summary.bytes);
    println!("  Spaces: {}", summary.spaces.len());
    println!("  Roots: {}", summary.roots);
    println!("  Threads: {}", summary.threads);
    println!("  Unresolved references: {}", summary.unresolved);

    Ok(())
}

/// Print the event vocabulary
pub fn display_events() {
    println!("{:>4}  {:<36} {:>5} {:>5} {:>5}", "id", "event", "move", "ptr", "alloc");
    for event in ALL_EVENTS {
        println!(
            "{:>4}  {:<36} {:>5} {:>5} {:>5}{}",
            event.id(),
            event.name(),
            flag(event.is_move()),
            flag(event.is_pointer()),
            flag(event.is_alloc()),
            if event.is_supported() { "" } else { "  (unsupported)" }
        );
    }
}

fn flag(set: bool) -> &'static str {
    if set {
        "x"
    } else {
        ""
    }
}

/// Display version information
pub fn display_version() {
    println!("Heap Trace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SCHEMA_VERSION);
    println!("Snapshot Format: v{}", SNAPSHOT_VERSION);
    println!();
    println!("Heap graph reconstruction from instrumented JVM allocation traces.");
}
