//! JSON heap summary writer.
//!
//! Writes a small, human-readable digest of a reconstructed heap next to the
//! binary snapshot.

use crate::heap::{GcInfo, HeapModel, HeapQuery};
use crate::reconstruct::ParseStats;
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::OutputError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Digest of one heap at one GC boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapSummary {
    pub version: String,
    pub generated_at: String,
    pub gc: GcInfo,
    pub objects: usize,
    pub bytes: u64,
    pub roots: usize,
    pub threads: usize,
    pub unresolved: usize,
    pub spaces: Vec<SpaceSummary>,

    /// Present when the heap came from a trace rather than a snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse: Option<ParseSummary>,
}

/// Per-space occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSummary {
    pub index: u32,
    pub name: String,
    pub kind: Option<String>,
    pub start: u64,
    pub length: u64,
    pub labs: usize,
    pub objects: usize,
    pub bytes: u64,
}

/// Counters of the parse that produced the heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub chunks: u64,
    pub windows: u64,
    pub records: u64,
    pub bytes: u64,
    pub gcs: u64,
}

impl From<&ParseStats> for ParseSummary {
    fn from(stats: &ParseStats) -> Self {
        Self {
            chunks: stats.chunks,
            windows: stats.windows,
            records: stats.records,
            bytes: stats.bytes,
            gcs: stats.gcs,
        }
    }
}

/// Build the summary of a heap
///
/// **Public** - `stats` is `None` for heaps read from a snapshot
pub fn summarize(heap: &HeapModel, stats: Option<&ParseStats>) -> HeapSummary {
    let spaces: Vec<SpaceSummary> = heap
        .spaces()
        .map(|space| {
            let (objects, bytes) = heap
                .objects_in(space.start, space.end())
                .filter_map(|(_, index)| heap.object(index))
                .fold((0, 0), |(count, bytes), object| (count + 1, bytes + object.size));
            SpaceSummary {
                index: space.index,
                name: space.name.clone(),
                kind: space.kind.map(|kind| kind.to_string()),
                start: space.start,
                length: space.length,
                labs: space.lab_count(),
                objects,
                bytes,
            }
        })
        .collect();

    HeapSummary {
        version: SCHEMA_VERSION.to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        gc: heap.gc_info().clone(),
        objects: heap.object_count(),
        bytes: heap.objects().map(|(_, object)| object.size).sum(),
        roots: heap.roots().count(),
        threads: heap.threads().count(),
        unresolved: heap.diagnostics().len(),
        spaces,
        parse: stats.map(ParseSummary::from),
    }
}

/// Write a heap summary to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `summary` - Summary to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_summary(summary: &HeapSummary, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing heap summary to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary).map_err(OutputError::SerializationFailed)?;

    info!("Summary written successfully ({} bytes)", calculate_file_size(output_path));
    Ok(())
}

/// Read a heap summary back
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_summary(input_path: impl AsRef<Path>) -> Result<HeapSummary, OutputError> {
    let input_path = input_path.as_ref();
    debug!("Reading heap summary from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let summary: HeapSummary = serde_json::from_reader(file).map_err(OutputError::SerializationFailed)?;

    debug!("Summary loaded: version {}, GC #{}", summary.version, summary.gc.id);
    Ok(summary)
}

/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!("Path is a directory: {}", path.display())));
    }
    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
