//! Output writers for reconstructed heaps.
//!
//! This module handles writing human-readable data to disk:
//! - JSON heap summaries (per-space occupancy, GC info, parse counters)
//!
//! The binary snapshot format lives in `snapshot`.

pub mod json;

// Re-export main functions
pub use json::{read_summary, summarize, write_summary, HeapSummary, ParseSummary, SpaceSummary};
