//! Heap reconstruction from decoded records.
//!
//! This module handles:
//! - The decoder worker pool and window barriers
//! - Ordered application of records by the master
//! - Cancellation

mod cancel;
mod master;
mod pipeline;

pub use cancel::CancellationToken;
pub use master::MasterReconstructor;
pub use pipeline::{ParseOutcome, ParseStats, ParserConfig, ShardBatch, TraceParser};
