//! Heap snapshots.
//!
//! A reconstructed heap can be persisted at any GC end and read back later
//! without replaying the trace.

mod reader;
mod writer;

pub use reader::{read_heap, read_snapshot};
pub use writer::{write_heap, write_snapshot};
