//! Decoder-side per-thread state and pointer reconciliation.

mod accumulation;
mod pending;
mod thread;

pub use accumulation::{Accumulation, Finished, PointerAccumulation};
pub use pending::{FragmentOrder, PendingPointerSet, PendingPointerTable};
pub use thread::{StagingThread, ThreadLab};
