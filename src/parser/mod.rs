//! Trace decoding.
//!
//! This module handles:
//! - The trace container (file header, per-thread chunks)
//! - Event headers, words and relative addresses
//! - Decoding one thread's chunks into address-resolved records

mod address;
mod decoder;
mod event;
mod record;
mod trace_file;
mod words;

// Re-export main types
pub use address::{AddressCodec, DecodedAddress};
pub use decoder::{DecodeContext, SlaveDecoder};
pub use event::{EventType, ALL_EVENTS};
pub use record::{Allocation, GcMeta, Located, PointerSet, Record, RetiredLab, RootRecord};
pub use trace_file::{Chunk, SyncLevel, TraceHeader, TraceReader};
pub use words::{recover_value, WordCursor};
