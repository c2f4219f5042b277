//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use crate::heap::{GcType, ObjectIndex};
use crate::parser::EventType;
use thiserror::Error;

/// What went wrong while decoding one event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("unexpected end of chunk")]
    Truncated,

    #[error("unknown event type 0x{0:02x}")]
    UnknownEvent(u8),

    #[error("unsupported event {0}")]
    UnsupportedEvent(EventType),

    #[error("anchor mismatch after {event}: found 0x{found:08x}")]
    AnchorMismatch { event: EventType, found: u32 },

    #[error("root pointer block is not terminated")]
    UnterminatedRootBlock,

    #[error("invalid root type {0}")]
    InvalidRootKind(i32),

    #[error("invalid GC type {0}")]
    InvalidGcType(i32),

    #[error("invalid space kind {0}")]
    InvalidSpaceKind(i32),

    #[error("invalid space mode {0}")]
    InvalidSpaceMode(i32),

    #[error("unknown allocation site {0}")]
    UnknownSite(u32),

    #[error("unknown type {0}")]
    UnknownType(u32),

    #[error("no open {0} lab with room for {1} bytes")]
    NoOpenLab(&'static str, u64),

    #[error("no space contains address 0x{0:x}")]
    NoSpaceAt(u64),

    #[error("no object at 0x{0:x}")]
    UnknownObject(u64),

    #[error("pointer extension for 0x{addr:x} without a pointer event in progress")]
    UnexpectedExtension { addr: u64 },

    #[error("pointer extension for 0x{addr:x} interleaved with object 0x{current:x}")]
    InterleavedExtension { addr: u64, current: u64 },

    #[error("string of {0} words exceeds the limit")]
    StringTooLong(usize),

    #[error("compressed chunks are not supported")]
    Compressed,

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationViolation),
}

/// Decoding failure of one shard, located by thread and byte offset
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("decode error in thread 0x{thread:x} at byte {offset}: {kind}")]
pub struct DecodeError {
    pub thread: u64,
    pub offset: u64,
    pub kind: DecodeErrorKind,
}

/// Broken pointer bookkeeping; always fatal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationViolation {
    #[error("pointer buffer overflow for 0x{addr:x}: capacity {capacity}, got {count}")]
    Overflow {
        addr: u64,
        capacity: usize,
        count: usize,
    },

    #[error("pointer accumulation for 0x{addr:x} started while 0x{current:x} is in progress")]
    DoubleStart { addr: u64, current: u64 },

    #[error("pointers of 0x{addr:x} incomplete at GC end: {filled} of {capacity}")]
    Incomplete {
        addr: u64,
        filled: usize,
        capacity: usize,
    },

    #[error("pending pointer set for 0x{addr:x} already has an owner")]
    DuplicatePending { addr: u64 },
}

/// Kind of reference that could not be resolved to a known object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ReferenceKind {
    Pointer,
    PointerOwner,
    Root,
    Move,
    KeepAlive,
    Dangling,
}

impl ReferenceKind {
    pub fn id(self) -> i32 {
        match self {
            ReferenceKind::Pointer => 0,
            ReferenceKind::PointerOwner => 1,
            ReferenceKind::Root => 2,
            ReferenceKind::Move => 3,
            ReferenceKind::KeepAlive => 4,
            ReferenceKind::Dangling => 5,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Some(match id {
            0 => ReferenceKind::Pointer,
            1 => ReferenceKind::PointerOwner,
            2 => ReferenceKind::Root,
            3 => ReferenceKind::Move,
            4 => ReferenceKind::KeepAlive,
            5 => ReferenceKind::Dangling,
            _ => return None,
        })
    }
}

/// A reference to an address with no known object.
///
/// Recoverable: collected as a diagnostic instead of aborting the parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unresolved {kind:?} reference to 0x{address:x} in GC #{gc_id}")]
pub struct UnresolvedReference {
    pub kind: ReferenceKind,
    pub address: u64,
    pub gc_id: u32,
}

/// Violations of the heap model's structure; always fatal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("GC end #{id} without matching GC start")]
    GcEndWithoutStart { id: u32 },

    #[error("GC start #{id} while GC #{current} is still running")]
    NestedGcStart { id: u32, current: u32 },

    #[error("GC #{id} started as {start:?} but ended as {end:?}")]
    GcTypeMismatch { id: u32, start: GcType, end: GcType },

    #[error("{0} record outside a GC")]
    OutsideGc(&'static str),

    #[error("unknown space {0}")]
    UnknownSpace(u32),

    #[error("space index {index} is beyond the limit of {limit}")]
    SpaceIndexOutOfRange { index: u32, limit: u32 },

    #[error("no space contains address 0x{0:x}")]
    NoSpaceForAddress(u64),

    #[error("address 0x{addr:x} is claimed by objects {first:?} and {second:?}")]
    AddressCollision {
        addr: u64,
        first: ObjectIndex,
        second: ObjectIndex,
    },

    #[error("lab at 0x{addr:x} overlaps live objects")]
    OverlappingLab { addr: u64 },

    #[error("heap validation failed: {0}")]
    Validation(String),
}

/// Errors that can occur while reading or writing snapshots
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a heap snapshot (magic 0x{0:08x})")]
    BadMagic(i32),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(i32),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur while loading a symbols file
#[derive(Error, Debug)]
pub enum SymbolsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown symbols format: {0}")]
    UnknownFormat(String),

    #[error("invalid symbols: {0}")]
    Invalid(String),
}

/// Terminal failure of a trace parse
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid trace header: {0}")]
    BadHeader(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationViolation),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("decoder worker failed: {0}")]
    Worker(String),

    #[error("parse cancelled")]
    Cancelled,
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
