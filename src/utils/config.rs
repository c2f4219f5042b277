//! Wire-format and codec constants.

/// Current JSON summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

// Trace container
pub const TRACE_MAGIC: u32 = 0x4154_5243;
pub const TRACE_VERSION: u32 = 1;
pub const TRACE_FLAG_ANCHORS: u32 = 1;

// Chunk metadata word: bit 31 compressed, bits 29-30 sync level, rest length
pub const CHUNK_COMPRESSED_MASK: u32 = 1 << 31;
pub const CHUNK_SYNC_SHIFT: u32 = 29;
pub const CHUNK_SYNC_MASK: u32 = 3 << CHUNK_SYNC_SHIFT;
pub const CHUNK_LENGTH_MASK: u32 = !(CHUNK_COMPRESSED_MASK | CHUNK_SYNC_MASK);

// Event header layout
pub const EVENT_TYPE_SHIFT: u32 = 26;
pub const TO_SPACE_SHIFT: u32 = 24;

// Anchors
pub const ANCHOR_PROTOTYPE: u32 = 0xFFFF_00FF;
pub const ANCHOR_MASK: u32 = 0xFFFF_00FF;

// Addresses
pub const RELATIVE_ADDR_BITS: u32 = 32;
pub const NARROW_ADDR_BITS: u32 = 22;

// Pointer payloads
pub const MAX_PTRS_PER_EVENT: usize = 12;
pub const PTR_KIND_END: u32 = 0;
pub const PTR_KIND_RELATIVE: u32 = 1;
pub const PTR_KIND_ABSOLUTE: u32 = 2;
pub const PTR_KIND_NULL: u32 = 3;

// Root pointer blocks
pub const MAX_ROOTS_PER_EVENT: usize = 3;
pub const ROOT_BLOCK_END: i64 = -1;

// Allocations
pub const BIG_ALLOCATION_SITE_BIT: i32 = 1 << 15;
pub const ARRAY_LENGTH_MAX_SMALL: i32 = 0xFF;
pub const LAST_ALLOCATIONS: usize = 15;

/// Longest thread name carried by THREAD_ALIVE, in words
pub const MAX_THREAD_NAME_WORDS: usize = 12;

/// Space indices at or above this are rejected
pub const MAX_SPACES: u32 = 1 << 16;

// Snapshots
pub const SNAPSHOT_MAGIC: i32 = 0x4854_5348;
pub const SNAPSHOT_VERSION: i32 = 1;

/// Byte budget of one decode window before it is cut
pub const DEFAULT_MAX_WINDOW_BYTES: usize = 64 * 1024 * 1024;

/// Bounded capacity of the decoder job queue
pub const JOB_QUEUE_CAPACITY: usize = 256;
