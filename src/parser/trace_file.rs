//! Trace container: file header and per-thread chunks.
//!
//! ```text
//! header: magic:u32 version:u32 flags:u32           (little endian)
//! chunk:  thread:u64 metadata:u32 payload[length]
//! ```
//!
//! The metadata word carries the payload length, a compression flag and
//! the sync level that tells the pipeline how the chunk is ordered against
//! chunks of other threads.

use crate::utils::config::{
    CHUNK_COMPRESSED_MASK, CHUNK_LENGTH_MASK, CHUNK_SYNC_MASK, CHUNK_SYNC_SHIFT, TRACE_FLAG_ANCHORS,
    TRACE_MAGIC, TRACE_VERSION,
};
use crate::utils::error::{DecodeError, DecodeErrorKind, TraceError};
use log::{debug, warn};
use std::io::{ErrorKind, Read};

/// Ordering requirement of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLevel {
    /// May be decoded concurrently with chunks of other threads
    None,
    /// Everything before must be applied first
    EnsureOrder,
    /// Everything before must be applied and every thread flushed first
    Full,
}

impl SyncLevel {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(SyncLevel::None),
            1 => Some(SyncLevel::EnsureOrder),
            2 => Some(SyncLevel::Full),
            _ => None,
        }
    }

    pub fn id(self) -> u32 {
        match self {
            SyncLevel::None => 0,
            SyncLevel::EnsureOrder => 1,
            SyncLevel::Full => 2,
        }
    }
}

/// Global trace settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub version: u32,
    /// Every event is followed by an anchor word
    pub anchors: bool,
}

/// One buffer flushed by one VM thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub thread: u64,
    pub sync: SyncLevel,
    /// Trace offset of the first payload byte
    pub position: u64,
    pub payload: Vec<u8>,
}

/// Sequential chunk reader
pub struct TraceReader<R: Read> {
    inner: R,
    header: TraceHeader,
    position: u64,
}

impl<R: Read> TraceReader<R> {
    /// Read and check the file header
    ///
    /// **Public** - fails with `TraceError::BadHeader` on a foreign file
    pub fn new(mut inner: R) -> Result<Self, TraceError> {
        let mut raw = [0u8; 12];
        inner.read_exact(&mut raw)?;

        let magic = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let flags = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);

        if magic != TRACE_MAGIC {
            return Err(TraceError::BadHeader(format!("magic 0x{:08x}", magic)));
        }
        if version != TRACE_VERSION {
            return Err(TraceError::BadHeader(format!("version {}", version)));
        }

        let header = TraceHeader {
            version,
            anchors: flags & TRACE_FLAG_ANCHORS != 0,
        };
        debug!("Trace header: {:?}", header);

        Ok(Self {
            inner,
            header,
            position: raw.len() as u64,
        })
    }

    pub fn header(&self) -> TraceHeader {
        self.header
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next chunk; `None` at end of trace
    ///
    /// A trace cut off in the middle of a chunk (VM killed while writing)
    /// ends the stream with a warning instead of an error.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TraceError> {
        let mut prefix = [0u8; 12];
        match read_full(&mut self.inner, &mut prefix)? {
            0 => return Ok(None),
            n if n < prefix.len() => {
                warn!("Trace ends inside a chunk header at byte {}", self.position);
                return Ok(None);
            }
            _ => {}
        }

        let thread = u64::from_le_bytes([
            prefix[0], prefix[1], prefix[2], prefix[3], prefix[4], prefix[5], prefix[6], prefix[7],
        ]);
        let metadata = u32::from_le_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]);
        let chunk_start = self.position;
        self.position += prefix.len() as u64;

        if metadata & CHUNK_COMPRESSED_MASK != 0 {
            return Err(DecodeError {
                thread,
                offset: chunk_start,
                kind: DecodeErrorKind::Compressed,
            }
            .into());
        }

        let sync_id = (metadata & CHUNK_SYNC_MASK) >> CHUNK_SYNC_SHIFT;
        let sync = SyncLevel::from_id(sync_id)
            .ok_or_else(|| TraceError::BadHeader(format!("sync level {} at byte {}", sync_id, chunk_start)))?;
        let length = (metadata & CHUNK_LENGTH_MASK) as usize;

        let mut payload = vec![0u8; length];
        let read = read_full(&mut self.inner, &mut payload)?;
        if read < length {
            warn!(
                "Trace ends inside chunk of thread 0x{:x} ({} of {} bytes)",
                thread, read, length
            );
            return Ok(None);
        }

        let position = self.position;
        self.position += length as u64;

        Ok(Some(Chunk {
            thread,
            sync,
            position,
            payload,
        }))
    }
}

/// Fill `buf` as far as the reader allows
///
/// **Private** - internal helper
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
