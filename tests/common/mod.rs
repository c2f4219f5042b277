//! Shared helpers: a symbols fixture and a builder for binary traces.

#![allow(dead_code)]

use heap_trace_studio::heap::{GcType, SpaceKind, SpaceMode};
use heap_trace_studio::parser::{EventType, SyncLevel};
use heap_trace_studio::symbols::{SiteInfo, Symbols, TypeInfo};
use heap_trace_studio::utils::config::{
    ANCHOR_PROTOTYPE, CHUNK_SYNC_SHIFT, EVENT_TYPE_SHIFT, PTR_KIND_ABSOLUTE, PTR_KIND_NULL, TRACE_FLAG_ANCHORS,
    TRACE_MAGIC, TRACE_VERSION,
};
use std::sync::Arc;

pub const EDEN: u64 = 0x10_0000;
pub const SURVIVOR: u64 = 0x20_0000;
pub const OLD: u64 = 0x30_0000;
pub const SPACE_SIZE: u64 = 0x10_0000;

/// Two reference fields, 24 bytes
pub const NODE_SITE: u32 = 1;
/// No reference fields, 16 bytes
pub const LEAF_SITE: u32 = 2;
/// Three reference fields, 32 bytes
pub const TRIPLE_SITE: u32 = 3;
/// Fourteen reference fields, more than one event carries
pub const WIDE_SITE: u32 = 4;

pub const NODE_SIZE: u64 = 24;
pub const LEAF_SIZE: u64 = 16;
pub const TRIPLE_SIZE: u64 = 32;
pub const WIDE_SIZE: u64 = 128;
pub const WIDE_POINTERS: usize = 14;

fn instance(id: u32, name: &str, size: u32, pointers: u32) -> TypeInfo {
    TypeInfo {
        id,
        name: name.to_string(),
        size,
        array: None,
        pointers,
        unknown_pointer_count: false,
        mirror: false,
    }
}

fn site(id: u32, type_id: u32) -> SiteInfo {
    SiteInfo {
        id,
        type_id: Some(type_id),
        location: format!("Test.site{}()", id),
    }
}

pub fn symbols() -> Arc<Symbols> {
    Arc::new(
        Symbols::new(8)
            .with_type(instance(1, "Node", NODE_SIZE as u32, 2))
            .with_type(instance(2, "Leaf", LEAF_SIZE as u32, 0))
            .with_type(instance(3, "Triple", TRIPLE_SIZE as u32, 3))
            .with_type(instance(4, "Wide", WIDE_SIZE as u32, WIDE_POINTERS as u32))
            .with_site(site(NODE_SITE, 1))
            .with_site(site(LEAF_SITE, 2))
            .with_site(site(TRIPLE_SITE, 3))
            .with_site(site(WIDE_SITE, 4))
            .with_cause(0, "Allocation Failure"),
    )
}

/// The symbols fixture as a JSON symbols file
pub const SYMBOLS_JSON: &str = r#"{
    "heap_word_size": 8,
    "types": [
        { "id": 1, "name": "Node", "size": 24, "pointers": 2 },
        { "id": 2, "name": "Leaf", "size": 16 },
        { "id": 3, "name": "Triple", "size": 32, "pointers": 3 },
        { "id": 4, "name": "Wide", "size": 128, "pointers": 14 }
    ],
    "sites": [
        { "id": 1, "type_id": 1 },
        { "id": 2, "type_id": 2 },
        { "id": 3, "type_id": 3 },
        { "id": 4, "type_id": 4 }
    ],
    "causes": [ { "id": 0, "name": "Allocation Failure" } ]
}"#;

/// Events of one chunk, as payload words
#[derive(Debug, Clone, Default)]
pub struct Events {
    words: Vec<u32>,
    anchors: bool,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow every event with its anchor word
    pub fn with_anchors() -> Self {
        Self {
            words: Vec::new(),
            anchors: true,
        }
    }

    pub fn word(mut self, word: u32) -> Self {
        self.words.push(word);
        self
    }

    fn double(mut self, value: u64) -> Self {
        self.words.push(value as u32);
        self.words.push((value >> 32) as u32);
        self
    }

    fn header(self, event: EventType, payload: u32) -> Self {
        self.word(((event.id() as u32) << EVENT_TYPE_SHIFT) | (payload & 0x00FF_FFFF))
    }

    fn anchor(self, event: EventType) -> Self {
        if self.anchors {
            self.word(ANCHOR_PROTOTYPE | ((event.id() as u32) << 8))
        } else {
            self
        }
    }

    /// Pointer kinds in the header, then the absolute addresses
    fn pointers(self, event: EventType, head: impl FnOnce(Self) -> Self, pointers: &[Option<u64>]) -> Self {
        assert!(pointers.len() <= 12);
        let mut kinds = 0u32;
        for (i, pointer) in pointers.iter().enumerate() {
            let kind = if pointer.is_some() { PTR_KIND_ABSOLUTE } else { PTR_KIND_NULL };
            kinds |= kind << ((11 - i) * 2);
        }
        let mut events = head(self.header(event, kinds));
        for pointer in pointers.iter().flatten() {
            events = events.double(*pointer);
        }
        events.anchor(event)
    }

    pub fn nop(self) -> Self {
        self.header(EventType::Nop, 0).anchor(EventType::Nop)
    }

    pub fn space_create(self, index: u32, start: u64, size: u64) -> Self {
        self.header(EventType::SpaceCreate, 0)
            .word(index)
            .double(start)
            .double(size)
            .anchor(EventType::SpaceCreate)
    }

    pub fn space_alloc(self, index: u32, kind: SpaceKind, mode: SpaceMode) -> Self {
        let payload = ((kind.id() as u32) << 18) | ((mode.id() as u32) << 10);
        self.header(EventType::SpaceAlloc, payload)
            .word(index)
            .anchor(EventType::SpaceAlloc)
    }

    /// Eden, survivor and old space, 1 MiB each
    pub fn standard_spaces(self) -> Self {
        self.space_create(0, EDEN, SPACE_SIZE)
            .space_alloc(0, SpaceKind::Eden, SpaceMode::Normal)
            .space_create(1, SURVIVOR, SPACE_SIZE)
            .space_alloc(1, SpaceKind::Survivor, SpaceMode::Normal)
            .space_create(2, OLD, SPACE_SIZE)
            .space_alloc(2, SpaceKind::Old, SpaceMode::Normal)
    }

    fn gc(self, event: EventType, gc_type: GcType, id: u32) -> Self {
        self.header(event, (gc_type.id() as u32) << 16)
            .word(id)
            .double(u64::from(id) * 1000)
            .double(EDEN)
            .anchor(event)
    }

    pub fn gc_start(self, gc_type: GcType, id: u32) -> Self {
        self.gc(EventType::GcStart, gc_type, id)
    }

    pub fn gc_end(self, gc_type: GcType, id: u32) -> Self {
        self.gc(EventType::GcEnd, gc_type, id)
    }

    pub fn thread_alive(self, id: u64, name: &str) -> Self {
        let mut events = self.header(EventType::ThreadAlive, 0).double(id);
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        for word in bytes.chunks(4) {
            events = events.word(u32::from_be_bytes([word[0], word[1], word[2], word[3]]));
        }
        events.anchor(EventType::ThreadAlive)
    }

    pub fn thread_death(self, id: u64) -> Self {
        self.header(EventType::ThreadDeath, 0)
            .double(id)
            .anchor(EventType::ThreadDeath)
    }

    /// Slow-path allocation at an explicit address
    pub fn alloc(self, site: u32, address: u64) -> Self {
        self.header(EventType::ObjAllocSlow, site << 8)
            .double(address)
            .anchor(EventType::ObjAllocSlow)
    }

    pub fn move_slow(self, from: u64, to: u64) -> Self {
        self.header(EventType::GcMoveSlow, 0)
            .double(from)
            .double(to)
            .anchor(EventType::GcMoveSlow)
    }

    pub fn move_slow_ptr(self, from: u64, to: u64, pointers: &[Option<u64>]) -> Self {
        self.pointers(EventType::GcMoveSlowPtr, |e| e.double(from).double(to), pointers)
    }

    pub fn keep_alive(self, address: u64) -> Self {
        self.header(EventType::GcKeepAlive, 0)
            .double(address)
            .anchor(EventType::GcKeepAlive)
    }

    pub fn keep_alive_ptr(self, address: u64, pointers: &[Option<u64>]) -> Self {
        self.pointers(EventType::GcKeepAlivePtr, |e| e.double(address), pointers)
    }

    pub fn ptr_extension(self, address: u64, pointers: &[Option<u64>]) -> Self {
        self.pointers(EventType::GcPtrExtension, |e| e.double(address), pointers)
    }

    pub fn ptr_update_premove(self, address: u64, pointers: &[Option<u64>]) -> Self {
        self.pointers(EventType::GcPtrUpdatePremove, |e| e.double(address), pointers)
    }

    pub fn ptr_multithreaded(self, address: u64, pointers: &[Option<u64>]) -> Self {
        self.pointers(EventType::GcPtrMultithreaded, |e| e.double(address), pointers)
    }

    /// A class root on `address`, closing the block early
    pub fn class_root(self, address: u64, class_id: u32) -> Self {
        self.header(EventType::GcRootPtr, 0)
            .double(address)
            .word(1)
            .word(class_id)
            .double(u64::MAX)
            .anchor(EventType::GcRootPtr)
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
}

/// Builder for a complete trace file
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    bytes: Vec<u8>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::with_flags(0)
    }

    pub fn with_anchors() -> Self {
        Self::with_flags(TRACE_FLAG_ANCHORS)
    }

    fn with_flags(flags: u32) -> Self {
        let mut bytes = Vec::new();
        for word in [TRACE_MAGIC, TRACE_VERSION, flags] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn chunk(self, thread: u64, sync: SyncLevel, events: Events) -> Self {
        self.raw_chunk(thread, sync.id() << CHUNK_SYNC_SHIFT, &events.into_words())
    }

    /// A chunk with extra metadata bits, for malformed traces
    pub fn raw_chunk(mut self, thread: u64, metadata_bits: u32, words: &[u32]) -> Self {
        let payload: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.bytes.extend_from_slice(&thread.to_le_bytes());
        self.bytes
            .extend_from_slice(&(metadata_bits | payload.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
