//! Decoded, address-resolved records handed from decoders to the master.

use super::EventType;
use crate::heap::{GcEventType, GcType, LabKind, RootPtr, SpaceKind, SpaceMode};

/// Fixed part of a GC start or end event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcMeta {
    pub event: GcEventType,
    pub gc_type: GcType,
    pub cause: u32,
    pub failed: bool,
    pub concurrent: bool,
    pub id: u32,
    pub time: u64,
    pub base: u64,
}

/// A new object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub event: EventType,
    pub site: u32,
    pub type_id: u32,
    pub address: u64,
    pub size: u64,
    pub array_length: Option<u32>,
}

/// The complete outgoing pointers of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerSet {
    /// Event that opened the set
    pub event: EventType,
    /// Pre-move address, when the set came with a move
    pub from: Option<u64>,
    /// Address the set is keyed by
    pub to: u64,
    /// Absolute target addresses; `None` is a NULL reference
    pub pointers: Vec<Option<u64>>,
}

/// A lab handed back by a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetiredLab {
    pub kind: LabKind,
    pub space: SpaceKind,
    pub addr: u64,
    pub capacity: u64,
    pub used: u64,
}

/// One root descriptor and the address it names (`None` = NULL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRecord {
    pub address: Option<u64>,
    pub root: RootPtr,
}

/// Everything the master can apply to the heap model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Gc(GcMeta),
    GcInfo { region: u32, id: u32 },
    GcFailed { region: u32 },
    GcInterrupt { id: u32, address: u64 },
    GcContinue { id: u32, address: u64 },
    GcTag(String),
    SpaceCreate { index: u32, start: u64, size: u64 },
    SpaceAlloc { index: u32, kind: SpaceKind, mode: SpaceMode },
    SpaceRelease { index: u32 },
    SpaceRedefine { index: u32, start: u64, size: u64 },
    SpaceDestroy { first: u32, count: u64 },
    ThreadAlive { id: u64, name: String },
    ThreadDeath { id: u64 },
    LabOpened { kind: LabKind, addr: u64, capacity: u64 },
    LabsRetired(Vec<RetiredLab>),
    Allocation(Allocation),
    Move { event: EventType, from: u64, to: u64 },
    KeepAlive { address: u64 },
    Sync {
        event: EventType,
        site: u32,
        type_id: u32,
        from: u64,
        to: u64,
        size: u64,
        array_length: Option<u32>,
    },
    Pointers(PointerSet),
    Roots(Vec<RootRecord>),
}

/// A record and the trace offset of the event it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub offset: u64,
    pub record: Record,
}
