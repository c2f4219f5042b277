//! The closed catalog of wire opcodes.
//!
//! Every event starts with a header word whose top six bits carry the opcode.
//! The next two bits carry a destination space for move events, and the low
//! 24 bits are an opcode-specific payload (allocation site, pointer kinds,
//! region index, ...).

use crate::utils::config::{EVENT_TYPE_SHIFT, TO_SPACE_SHIFT};
use std::fmt;

/// Wire opcodes emitted by the instrumented VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EventType {
    Nop = 0x00,
    Mark = 0x01,
    GcStart = 0x02,
    GcEnd = 0x03,
    GcInfo = 0x04,
    GcFailed = 0x05,
    SpaceCreate = 0x06,
    SpaceAlloc = 0x07,
    SpaceRelease = 0x08,
    SpaceRedefine = 0x09,
    SpaceDestroy = 0x0A,
    ThreadAlive = 0x0B,
    ThreadDeath = 0x0C,
    TlabAlloc = 0x0D,
    PlabAlloc = 0x0E,
    ObjAllocSlow = 0x0F,
    ObjAllocSlowIr = 0x10,
    ObjAllocSlowIrDeviantType = 0x11,
    ObjAllocNormalIr = 0x12,
    ObjAllocFastIr = 0x13,
    ObjAllocSlowC1 = 0x14,
    ObjAllocSlowC1DeviantType = 0x15,
    ObjAllocNormalC1 = 0x16,
    ObjAllocFastC1 = 0x17,
    ObjAllocFastC1DeviantType = 0x18,
    ObjAllocSlowC2 = 0x19,
    ObjAllocSlowC2DeviantType = 0x1A,
    ObjAllocNormalC2 = 0x1B,
    ObjAllocFastC2 = 0x1C,
    ObjAllocFastC2DeviantType = 0x1D,
    GcMoveSlow = 0x1E,
    GcMoveFastWide = 0x1F,
    GcMoveFast = 0x20,
    GcMoveFastNarrow = 0x21,
    GcMoveRegion = 0x22,
    GcKeepAlive = 0x23,
    SyncObj = 0x24,
    SyncObjNarrow = 0x25,
    GcDeallocation = 0x26,
    GcMoveSlowPtr = 0x27,
    GcMoveFastWidePtr = 0x28,
    GcMoveFastPtr = 0x29,
    GcKeepAlivePtr = 0x2A,
    GcPtrExtension = 0x2B,
    GcPtrMultithreaded = 0x2C,
    GcRootPtr = 0x2D,
    GcPtrUpdatePremove = 0x2E,
    GcInterrupt = 0x2F,
    GcContinue = 0x30,
    GcPtrUpdatePostmove = 0x31,
    GcTag = 0x32,
    Cleanup = 0x33,
    MoveGeneric = 0x34,
}

/// Every opcode in id order
pub const ALL_EVENTS: [EventType; 53] = [
    EventType::Nop,
    EventType::Mark,
    EventType::GcStart,
    EventType::GcEnd,
    EventType::GcInfo,
    EventType::GcFailed,
    EventType::SpaceCreate,
    EventType::SpaceAlloc,
    EventType::SpaceRelease,
    EventType::SpaceRedefine,
    EventType::SpaceDestroy,
    EventType::ThreadAlive,
    EventType::ThreadDeath,
    EventType::TlabAlloc,
    EventType::PlabAlloc,
    EventType::ObjAllocSlow,
    EventType::ObjAllocSlowIr,
    EventType::ObjAllocSlowIrDeviantType,
    EventType::ObjAllocNormalIr,
    EventType::ObjAllocFastIr,
    EventType::ObjAllocSlowC1,
    EventType::ObjAllocSlowC1DeviantType,
    EventType::ObjAllocNormalC1,
    EventType::ObjAllocFastC1,
    EventType::ObjAllocFastC1DeviantType,
    EventType::ObjAllocSlowC2,
    EventType::ObjAllocSlowC2DeviantType,
    EventType::ObjAllocNormalC2,
    EventType::ObjAllocFastC2,
    EventType::ObjAllocFastC2DeviantType,
    EventType::GcMoveSlow,
    EventType::GcMoveFastWide,
    EventType::GcMoveFast,
    EventType::GcMoveFastNarrow,
    EventType::GcMoveRegion,
    EventType::GcKeepAlive,
    EventType::SyncObj,
    EventType::SyncObjNarrow,
    EventType::GcDeallocation,
    EventType::GcMoveSlowPtr,
    EventType::GcMoveFastWidePtr,
    EventType::GcMoveFastPtr,
    EventType::GcKeepAlivePtr,
    EventType::GcPtrExtension,
    EventType::GcPtrMultithreaded,
    EventType::GcRootPtr,
    EventType::GcPtrUpdatePremove,
    EventType::GcInterrupt,
    EventType::GcContinue,
    EventType::GcPtrUpdatePostmove,
    EventType::GcTag,
    EventType::Cleanup,
    EventType::MoveGeneric,
];

impl EventType {
    /// Wire id of this opcode
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Opcode stored in the top bits of a header word
    ///
    /// **Public** - used by the decoder dispatch
    pub fn from_header(header: u32) -> Result<Self, u8> {
        let id = (header >> EVENT_TYPE_SHIFT) as u8;
        EventType::try_from(id)
    }

    /// Two-bit destination space carried next to the opcode
    pub fn to_space_bits(header: u32) -> u8 {
        ((header >> TO_SPACE_SHIFT) & 0x3) as u8
    }

    /// Upper-case name as used by the VM
    pub fn name(self) -> &'static str {
        match self {
            EventType::Nop => "NOP",
            EventType::Mark => "MARK",
            EventType::GcStart => "GC_START",
            EventType::GcEnd => "GC_END",
            EventType::GcInfo => "GC_INFO",
            EventType::GcFailed => "GC_FAILED",
            EventType::SpaceCreate => "SPACE_CREATE",
            EventType::SpaceAlloc => "SPACE_ALLOC",
            EventType::SpaceRelease => "SPACE_RELEASE",
            EventType::SpaceRedefine => "SPACE_REDEFINE",
            EventType::SpaceDestroy => "SPACE_DESTROY",
            EventType::ThreadAlive => "THREAD_ALIVE",
            EventType::ThreadDeath => "THREAD_DEATH",
            EventType::TlabAlloc => "TLAB_ALLOC",
            EventType::PlabAlloc => "PLAB_ALLOC",
            EventType::ObjAllocSlow => "OBJ_ALLOC_SLOW",
            EventType::ObjAllocSlowIr => "OBJ_ALLOC_SLOW_IR",
            EventType::ObjAllocSlowIrDeviantType => "OBJ_ALLOC_SLOW_IR_DEVIANT_TYPE",
            EventType::ObjAllocNormalIr => "OBJ_ALLOC_NORMAL_IR",
            EventType::ObjAllocFastIr => "OBJ_ALLOC_FAST_IR",
            EventType::ObjAllocSlowC1 => "OBJ_ALLOC_SLOW_C1",
            EventType::ObjAllocSlowC1DeviantType => "OBJ_ALLOC_SLOW_C1_DEVIANT_TYPE",
            EventType::ObjAllocNormalC1 => "OBJ_ALLOC_NORMAL_C1",
            EventType::ObjAllocFastC1 => "OBJ_ALLOC_FAST_C1",
            EventType::ObjAllocFastC1DeviantType => "OBJ_ALLOC_FAST_C1_DEVIANT_TYPE",
            EventType::ObjAllocSlowC2 => "OBJ_ALLOC_SLOW_C2",
            EventType::ObjAllocSlowC2DeviantType => "OBJ_ALLOC_SLOW_C2_DEVIANT_TYPE",
            EventType::ObjAllocNormalC2 => "OBJ_ALLOC_NORMAL_C2",
            EventType::ObjAllocFastC2 => "OBJ_ALLOC_FAST_C2",
            EventType::ObjAllocFastC2DeviantType => "OBJ_ALLOC_FAST_C2_DEVIANT_TYPE",
            EventType::GcMoveSlow => "GC_MOVE_SLOW",
            EventType::GcMoveFastWide => "GC_MOVE_FAST_WIDE",
            EventType::GcMoveFast => "GC_MOVE_FAST",
            EventType::GcMoveFastNarrow => "GC_MOVE_FAST_NARROW",
            EventType::GcMoveRegion => "GC_MOVE_REGION",
            EventType::GcKeepAlive => "GC_KEEP_ALIVE",
            EventType::SyncObj => "SYNC_OBJ",
            EventType::SyncObjNarrow => "SYNC_OBJ_NARROW",
            EventType::GcDeallocation => "GC_DEALLOCATION",
            EventType::GcMoveSlowPtr => "GC_MOVE_SLOW_PTR",
            EventType::GcMoveFastWidePtr => "GC_MOVE_FAST_WIDE_PTR",
            EventType::GcMoveFastPtr => "GC_MOVE_FAST_PTR",
            EventType::GcKeepAlivePtr => "GC_KEEP_ALIVE_PTR",
            EventType::GcPtrExtension => "GC_PTR_EXTENSION",
            EventType::GcPtrMultithreaded => "GC_PTR_MULTITHREADED",
            EventType::GcRootPtr => "GC_ROOT_PTR",
            EventType::GcPtrUpdatePremove => "GC_PTR_UPDATE_PREMOVE",
            EventType::GcInterrupt => "GC_INTERRUPT",
            EventType::GcContinue => "GC_CONTINUE",
            EventType::GcPtrUpdatePostmove => "GC_PTR_UPDATE_POSTMOVE",
            EventType::GcTag => "GC_TAG",
            EventType::Cleanup => "CLEANUP",
            EventType::MoveGeneric => "MOVE_GENERIC",
        }
    }

    /// Events that relocate (or retain) an object during a GC
    pub fn is_move(self) -> bool {
        matches!(
            self,
            EventType::GcMoveSlow
                | EventType::GcMoveFastWide
                | EventType::GcMoveFast
                | EventType::GcMoveFastNarrow
                | EventType::GcMoveRegion
                | EventType::GcKeepAlive
                | EventType::SyncObj
                | EventType::SyncObjNarrow
                | EventType::GcMoveSlowPtr
                | EventType::GcMoveFastWidePtr
                | EventType::GcMoveFastPtr
                | EventType::GcKeepAlivePtr
                | EventType::MoveGeneric
        )
    }

    /// Events that carry a pointer payload after their fixed fields
    pub fn is_pointer(self) -> bool {
        matches!(
            self,
            EventType::GcMoveSlowPtr
                | EventType::GcMoveFastWidePtr
                | EventType::GcMoveFastPtr
                | EventType::GcKeepAlivePtr
                | EventType::GcPtrExtension
                | EventType::GcPtrMultithreaded
                | EventType::GcPtrUpdatePremove
                | EventType::GcPtrUpdatePostmove
        )
    }

    /// Pointer events that do not relocate anything themselves
    pub fn is_dedicated_pointer(self) -> bool {
        matches!(
            self,
            EventType::GcPtrExtension
                | EventType::GcPtrMultithreaded
                | EventType::GcPtrUpdatePremove
                | EventType::GcPtrUpdatePostmove
        )
    }

    pub fn is_alloc(self) -> bool {
        (EventType::ObjAllocSlow.id()..=EventType::ObjAllocFastC2DeviantType.id())
            .contains(&self.id())
    }

    /// Whether the producer may write a resynchronization anchor after this event
    pub fn may_be_followed_by_anchor(self) -> bool {
        true
    }

    /// Opcodes the decoder understands
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            EventType::Mark
                | EventType::GcDeallocation
                | EventType::Cleanup
                | EventType::MoveGeneric
        )
    }
}

impl TryFrom<u8> for EventType {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        ALL_EVENTS.get(id as usize).copied().ok_or(id)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense() {
        for (i, event) in ALL_EVENTS.iter().enumerate() {
            assert_eq!(event.id() as usize, i);
            assert_eq!(EventType::try_from(i as u8), Ok(*event));
        }
        assert_eq!(EventType::try_from(0x35), Err(0x35));
    }

    #[test]
    fn test_header_fields() {
        let header = (EventType::GcMoveFast.id() as u32) << 26 | 2 << 24 | 0x00AB_CDEF;
        assert_eq!(EventType::from_header(header), Ok(EventType::GcMoveFast));
        assert_eq!(EventType::to_space_bits(header), 2);
    }

    #[test]
    fn test_flags() {
        assert!(EventType::GcMoveFastPtr.is_move());
        assert!(EventType::GcMoveFastPtr.is_pointer());
        assert!(!EventType::GcPtrExtension.is_move());
        assert!(EventType::GcPtrExtension.is_dedicated_pointer());
        assert!(EventType::ObjAllocFastC2.is_alloc());
        assert!(!EventType::TlabAlloc.is_alloc());
        assert!(!EventType::GcDeallocation.is_supported());
        assert!(ALL_EVENTS.iter().all(|e| e.may_be_followed_by_anchor()));
    }
}
