//! Slave decoder: turns one thread's chunks into address-resolved records.
//!
//! Decoders run in parallel, one shard each. They only read the heap (as it
//! was when the window started) and write to their own staging thread; the
//! one shared structure they touch is the pending pointer table.

use super::address::AddressCodec;
use super::event::EventType;
use super::record::{Allocation, GcMeta, Located, Record, RootRecord};
use super::trace_file::Chunk;
use super::words::{recover_value, WordCursor};
use crate::heap::{GcEventType, GcType, HeapModel, LabKind, RootInfo, RootKind, RootPtr, SpaceKind, SpaceMode};
use crate::reconstruct::CancellationToken;
use crate::staging::{FragmentOrder, PendingPointerTable, StagingThread, ThreadLab};
use crate::symbols::{PointerCapacity, Symbols, TypeInfo};
use crate::utils::config::{
    ANCHOR_MASK, ANCHOR_PROTOTYPE, ARRAY_LENGTH_MAX_SMALL, BIG_ALLOCATION_SITE_BIT, MAX_PTRS_PER_EVENT,
    MAX_ROOTS_PER_EVENT, MAX_THREAD_NAME_WORDS, PTR_KIND_ABSOLUTE, PTR_KIND_END, PTR_KIND_NULL,
    PTR_KIND_RELATIVE, ROOT_BLOCK_END,
};
use crate::utils::error::{DecodeError, DecodeErrorKind, TraceError};
use log::trace;

/// Everything a decoder borrows for the duration of one window
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    pub symbols: &'a Symbols,
    /// The heap frozen at window start
    pub heap: &'a HeapModel,
    pub pending: &'a PendingPointerTable,
    pub cancel: &'a CancellationToken,
    /// Every event is followed by an anchor word
    pub anchors: bool,
    pub window: u64,
    pub shard: u32,
}

/// Decoder for one shard
pub struct SlaveDecoder<'a> {
    ctx: DecodeContext<'a>,
    codec: AddressCodec,
    sequence: u64,
    saw_gc: bool,
}

type EventResult = Result<(), DecodeErrorKind>;

impl<'a> SlaveDecoder<'a> {
    /// Create a decoder whose address codec starts at `base`
    pub fn new(ctx: DecodeContext<'a>, base: u64) -> Self {
        let mut codec = AddressCodec::new(ctx.symbols.heap_word_size);
        codec.set_base(base);
        Self {
            ctx,
            codec,
            sequence: 0,
            saw_gc: false,
        }
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    /// Whether a GC start or end moved the address base
    pub fn saw_gc(&self) -> bool {
        self.saw_gc
    }

    /// Decode every event of `chunk`, appending records to `out`
    ///
    /// **Public** - main entry point, called once per chunk of the shard
    ///
    /// # Errors
    /// * `TraceError::Decode` - malformed event, located by thread and offset
    /// * `TraceError::Cancelled` - the token was cancelled
    pub fn decode_chunk(
        &mut self,
        staging: &mut StagingThread,
        chunk: &Chunk,
        out: &mut Vec<Located>,
    ) -> Result<(), TraceError> {
        let mut cursor = WordCursor::new(&chunk.payload, chunk.position);

        while !cursor.is_empty() {
            if self.ctx.cancel.is_cancelled() {
                return Err(TraceError::Cancelled);
            }

            let offset = cursor.offset();
            self.decode_event(staging, &mut cursor, offset, out)
                .map_err(|kind| DecodeError {
                    thread: chunk.thread,
                    offset,
                    kind,
                })?;
        }

        Ok(())
    }

    /// **Private** - one event: header, payload, anchor
    fn decode_event(
        &mut self,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
        offset: u64,
        out: &mut Vec<Located>,
    ) -> EventResult {
        let header = cursor.next_word()?;
        let event = EventType::from_header(header as u32).map_err(DecodeErrorKind::UnknownEvent)?;
        if !event.is_supported() {
            return Err(DecodeErrorKind::UnsupportedEvent(event));
        }
        self.sequence += 1;

        // Updates decide after reading their address: they may continue the object in progress
        let continues_pointers = matches!(
            event,
            EventType::GcPtrExtension | EventType::GcPtrUpdatePremove | EventType::GcPtrUpdatePostmove
        );
        if !continues_pointers {
            if let Some(set) = staging.finish_pointer_accumulation(self.ctx.pending)? {
                out.push(Located {
                    offset,
                    record: Record::Pointers(set),
                });
            }
        }

        let mut records = Vec::new();
        self.dispatch(event, header, staging, cursor, &mut records)?;
        out.extend(records.into_iter().map(|record| Located { offset, record }));

        if self.ctx.anchors && event.may_be_followed_by_anchor() {
            check_anchor(event, cursor)?;
        }

        Ok(())
    }

    /// **Private** - the single dispatch over the event vocabulary
    fn dispatch(
        &mut self,
        event: EventType,
        header: i32,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
        out: &mut Vec<Record>,
    ) -> EventResult {
        trace!("{} at {}", event, cursor.offset());

        match event {
            EventType::Nop => {}

            EventType::GcStart | EventType::GcEnd => {
                let meta = self.gc_meta(event, header, cursor)?;
                self.codec.set_base(meta.base);
                self.saw_gc = true;
                out.push(Record::Gc(meta));
            }

            EventType::GcInfo => {
                let region = recover_value(header, 1, 3) as u32;
                let id = cursor.next_word()? as u32;
                out.push(Record::GcInfo { region, id });
            }

            EventType::GcFailed => {
                let region = recover_value(header, 1, 3) as u32;
                out.push(Record::GcFailed { region });
            }

            EventType::GcInterrupt | EventType::GcContinue => {
                let id = cursor.next_word()? as u32;
                let address = cursor.next_double_word()? as u64;
                out.push(if event == EventType::GcInterrupt {
                    Record::GcInterrupt { id, address }
                } else {
                    Record::GcContinue { id, address }
                });
            }

            EventType::GcTag => {
                let len = cursor.next_word()? as u32 as usize;
                out.push(Record::GcTag(cursor.read_string(len)?));
            }

            EventType::SpaceCreate | EventType::SpaceRedefine => {
                let index = cursor.next_word()? as u32;
                let start = cursor.next_double_word()? as u64;
                let size = cursor.next_double_word()? as u64;
                out.push(if event == EventType::SpaceCreate {
                    Record::SpaceCreate { index, start, size }
                } else {
                    Record::SpaceRedefine { index, start, size }
                });
            }

            EventType::SpaceAlloc => {
                let kind_id = (header >> 18) & 0xFF;
                let mode_id = (header >> 10) & 0xFF;
                let kind = SpaceKind::from_id(kind_id).ok_or(DecodeErrorKind::InvalidSpaceKind(kind_id))?;
                let mode = SpaceMode::from_id(mode_id).ok_or(DecodeErrorKind::InvalidSpaceMode(mode_id))?;
                let index = cursor.next_word()? as u32;
                out.push(Record::SpaceAlloc { index, kind, mode });
            }

            EventType::SpaceRelease => {
                let index = cursor.next_word()? as u32;
                out.push(Record::SpaceRelease { index });
            }

            EventType::SpaceDestroy => {
                let first = cursor.next_word()? as u32;
                let count = cursor.next_double_word()? as u64;
                out.push(Record::SpaceDestroy { first, count });
            }

            EventType::ThreadAlive => {
                let id = cursor.next_double_word()? as u64;
                let name = cursor.read_terminated(MAX_THREAD_NAME_WORDS)?;
                out.push(Record::ThreadAlive { id, name });
            }

            EventType::ThreadDeath => {
                let id = cursor.next_double_word()? as u64;
                out.push(Record::ThreadDeath { id });
            }

            EventType::TlabAlloc | EventType::PlabAlloc => {
                let capacity = cursor.next_double_word()? as u64;
                let addr = cursor.next_double_word()? as u64;
                let (kind, space) = if event == EventType::TlabAlloc {
                    (LabKind::Tlab, SpaceKind::Eden)
                } else {
                    let space = self
                        .ctx
                        .heap
                        .space_kind_at(addr)
                        .ok_or(DecodeErrorKind::NoSpaceAt(addr))?;
                    (LabKind::Plab, space)
                };
                staging.open_lab(ThreadLab::new(kind, space, addr, capacity));
                out.push(Record::LabOpened { kind, addr, capacity });
            }

            EventType::ObjAllocFastIr | EventType::ObjAllocFastC1 | EventType::ObjAllocFastC2 => {
                self.alloc_fast(event, header, false, staging, cursor, out)?;
            }

            EventType::ObjAllocFastC1DeviantType | EventType::ObjAllocFastC2DeviantType => {
                self.alloc_fast(event, header, true, staging, cursor, out)?;
            }

            EventType::ObjAllocNormalIr | EventType::ObjAllocNormalC1 | EventType::ObjAllocNormalC2 => {
                self.alloc_normal(event, header, staging, cursor, out)?;
            }

            EventType::ObjAllocSlow
            | EventType::ObjAllocSlowIr
            | EventType::ObjAllocSlowC1
            | EventType::ObjAllocSlowC2
            | EventType::ObjAllocSlowIrDeviantType
            | EventType::ObjAllocSlowC1DeviantType
            | EventType::ObjAllocSlowC2DeviantType => {
                self.alloc_slow(event, header, staging, cursor, out)?;
            }

            EventType::GcMoveSlow | EventType::GcMoveSlowPtr => {
                let from = cursor.next_double_word()? as u64;
                let to = cursor.next_double_word()? as u64;
                out.push(Record::Move { event, from, to });
                if event.is_pointer() {
                    self.start_pointers(event, header, Some(from), to, from, staging, cursor)?;
                }
            }

            EventType::GcMoveFastWide | EventType::GcMoveFastWidePtr => {
                let from = cursor.next_double_word()? as u64;
                self.fast_move(event, header, from, staging, cursor, out)?;
            }

            EventType::GcMoveFast | EventType::GcMoveFastPtr => {
                let from = self.codec.absolute(cursor.next_word()?).address;
                self.fast_move(event, header, from, staging, cursor, out)?;
            }

            EventType::GcMoveFastNarrow => {
                let from = self.codec.absolute_narrow(recover_value(header, 1, 3) >> 2).address;
                self.fast_move(event, header, from, staging, cursor, out)?;
            }

            EventType::GcMoveRegion => {
                let count = recover_value(header, 1, 3) as u32;
                let mut from = cursor.next_double_word()? as u64;
                let mut to = cursor.next_double_word()? as u64;
                for _ in 0..count {
                    let (_, object) = self
                        .ctx
                        .heap
                        .object_at(from)
                        .ok_or(DecodeErrorKind::UnknownObject(from))?;
                    let size = object.size;
                    out.push(Record::Move { event, from, to });
                    from += size;
                    to += size;
                }
            }

            EventType::GcKeepAlive | EventType::GcKeepAlivePtr => {
                let address = cursor.next_double_word()? as u64;
                out.push(Record::KeepAlive { address });
                if event.is_pointer() {
                    self.start_pointers(event, header, Some(address), address, address, staging, cursor)?;
                }
            }

            EventType::SyncObj | EventType::SyncObjNarrow => {
                let site = recover_value(header, 1, 3) as u32;
                let type_id = cursor.next_word()? as u32;
                let info = self.type_info(type_id)?;
                let from = cursor.next_double_word()? as u64;
                let to = if event == EventType::SyncObj {
                    cursor.next_double_word()? as u64
                } else {
                    from
                };
                let array_length = if info.is_array() {
                    Some(cursor.next_word()? as u32)
                } else {
                    None
                };
                let size = if info.mirror {
                    cursor.next_word()? as u32 as u64
                } else {
                    self.ctx.symbols.object_size(info, array_length)
                };
                out.push(Record::Sync {
                    event,
                    site,
                    type_id,
                    from,
                    to,
                    size,
                    array_length,
                });
            }

            EventType::GcPtrExtension => {
                let addr = cursor.next_double_word()? as u64;
                let pointers = self.parse_pointers(header, addr, cursor)?;
                staging.append_pointers(addr, pointers)?;
            }

            EventType::GcPtrMultithreaded => {
                let addr = cursor.next_double_word()? as u64;
                let pointers = self.parse_pointers(header, addr, cursor)?;
                let order = FragmentOrder {
                    window: self.ctx.window,
                    shard: self.ctx.shard,
                    sequence: self.sequence,
                };
                if let Some(set) = staging.add_multithreaded_pointers(self.ctx.pending, addr, order, pointers)? {
                    out.push(Record::Pointers(set));
                }
            }

            EventType::GcPtrUpdatePremove | EventType::GcPtrUpdatePostmove => {
                let addr = cursor.next_double_word()? as u64;
                if staging.accumulation().is_collecting(addr) {
                    let pointers = self.parse_pointers(header, addr, cursor)?;
                    staging.append_pointers(addr, pointers)?;
                } else {
                    if let Some(set) = staging.finish_pointer_accumulation(self.ctx.pending)? {
                        out.push(Record::Pointers(set));
                    }
                    self.start_pointers(event, header, None, addr, addr, staging, cursor)?;
                }
            }

            EventType::GcRootPtr => {
                out.push(Record::Roots(parse_roots(cursor)?));
            }

            EventType::Mark | EventType::GcDeallocation | EventType::Cleanup | EventType::MoveGeneric => {
                return Err(DecodeErrorKind::UnsupportedEvent(event));
            }
        }

        Ok(())
    }

    /// **Private** - fixed part of GC_START / GC_END
    fn gc_meta(&self, event: EventType, header: i32, cursor: &mut WordCursor<'_>) -> Result<GcMeta, DecodeErrorKind> {
        let type_id = recover_value(header, 1, 1);
        let gc_type = GcType::from_id(type_id).ok_or(DecodeErrorKind::InvalidGcType(type_id))?;
        let cause = recover_value(header, 2, 2) as u32;
        let flags = recover_value(header, 3, 3);

        Ok(GcMeta {
            event: if event == EventType::GcStart {
                GcEventType::Start
            } else {
                GcEventType::End
            },
            gc_type,
            cause,
            failed: flags & 1 != 0,
            concurrent: flags & 2 != 0,
            id: cursor.next_word()? as u32,
            time: cursor.next_double_word()? as u64,
            base: cursor.next_double_word()? as u64,
        })
    }

    /// **Private** - fast moves land in the current PLAB of the header's to-space
    fn fast_move(
        &mut self,
        event: EventType,
        header: i32,
        from: u64,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
        out: &mut Vec<Record>,
    ) -> EventResult {
        let space_id = EventType::to_space_bits(header as u32) as i32;
        let space = SpaceKind::from_id(space_id).ok_or(DecodeErrorKind::InvalidSpaceKind(space_id))?;
        let (_, object) = self
            .ctx
            .heap
            .object_at(from)
            .ok_or(DecodeErrorKind::UnknownObject(from))?;

        let to = staging.bump(space, object.size)?;
        out.push(Record::Move { event, from, to });

        if event.is_pointer() {
            self.start_pointers(event, header, Some(from), to, from, staging, cursor)?;
        }
        Ok(())
    }

    /// **Private** - decode a pointer payload and open an accumulation for it
    ///
    /// `lookup` is the pre-GC address used to find the owner's type.
    #[allow(clippy::too_many_arguments)]
    fn start_pointers(
        &mut self,
        event: EventType,
        header: i32,
        from: Option<u64>,
        to: u64,
        lookup: u64,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
    ) -> EventResult {
        let pointers = self.parse_pointers(header, to, cursor)?;
        let capacity = match self.ctx.heap.object_at(lookup) {
            Some((_, object)) => self.ctx.heap.capacity_of(object),
            None => PointerCapacity::Deferred,
        };
        staging.start_pointer_accumulation(event, from, to, capacity, pointers)?;
        Ok(())
    }

    /// Decode the up to twelve pointers announced in the header
    ///
    /// **Public** - `reference` is the address relative pointers count back from
    pub fn parse_pointers(
        &self,
        header: i32,
        reference: u64,
        cursor: &mut WordCursor<'_>,
    ) -> Result<Vec<Option<u64>>, DecodeErrorKind> {
        let kinds = recover_value(header, 1, 3) as u32;
        let word = self.ctx.symbols.heap_word_size as i64;
        let reference = reference as i64;
        let mut last = 0i64;
        let mut pointers = Vec::new();

        for i in 0..MAX_PTRS_PER_EVENT {
            let kind = (kinds >> ((MAX_PTRS_PER_EVENT - i - 1) * 2)) & 0x3;
            match kind {
                PTR_KIND_END => break,
                PTR_KIND_RELATIVE => {
                    last = last.wrapping_add(cursor.next_word()? as i64);
                    pointers.push(Some(reference.wrapping_sub(last.wrapping_mul(word)) as u64));
                }
                PTR_KIND_ABSOLUTE => {
                    let addr = cursor.next_double_word()?;
                    last = reference.wrapping_sub(addr) / word;
                    pointers.push(Some(addr as u64));
                }
                PTR_KIND_NULL => pointers.push(None),
                _ => unreachable!("two-bit pointer kind"),
            }
        }

        Ok(pointers)
    }

    /// **Private** - allocations that bump the thread's TLAB
    fn alloc_fast(
        &mut self,
        event: EventType,
        header: i32,
        deviant: bool,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
        out: &mut Vec<Record>,
    ) -> EventResult {
        let (site, _) = alloc_site(header);
        let type_id = if deviant {
            cursor.next_word()? as u32
        } else {
            self.site_type(site)?
        };
        let info = self.type_info(type_id)?;
        let array_length = if info.is_array() {
            Some(array_length(header, cursor)?)
        } else {
            None
        };
        let size = self.ctx.symbols.object_size(info, array_length);
        let address = staging.bump(SpaceKind::Eden, size)?;

        staging.push_site(site);
        out.push(Record::Allocation(Allocation {
            event,
            site,
            type_id,
            address,
            size,
            array_length,
        }));
        Ok(())
    }

    /// **Private** - allocations that carry their address
    fn alloc_normal(
        &mut self,
        event: EventType,
        header: i32,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
        out: &mut Vec<Record>,
    ) -> EventResult {
        let (site, _) = alloc_site(header);
        let type_id = self.site_type(site)?;
        let info = self.type_info(type_id)?;
        let address = cursor.next_double_word()? as u64;
        let array_length = if info.is_array() {
            Some(array_length(header, cursor)?)
        } else {
            None
        };
        let size = self.ctx.symbols.object_size(info, array_length);

        staging.push_site(site);
        out.push(Record::Allocation(Allocation {
            event,
            site,
            type_id,
            address,
            size,
            array_length,
        }));
        Ok(())
    }

    /// **Private** - slow-path allocations from the VM runtime
    ///
    /// Small sites always carry a length byte (zero for non-arrays).
    fn alloc_slow(
        &mut self,
        event: EventType,
        header: i32,
        staging: &mut StagingThread,
        cursor: &mut WordCursor<'_>,
        out: &mut Vec<Record>,
    ) -> EventResult {
        let (site, big) = alloc_site(header);
        let site_type = self
            .ctx
            .symbols
            .site_by_id(site)
            .ok_or(DecodeErrorKind::UnknownSite(site))?
            .type_id;
        let address = cursor.next_double_word()? as u64;
        let mut array_length = if big {
            None
        } else {
            Some(array_length(header, cursor)?)
        };

        let deviant = matches!(
            event,
            EventType::ObjAllocSlowIrDeviantType
                | EventType::ObjAllocSlowC1DeviantType
                | EventType::ObjAllocSlowC2DeviantType
        );
        let type_id = if deviant || (event == EventType::ObjAllocSlow && site_type.is_none()) {
            cursor.next_word()? as u32
        } else {
            site_type.ok_or(DecodeErrorKind::UnknownSite(site))?
        };
        let info = self.type_info(type_id)?;

        let size = if event == EventType::ObjAllocSlow && info.mirror {
            array_length = None;
            cursor.next_word()? as u32 as u64
        } else {
            if !info.is_array() {
                array_length = None;
            }
            self.ctx.symbols.object_size(info, array_length)
        };

        staging.push_site(site);
        out.push(Record::Allocation(Allocation {
            event,
            site,
            type_id,
            address,
            size,
            array_length,
        }));
        Ok(())
    }

    /// **Private** - internal helper
    fn site_type(&self, site: u32) -> Result<u32, DecodeErrorKind> {
        self.ctx
            .symbols
            .site_by_id(site)
            .and_then(|s| s.type_id)
            .ok_or(DecodeErrorKind::UnknownSite(site))
    }

    /// **Private** - internal helper
    fn type_info(&self, type_id: u32) -> Result<&'a TypeInfo, DecodeErrorKind> {
        self.ctx
            .symbols
            .type_by_id(type_id)
            .ok_or(DecodeErrorKind::UnknownType(type_id))
    }
}

/// Allocation site id from header bytes 1-2, or 1-3 for big sites
///
/// **Private** - returns the id and whether the site is big
fn alloc_site(header: i32) -> (u32, bool) {
    let small = recover_value(header, 1, 2);
    if small & BIG_ALLOCATION_SITE_BIT != 0 {
        (recover_value(header, 1, 3) as u32, true)
    } else {
        (small as u32, false)
    }
}

/// Array length from header byte 3, or the next word when it saturates
///
/// **Private** - internal helper
fn array_length(header: i32, cursor: &mut WordCursor<'_>) -> Result<u32, DecodeErrorKind> {
    let small = recover_value(header, 3, 3);
    if small == ARRAY_LENGTH_MAX_SMALL {
        Ok(cursor.next_word()? as u32)
    } else {
        Ok(small as u32)
    }
}

/// **Private** - verify the resynchronization word after an event
fn check_anchor(event: EventType, cursor: &mut WordCursor<'_>) -> EventResult {
    let found = cursor.next_word()? as u32;
    let opcode = (found >> 8) & 0xFF;
    if found & ANCHOR_MASK != ANCHOR_PROTOTYPE || opcode != event.id() as u32 {
        return Err(DecodeErrorKind::AnchorMismatch { event, found });
    }
    Ok(())
}

/// Decode a root pointer block of at most three entries
///
/// An address of -1 ends the block early, 0 is a NULL root.
fn parse_roots(cursor: &mut WordCursor<'_>) -> Result<Vec<RootRecord>, DecodeErrorKind> {
    let mut roots = Vec::with_capacity(MAX_ROOTS_PER_EVENT);

    for _ in 0..MAX_ROOTS_PER_EVENT {
        if cursor.is_empty() {
            return Err(DecodeErrorKind::UnterminatedRootBlock);
        }
        let ptr = cursor
            .next_double_word()
            .map_err(|_| DecodeErrorKind::UnterminatedRootBlock)?;
        if ptr == ROOT_BLOCK_END {
            break;
        }
        let address = if ptr == 0 { None } else { Some(ptr as u64) };

        let kind_id = cursor.next_word()?;
        let kind = RootKind::from_id(kind_id).ok_or(DecodeErrorKind::InvalidRootKind(kind_id))?;
        let info = match kind {
            RootKind::ClassLoader => {
                let len = cursor.next_word()? as u32 as usize;
                RootInfo::ClassLoader {
                    name: cursor.read_string(len)?,
                }
            }
            RootKind::Class => RootInfo::Class {
                class_id: cursor.next_word()? as u32,
            },
            RootKind::StaticField => RootInfo::StaticField {
                class_id: cursor.next_word()? as u32,
                offset: cursor.next_word()? as u32,
            },
            RootKind::LocalVariable => RootInfo::LocalVariable {
                thread_id: cursor.next_double_word()? as u64,
                class_id: cursor.next_word()? as u32,
                method_id: cursor.next_word()? as u32,
                slot: cursor.next_word()? as u32,
            },
            RootKind::VmInternalThreadData | RootKind::JniLocal => RootInfo::Thread {
                thread_id: cursor.next_double_word()? as u64,
            },
            RootKind::CodeBlob => RootInfo::CodeBlob {
                class_id: cursor.next_word()? as u32,
                method_id: cursor.next_word()? as u32,
            },
            RootKind::JniGlobal => RootInfo::JniGlobal {
                weak: cursor.next_word()? != 0,
            },
            RootKind::Debug => {
                let len = cursor.next_word()? as u32 as usize;
                RootInfo::Debug {
                    call: cursor.read_string(len)?,
                }
            }
            RootKind::ClassLoaderInternal
            | RootKind::Universe
            | RootKind::SystemDictionary
            | RootKind::BusyMonitor
            | RootKind::InternedString
            | RootKind::FlatProfiler
            | RootKind::Management
            | RootKind::Jvmti => RootInfo::None,
        };

        roots.push(RootRecord {
            address,
            root: RootPtr::new(kind, info),
        });
    }

    Ok(roots)
}
