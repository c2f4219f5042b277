//! Single-writer state machine that applies decoded records to the heap.
//!
//! Addresses stay pre-GC for the whole collection: moves only fill the
//! cycle's forwarding table, and the address map is rebuilt once the GC
//! ends. Pointer sets are parked in the cycle until then as well, since
//! their targets can only be resolved against the right map.

use super::cancel::CancellationToken;
use crate::heap::{
    GcCause, GcEventType, GcInfo, GcType, HeapListener, HeapModel, HeapObject, Lab, LabState, ObjectIndex,
    ParsingInfo, Space, SpaceKind,
};
use crate::parser::{EventType, GcMeta, Located, PointerSet, Record, RetiredLab, RootRecord};
use crate::staging::PendingPointerTable;
use crate::symbols::PointerCapacity;
use crate::utils::error::{ReconciliationViolation, ReferenceKind, StructuralError, TraceError};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Everything collected between a GC start and its end
#[derive(Debug)]
struct GcCycle {
    start: GcInfo,
    failed: bool,
    /// First sync GC of the trace: unknown synced objects are created
    first_sync: bool,
    collected_regions: Vec<u32>,
    forwarding: HashMap<ObjectIndex, u64>,
    moved_to: HashMap<u64, ObjectIndex>,
    kept_alive: HashSet<ObjectIndex>,
    pointer_sets: Vec<PointerSet>,
    /// Labs opened during the GC, placed once addresses are rebuilt
    labs: Vec<Lab>,
}

impl GcCycle {
    fn new(start: GcInfo, first_sync: bool) -> Self {
        Self {
            failed: start.failed,
            start,
            first_sync,
            collected_regions: Vec::new(),
            forwarding: HashMap::new(),
            moved_to: HashMap::new(),
            kept_alive: HashSet::new(),
            pointer_sets: Vec::new(),
            labs: Vec::new(),
        }
    }

    /// **Private** - pre-GC map first, then addresses objects already moved to
    fn resolve(&self, heap: &HeapModel, addr: u64) -> Option<ObjectIndex> {
        heap.object_at(addr)
            .map(|(index, _)| index)
            .or_else(|| self.moved_to.get(&addr).copied())
    }

    fn record_move(&mut self, index: ObjectIndex, to: u64) {
        if let Some(previous) = self.forwarding.insert(index, to) {
            self.moved_to.remove(&previous);
        }
        self.moved_to.insert(to, index);
    }
}

#[derive(Debug, Default)]
enum MasterState {
    #[default]
    Idle,
    InGc(GcCycle),
    Failed(GcCycle),
}

/// Applies records in causal order and fires listeners at GC ends
pub struct MasterReconstructor {
    listeners: Vec<Box<dyn HeapListener>>,
    state: MasterState,
    cancel: CancellationToken,
    seen_sync_gc: bool,
    gc_count: u64,
}

impl MasterReconstructor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            listeners: Vec::new(),
            state: MasterState::Idle,
            cancel,
            seen_sync_gc: false,
            gc_count: 0,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn HeapListener>) {
        self.listeners.push(listener);
    }

    pub fn into_listeners(self) -> Vec<Box<dyn HeapListener>> {
        self.listeners
    }

    /// Number of completed GCs
    pub fn gc_count(&self) -> u64 {
        self.gc_count
    }

    /// Id of the GC in progress, if any
    pub fn current_gc(&self) -> Option<u32> {
        match &self.state {
            MasterState::Idle => None,
            MasterState::InGc(cycle) | MasterState::Failed(cycle) => Some(cycle.start.id),
        }
    }

    /// Apply one record produced by the decoder of `thread`
    ///
    /// **Public** - main entry point, called in shard ordinal order
    ///
    /// # Errors
    /// * `TraceError::Structural` - GC nesting or heap invariants broken
    /// * `TraceError::Reconciliation` - pointer counts wrong at GC end
    /// * `TraceError::Cancelled` - the token was cancelled
    pub fn apply(
        &mut self,
        heap: &mut HeapModel,
        pending: &PendingPointerTable,
        thread: u64,
        located: Located,
        info: &ParsingInfo,
    ) -> Result<(), TraceError> {
        if self.cancel.is_cancelled() {
            return Err(TraceError::Cancelled);
        }

        let Located { offset, record } = located;

        match record {
            Record::Gc(meta) => match meta.event {
                GcEventType::Start => self.start_gc(heap, &meta)?,
                GcEventType::End => self.end_gc(heap, pending, &meta, offset, info)?,
            },

            Record::GcInfo { region, id } => {
                debug!("GC #{} collects region {}", id, region);
                self.cycle_mut("GC_INFO")?.collected_regions.push(region);
            }

            Record::GcFailed { region } => {
                self.state = match std::mem::take(&mut self.state) {
                    MasterState::Idle => return Err(StructuralError::OutsideGc("GC_FAILED").into()),
                    MasterState::InGc(mut cycle) | MasterState::Failed(mut cycle) => {
                        warn!("GC #{} failed in region {}", cycle.start.id, region);
                        cycle.failed = true;
                        MasterState::Failed(cycle)
                    }
                };
            }

            Record::GcInterrupt { id, address } => debug!("GC #{} interrupted at 0x{:x}", id, address),
            Record::GcContinue { id, address } => debug!("GC #{} continues at 0x{:x}", id, address),
            Record::GcTag(tag) => heap.add_tag(tag),

            Record::SpaceCreate { index, start, size } => {
                heap.add_space(Space::new(index, start, size))?;
            }
            Record::SpaceAlloc { index, kind, mode } => heap.alloc_space(index, kind, mode)?,
            Record::SpaceRelease { index } => heap.release_space(index)?,
            Record::SpaceRedefine { index, start, size } => heap.redefine_space(index, start, size)?,
            Record::SpaceDestroy { first, count } => heap.destroy_spaces(first, count)?,

            Record::ThreadAlive { id, name } => heap.thread_alive(id, name),
            Record::ThreadDeath { id } => heap.thread_death(id),

            Record::LabOpened { kind, addr, capacity } => match &mut self.state {
                MasterState::Idle => heap.open_lab(thread, kind, addr, capacity)?,
                MasterState::InGc(cycle) | MasterState::Failed(cycle) => {
                    cycle.labs.push(Lab::new(thread, kind, addr, capacity));
                }
            },

            Record::LabsRetired(labs) => self.retire_labs(heap, &labs),

            Record::Allocation(allocation) => {
                heap.ensure_lab(thread, allocation.address, allocation.size)?;
                let born = heap.gc_info().id;
                heap.insert_object(HeapObject::new(
                    allocation.address,
                    allocation.type_id,
                    allocation.site,
                    allocation.event,
                    born,
                    allocation.size,
                    allocation.array_length,
                ))?;
            }

            Record::Move { from, to, .. } => {
                let cycle = self.cycle_mut("move")?;
                match cycle.resolve(heap, from) {
                    Some(index) => cycle.record_move(index, to),
                    None => heap.record_unresolved(ReferenceKind::Move, from),
                }
            }

            Record::KeepAlive { address } => {
                let cycle = self.cycle_mut("keep-alive")?;
                match cycle.resolve(heap, address) {
                    Some(index) => {
                        cycle.kept_alive.insert(index);
                    }
                    None => heap.record_unresolved(ReferenceKind::KeepAlive, address),
                }
            }

            Record::Sync {
                event,
                site,
                type_id,
                from,
                to,
                size,
                array_length,
            } => {
                let cycle = self.cycle_mut("sync")?;
                match cycle.resolve(heap, from) {
                    Some(index) => cycle.record_move(index, to),
                    None if cycle.first_sync => {
                        let born = heap.gc_info().id;
                        let index =
                            heap.insert_detached(HeapObject::new(to, type_id, site, event, born, size, array_length));
                        cycle.kept_alive.insert(index);
                        cycle.moved_to.insert(to, index);
                    }
                    None => heap.record_unresolved(ReferenceKind::Move, from),
                }
            }

            Record::Pointers(set) => self.cycle_mut("pointer")?.pointer_sets.push(set),

            Record::Roots(roots) => {
                let cycle = self.cycle_mut("root")?;
                for RootRecord { address, root } in roots {
                    let Some(address) = address else {
                        continue;
                    };
                    match cycle.resolve(heap, address) {
                        Some(index) => heap.add_root(index, root),
                        None => heap.record_unresolved(ReferenceKind::Root, address),
                    }
                }
            }
        }

        Ok(())
    }

    /// End of trace: warn about unfinished work and close every listener
    pub fn finish(&mut self, heap: &HeapModel, pending: &PendingPointerTable, info: &ParsingInfo) {
        if let Some(id) = self.current_gc() {
            warn!("Trace ended inside GC #{}; its work is not applied", id);
        }
        if !pending.is_empty() {
            warn!("{} pointer sets still pending at end of trace", pending.len());
        }

        for listener in &mut self.listeners {
            listener.close(heap, info);
        }
    }

    /// **Private** - the cycle in progress, or an error naming the record
    fn cycle_mut(&mut self, what: &'static str) -> Result<&mut GcCycle, StructuralError> {
        match &mut self.state {
            MasterState::InGc(cycle) | MasterState::Failed(cycle) => Ok(cycle),
            MasterState::Idle => Err(StructuralError::OutsideGc(what)),
        }
    }

    fn retire_labs(&mut self, heap: &mut HeapModel, labs: &[RetiredLab]) {
        for retired in labs {
            let deferred = match &mut self.state {
                MasterState::Idle => None,
                MasterState::InGc(cycle) | MasterState::Failed(cycle) => {
                    cycle.labs.iter_mut().find(|lab| lab.addr == retired.addr)
                }
            };
            match deferred {
                Some(lab) => lab.state = LabState::Retired,
                None => heap.retire_lab(retired.addr),
            }
        }
    }

    fn start_gc(&mut self, heap: &mut HeapModel, meta: &GcMeta) -> Result<(), StructuralError> {
        if let Some(current) = self.current_gc() {
            return Err(StructuralError::NestedGcStart { id: meta.id, current });
        }

        let start = gc_info(heap, meta, meta.failed);
        debug!("GC #{} start: {:?} ({})", start.id, start.gc_type, start.cause.name);

        heap.set_gc_info(start.clone());
        heap.clear_roots();

        let first_sync = meta.gc_type.is_sync() && !self.seen_sync_gc;
        let cycle = GcCycle::new(start, first_sync);
        self.state = if cycle.failed {
            MasterState::Failed(cycle)
        } else {
            MasterState::InGc(cycle)
        };
        Ok(())
    }

    /// Finish a GC: drain pointers, drop the dead, rebuild addresses and labs
    fn end_gc(
        &mut self,
        heap: &mut HeapModel,
        pending: &PendingPointerTable,
        meta: &GcMeta,
        position: u64,
        info: &ParsingInfo,
    ) -> Result<(), TraceError> {
        let mut cycle = match std::mem::take(&mut self.state) {
            MasterState::Idle => return Err(StructuralError::GcEndWithoutStart { id: meta.id }.into()),
            MasterState::InGc(cycle) | MasterState::Failed(cycle) => cycle,
        };

        if cycle.start.gc_type != meta.gc_type {
            return Err(StructuralError::GcTypeMismatch {
                id: meta.id,
                start: cycle.start.gc_type,
                end: meta.gc_type,
            }
            .into());
        }

        let failed = cycle.failed || meta.failed;
        let end = gc_info(heap, meta, failed);
        let in_window = info.in_window(position);

        for listener in &mut self.listeners {
            listener.phase_changing(heap, &cycle.start, &end, failed, position, info, in_window);
        }

        for (to, set) in pending.drain() {
            if let Some(capacity) = set.capacity {
                check_count(to, capacity, set.filled())?;
            }
            cycle.pointer_sets.push(set.into_pointer_set(to));
        }

        let collected = collected_spaces(heap, &cycle);
        let in_collected = |heap: &HeapModel, addr: u64| {
            heap.space_containing(addr)
                .is_some_and(|space| collected.contains(&space.index))
        };

        let view: &HeapModel = heap;
        let (survivors, dead): (Vec<_>, Vec<_>) = view
            .objects()
            .map(|(index, object)| {
                let survives = failed
                    || cycle.forwarding.contains_key(&index)
                    || cycle.kept_alive.contains(&index)
                    || !in_collected(view, object.address);
                (index, survives)
            })
            .partition(|(_, survives)| *survives);
        let survivors: Vec<ObjectIndex> = survivors.into_iter().map(|(index, _)| index).collect();

        let old_map = heap.rebuild_addresses(&survivors, &cycle.forwarding)?;

        debug!(
            "GC #{}: {} survivors, {} dead, {} moved",
            end.id,
            survivors.len(),
            dead.len(),
            cycle.forwarding.len()
        );
        for (index, _) in dead {
            heap.remove_object(index);
        }

        place_labs(heap, &mut cycle, &collected)?;
        let view: &HeapModel = heap;
        let relabel: Vec<(u64, u64)> = view
            .objects()
            .filter(|(index, object)| cycle.forwarding.contains_key(index) || in_collected(view, object.address))
            .map(|(_, object)| (object.address, object.size))
            .collect();
        for (addr, size) in relabel {
            heap.ensure_lab(0, addr, size)?;
        }

        let resolved = resolve_pointer_sets(heap, &old_map, &cycle);
        for (owner, _, pointers) in &resolved {
            heap.set_pointers(*owner, pointers.clone());
        }
        for (owner, addr, pointers) in &resolved {
            let capacity = heap.object(*owner).map(|object| heap.capacity_of(object));
            if let Some(PointerCapacity::Exact(capacity)) = capacity {
                check_count(*addr, capacity, pointers.len())?;
            }
        }

        heap.drop_empty_labs(&collected);
        heap.set_gc_info(end.clone());
        heap.validate()?;

        if cycle.start.gc_type.is_sync() {
            self.seen_sync_gc = true;
        }
        self.gc_count += 1;
        info!(
            "GC #{} ({:?}) done: {} live objects{}",
            end.id,
            end.gc_type,
            heap.live_objects(),
            if failed { ", failed" } else { "" }
        );

        for listener in &mut self.listeners {
            listener.phase_changed(heap, &cycle.start, &end, failed, position, info, in_window);
        }
        Ok(())
    }
}

/// **Private** - labs opened during the GC
///
/// Collected spaces start from a clean slate; elsewhere the usual overlap
/// rules apply.
fn place_labs(heap: &mut HeapModel, cycle: &mut GcCycle, collected: &[u32]) -> Result<(), StructuralError> {
    heap.clear_labs(collected);

    for lab in cycle.labs.drain(..) {
        let in_collected = heap
            .space_containing(lab.addr)
            .is_some_and(|space| collected.contains(&space.index));
        if in_collected {
            heap.place_lab(lab)?;
        } else {
            heap.open_lab(lab.thread, lab.kind, lab.addr, lab.capacity)?;
            if lab.state == LabState::Retired {
                heap.retire_lab(lab.addr);
            }
        }
    }
    Ok(())
}

/// **Private** - GC metadata with the cause name filled in
fn gc_info(heap: &HeapModel, meta: &GcMeta, failed: bool) -> GcInfo {
    GcInfo {
        event: meta.event,
        gc_type: meta.gc_type,
        cause: GcCause {
            id: meta.cause,
            name: heap.symbols().cause_name(meta.cause).to_string(),
        },
        id: meta.id,
        time: meta.time,
        concurrent: meta.concurrent,
        failed,
    }
}

/// Spaces whose unmoved objects die: young spaces for minor GCs, all spaces
/// for major ones, plus regions named by GC_INFO
fn collected_spaces(heap: &HeapModel, cycle: &GcCycle) -> Vec<u32> {
    let major = cycle.start.gc_type.is_major();
    heap.spaces()
        .filter(|space| {
            major || space.kind.is_some_and(SpaceKind::is_young) || cycle.collected_regions.contains(&space.index)
        })
        .map(|space| space.index)
        .collect()
}

/// Whether a set's addresses are pre-move addresses
fn is_premove(event: EventType, gc_type: GcType) -> bool {
    match event {
        EventType::GcPtrUpdatePremove => true,
        EventType::GcPtrUpdatePostmove => false,
        _ => !gc_type.is_major(),
    }
}

fn check_count(addr: u64, capacity: usize, count: usize) -> Result<(), ReconciliationViolation> {
    if count < capacity {
        Err(ReconciliationViolation::Incomplete {
            addr,
            filled: count,
            capacity,
        })
    } else if count > capacity {
        Err(ReconciliationViolation::Overflow { addr, capacity, count })
    } else {
        Ok(())
    }
}

type ResolvedSet = (ObjectIndex, u64, Vec<Option<ObjectIndex>>);

/// **Private** - turn stored sets into index arrays
///
/// Unknown owners and targets are recorded as diagnostics; a target that
/// cannot be resolved becomes a NULL slot.
fn resolve_pointer_sets(heap: &mut HeapModel, old_map: &BTreeMap<u64, ObjectIndex>, cycle: &GcCycle) -> Vec<ResolvedSet> {
    let gc_type = cycle.start.gc_type;
    let mut resolved = Vec::with_capacity(cycle.pointer_sets.len());

    for set in &cycle.pointer_sets {
        let premove = is_premove(set.event, gc_type);
        let live = |heap: &HeapModel, index: ObjectIndex| heap.object(index).is_some();
        let in_old = |heap: &HeapModel, addr: u64| old_map.get(&addr).copied().filter(|i| live(heap, *i));

        let owner = if set.event == EventType::GcPtrUpdatePremove {
            in_old(heap, set.to)
        } else {
            heap.object_at(set.to)
                .map(|(index, _)| index)
                .or_else(|| set.from.and_then(|from| in_old(heap, from)))
        };
        let Some(owner) = owner else {
            heap.record_unresolved(ReferenceKind::PointerOwner, set.to);
            continue;
        };

        let mut targets = Vec::with_capacity(set.pointers.len());
        for pointer in &set.pointers {
            let target = match pointer {
                None => None,
                Some(addr) => {
                    let found = if premove {
                        in_old(heap, *addr)
                    } else {
                        heap.object_at(*addr).map(|(index, _)| index)
                    };
                    if found.is_none() {
                        heap.record_unresolved(ReferenceKind::Pointer, *addr);
                    }
                    found
                }
            };
            targets.push(target);
        }
        resolved.push((owner, set.to, targets));
    }

    resolved
}
