//! Per-thread staging state.
//!
//! One `StagingThread` exists per VM thread seen in the trace. It is owned
//! by exactly one decoder at a time: the pipeline moves it into the job that
//! decodes the thread's shard and gets it back with the batch.

use super::accumulation::{Finished, PointerAccumulation};
use super::pending::{FragmentOrder, PendingPointerTable};
use crate::heap::{LabKind, SpaceKind};
use crate::parser::{EventType, PointerSet, Record, RetiredLab};
use crate::symbols::PointerCapacity;
use crate::utils::config::LAST_ALLOCATIONS;
use crate::utils::error::{DecodeErrorKind, ReconciliationViolation};
use log::trace;
use std::collections::{HashMap, VecDeque};

/// A lab the thread is currently bumping into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLab {
    pub kind: LabKind,
    pub space: SpaceKind,
    pub addr: u64,
    pub capacity: u64,
    pub top: u64,
}

impl ThreadLab {
    pub fn new(kind: LabKind, space: SpaceKind, addr: u64, capacity: u64) -> Self {
        Self {
            kind,
            space,
            addr,
            capacity,
            top: addr,
        }
    }

    pub fn used(&self) -> u64 {
        self.top - self.addr
    }

    pub fn free(&self) -> u64 {
        self.capacity - self.used()
    }

    fn retire(self) -> RetiredLab {
        RetiredLab {
            kind: self.kind,
            space: self.space,
            addr: self.addr,
            capacity: self.capacity,
            used: self.used(),
        }
    }
}

/// Decoder-side state of one VM thread
#[derive(Debug, Clone)]
pub struct StagingThread {
    id: u64,
    current_labs: HashMap<SpaceKind, ThreadLab>,
    retired_labs: Vec<RetiredLab>,
    last_allocations: VecDeque<u32>,
    accumulation: PointerAccumulation,
}

impl StagingThread {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            current_labs: HashMap::new(),
            retired_labs: Vec::new(),
            last_allocations: VecDeque::with_capacity(LAST_ALLOCATIONS),
            accumulation: PointerAccumulation::Idle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn current_lab(&self, space: SpaceKind) -> Option<&ThreadLab> {
        self.current_labs.get(&space)
    }

    pub fn retired_labs(&self) -> &[RetiredLab] {
        &self.retired_labs
    }

    pub fn accumulation(&self) -> &PointerAccumulation {
        &self.accumulation
    }

    /// Make `lab` the current lab for its space kind, retiring the previous one
    pub fn open_lab(&mut self, lab: ThreadLab) {
        trace!(
            "Thread 0x{:x} opens {:?} at 0x{:x} ({} bytes)",
            self.id,
            lab.kind,
            lab.addr,
            lab.capacity
        );
        if let Some(previous) = self.current_labs.insert(lab.space, lab) {
            self.retired_labs.push(previous.retire());
        }
    }

    /// Reserve `size` bytes in the current lab of `space`
    ///
    /// **Public** - address resolution for fast allocations and fast moves
    pub fn bump(&mut self, space: SpaceKind, size: u64) -> Result<u64, DecodeErrorKind> {
        let name = lab_name(space);
        let lab = self
            .current_labs
            .get_mut(&space)
            .ok_or(DecodeErrorKind::NoOpenLab(name, size))?;

        if lab.free() < size {
            return Err(DecodeErrorKind::NoOpenLab(name, size));
        }

        let addr = lab.top;
        lab.top += size;
        Ok(addr)
    }

    /// Remember the site of an allocation
    pub fn push_site(&mut self, site: u32) {
        if self.last_allocations.len() == LAST_ALLOCATIONS {
            self.last_allocations.pop_front();
        }
        self.last_allocations.push_back(site);
    }

    /// Most recent allocation sites, oldest first
    pub fn last_allocations(&self) -> impl Iterator<Item = &u32> {
        self.last_allocations.iter()
    }

    pub fn start_pointer_accumulation(
        &mut self,
        event: EventType,
        from: Option<u64>,
        to: u64,
        capacity: PointerCapacity,
        pointers: Vec<Option<u64>>,
    ) -> Result<(), ReconciliationViolation> {
        self.accumulation.start(event, from, to, capacity, pointers)
    }

    pub fn append_pointers(&mut self, to: u64, pointers: Vec<Option<u64>>) -> Result<(), DecodeErrorKind> {
        self.accumulation.append(to, pointers)
    }

    /// Finish the accumulation in progress, if any
    ///
    /// **Public** - returns the complete set, or parks a partial buffer in
    /// `pending` (which may itself complete it)
    pub fn finish_pointer_accumulation(
        &mut self,
        pending: &PendingPointerTable,
    ) -> Result<Option<PointerSet>, ReconciliationViolation> {
        match self.accumulation.finish() {
            Finished::Nothing => Ok(None),
            Finished::Complete(set) => Ok(Some(set)),
            Finished::Partial(acc) => {
                let capacity = match acc.capacity {
                    PointerCapacity::Exact(n) => Some(n),
                    PointerCapacity::Open | PointerCapacity::Deferred => None,
                };
                pending.insert_head(acc.to, acc.event, acc.from, capacity, acc.buffer)
            }
        }
    }

    /// Add a multithreaded pointer fragment to the shared table
    pub fn add_multithreaded_pointers(
        &self,
        pending: &PendingPointerTable,
        to: u64,
        order: FragmentOrder,
        pointers: Vec<Option<u64>>,
    ) -> Result<Option<PointerSet>, ReconciliationViolation> {
        pending.add_fragment(to, order, pointers)
    }

    /// Finish pending pointers and retire every lab
    ///
    /// **Public** - run before every fully synchronized chunk and at the end
    /// of the trace
    pub fn flush(&mut self, pending: &PendingPointerTable) -> Result<Vec<Record>, ReconciliationViolation> {
        let mut records = Vec::new();

        if let Some(set) = self.finish_pointer_accumulation(pending)? {
            records.push(Record::Pointers(set));
        }

        let mut retired = std::mem::take(&mut self.retired_labs);
        let mut current: Vec<_> = self.current_labs.drain().map(|(_, lab)| lab).collect();
        current.sort_by_key(|lab| lab.addr);
        retired.extend(current.into_iter().map(ThreadLab::retire));

        if !retired.is_empty() {
            records.push(Record::LabsRetired(retired));
        }

        Ok(records)
    }
}

/// **Private** - lab name used in error messages
fn lab_name(space: SpaceKind) -> &'static str {
    match space {
        SpaceKind::Eden => "TLAB",
        SpaceKind::Survivor => "survivor PLAB",
        SpaceKind::Old => "old PLAB",
    }
}
