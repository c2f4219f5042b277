//! Shared table of pointer sets still waiting for fragments.
//!
//! An object's pointers can arrive as a head (the tail of one thread's
//! accumulation) plus fragments emitted by other GC threads in any order.
//! Fragments are keyed by their position in the trace so that the merged
//! pointer list does not depend on which worker decoded what first.

use crate::parser::{EventType, PointerSet};
use crate::utils::error::ReconciliationViolation;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Position of a fragment in the trace, independent of worker scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentOrder {
    pub window: u64,
    pub shard: u32,
    pub sequence: u64,
}

/// Everything known so far about one object's pointers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingPointerSet {
    pub event: Option<EventType>,
    pub from: Option<u64>,
    /// Declared number of pointer slots, when the owner's type was known
    pub capacity: Option<usize>,
    pub head: Option<Vec<Option<u64>>>,
    pub fragments: Vec<(FragmentOrder, Vec<Option<u64>>)>,
}

impl PendingPointerSet {
    /// Number of pointers collected so far
    pub fn filled(&self) -> usize {
        self.head.as_ref().map_or(0, Vec::len)
            + self.fragments.iter().map(|(_, p)| p.len()).sum::<usize>()
    }

    /// Merge into a complete set: head first, then fragments in trace order
    pub fn into_pointer_set(mut self, to: u64) -> PointerSet {
        self.fragments.sort_by_key(|(order, _)| *order);

        let mut pointers = self.head.unwrap_or_default();
        for (_, fragment) in self.fragments {
            pointers.extend(fragment);
        }

        PointerSet {
            event: self.event.unwrap_or(EventType::GcPtrMultithreaded),
            from: self.from,
            to,
            pointers,
        }
    }

    /// **Private** - complete once a known capacity is filled
    fn check(&self, to: u64) -> Result<bool, ReconciliationViolation> {
        match self.capacity {
            Some(capacity) => {
                let count = self.filled();
                if count > capacity {
                    Err(ReconciliationViolation::Overflow {
                        addr: to,
                        capacity,
                        count,
                    })
                } else {
                    Ok(count == capacity)
                }
            }
            None => Ok(false),
        }
    }
}

/// Pointer sets keyed by destination address
#[derive(Debug, Default)]
pub struct PendingPointerTable {
    sets: Mutex<HashMap<u64, PendingPointerSet>>,
}

impl PendingPointerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the unfinished accumulation of the thread that owns `to`
    ///
    /// **Public** - returns the merged set when fragments already filled
    /// the declared capacity
    ///
    /// # Errors
    /// * `DuplicatePending` - another thread already parked a head for `to`
    /// * `Overflow` - head plus fragments exceed the capacity
    pub fn insert_head(
        &self,
        to: u64,
        event: EventType,
        from: Option<u64>,
        capacity: Option<usize>,
        pointers: Vec<Option<u64>>,
    ) -> Result<Option<PointerSet>, ReconciliationViolation> {
        let mut sets = self.sets.lock();
        let set = sets.entry(to).or_default();

        if set.head.is_some() {
            return Err(ReconciliationViolation::DuplicatePending { addr: to });
        }

        set.event = Some(event);
        set.from = from;
        set.capacity = capacity;
        set.head = Some(pointers);

        Self::complete_if_full(&mut sets, to)
    }

    /// Add pointers reported by a multithreaded pointer event
    pub fn add_fragment(
        &self,
        to: u64,
        order: FragmentOrder,
        pointers: Vec<Option<u64>>,
    ) -> Result<Option<PointerSet>, ReconciliationViolation> {
        let mut sets = self.sets.lock();
        sets.entry(to).or_default().fragments.push((order, pointers));

        Self::complete_if_full(&mut sets, to)
    }

    /// Remove and return every set, ordered by address
    ///
    /// **Public** - called by the master once per GC end
    pub fn drain(&self) -> Vec<(u64, PendingPointerSet)> {
        let mut drained: Vec<_> = self.sets.lock().drain().collect();
        drained.sort_by_key(|(addr, _)| *addr);
        if !drained.is_empty() {
            debug!("Draining {} pending pointer sets", drained.len());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// **Private** - internal helper, runs under the lock
    fn complete_if_full(
        sets: &mut HashMap<u64, PendingPointerSet>,
        to: u64,
    ) -> Result<Option<PointerSet>, ReconciliationViolation> {
        let full = match sets.get(&to) {
            Some(set) => set.check(to)?,
            None => false,
        };

        Ok(if full {
            sets.remove(&to).map(|set| set.into_pointer_set(to))
        } else {
            None
        })
    }
}
