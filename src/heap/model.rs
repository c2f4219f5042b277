//! The canonical heap model.
//!
//! Objects live in an arena and are identified by `ObjectIndex`. The
//! address map is a separate lookup that is only rebuilt when a GC ends, so
//! during a collection it keeps answering with pre-GC addresses.

use super::gc::GcInfo;
use super::object::{HeapObject, ObjectIndex};
use super::roots::{insert_sorted, RootPtr};
use super::space::{Lab, LabKind, LabState, Space, SpaceKind, SpaceMode};
use crate::symbols::{PointerCapacity, Symbols};
use crate::utils::config::MAX_SPACES;
use crate::utils::error::{ReferenceKind, StructuralError, UnresolvedReference};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A VM thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
    pub alive: bool,
}

/// Spaces, objects, roots and threads of one heap
#[derive(Debug, Clone)]
pub struct HeapModel {
    pub(crate) symbols: Arc<Symbols>,
    pub(crate) objects: Vec<Option<HeapObject>>,
    pub(crate) addresses: BTreeMap<u64, ObjectIndex>,
    pub(crate) spaces: Vec<Option<Space>>,
    pub(crate) space_starts: BTreeMap<u64, u32>,
    pub(crate) roots: BTreeMap<ObjectIndex, Vec<RootPtr>>,
    pub(crate) threads: BTreeMap<u64, ThreadInfo>,
    pub(crate) gc_info: GcInfo,
    pub(crate) tags: Vec<String>,
    pub(crate) diagnostics: Vec<UnresolvedReference>,
    pub(crate) live: usize,
}

impl HeapModel {
    /// Empty heap before the first GC
    pub fn new(symbols: Arc<Symbols>) -> Self {
        Self {
            symbols,
            objects: Vec::new(),
            addresses: BTreeMap::new(),
            spaces: Vec::new(),
            space_starts: BTreeMap::new(),
            roots: BTreeMap::new(),
            threads: BTreeMap::new(),
            gc_info: GcInfo::initial(),
            tags: Vec::new(),
            diagnostics: Vec::new(),
            live: 0,
        }
    }

    pub fn symbols(&self) -> &Arc<Symbols> {
        &self.symbols
    }

    pub fn gc_info(&self) -> &GcInfo {
        &self.gc_info
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// References that could not be resolved to an object
    pub fn diagnostics(&self) -> &[UnresolvedReference] {
        &self.diagnostics
    }

    pub fn live_objects(&self) -> usize {
        self.live
    }

    /// Arena length; the next allocation gets this index
    pub fn next_index(&self) -> u32 {
        self.objects.len() as u32
    }

    pub fn object(&self, index: ObjectIndex) -> Option<&HeapObject> {
        self.objects.get(index.as_usize()).and_then(Option::as_ref)
    }

    /// Live objects in index order
    pub fn objects(&self) -> impl Iterator<Item = (ObjectIndex, &HeapObject)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().map(|o| (ObjectIndex(i as u32), o)))
    }

    /// The object registered at `addr` in the address map
    pub fn object_at(&self, addr: u64) -> Option<(ObjectIndex, &HeapObject)> {
        let index = *self.addresses.get(&addr)?;
        self.object(index).map(|o| (index, o))
    }

    /// Objects whose address lies in `[start, end)`, by address
    pub fn objects_in(&self, start: u64, end: u64) -> impl Iterator<Item = (u64, ObjectIndex)> + '_ {
        self.addresses
            .range(start..end.max(start))
            .map(|(addr, index)| (*addr, *index))
    }

    pub fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.spaces.iter().flatten()
    }

    pub fn space(&self, index: u32) -> Option<&Space> {
        self.spaces.get(index as usize).and_then(Option::as_ref)
    }

    /// Number of space slots, including removed ones
    pub fn space_slots(&self) -> usize {
        self.spaces.len()
    }

    pub fn space_containing(&self, addr: u64) -> Option<&Space> {
        let (_, index) = self.space_starts.range(..=addr).next_back()?;
        self.space(*index).filter(|space| space.contains(addr))
    }

    /// Kind of the space containing `addr`, if the space is allocated
    pub fn space_kind_at(&self, addr: u64) -> Option<SpaceKind> {
        self.space_containing(addr).and_then(|space| space.kind)
    }

    pub fn roots(&self) -> impl Iterator<Item = (ObjectIndex, &[RootPtr])> {
        self.roots.iter().map(|(index, roots)| (*index, roots.as_slice()))
    }

    pub fn roots_of(&self, index: ObjectIndex) -> &[RootPtr] {
        self.roots.get(&index).map_or(&[], Vec::as_slice)
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadInfo> {
        self.threads.values()
    }

    /// Pointer capacity of a live object, from its type
    pub fn capacity_of(&self, object: &HeapObject) -> PointerCapacity {
        self.symbols
            .type_by_id(object.type_id)
            .map_or(PointerCapacity::Deferred, |info| info.capacity(object.array_length))
    }

    // ------------------------------------------------------------------
    // Mutation, driven by the master reconstructor and the snapshot reader
    // ------------------------------------------------------------------

    pub(crate) fn set_gc_info(&mut self, info: GcInfo) {
        self.gc_info = info;
    }

    pub(crate) fn add_tag(&mut self, tag: String) {
        self.tags.push(tag);
    }

    pub(crate) fn record_unresolved(&mut self, kind: ReferenceKind, address: u64) {
        let reference = UnresolvedReference {
            kind,
            address,
            gc_id: self.gc_info.id,
        };
        warn!("{}", reference);
        self.diagnostics.push(reference);
    }

    pub(crate) fn thread_alive(&mut self, id: u64, name: String) {
        self.threads.insert(id, ThreadInfo { id, name, alive: true });
    }

    pub(crate) fn thread_death(&mut self, id: u64) {
        match self.threads.get_mut(&id) {
            Some(thread) => thread.alive = false,
            None => {
                self.threads.insert(
                    id,
                    ThreadInfo {
                        id,
                        name: String::new(),
                        alive: false,
                    },
                );
            }
        }
    }

    /// Create or replace the space at `space.index`
    ///
    /// # Errors
    /// - `SpaceIndexOutOfRange` if the index is at or above `MAX_SPACES`
    pub(crate) fn add_space(&mut self, space: Space) -> Result<(), StructuralError> {
        if space.index >= MAX_SPACES {
            return Err(StructuralError::SpaceIndexOutOfRange {
                index: space.index,
                limit: MAX_SPACES,
            });
        }
        let slot = space.index as usize;
        if self.spaces.len() <= slot {
            self.spaces.resize(slot + 1, None);
        }
        if let Some(old) = self.spaces[slot].take() {
            warn!("Space {} created twice, replacing it", old.index);
            self.space_starts.remove(&old.start);
        }
        self.space_starts.insert(space.start, space.index);
        self.spaces[slot] = Some(space);
        Ok(())
    }

    fn space_mut(&mut self, index: u32) -> Result<&mut Space, StructuralError> {
        self.spaces
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .ok_or(StructuralError::UnknownSpace(index))
    }

    fn space_containing_mut(&mut self, addr: u64) -> Option<&mut Space> {
        let (_, index) = self.space_starts.range(..=addr).next_back()?;
        let index = *index;
        self.spaces
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .filter(|space| space.contains(addr))
    }

    pub(crate) fn alloc_space(&mut self, index: u32, kind: SpaceKind, mode: SpaceMode) -> Result<(), StructuralError> {
        let space = self.space_mut(index)?;
        space.kind = Some(kind);
        space.mode = Some(mode);
        Ok(())
    }

    /// Reset a space to unallocated, dropping its objects and labs
    pub(crate) fn release_space(&mut self, index: u32) -> Result<(), StructuralError> {
        let (start, end) = {
            let space = self.space_mut(index)?;
            space.kind = None;
            space.mode = None;
            space.clear_labs();
            (space.start, space.end())
        };
        self.drop_range(start, end);
        Ok(())
    }

    pub(crate) fn redefine_space(&mut self, index: u32, start: u64, length: u64) -> Result<(), StructuralError> {
        let old_start = {
            let space = self.space_mut(index)?;
            let old = space.start;
            space.redefine(start, length);
            old
        };
        self.space_starts.remove(&old_start);
        self.space_starts.insert(start, index);
        Ok(())
    }

    /// Remove `count` spaces starting at `first`, dropping their objects
    pub(crate) fn destroy_spaces(&mut self, first: u32, count: u64) -> Result<(), StructuralError> {
        for offset in 0..count {
            let index = u32::try_from(first as u64 + offset).map_err(|_| StructuralError::UnknownSpace(first))?;
            let space = self
                .spaces
                .get_mut(index as usize)
                .and_then(Option::take)
                .ok_or(StructuralError::UnknownSpace(index))?;
            self.space_starts.remove(&space.start);
            self.drop_range(space.start, space.end());
        }
        Ok(())
    }

    /// **Private** - drop every object in `[start, end)`
    fn drop_range(&mut self, start: u64, end: u64) {
        let doomed: Vec<ObjectIndex> = self.objects_in(start, end).map(|(_, index)| index).collect();
        if !doomed.is_empty() {
            debug!("Dropping {} objects in 0x{:x}..0x{:x}", doomed.len(), start, end);
        }
        for index in doomed {
            self.remove_object(index);
        }
    }

    /// Add a new object and register its address
    pub(crate) fn insert_object(&mut self, object: HeapObject) -> Result<ObjectIndex, StructuralError> {
        let index = ObjectIndex(self.next_index());
        if let Some(existing) = self.addresses.get(&object.address) {
            return Err(StructuralError::AddressCollision {
                addr: object.address,
                first: *existing,
                second: index,
            });
        }
        self.addresses.insert(object.address, index);
        self.objects.push(Some(object));
        self.live += 1;
        Ok(index)
    }

    /// Add an object to the arena only; its address is registered by the next rebuild
    pub(crate) fn insert_detached(&mut self, object: HeapObject) -> ObjectIndex {
        let index = ObjectIndex(self.next_index());
        self.objects.push(Some(object));
        self.live += 1;
        index
    }

    /// Remove an object and unlink its edges
    ///
    /// Slots of other objects that pointed at it become NULL and are
    /// recorded as dangling references.
    pub(crate) fn remove_object(&mut self, index: ObjectIndex) {
        let Some(object) = self.objects.get_mut(index.as_usize()).and_then(Option::take) else {
            return;
        };
        self.live -= 1;

        if self.addresses.get(&object.address) == Some(&index) {
            self.addresses.remove(&object.address);
        }
        self.roots.remove(&index);

        for target in object.pointers_to.iter().flatten().flatten() {
            if let Some(Some(target)) = self.objects.get_mut(target.as_usize()) {
                target.remove_incoming(index);
            }
        }

        for source in object.pointed_from {
            if source == index {
                continue;
            }
            let Some(Some(owner)) = self.objects.get_mut(source.as_usize()) else {
                continue;
            };
            let mut nulled = false;
            for slot in owner.pointers_to.iter_mut().flatten() {
                if *slot == Some(index) {
                    *slot = None;
                    nulled = true;
                }
            }
            if nulled {
                self.record_unresolved(ReferenceKind::Dangling, object.address);
            }
        }
    }

    /// Replace an object's outgoing pointers, keeping incoming sets symmetric
    pub(crate) fn set_pointers(&mut self, owner: ObjectIndex, pointers: Vec<Option<ObjectIndex>>) {
        let old = match self.objects.get_mut(owner.as_usize()) {
            Some(Some(object)) => object.pointers_to.take(),
            _ => return,
        };

        for target in old.iter().flatten().flatten() {
            if let Some(Some(target)) = self.objects.get_mut(target.as_usize()) {
                target.remove_incoming(owner);
            }
        }
        for target in pointers.iter().flatten() {
            if let Some(Some(target)) = self.objects.get_mut(target.as_usize()) {
                target.add_incoming(owner);
            }
        }

        if let Some(Some(object)) = self.objects.get_mut(owner.as_usize()) {
            object.pointers_to = Some(pointers);
        }
    }

    pub(crate) fn add_root(&mut self, index: ObjectIndex, root: RootPtr) {
        insert_sorted(self.roots.entry(index).or_default(), root);
    }

    pub(crate) fn clear_roots(&mut self) {
        self.roots.clear();
    }

    /// Attach an object to the lab containing it, creating a virtual lab if needed
    pub(crate) fn ensure_lab(&mut self, thread: u64, addr: u64, size: u64) -> Result<(), StructuralError> {
        let space = self
            .space_containing_mut(addr)
            .ok_or(StructuralError::NoSpaceForAddress(addr))?;

        match space.lab_containing_mut(addr) {
            Some(lab) => {
                if lab.state == LabState::Open {
                    lab.state = LabState::Filling;
                }
            }
            None => {
                let mut lab = Lab::new(thread, LabKind::Virtual, addr, size.max(1));
                lab.state = LabState::Filling;
                space.insert_lab(lab);
            }
        }
        Ok(())
    }

    /// Insert a lab, discarding empty labs it overlaps
    pub(crate) fn open_lab(&mut self, thread: u64, kind: LabKind, addr: u64, capacity: u64) -> Result<(), StructuralError> {
        let overlapping = self
            .space_containing(addr)
            .ok_or(StructuralError::NoSpaceForAddress(addr))?
            .overlapping_labs(addr, capacity);

        for start in &overlapping {
            let end = self
                .space_containing(addr)
                .and_then(|space| space.labs().find(|lab| lab.addr == *start))
                .map_or(*start, Lab::end);
            if self.objects_in(*start, end).next().is_some() {
                return Err(StructuralError::OverlappingLab { addr });
            }
        }

        let space = self
            .space_containing_mut(addr)
            .ok_or(StructuralError::NoSpaceForAddress(addr))?;
        for start in overlapping {
            space.remove_lab(start);
        }
        space.insert_lab(Lab::new(thread, kind, addr, capacity));
        Ok(())
    }

    pub(crate) fn retire_lab(&mut self, addr: u64) {
        match self.space_containing_mut(addr).and_then(|space| space.lab_at_mut(addr)) {
            Some(lab) => lab.state = LabState::Retired,
            None => debug!("Retired lab at 0x{:x} is not known", addr),
        }
    }

    /// Forget every lab of the given spaces
    ///
    /// Collected spaces get their labs rebuilt from the survivors at GC end.
    pub(crate) fn clear_labs(&mut self, spaces: &[u32]) {
        for &index in spaces {
            if let Some(Some(space)) = self.spaces.get_mut(index as usize) {
                space.clear_labs();
            }
        }
    }

    /// Insert a lab as is, without the overlap check of `open_lab`
    pub(crate) fn place_lab(&mut self, lab: Lab) -> Result<(), StructuralError> {
        let space = self
            .space_containing_mut(lab.addr)
            .ok_or(StructuralError::NoSpaceForAddress(lab.addr))?;
        space.insert_lab(lab);
        Ok(())
    }

    /// Drop labs without objects in the given spaces
    pub(crate) fn drop_empty_labs(&mut self, spaces: &[u32]) {
        for &index in spaces {
            let empty: Vec<u64> = match self.space(index) {
                Some(space) => space
                    .labs()
                    .filter(|lab| self.objects_in(lab.addr, lab.end()).next().is_none())
                    .map(|lab| lab.addr)
                    .collect(),
                None => continue,
            };
            if let Some(Some(space)) = self.spaces.get_mut(index as usize) {
                for addr in empty {
                    space.remove_lab(addr);
                }
            }
        }
    }

    /// Rebuild the address map from the survivors
    ///
    /// **Public** - `forwarding` gives the new address of moved objects.
    /// Returns the previous map so premove addresses can still be resolved.
    pub(crate) fn rebuild_addresses(
        &mut self,
        survivors: &[ObjectIndex],
        forwarding: &HashMap<ObjectIndex, u64>,
    ) -> Result<BTreeMap<u64, ObjectIndex>, StructuralError> {
        let mut rebuilt = BTreeMap::new();

        for &index in survivors {
            let Some(Some(object)) = self.objects.get_mut(index.as_usize()) else {
                continue;
            };
            if let Some(&to) = forwarding.get(&index) {
                object.address = to;
            }
            if let Some(first) = rebuilt.insert(object.address, index) {
                return Err(StructuralError::AddressCollision {
                    addr: object.address,
                    first,
                    second: index,
                });
            }
        }

        Ok(std::mem::replace(&mut self.addresses, rebuilt))
    }

    /// Check every structural invariant of the model
    ///
    /// **Public** - run at every GC end and after reading a snapshot
    pub fn validate(&self) -> Result<(), StructuralError> {
        let fail = |msg: String| -> Result<(), StructuralError> { Err(StructuralError::Validation(msg)) };

        let mut counted = 0;
        for (index, object) in self.objects() {
            counted += 1;

            if self.addresses.get(&object.address) != Some(&index) {
                return fail(format!("object {} at 0x{:x} is not in the address map", index, object.address));
            }

            match self.space_containing(object.address) {
                None => return fail(format!("object {} at 0x{:x} is outside every space", index, object.address)),
                Some(space) if space.lab_containing(object.address).is_none() => {
                    return fail(format!("object {} at 0x{:x} is in no lab of {}", index, object.address, space.name))
                }
                Some(_) => {}
            }

            if let Some(pointers) = object.pointers_to() {
                if let PointerCapacity::Exact(capacity) = self.capacity_of(object) {
                    if pointers.len() != capacity {
                        return fail(format!(
                            "object {} has {} pointers, its type declares {}",
                            index,
                            pointers.len(),
                            capacity
                        ));
                    }
                }

                for target in pointers.iter().flatten() {
                    match self.object(*target) {
                        Some(t) if t.pointed_from().binary_search(&index).is_ok() => {}
                        Some(_) => return fail(format!("{} -> {} has no back edge", index, target)),
                        None => return fail(format!("{} points to removed object {}", index, target)),
                    }
                }
            }

            for source in object.pointed_from() {
                let linked = self
                    .object(*source)
                    .and_then(HeapObject::pointers_to)
                    .is_some_and(|p| p.contains(&Some(index)));
                if !linked {
                    return fail(format!("{} lists {} as incoming without an edge", index, source));
                }
            }
        }

        if counted != self.live || self.addresses.len() != self.live {
            return fail(format!(
                "{} live objects, {} counted, {} addresses",
                self.live,
                counted,
                self.addresses.len()
            ));
        }

        for index in self.roots.keys() {
            if self.object(*index).is_none() {
                return fail(format!("root on removed object {}", index));
            }
        }

        Ok(())
    }
}
