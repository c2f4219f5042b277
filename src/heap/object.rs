//! Heap objects and their stable identity.

use crate::parser::EventType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable arena index of an object; never reused within one heap model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIndex(pub u32);

impl ObjectIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapObject {
    /// Current address; changes on every move
    pub address: u64,
    pub type_id: u32,
    pub site_id: u32,
    pub event: EventType,
    /// Id of the last GC before the allocation
    pub born: u32,
    pub size: u64,
    pub array_length: Option<u32>,
    pub(crate) pointers_to: Option<Vec<Option<ObjectIndex>>>,
    pub(crate) pointed_from: Vec<ObjectIndex>,
}

impl HeapObject {
    pub fn new(
        address: u64,
        type_id: u32,
        site_id: u32,
        event: EventType,
        born: u32,
        size: u64,
        array_length: Option<u32>,
    ) -> Self {
        Self {
            address,
            type_id,
            site_id,
            event,
            born,
            size,
            array_length,
            pointers_to: None,
            pointed_from: Vec::new(),
        }
    }

    /// Outgoing pointers; a `None` slot is a NULL reference
    pub fn pointers_to(&self) -> Option<&[Option<ObjectIndex>]> {
        self.pointers_to.as_deref()
    }

    /// Objects pointing here, sorted and unique
    pub fn pointed_from(&self) -> &[ObjectIndex] {
        &self.pointed_from
    }

    pub fn end(&self) -> u64 {
        self.address + self.size
    }

    pub(crate) fn add_incoming(&mut self, from: ObjectIndex) {
        if let Err(pos) = self.pointed_from.binary_search(&from) {
            self.pointed_from.insert(pos, from);
        }
    }

    pub(crate) fn remove_incoming(&mut self, from: ObjectIndex) {
        if let Ok(pos) = self.pointed_from.binary_search(&from) {
            self.pointed_from.remove(pos);
        }
    }
}
