//! Memory spaces and the allocation buffers inside them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Generation a space belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpaceKind {
    Eden,
    Survivor,
    Old,
}

impl SpaceKind {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(SpaceKind::Eden),
            1 => Some(SpaceKind::Survivor),
            2 => Some(SpaceKind::Old),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            SpaceKind::Eden => 0,
            SpaceKind::Survivor => 1,
            SpaceKind::Old => 2,
        }
    }

    /// Spaces emptied by a minor collection
    pub fn is_young(self) -> bool {
        matches!(self, SpaceKind::Eden | SpaceKind::Survivor)
    }
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpaceKind::Eden => "eden",
            SpaceKind::Survivor => "survivor",
            SpaceKind::Old => "old",
        };
        f.write_str(name)
    }
}

/// Region mode (humongous regions span several regions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceMode {
    Normal,
    HumongousStart,
    HumongousContinues,
}

impl SpaceMode {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(SpaceMode::Normal),
            1 => Some(SpaceMode::HumongousStart),
            2 => Some(SpaceMode::HumongousContinues),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            SpaceMode::Normal => 0,
            SpaceMode::HumongousStart => 1,
            SpaceMode::HumongousContinues => 2,
        }
    }
}

/// How a lab came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabKind {
    /// Thread-local allocation buffer
    Tlab,

    /// Promotion buffer used by GC threads
    Plab,

    /// A whole region handed to one thread
    Region,

    /// Synthesized around objects allocated or moved outside any buffer
    Virtual,
}

impl LabKind {
    pub fn id(self) -> i32 {
        match self {
            LabKind::Tlab => 0,
            LabKind::Plab => 1,
            LabKind::Region => 2,
            LabKind::Virtual => 3,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(LabKind::Tlab),
            1 => Some(LabKind::Plab),
            2 => Some(LabKind::Region),
            3 => Some(LabKind::Virtual),
            _ => None,
        }
    }
}

/// Lab lifecycle: open, filling, retired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabState {
    Open,
    Filling,
    Retired,
}

impl LabState {
    pub fn id(self) -> i32 {
        match self {
            LabState::Open => 0,
            LabState::Filling => 1,
            LabState::Retired => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(LabState::Open),
            1 => Some(LabState::Filling),
            2 => Some(LabState::Retired),
            _ => None,
        }
    }
}

/// An address range owned by one thread within one space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lab {
    pub thread: u64,
    pub kind: LabKind,
    pub state: LabState,
    pub addr: u64,
    pub capacity: u64,
}

impl Lab {
    pub fn new(thread: u64, kind: LabKind, addr: u64, capacity: u64) -> Self {
        Self {
            thread,
            kind,
            state: LabState::Open,
            addr,
            capacity,
        }
    }

    pub fn end(&self) -> u64 {
        self.addr + self.capacity
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.end()
    }

    pub fn overlaps(&self, addr: u64, capacity: u64) -> bool {
        addr < self.end() && self.addr < addr + capacity
    }
}

/// A typed memory region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub index: u32,
    pub name: String,
    pub kind: Option<SpaceKind>,
    pub mode: Option<SpaceMode>,
    pub start: u64,
    pub length: u64,
    labs: BTreeMap<u64, Lab>,
}

impl Space {
    pub fn new(index: u32, start: u64, length: u64) -> Self {
        Self {
            index,
            name: format!("space-{}", index),
            kind: None,
            mode: None,
            start,
            length,
            labs: BTreeMap::new(),
        }
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Labs ordered by start address
    pub fn labs(&self) -> impl Iterator<Item = &Lab> {
        self.labs.values()
    }

    pub fn lab_count(&self) -> usize {
        self.labs.len()
    }

    /// The lab whose range contains `addr`
    pub fn lab_containing(&self, addr: u64) -> Option<&Lab> {
        self.labs
            .range(..=addr)
            .next_back()
            .map(|(_, lab)| lab)
            .filter(|lab| lab.contains(addr))
    }

    pub fn lab_containing_mut(&mut self, addr: u64) -> Option<&mut Lab> {
        self.labs
            .range_mut(..=addr)
            .next_back()
            .map(|(_, lab)| lab)
            .filter(|lab| lab.contains(addr))
    }

    pub fn lab_at_mut(&mut self, addr: u64) -> Option<&mut Lab> {
        self.labs.get_mut(&addr)
    }

    /// Start addresses of labs overlapping `[addr, addr + capacity)`
    pub fn overlapping_labs(&self, addr: u64, capacity: u64) -> Vec<u64> {
        self.labs
            .values()
            .filter(|lab| lab.overlaps(addr, capacity))
            .map(|lab| lab.addr)
            .collect()
    }

    pub fn insert_lab(&mut self, lab: Lab) {
        self.labs.insert(lab.addr, lab);
    }

    pub fn remove_lab(&mut self, addr: u64) -> Option<Lab> {
        self.labs.remove(&addr)
    }

    pub fn clear_labs(&mut self) {
        self.labs.clear();
    }

    /// Change the range, dropping labs that no longer fit
    pub fn redefine(&mut self, start: u64, length: u64) {
        self.start = start;
        self.length = length;
        let end = start + length;
        self.labs.retain(|_, lab| lab.addr >= start && lab.end() <= end);
    }
}
