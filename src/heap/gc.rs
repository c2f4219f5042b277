//! GC episode metadata.

use serde::{Deserialize, Serialize};

/// Kind of collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GcType {
    Minor,
    Major,
    MajorSync,
    MinorSync,

    /// Placeholder before the first GC of a trace
    Initial,
}

impl GcType {
    /// Parse the wire id (header byte 1)
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(GcType::Minor),
            1 => Some(GcType::Major),
            2 => Some(GcType::MajorSync),
            3 => Some(GcType::MinorSync),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            GcType::Minor => 0,
            GcType::Major => 1,
            GcType::MajorSync => 2,
            GcType::MinorSync => 3,
            GcType::Initial => -1,
        }
    }

    /// Snapshot id; accepts the initial placeholder too
    pub fn from_stored_id(id: i32) -> Option<Self> {
        if id == -1 {
            Some(GcType::Initial)
        } else {
            GcType::from_id(id)
        }
    }

    /// Major collections see post-move pointer addresses and collect every space
    pub fn is_major(self) -> bool {
        matches!(self, GcType::Major | GcType::MajorSync)
    }

    pub fn is_sync(self) -> bool {
        matches!(self, GcType::MajorSync | GcType::MinorSync)
    }
}

/// Whether a GcInfo describes the start or the end of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GcEventType {
    Start,
    End,
}

impl GcEventType {
    pub fn id(self) -> i32 {
        match self {
            GcEventType::Start => 0,
            GcEventType::End => 1,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(GcEventType::Start),
            1 => Some(GcEventType::End),
            _ => None,
        }
    }
}

/// Why the GC ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcCause {
    pub id: u32,
    pub name: String,
}

/// One GC boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcInfo {
    pub event: GcEventType,
    pub gc_type: GcType,
    pub cause: GcCause,
    pub id: u32,
    pub time: u64,
    pub concurrent: bool,
    pub failed: bool,
}

impl GcInfo {
    /// The boundary before anything happened
    pub fn initial() -> Self {
        Self {
            event: GcEventType::End,
            gc_type: GcType::Initial,
            cause: GcCause {
                id: 0,
                name: "initial".to_string(),
            },
            id: 0,
            time: 0,
            concurrent: false,
            failed: false,
        }
    }

    pub fn is_start(&self) -> bool {
        self.event == GcEventType::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_type_ids() {
        for id in 0..4 {
            assert_eq!(GcType::from_id(id).unwrap().id(), id);
        }
        assert_eq!(GcType::from_id(4), None);
        assert_eq!(GcType::from_id(-1), None);
        assert_eq!(GcType::from_stored_id(-1), Some(GcType::Initial));
    }

    #[test]
    fn test_major_and_sync() {
        assert!(GcType::MajorSync.is_major());
        assert!(GcType::MajorSync.is_sync());
        assert!(!GcType::Minor.is_major());
        assert!(GcType::MinorSync.is_sync());
    }
}
