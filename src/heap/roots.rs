//! Root pointers: references into the heap from outside it.

use serde::{Deserialize, Serialize};

/// Root categories in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RootKind {
    ClassLoader,
    Class,
    StaticField,
    LocalVariable,
    VmInternalThreadData,
    CodeBlob,
    JniLocal,
    JniGlobal,
    ClassLoaderInternal,
    Universe,
    SystemDictionary,
    BusyMonitor,
    InternedString,
    FlatProfiler,
    Management,
    Jvmti,
    Debug,
}

const ROOT_KINDS: [RootKind; 17] = [
    RootKind::ClassLoader,
    RootKind::Class,
    RootKind::StaticField,
    RootKind::LocalVariable,
    RootKind::VmInternalThreadData,
    RootKind::CodeBlob,
    RootKind::JniLocal,
    RootKind::JniGlobal,
    RootKind::ClassLoaderInternal,
    RootKind::Universe,
    RootKind::SystemDictionary,
    RootKind::BusyMonitor,
    RootKind::InternedString,
    RootKind::FlatProfiler,
    RootKind::Management,
    RootKind::Jvmti,
    RootKind::Debug,
];

impl RootKind {
    pub fn from_id(id: i32) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| ROOT_KINDS.get(i).copied())
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn label(self) -> &'static str {
        match self {
            RootKind::ClassLoader => "Class loader",
            RootKind::Class => "Class",
            RootKind::StaticField => "Static field",
            RootKind::LocalVariable => "Local variable",
            RootKind::VmInternalThreadData => "VM internal thread data",
            RootKind::CodeBlob => "Code blob",
            RootKind::JniLocal => "JNI local",
            RootKind::JniGlobal => "JNI global",
            RootKind::ClassLoaderInternal => "Class loader internal",
            RootKind::Universe => "Universe",
            RootKind::SystemDictionary => "System dictionary",
            RootKind::BusyMonitor => "Busy monitor",
            RootKind::InternedString => "Interned String",
            RootKind::FlatProfiler => "Flat profiler",
            RootKind::Management => "Management",
            RootKind::Jvmti => "JVMTI",
            RootKind::Debug => "Debug",
        }
    }
}

/// Kind-specific details of a root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RootInfo {
    None,
    ClassLoader { name: String },
    Class { class_id: u32 },
    StaticField { class_id: u32, offset: u32 },
    LocalVariable { thread_id: u64, class_id: u32, method_id: u32, slot: u32 },
    Thread { thread_id: u64 },
    CodeBlob { class_id: u32, method_id: u32 },
    JniGlobal { weak: bool },
    Debug { call: String },
}

/// A typed root descriptor attached to an object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootPtr {
    pub kind: RootKind,
    pub info: RootInfo,
}

impl RootPtr {
    pub fn new(kind: RootKind, info: RootInfo) -> Self {
        Self { kind, info }
    }
}

/// Insert keeping the set sorted by kind and free of duplicates
pub(crate) fn insert_sorted(roots: &mut Vec<RootPtr>, root: RootPtr) {
    if let Err(pos) = roots.binary_search(&root) {
        roots.insert(pos, root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids() {
        assert_eq!(RootKind::from_id(0), Some(RootKind::ClassLoader));
        assert_eq!(RootKind::from_id(16), Some(RootKind::Debug));
        assert_eq!(RootKind::from_id(17), None);
        assert_eq!(RootKind::from_id(-1), None);
        assert_eq!(RootKind::JniGlobal.id(), 7);
    }

    #[test]
    fn test_roots_sorted_by_kind() {
        let mut roots = Vec::new();
        insert_sorted(&mut roots, RootPtr::new(RootKind::JniGlobal, RootInfo::JniGlobal { weak: false }));
        insert_sorted(&mut roots, RootPtr::new(RootKind::Class, RootInfo::Class { class_id: 4 }));
        insert_sorted(&mut roots, RootPtr::new(RootKind::Class, RootInfo::Class { class_id: 4 }));

        let kinds: Vec<_> = roots.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RootKind::Class, RootKind::JniGlobal]);
    }
}
