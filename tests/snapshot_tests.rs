mod common;

use common::*;
use heap_trace_studio::heap::{GcType, HeapModel, HeapObject, HeapQuery, ObjectIndex, Space};
use heap_trace_studio::parser::SyncLevel;
use heap_trace_studio::reconstruct::{ParserConfig, TraceParser};
use heap_trace_studio::snapshot::{read_heap, read_snapshot, write_heap, write_snapshot};
use heap_trace_studio::utils::error::SnapshotError;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// A heap with a survivor, a promoted object, a root and a fresh allocation
fn rebuilt_heap() -> HeapModel {
    let trace = TraceBuilder::new()
        .chunk(
            1,
            SyncLevel::Full,
            Events::new().standard_spaces().thread_alive(2, "main"),
        )
        .chunk(
            2,
            SyncLevel::None,
            Events::new()
                .alloc(NODE_SITE, EDEN)
                .alloc(LEAF_SITE, EDEN + 24)
                .alloc(TRIPLE_SITE, EDEN + 40),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(
            3,
            SyncLevel::None,
            Events::new()
                .move_slow_ptr(EDEN, SURVIVOR, &[Some(EDEN + 24), Some(EDEN)])
                .move_slow(EDEN + 24, OLD)
                .class_root(EDEN, 7),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .chunk(2, SyncLevel::None, Events::new().alloc(LEAF_SITE, EDEN))
        .build();

    TraceParser::new(symbols(), ParserConfig::default())
        .parse(&trace[..], None)
        .unwrap()
        .heap
}

fn objects(heap: &HeapModel) -> Vec<(ObjectIndex, HeapObject)> {
    heap.objects().map(|(index, object)| (index, object.clone())).collect()
}

fn spaces(heap: &HeapModel) -> Vec<Space> {
    heap.spaces().cloned().collect()
}

#[test]
fn test_snapshot_preserves_the_heap() {
    let heap = rebuilt_heap();
    assert_eq!(heap.object_count(), 3);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("heap.snapshot");
    write_snapshot(&heap, &path).unwrap();
    let restored = read_snapshot(&path, symbols()).unwrap();

    assert_eq!(objects(&restored), objects(&heap));
    assert_eq!(spaces(&restored), spaces(&heap));
    assert_eq!(restored.gc_info(), heap.gc_info());
    assert_eq!(restored.next_index(), heap.next_index());
    assert_eq!(
        restored.roots().collect::<Vec<_>>(),
        heap.roots().collect::<Vec<_>>()
    );
    assert_eq!(
        restored.threads().collect::<Vec<_>>(),
        heap.threads().collect::<Vec<_>>()
    );
    assert_eq!(restored.diagnostics(), heap.diagnostics());

    let node = restored.to_index(SURVIVOR).unwrap();
    let leaf = restored.to_index(OLD).unwrap();
    assert_eq!(restored.get_to_pointers(node), Some(&[Some(leaf), Some(node)][..]));
    assert_eq!(restored.get_from_pointers(node), Some(&[node][..]));
    assert_eq!(restored.get_type(leaf).unwrap().name, "Leaf");
}

#[test]
fn test_snapshot_of_empty_heap() {
    let heap = HeapModel::new(symbols());

    let mut bytes = Vec::new();
    write_heap(&heap, &mut bytes).unwrap();
    let restored = read_heap(&bytes[..], symbols()).unwrap();

    assert_eq!(restored.object_count(), 0);
    assert_eq!(restored.space_slots(), 0);
    assert_eq!(restored.gc_info(), heap.gc_info());
}

#[test]
fn test_newer_snapshot_version_is_rejected() {
    let mut bytes = Vec::new();
    write_heap(&rebuilt_heap(), &mut bytes).unwrap();
    bytes[4..8].copy_from_slice(&2i32.to_be_bytes());

    match read_heap(&bytes[..], symbols()) {
        Err(SnapshotError::UnsupportedVersion(2)) => {}
        other => panic!("expected an unsupported version, got {:?}", other.map(|h| h.live_objects())),
    }
}

#[test]
fn test_cut_snapshot_is_an_error() {
    let mut bytes = Vec::new();
    write_heap(&rebuilt_heap(), &mut bytes).unwrap();
    bytes.truncate(bytes.len() / 2);

    assert!(read_heap(&bytes[..], symbols()).is_err());
}
