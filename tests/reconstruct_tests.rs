mod common;

use common::*;
use heap_trace_studio::heap::{
    GcInfo, GcType, HeapListener, HeapModel, HeapQuery, ObjectIndex, ParsingInfo, RootInfo, RootKind,
};
use heap_trace_studio::parser::SyncLevel;
use heap_trace_studio::reconstruct::{ParseOutcome, ParserConfig, TraceParser};
use heap_trace_studio::utils::error::{ReconciliationViolation, StructuralError, TraceError};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn parse_with(bytes: &[u8], parallelism: usize) -> Result<ParseOutcome, TraceError> {
    let config = ParserConfig {
        parallelism,
        ..Default::default()
    };
    TraceParser::new(symbols(), config).parse(bytes, Some(bytes.len() as u64))
}

fn index_at(heap: &HeapModel, address: u64) -> ObjectIndex {
    heap.to_index(address)
        .unwrap_or_else(|| panic!("no object at 0x{:x}", address))
}

#[test]
fn test_minor_gc_moves_links_and_collects() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(
            2,
            SyncLevel::None,
            Events::new()
                .alloc(NODE_SITE, EDEN)
                .alloc(LEAF_SITE, EDEN + 24)
                .alloc(NODE_SITE, EDEN + 40),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(
            3,
            SyncLevel::None,
            Events::new()
                .move_slow_ptr(EDEN, SURVIVOR, &[Some(EDEN + 24), None])
                .move_slow(EDEN + 24, SURVIVOR + 24)
                .class_root(EDEN, 1),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    for parallelism in [1, 4] {
        let outcome = parse_with(&trace, parallelism).unwrap();
        let heap = &outcome.heap;

        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.to_index(EDEN + 40), None);
        assert_eq!(heap.to_index(EDEN), None);

        let node = index_at(heap, SURVIVOR);
        let leaf = index_at(heap, SURVIVOR + 24);
        assert_eq!(heap.get_to_pointers(node), Some(&[Some(leaf), None][..]));
        assert_eq!(heap.get_from_pointers(leaf), Some(&[node][..]));
        assert_eq!(heap.get_space(node).unwrap().index, 1);

        let roots = heap.roots_of(node);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].kind, RootKind::Class);
        assert_eq!(roots[0].info, RootInfo::Class { class_id: 1 });

        assert_eq!(heap.gc_info().id, 1);
        assert_eq!(outcome.stats.gcs, 1);
        assert!(heap.diagnostics().is_empty());
        heap.validate().unwrap();
    }
}

#[test]
fn test_allocation_after_gc_reuses_freed_address() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(NODE_SITE, EDEN))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(3, SyncLevel::None, Events::new().move_slow(EDEN, OLD))
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .chunk(2, SyncLevel::None, Events::new().alloc(NODE_SITE, EDEN))
        .build();

    let outcome = parse_with(&trace, 2).unwrap();
    let heap = &outcome.heap;

    let promoted = index_at(heap, OLD);
    let fresh = index_at(heap, EDEN);
    assert_ne!(promoted, fresh);
    assert_eq!(heap.get_born(promoted), Some(0));
    assert_eq!(heap.get_born(fresh), Some(1));
    assert_eq!(heap.next_index(), 2);
    assert!(heap.diagnostics().is_empty());
}

#[test]
fn test_major_gc_collects_old_space() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(
            2,
            SyncLevel::None,
            Events::new().alloc(LEAF_SITE, OLD).alloc(LEAF_SITE, OLD + 16),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Major, 1))
        .chunk(3, SyncLevel::None, Events::new().keep_alive(OLD + 16))
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Major, 1))
        .build();

    let outcome = parse_with(&trace, 2).unwrap();
    let heap = &outcome.heap;

    assert_eq!(heap.object_count(), 1);
    assert_eq!(heap.to_index(OLD), None);
    assert!(heap.to_index(OLD + 16).is_some());
}

#[test]
fn test_minor_gc_keeps_unreported_old_objects() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(LEAF_SITE, OLD))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    let outcome = parse_with(&trace, 1).unwrap();
    assert_eq!(outcome.heap.object_count(), 1);
    assert_eq!(outcome.heap.get_born(index_at(&outcome.heap, OLD)), Some(0));
}

/// Triple moved by one GC thread, its last pointer reported by another
fn split_trace(head_first: bool, ensure_order: bool) -> Vec<u8> {
    let target = OLD + 0x100;
    let head = Events::new()
        .move_slow_ptr(EDEN, target, &[Some(OLD), Some(OLD + 16)])
        .nop();
    let fragment = Events::new().ptr_multithreaded(target, &[Some(OLD + 32)]);
    let second_sync = if ensure_order {
        SyncLevel::EnsureOrder
    } else {
        SyncLevel::None
    };

    let builder = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(
            2,
            SyncLevel::None,
            Events::new()
                .alloc(TRIPLE_SITE, EDEN)
                .alloc(LEAF_SITE, OLD)
                .alloc(LEAF_SITE, OLD + 16)
                .alloc(LEAF_SITE, OLD + 32),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1));

    let builder = if head_first {
        builder
            .chunk(3, SyncLevel::None, head)
            .chunk(4, second_sync, fragment)
    } else {
        builder
            .chunk(4, SyncLevel::None, fragment)
            .chunk(3, second_sync, head)
    };

    builder
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build()
}

#[test]
fn test_split_pointers_merge_in_any_order() {
    for head_first in [true, false] {
        for ensure_order in [true, false] {
            for parallelism in [1, 4] {
                let trace = split_trace(head_first, ensure_order);
                let outcome = parse_with(&trace, parallelism).unwrap();
                let heap = &outcome.heap;

                let triple = index_at(heap, OLD + 0x100);
                let expected: Vec<Option<ObjectIndex>> = [OLD, OLD + 16, OLD + 32]
                    .iter()
                    .map(|addr| Some(index_at(heap, *addr)))
                    .collect();

                assert_eq!(
                    heap.get_to_pointers(triple),
                    Some(expected.as_slice()),
                    "head_first={} ensure_order={} parallelism={}",
                    head_first,
                    ensure_order,
                    parallelism
                );
                for leaf in expected.iter().flatten() {
                    assert_eq!(heap.get_from_pointers(*leaf), Some(&[triple][..]));
                }
            }
        }
    }
}

/// Wide's pointer slots: `first` in slot 0, `last` in slot 13
fn wide_slots(first: ObjectIndex, last: ObjectIndex) -> Vec<Option<ObjectIndex>> {
    let mut slots = vec![None; WIDE_POINTERS];
    slots[0] = Some(first);
    slots[WIDE_POINTERS - 1] = Some(last);
    slots
}

fn twelve_with_first(first: u64) -> Vec<Option<u64>> {
    let mut pointers = vec![None; 12];
    pointers[0] = Some(first);
    pointers
}

#[test]
fn test_move_with_extension_merges_pointers() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(
            2,
            SyncLevel::None,
            Events::new()
                .alloc(WIDE_SITE, EDEN)
                .alloc(LEAF_SITE, OLD)
                .alloc(LEAF_SITE, OLD + LEAF_SIZE),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(
            3,
            SyncLevel::None,
            Events::new()
                .move_slow_ptr(EDEN, SURVIVOR, &twelve_with_first(OLD))
                .ptr_extension(SURVIVOR, &[None, Some(OLD + LEAF_SIZE)])
                .nop(),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    for parallelism in [1, 4] {
        let outcome = parse_with(&trace, parallelism).unwrap();
        let heap = &outcome.heap;

        let wide = index_at(heap, SURVIVOR);
        let first = index_at(heap, OLD);
        let last = index_at(heap, OLD + LEAF_SIZE);
        assert_eq!(
            heap.get_to_pointers(wide),
            Some(wide_slots(first, last).as_slice()),
            "parallelism={}",
            parallelism
        );
        assert_eq!(heap.get_from_pointers(last), Some(&[wide][..]));
        assert!(heap.diagnostics().is_empty());
    }
}

#[test]
fn test_update_continues_object_in_progress() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(
            2,
            SyncLevel::None,
            Events::new()
                .alloc(WIDE_SITE, OLD)
                .alloc(LEAF_SITE, OLD + WIDE_SIZE)
                .alloc(LEAF_SITE, OLD + WIDE_SIZE + LEAF_SIZE),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(
            3,
            SyncLevel::None,
            Events::new()
                .keep_alive_ptr(OLD, &twelve_with_first(OLD + WIDE_SIZE))
                .ptr_update_premove(OLD, &[None, Some(OLD + WIDE_SIZE + LEAF_SIZE)])
                .nop(),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    for parallelism in [1, 4] {
        let outcome = parse_with(&trace, parallelism).unwrap();
        let heap = &outcome.heap;

        let wide = index_at(heap, OLD);
        let first = index_at(heap, OLD + WIDE_SIZE);
        let last = index_at(heap, OLD + WIDE_SIZE + LEAF_SIZE);
        assert_eq!(
            heap.get_to_pointers(wide),
            Some(wide_slots(first, last).as_slice()),
            "parallelism={}",
            parallelism
        );
        assert!(heap.diagnostics().is_empty());
    }
}

#[test]
fn test_events_before_full_gc_start_apply_first() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(NODE_SITE, EDEN))
        .chunk(5, SyncLevel::None, Events::new().alloc(LEAF_SITE, EDEN + 0x100))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(3, SyncLevel::None, Events::new().move_slow(EDEN + 0x100, SURVIVOR))
        .chunk(
            4,
            SyncLevel::None,
            Events::new().move_slow_ptr(EDEN, OLD, &[Some(EDEN + 0x100), None]),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    for parallelism in [1, 4] {
        let outcome = parse_with(&trace, parallelism).unwrap();
        let heap = &outcome.heap;

        assert_eq!(heap.object_count(), 2, "parallelism={}", parallelism);
        assert!(heap.diagnostics().is_empty(), "parallelism={}", parallelism);

        let node = index_at(heap, OLD);
        let leaf = index_at(heap, SURVIVOR);
        assert_eq!(heap.get_born(node), Some(0));
        assert_eq!(heap.get_born(leaf), Some(0));
        assert_eq!(heap.get_to_pointers(node), Some(&[Some(leaf), None][..]));
        assert_eq!(heap.objects_in(EDEN, EDEN + SPACE_SIZE).count(), 0);
    }
}

/// A kept old Triple whose three pointers arrive only as fragments from two GC threads
fn headless_trace(thread_three_first: bool) -> Vec<u8> {
    let leaves = [OLD + TRIPLE_SIZE, OLD + TRIPLE_SIZE + LEAF_SIZE, OLD + TRIPLE_SIZE + 2 * LEAF_SIZE];
    let two = Events::new()
        .ptr_multithreaded(OLD, &[Some(leaves[0]), Some(leaves[1])])
        .nop();
    let one = Events::new().ptr_multithreaded(OLD, &[Some(leaves[2])]).nop();

    let builder = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(
            2,
            SyncLevel::None,
            Events::new()
                .alloc(TRIPLE_SITE, OLD)
                .alloc(LEAF_SITE, leaves[0])
                .alloc(LEAF_SITE, leaves[1])
                .alloc(LEAF_SITE, leaves[2]),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1));

    let builder = if thread_three_first {
        builder.chunk(3, SyncLevel::None, two).chunk(4, SyncLevel::None, one)
    } else {
        builder.chunk(4, SyncLevel::None, one).chunk(3, SyncLevel::None, two)
    };

    builder
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build()
}

#[test]
fn test_fragments_without_head_merge_in_trace_order() {
    for thread_three_first in [true, false] {
        for parallelism in [1, 4] {
            let trace = headless_trace(thread_three_first);
            let outcome = parse_with(&trace, parallelism).unwrap();
            let heap = &outcome.heap;

            let triple = index_at(heap, OLD);
            let leaves: Vec<ObjectIndex> = (0..3)
                .map(|i| index_at(heap, OLD + TRIPLE_SIZE + i * LEAF_SIZE))
                .collect();
            let order = if thread_three_first { [0, 1, 2] } else { [2, 0, 1] };
            let expected: Vec<Option<ObjectIndex>> = order.iter().map(|&i| Some(leaves[i])).collect();

            assert_eq!(
                heap.get_to_pointers(triple),
                Some(expected.as_slice()),
                "thread_three_first={} parallelism={}",
                thread_three_first,
                parallelism
            );
            for leaf in &leaves {
                assert_eq!(heap.get_from_pointers(*leaf), Some(&[triple][..]));
            }
            assert!(heap.diagnostics().is_empty());
        }
    }
}

#[test]
fn test_space_index_beyond_limit_fails_the_parse() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().space_create(u32::MAX, EDEN, SPACE_SIZE))
        .build();

    for parallelism in [1, 4] {
        assert!(matches!(
            parse_with(&trace, parallelism),
            Err(TraceError::Structural(StructuralError::SpaceIndexOutOfRange { index: u32::MAX, .. }))
        ));
    }
}

#[test]
fn test_too_many_pointers_is_a_violation() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(NODE_SITE, EDEN))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(
            3,
            SyncLevel::None,
            Events::new().move_slow_ptr(EDEN, SURVIVOR, &[None, None, None]),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    let err = parse_with(&trace, 2).unwrap_err();
    assert!(matches!(
        err,
        TraceError::Decode(_) | TraceError::Reconciliation(ReconciliationViolation::Overflow { .. })
    ));
}

#[test]
fn test_missing_pointer_fragment_is_incomplete() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(TRIPLE_SITE, EDEN))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(
            3,
            SyncLevel::None,
            Events::new().move_slow_ptr(EDEN, OLD, &[None]),
        )
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    let err = parse_with(&trace, 2).unwrap_err();
    assert!(matches!(
        err,
        TraceError::Reconciliation(ReconciliationViolation::Incomplete {
            filled: 1,
            capacity: 3,
            ..
        })
    ));
}

#[test]
fn test_move_outside_gc_is_structural() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(LEAF_SITE, EDEN))
        .chunk(3, SyncLevel::None, Events::new().move_slow(EDEN, OLD))
        .build();

    assert!(matches!(parse_with(&trace, 2), Err(TraceError::Structural(_))));
}

#[test]
fn test_unknown_move_source_is_a_diagnostic() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(3, SyncLevel::None, Events::new().move_slow(EDEN + 0x80, OLD))
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    let outcome = parse_with(&trace, 2).unwrap();
    assert_eq!(outcome.heap.object_count(), 0);
    assert_eq!(outcome.heap.diagnostics().len(), 1);
    assert_eq!(outcome.heap.diagnostics()[0].address, EDEN + 0x80);
    assert_eq!(outcome.stats.unresolved, 1);
}

#[derive(Default)]
struct Counts {
    changing: AtomicUsize,
    changed: AtomicUsize,
    closed: AtomicUsize,
}

struct CountingListener(Arc<Counts>);

impl HeapListener for CountingListener {
    fn phase_changing(
        &mut self,
        sender: &HeapModel,
        from: &GcInfo,
        to: &GcInfo,
        failed: bool,
        _position: u64,
        _info: &ParsingInfo,
        in_window: bool,
    ) {
        assert!(from.is_start());
        assert!(!to.is_start());
        assert!(!failed);
        assert!(in_window);
        assert_eq!(sender.gc_info().id, 1);
        self.0.changing.fetch_add(1, Ordering::SeqCst);
    }

    fn phase_changed(
        &mut self,
        sender: &HeapModel,
        _from: &GcInfo,
        to: &GcInfo,
        _failed: bool,
        _position: u64,
        _info: &ParsingInfo,
        _in_window: bool,
    ) {
        assert_eq!(sender.gc_info(), to);
        self.0.changed.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self, _sender: &HeapModel, info: &ParsingInfo) {
        assert_eq!(info.trace_length, Some(info.position));
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_empty_gc_fires_listeners_once() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(1, SyncLevel::Full, Events::new().gc_end(GcType::Minor, 1))
        .build();

    let counts = Arc::new(Counts::default());
    let mut parser = TraceParser::new(symbols(), ParserConfig::default());
    parser.add_listener(Box::new(CountingListener(Arc::clone(&counts))));
    let outcome = parser.parse(&trace[..], Some(trace.len() as u64)).unwrap();

    assert_eq!(counts.changing.load(Ordering::SeqCst), 1);
    assert_eq!(counts.changed.load(Ordering::SeqCst), 1);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.listeners.len(), 1);
    assert_eq!(outcome.heap.object_count(), 0);
}

#[test]
fn test_gc_start_alone_fires_no_phase_change() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .build();

    let counts = Arc::new(Counts::default());
    let mut parser = TraceParser::new(symbols(), ParserConfig::default());
    parser.add_listener(Box::new(CountingListener(Arc::clone(&counts))));
    parser.parse(&trace[..], Some(trace.len() as u64)).unwrap();

    assert_eq!(counts.changing.load(Ordering::SeqCst), 0);
    assert_eq!(counts.changed.load(Ordering::SeqCst), 0);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_gc_start_inside_gc_is_rejected() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 2))
        .build();

    assert!(matches!(parse_with(&trace, 1), Err(TraceError::Structural(_))));
}

#[test]
fn test_trace_ending_inside_gc_keeps_pre_gc_heap() {
    let trace = TraceBuilder::new()
        .chunk(1, SyncLevel::Full, Events::new().standard_spaces())
        .chunk(2, SyncLevel::None, Events::new().alloc(LEAF_SITE, EDEN))
        .chunk(1, SyncLevel::Full, Events::new().gc_start(GcType::Minor, 1))
        .chunk(3, SyncLevel::None, Events::new().move_slow(EDEN, OLD))
        .build();

    let outcome = parse_with(&trace, 2).unwrap();
    assert_eq!(outcome.stats.gcs, 0);
    assert!(outcome.heap.to_index(EDEN).is_some());
    assert!(outcome.heap.gc_info().is_start());
}
