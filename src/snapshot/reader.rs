//! Binary heap snapshot reader.

use crate::heap::{
    GcCause, GcEventType, GcInfo, GcType, HeapModel, HeapObject, Lab, LabKind, LabState, ObjectIndex, RootInfo,
    RootKind, RootPtr, Space, SpaceKind, SpaceMode, ThreadInfo,
};
use crate::parser::EventType;
use crate::symbols::Symbols;
use crate::utils::config::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::utils::error::{ReferenceKind, SnapshotError, UnresolvedReference};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Read a heap snapshot from a file
///
/// **Public** - main entry point for snapshot input
///
/// # Arguments
/// * `path` - Snapshot written by `write_snapshot`
/// * `symbols` - Symbols of the traced VM, needed to answer type queries
///
/// # Errors
/// * `SnapshotError::Io` - file missing or truncated
/// * `SnapshotError::BadMagic` / `UnsupportedVersion` - not a snapshot this build reads
/// * `SnapshotError::Corrupt` - inconsistent content
/// * `SnapshotError::Structural` - the rebuilt model fails validation
pub fn read_snapshot(path: impl AsRef<Path>, symbols: Arc<Symbols>) -> Result<HeapModel, SnapshotError> {
    let path = path.as_ref();
    info!("Reading heap snapshot from: {}", path.display());

    let heap = read_heap(BufReader::new(File::open(path)?), symbols)?;

    info!("Snapshot loaded ({} objects)", heap.live_objects());
    Ok(heap)
}

/// Rebuild a heap from any reader
pub fn read_heap<R: Read>(input: R, symbols: Arc<Symbols>) -> Result<HeapModel, SnapshotError> {
    let mut r = DataReader { input };

    let magic = r.i32()?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }
    let version = r.i32()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let mut heap = HeapModel::new(symbols);
    heap.set_gc_info(read_gc_info(&mut r)?);

    // Counts come from the file; containers grow only as entries are actually read
    let prototype_count = r.len()?;
    let mut prototypes = Vec::new();
    for position in 0..prototype_count {
        let id = r.len()?;
        if id != position {
            return Err(corrupt(format!("prototype {} stored at position {}", id, position)));
        }
        let type_id = r.u32()?;
        let site_id = r.u32()?;
        let event = r.i32()?;
        let event = u8::try_from(event)
            .ok()
            .and_then(|id| EventType::try_from(id).ok())
            .ok_or_else(|| corrupt(format!("prototype {} has unknown event {}", id, event)))?;
        prototypes.push((type_id, site_id, event));
    }

    let object_count = r.len()?;
    let next_index = r.len()? as u32;
    if (next_index as usize) < object_count {
        return Err(corrupt(format!(
            "next index {} is below the object count {}",
            next_index, object_count
        )));
    }

    let mut objects = BTreeMap::new();
    let space_slots = r.len()?;
    for _ in 0..space_slots {
        if r.bool()? {
            read_space(&mut r, &mut heap, &prototypes, next_index, &mut objects)?;
        }
    }

    if objects.len() != object_count {
        return Err(corrupt(format!("expected {} objects, found {}", object_count, objects.len())));
    }
    build_arena(&mut heap, next_index, objects)?;
    link_incoming(&mut heap)?;

    let root_count = r.len()?;
    for _ in 0..root_count {
        let index = ObjectIndex(r.u32()?);
        let kind = r.i32()?;
        let kind = RootKind::from_id(kind).ok_or_else(|| corrupt(format!("unknown root kind {}", kind)))?;
        let info = read_root_info(&mut r)?;
        heap.add_root(index, RootPtr::new(kind, info));
    }

    let thread_count = r.len()?;
    for _ in 0..thread_count {
        let id = r.u64()?;
        let name = r.utf()?;
        let alive = r.bool()?;
        heap.threads.insert(id, ThreadInfo { id, name, alive });
    }

    let diagnostic_count = r.len()?;
    for _ in 0..diagnostic_count {
        let kind = r.i32()?;
        let kind = ReferenceKind::from_id(kind).ok_or_else(|| corrupt(format!("unknown reference kind {}", kind)))?;
        let address = r.u64()?;
        let gc_id = r.u32()?;
        heap.diagnostics.push(UnresolvedReference { kind, address, gc_id });
    }

    heap.validate()?;
    debug!("Snapshot validated: {} objects, {} spaces", heap.live, heap.spaces().count());
    Ok(heap)
}

type Prototype = (u32, u32, EventType);

fn read_space<R: Read>(
    r: &mut DataReader<R>,
    heap: &mut HeapModel,
    prototypes: &[Prototype],
    next_index: u32,
    objects: &mut BTreeMap<ObjectIndex, HeapObject>,
) -> Result<(), SnapshotError> {
    let index = r.u32()?;
    let name = r.utf()?;
    let start = r.u64()?;
    let length = r.u64()?;
    let kind = match r.i32()? {
        -1 => None,
        id => Some(SpaceKind::from_id(id).ok_or_else(|| corrupt(format!("unknown space kind {}", id)))?),
    };
    let mode = match r.i32()? {
        -1 => None,
        id => Some(SpaceMode::from_id(id).ok_or_else(|| corrupt(format!("unknown space mode {}", id)))?),
    };

    let mut space = Space::new(index, start, length);
    space.name = name;
    space.kind = kind;
    space.mode = mode;
    heap.add_space(space)?;

    let lab_count = r.len()?;
    for _ in 0..lab_count {
        let thread = r.u64()?;
        let kind = r.i32()?;
        let kind = LabKind::from_id(kind).ok_or_else(|| corrupt(format!("unknown lab kind {}", kind)))?;
        let state = r.i32()?;
        let state = LabState::from_id(state).ok_or_else(|| corrupt(format!("unknown lab state {}", state)))?;
        let addr = r.u64()?;
        let capacity = r.u64()?;

        let mut lab = Lab::new(thread, kind, addr, capacity);
        lab.state = state;

        let lab_objects = r.len()?;
        for _ in 0..lab_objects {
            let (index, object) = read_object(r, prototypes)?;
            if index.0 >= next_index {
                return Err(corrupt(format!("object index {} beyond next index {}", index, next_index)));
            }
            if !lab.contains(object.address) {
                return Err(corrupt(format!(
                    "object {} at 0x{:x} lies outside its lab at 0x{:x}",
                    index, object.address, lab.addr
                )));
            }
            if let Some(first) = heap.addresses.insert(object.address, index) {
                return Err(corrupt(format!("objects {} and {} share 0x{:x}", first, index, object.address)));
            }
            if objects.insert(index, object).is_some() {
                return Err(corrupt(format!("object {} stored twice", index)));
            }
        }
        heap.place_lab(lab)?;
    }
    Ok(())
}

fn read_object<R: Read>(
    r: &mut DataReader<R>,
    prototypes: &[Prototype],
) -> Result<(ObjectIndex, HeapObject), SnapshotError> {
    let index = ObjectIndex(r.u32()?);
    let prototype = r.len()?;
    let (type_id, site_id, event) = prototypes
        .get(prototype)
        .copied()
        .ok_or_else(|| corrupt(format!("object {} names unknown prototype {}", index, prototype)))?;
    let address = r.u64()?;
    let size = r.u64()?;
    let array_length = match r.i32()? {
        -1 => None,
        len => Some(u32::try_from(len).map_err(|_| corrupt(format!("object {} has array length {}", index, len)))?),
    };
    let born = r.u32()?;

    let mut object = HeapObject::new(address, type_id, site_id, event, born, size, array_length);
    let pointer_count = r.i32()?;
    if pointer_count < -1 {
        return Err(corrupt(format!("object {} has {} pointers", index, pointer_count)));
    }
    if pointer_count >= 0 {
        let mut pointers = Vec::new();
        for _ in 0..pointer_count {
            pointers.push(match r.i32()? {
                -1 => None,
                target => Some(ObjectIndex(target as u32)),
            });
        }
        object.pointers_to = Some(pointers);
    }
    Ok((index, object))
}

/// **Private** - lay the read objects out in an arena of `next_index` slots
///
/// The arena is reserved fallibly since its length comes from the file.
fn build_arena(
    heap: &mut HeapModel,
    next_index: u32,
    objects: BTreeMap<ObjectIndex, HeapObject>,
) -> Result<(), SnapshotError> {
    let mut arena: Vec<Option<HeapObject>> = Vec::new();
    arena
        .try_reserve_exact(next_index as usize)
        .map_err(|e| corrupt(format!("cannot hold {} object slots: {}", next_index, e)))?;
    arena.resize(next_index as usize, None);

    heap.live = objects.len();
    for (index, object) in objects {
        arena[index.as_usize()] = Some(object);
    }
    heap.objects = arena;
    Ok(())
}

/// **Private** - incoming sets are not stored; derive them from the outgoing pointers
fn link_incoming(heap: &mut HeapModel) -> Result<(), SnapshotError> {
    let edges: Vec<(ObjectIndex, ObjectIndex)> = heap
        .objects()
        .flat_map(|(owner, object)| {
            object
                .pointers_to()
                .unwrap_or_default()
                .iter()
                .flatten()
                .map(move |target| (owner, *target))
        })
        .collect();

    for (owner, target) in edges {
        match heap.objects.get_mut(target.as_usize()) {
            Some(Some(object)) => object.add_incoming(owner),
            _ => return Err(corrupt(format!("{} points to missing object {}", owner, target))),
        }
    }
    Ok(())
}

fn read_gc_info<R: Read>(r: &mut DataReader<R>) -> Result<GcInfo, SnapshotError> {
    let event = r.i32()?;
    let event = GcEventType::from_id(event).ok_or_else(|| corrupt(format!("unknown GC event {}", event)))?;
    let gc_type = r.i32()?;
    let gc_type = GcType::from_stored_id(gc_type).ok_or_else(|| corrupt(format!("unknown GC type {}", gc_type)))?;
    let cause = GcCause {
        id: r.u32()?,
        name: r.utf()?,
    };
    Ok(GcInfo {
        event,
        gc_type,
        cause,
        id: r.u32()?,
        time: r.u64()?,
        concurrent: r.bool()?,
        failed: r.bool()?,
    })
}

fn read_root_info<R: Read>(r: &mut DataReader<R>) -> Result<RootInfo, SnapshotError> {
    Ok(match r.i32()? {
        0 => RootInfo::None,
        1 => RootInfo::ClassLoader { name: r.utf()? },
        2 => RootInfo::Class { class_id: r.u32()? },
        3 => RootInfo::StaticField {
            class_id: r.u32()?,
            offset: r.u32()?,
        },
        4 => RootInfo::LocalVariable {
            thread_id: r.u64()?,
            class_id: r.u32()?,
            method_id: r.u32()?,
            slot: r.u32()?,
        },
        5 => RootInfo::Thread { thread_id: r.u64()? },
        6 => RootInfo::CodeBlob {
            class_id: r.u32()?,
            method_id: r.u32()?,
        },
        7 => RootInfo::JniGlobal { weak: r.bool()? },
        8 => RootInfo::Debug { call: r.utf()? },
        tag => return Err(corrupt(format!("unknown root info tag {}", tag))),
    })
}

fn corrupt(message: String) -> SnapshotError {
    SnapshotError::Corrupt(message)
}

/// Big-endian primitive reader
struct DataReader<R: Read> {
    input: R,
}

impl<R: Read> DataReader<R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let mut buf = [0u8; N];
        self.input.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn i32(&mut self) -> Result<i32, SnapshotError> {
        Ok(i32::from_be_bytes(self.bytes()?))
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(self.i32()? as u32)
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_be_bytes(self.bytes()?))
    }

    fn bool(&mut self) -> Result<bool, SnapshotError> {
        let [byte] = self.bytes::<1>()?;
        Ok(byte != 0)
    }

    fn len(&mut self) -> Result<usize, SnapshotError> {
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| corrupt(format!("negative count {}", value)))
    }

    fn utf(&mut self) -> Result<String, SnapshotError> {
        let len = u16::from_be_bytes(self.bytes()?) as usize;
        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| corrupt(format!("invalid string: {}", e)))
    }
}
