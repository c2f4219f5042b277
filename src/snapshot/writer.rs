//! Binary heap snapshot writer.
//!
//! Objects are written space by space and lab by lab, so a reader can put
//! every object straight back into the lab it came from.

use crate::heap::{GcInfo, HeapModel, Lab, ObjectIndex, RootInfo, Space};
use crate::parser::EventType;
use crate::utils::config::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::utils::error::SnapshotError;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a heap snapshot to a file
///
/// **Public** - main entry point for snapshot output
///
/// # Errors
/// * `SnapshotError::InvalidPath` - path is empty or a directory
/// * `SnapshotError::Io` - I/O error during write
/// * `SnapshotError::Corrupt` - the heap has objects outside every lab
pub fn write_snapshot(heap: &HeapModel, output_path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let output_path = output_path.as_ref();

    info!("Writing heap snapshot to: {}", output_path.display());

    if output_path.as_os_str().is_empty() {
        return Err(SnapshotError::InvalidPath("Path is empty".to_string()));
    }
    if output_path.is_dir() {
        return Err(SnapshotError::InvalidPath(format!(
            "Path is a directory: {}",
            output_path.display()
        )));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    write_heap(heap, &mut writer)?;
    writer.flush()?;

    info!(
        "Snapshot written successfully ({} objects, {} bytes)",
        heap.live_objects(),
        std::fs::metadata(output_path).map(|m| m.len()).unwrap_or(0)
    );
    Ok(())
}

/// Serialize a heap to any writer
pub fn write_heap<W: Write>(heap: &HeapModel, out: W) -> Result<(), SnapshotError> {
    let mut w = DataWriter { out };

    w.i32(SNAPSHOT_MAGIC)?;
    w.i32(SNAPSHOT_VERSION)?;
    write_gc_info(&mut w, heap.gc_info())?;

    let prototypes = Prototypes::collect(heap);
    w.len(prototypes.list.len())?;
    for (id, &(site, type_id, event)) in prototypes.list.iter().enumerate() {
        w.len(id)?;
        w.u32(type_id)?;
        w.u32(site)?;
        w.i32(event.id() as i32)?;
    }

    w.len(heap.live_objects())?;
    w.len(heap.next_index() as usize)?;

    let mut written = 0;
    w.len(heap.space_slots())?;
    for slot in 0..heap.space_slots() {
        match heap.space(slot as u32) {
            Some(space) => {
                w.bool(true)?;
                written += write_space(&mut w, heap, space, &prototypes)?;
            }
            None => w.bool(false)?,
        }
    }

    if written != heap.live_objects() {
        return Err(SnapshotError::Corrupt(format!(
            "{} of {} live objects are outside every lab",
            heap.live_objects() - written.min(heap.live_objects()),
            heap.live_objects()
        )));
    }

    let roots: Vec<_> = heap
        .roots()
        .flat_map(|(index, roots)| roots.iter().map(move |root| (index, root)))
        .collect();
    w.len(roots.len())?;
    for (index, root) in roots {
        w.u32(index.0)?;
        w.i32(root.kind.id())?;
        write_root_info(&mut w, &root.info)?;
    }

    let threads: Vec<_> = heap.threads().collect();
    w.len(threads.len())?;
    for thread in threads {
        w.u64(thread.id)?;
        w.utf(&thread.name)?;
        w.bool(thread.alive)?;
    }

    w.len(heap.diagnostics().len())?;
    for diagnostic in heap.diagnostics() {
        w.i32(diagnostic.kind.id())?;
        w.u64(diagnostic.address)?;
        w.u32(diagnostic.gc_id)?;
    }

    debug!("Snapshot: {} prototypes, {} objects", prototypes.list.len(), written);
    Ok(())
}

/// **Private** - returns the number of objects written
fn write_space<W: Write>(
    w: &mut DataWriter<W>,
    heap: &HeapModel,
    space: &Space,
    prototypes: &Prototypes,
) -> Result<usize, SnapshotError> {
    w.u32(space.index)?;
    w.utf(&space.name)?;
    w.u64(space.start)?;
    w.u64(space.length)?;
    w.i32(space.kind.map_or(-1, |kind| kind.id()))?;
    w.i32(space.mode.map_or(-1, |mode| mode.id()))?;

    let mut written = 0;
    w.len(space.lab_count())?;
    for lab in space.labs() {
        written += write_lab(w, heap, lab, prototypes)?;
    }
    Ok(written)
}

fn write_lab<W: Write>(
    w: &mut DataWriter<W>,
    heap: &HeapModel,
    lab: &Lab,
    prototypes: &Prototypes,
) -> Result<usize, SnapshotError> {
    w.u64(lab.thread)?;
    w.i32(lab.kind.id())?;
    w.i32(lab.state.id())?;
    w.u64(lab.addr)?;
    w.u64(lab.capacity)?;

    let objects: Vec<ObjectIndex> = heap.objects_in(lab.addr, lab.end()).map(|(_, index)| index).collect();
    w.len(objects.len())?;
    for index in &objects {
        let Some(object) = heap.object(*index) else {
            return Err(SnapshotError::Corrupt(format!("address map names removed object {}", index)));
        };
        w.u32(index.0)?;
        w.len(prototypes.id_of(object.site_id, object.type_id, object.event))?;
        w.u64(object.address)?;
        w.u64(object.size)?;
        w.i32(object.array_length.map_or(-1, |len| len as i32))?;
        w.u32(object.born)?;

        match object.pointers_to() {
            None => w.i32(-1)?,
            Some(pointers) => {
                w.len(pointers.len())?;
                for pointer in pointers {
                    w.i32(pointer.map_or(-1, |target| target.0 as i32))?;
                }
            }
        }
    }
    Ok(objects.len())
}

fn write_gc_info<W: Write>(w: &mut DataWriter<W>, info: &GcInfo) -> Result<(), SnapshotError> {
    w.i32(info.event.id())?;
    w.i32(info.gc_type.id())?;
    w.u32(info.cause.id)?;
    w.utf(&info.cause.name)?;
    w.u32(info.id)?;
    w.u64(info.time)?;
    w.bool(info.concurrent)?;
    w.bool(info.failed)
}

fn write_root_info<W: Write>(w: &mut DataWriter<W>, info: &RootInfo) -> Result<(), SnapshotError> {
    match info {
        RootInfo::None => w.i32(0),
        RootInfo::ClassLoader { name } => {
            w.i32(1)?;
            w.utf(name)
        }
        RootInfo::Class { class_id } => {
            w.i32(2)?;
            w.u32(*class_id)
        }
        RootInfo::StaticField { class_id, offset } => {
            w.i32(3)?;
            w.u32(*class_id)?;
            w.u32(*offset)
        }
        RootInfo::LocalVariable {
            thread_id,
            class_id,
            method_id,
            slot,
        } => {
            w.i32(4)?;
            w.u64(*thread_id)?;
            w.u32(*class_id)?;
            w.u32(*method_id)?;
            w.u32(*slot)
        }
        RootInfo::Thread { thread_id } => {
            w.i32(5)?;
            w.u64(*thread_id)
        }
        RootInfo::CodeBlob { class_id, method_id } => {
            w.i32(6)?;
            w.u32(*class_id)?;
            w.u32(*method_id)
        }
        RootInfo::JniGlobal { weak } => {
            w.i32(7)?;
            w.bool(*weak)
        }
        RootInfo::Debug { call } => {
            w.i32(8)?;
            w.utf(call)
        }
    }
}

/// Distinct (site, type, event) triples, numbered in order of first use
struct Prototypes {
    list: Vec<(u32, u32, EventType)>,
    ids: HashMap<(u32, u32, EventType), usize>,
}

impl Prototypes {
    fn collect(heap: &HeapModel) -> Self {
        let mut prototypes = Self {
            list: Vec::new(),
            ids: HashMap::new(),
        };
        for (_, object) in heap.objects() {
            let key = (object.site_id, object.type_id, object.event);
            if !prototypes.ids.contains_key(&key) {
                prototypes.ids.insert(key, prototypes.list.len());
                prototypes.list.push(key);
            }
        }
        prototypes
    }

    fn id_of(&self, site: u32, type_id: u32, event: EventType) -> usize {
        self.ids.get(&(site, type_id, event)).copied().unwrap_or_default()
    }
}

/// Big-endian primitive writer
struct DataWriter<W: Write> {
    out: W,
}

impl<W: Write> DataWriter<W> {
    fn i32(&mut self, value: i32) -> Result<(), SnapshotError> {
        self.out.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn u32(&mut self, value: u32) -> Result<(), SnapshotError> {
        self.i32(value as i32)
    }

    fn u64(&mut self, value: u64) -> Result<(), SnapshotError> {
        self.out.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn bool(&mut self, value: bool) -> Result<(), SnapshotError> {
        self.out.write_all(&[value as u8])?;
        Ok(())
    }

    /// Counts and ids are stored as i32
    fn len(&mut self, value: usize) -> Result<(), SnapshotError> {
        let value = i32::try_from(value).map_err(|_| SnapshotError::Corrupt(format!("count {} overflows", value)))?;
        self.i32(value)
    }

    /// u16 length prefix, then UTF-8 bytes
    fn utf(&mut self, value: &str) -> Result<(), SnapshotError> {
        let len = u16::try_from(value.len())
            .map_err(|_| SnapshotError::Corrupt(format!("string of {} bytes is too long", value.len())))?;
        self.out.write_all(&len.to_be_bytes())?;
        self.out.write_all(value.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{HeapObject, SpaceKind, SpaceMode};
    use crate::symbols::Symbols;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn heap_with_object() -> HeapModel {
        let mut heap = HeapModel::new(Arc::new(Symbols::default()));
        heap.add_space(Space::new(0, 0x1000, 0x1000)).unwrap();
        heap.alloc_space(0, SpaceKind::Old, SpaceMode::Normal).unwrap();
        heap.ensure_lab(1, 0x1000, 16).unwrap();
        heap.insert_object(HeapObject::new(0x1000, 1, 2, EventType::ObjAllocSlow, 0, 16, None))
            .unwrap();
        heap
    }

    #[test]
    fn test_header_is_big_endian() {
        let mut bytes = Vec::new();
        write_heap(&heap_with_object(), &mut bytes).unwrap();

        assert_eq!(&bytes[0..4], &SNAPSHOT_MAGIC.to_be_bytes());
        assert_eq!(&bytes[4..8], &SNAPSHOT_VERSION.to_be_bytes());
    }

    #[test]
    fn test_object_outside_labs_is_rejected() {
        let mut heap = heap_with_object();
        heap.clear_labs(&[0]);

        let err = write_heap(&heap, Vec::new()).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt(_)));
    }

    #[test]
    fn test_write_snapshot_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("heap.snap");

        write_snapshot(&heap_with_object(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_directory_path_is_rejected() {
        let dir = tempdir().unwrap();
        let err = write_snapshot(&heap_with_object(), dir.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidPath(_)));
    }
}
