//! Read-only query surface for consumers of a reconstructed heap.

use super::model::HeapModel;
use super::object::ObjectIndex;
use super::space::Space;
use crate::symbols::TypeInfo;

/// Object identity, type, size and adjacency lookups
pub trait HeapQuery {
    /// Number of live objects
    fn object_count(&self) -> usize;

    fn get_type(&self, index: ObjectIndex) -> Option<&TypeInfo>;

    fn get_address(&self, index: ObjectIndex) -> Option<u64>;

    fn get_size(&self, index: ObjectIndex) -> Option<u64>;

    /// Outgoing pointers; `None` when the object's pointers were never reported
    fn get_to_pointers(&self, index: ObjectIndex) -> Option<&[Option<ObjectIndex>]>;

    /// Objects pointing at `index`
    fn get_from_pointers(&self, index: ObjectIndex) -> Option<&[ObjectIndex]>;

    /// The space the object currently lives in
    fn get_space(&self, index: ObjectIndex) -> Option<&Space>;

    /// Id of the GC the object was allocated after
    fn get_born(&self, index: ObjectIndex) -> Option<u32>;

    fn to_index(&self, address: u64) -> Option<ObjectIndex>;
}

impl HeapQuery for HeapModel {
    fn object_count(&self) -> usize {
        self.live_objects()
    }

    fn get_type(&self, index: ObjectIndex) -> Option<&TypeInfo> {
        let object = self.object(index)?;
        self.symbols().type_by_id(object.type_id)
    }

    fn get_address(&self, index: ObjectIndex) -> Option<u64> {
        self.object(index).map(|o| o.address)
    }

    fn get_size(&self, index: ObjectIndex) -> Option<u64> {
        self.object(index).map(|o| o.size)
    }

    fn get_to_pointers(&self, index: ObjectIndex) -> Option<&[Option<ObjectIndex>]> {
        self.object(index)?.pointers_to()
    }

    fn get_from_pointers(&self, index: ObjectIndex) -> Option<&[ObjectIndex]> {
        self.object(index).map(|o| o.pointed_from())
    }

    fn get_space(&self, index: ObjectIndex) -> Option<&Space> {
        let address = self.object(index)?.address;
        self.space_containing(address)
    }

    fn get_born(&self, index: ObjectIndex) -> Option<u32> {
        self.object(index).map(|o| o.born)
    }

    fn to_index(&self, address: u64) -> Option<ObjectIndex> {
        self.object_at(address).map(|(index, _)| index)
    }
}
