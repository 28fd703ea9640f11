//! Arena storage for container values.
//!
//! Lists and maps are stored here and referenced from [`crate::value::Value`]
//! by [`HeapId`]. Keeping containers behind ids (rather than owning handles)
//! is what lets a Place carry a writable back-reference to a container slot
//! without fighting ownership: the same id can be read through one borrow and
//! written through another.
//!
//! The heap lives alongside the graph store for the duration of a machine:
//! entity contexts hold `HeapId`s into it, so both must be kept together.

use indexmap::IndexMap;

use crate::value::Value;

/// Unique identifier for a container stored in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

impl HeapId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("heap id overflow"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A heap-allocated container.
#[derive(Debug, Clone)]
pub enum HeapData {
    List(Vec<Value>),
    /// Insertion-ordered string-keyed mapping.
    Map(IndexMap<String, Value>),
}

/// Arena of container values for one machine.
///
/// Slots are never reclaimed during a run; containers are small and live as
/// long as the scope or entity context that references them.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<HeapData>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_list(&mut self, items: Vec<Value>) -> HeapId {
        let id = HeapId::new(self.slots.len());
        self.slots.push(HeapData::List(items));
        id
    }

    pub fn alloc_map(&mut self, map: IndexMap<String, Value>) -> HeapId {
        let id = HeapId::new(self.slots.len());
        self.slots.push(HeapData::Map(map));
        id
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.index()]
    }

    /// The list behind `id`.
    ///
    /// # Panics
    /// Panics if `id` names a map; callers check the value tag first.
    pub fn list(&self, id: HeapId) -> &Vec<Value> {
        match self.get(id) {
            HeapData::List(items) => items,
            HeapData::Map(_) => panic!("heap id is a map, expected a list"),
        }
    }

    pub fn list_mut(&mut self, id: HeapId) -> &mut Vec<Value> {
        match self.get_mut(id) {
            HeapData::List(items) => items,
            HeapData::Map(_) => panic!("heap id is a map, expected a list"),
        }
    }

    /// The map behind `id`.
    ///
    /// # Panics
    /// Panics if `id` names a list; callers check the value tag first.
    pub fn map(&self, id: HeapId) -> &IndexMap<String, Value> {
        match self.get(id) {
            HeapData::Map(map) => map,
            HeapData::List(_) => panic!("heap id is a list, expected a map"),
        }
    }

    pub fn map_mut(&mut self, id: HeapId) -> &mut IndexMap<String, Value> {
        match self.get_mut(id) {
            HeapData::Map(map) => map,
            HeapData::List(_) => panic!("heap id is a list, expected a map"),
        }
    }
}
