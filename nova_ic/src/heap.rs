// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Reference heap
//!
//! A minimal index-addressed heap hosting the values inline caches refer
//! to. Every value lives in a `Vec<Option<T>>` and is addressed by a
//! [`BaseIndex`](indexes::BaseIndex). Garbage collection empties the slots
//! of unreachable values without compacting, so a weak reference is live
//! exactly as long as its slot is occupied.

mod heap_bits;
mod heap_gc;
pub mod indexes;
pub mod object;
pub mod weak_reference;

use core::{
    hash::{Hash, Hasher},
    ops::{Index, IndexMut},
};

use ahash::AHasher;
use hashbrown::{HashTable, hash_table::Entry};

pub use heap_bits::{HeapMarkAndSweep, WorkQueues};

use crate::ic::{
    ObjectModel,
    handler::{PrototypeHandlerRecord, TransitionHandlerRecord},
};

use self::{
    indexes::{
        InvalidationCell, Object, PropertyBox, PropertyKey, PrototypeHandler, Shape,
        TransitionHandler,
    },
    object::{
        InvalidationCellHeapData, ObjectHeapData, PropertyBoxHeapData, PropertyKeyHeapData,
        ShapeHeapData,
    },
    weak_reference::{WeakReference, WeakReferences},
};

#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) objects: Vec<Option<ObjectHeapData>>,
    pub(crate) shapes: Vec<Option<ShapeHeapData>>,
    pub(crate) property_keys: Vec<Option<PropertyKeyHeapData>>,
    pub(crate) property_boxes: Vec<Option<PropertyBoxHeapData>>,
    pub(crate) invalidation_cells: Vec<Option<InvalidationCellHeapData>>,
    pub(crate) prototype_handlers: Vec<Option<PrototypeHandlerRecord>>,
    pub(crate) transition_handlers: Vec<Option<TransitionHandlerRecord>>,
    /// Interning table of live property keys. Does not keep keys alive.
    pub(crate) property_key_table: HashTable<PropertyKey>,
}

pub trait CreateHeapData<T, F> {
    /// Allocates the given data on the heap and returns its handle.
    fn create(&mut self, data: T) -> F;
}

fn hash_property_key_name(name: &str) -> u64 {
    let mut hasher = AHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the interned property key for the given name.
    pub fn property_key(&mut self, name: &str) -> PropertyKey {
        let Self {
            property_keys,
            property_key_table,
            ..
        } = self;
        let hash = hash_property_key_name(name);
        let entry = property_key_table.entry(
            hash,
            |key| {
                property_keys[key.into_index()]
                    .as_ref()
                    .is_some_and(|data| data.as_str() == name)
            },
            |key| {
                property_keys[key.into_index()]
                    .as_ref()
                    .map_or(0, |data| hash_property_key_name(data.as_str()))
            },
        );
        match entry {
            Entry::Occupied(occupied) => *occupied.get(),
            Entry::Vacant(vacant) => {
                property_keys.push(Some(PropertyKeyHeapData { name: name.into() }));
                let key = PropertyKey::last(property_keys);
                vacant.insert(key);
                key
            }
        }
    }

    pub fn set_shape(&mut self, object: Object, shape: Shape) {
        self[object].shape = shape;
    }

    /// Record that the prototype chain layout seen by objects of the given
    /// shape has changed, invalidating every prototype handler built for it.
    pub fn mark_prototype_chain_changed(&mut self, shape: Shape) {
        if let Some(cell) = self[shape].invalidation_cell {
            self[cell].has_changed = true;
        }
    }

    /// Run a full garbage collection. Everything not reachable from `roots`
    /// is freed, and weak references to freed values are cleared.
    pub fn collect(&mut self, roots: &[&dyn HeapMarkAndSweep]) {
        heap_gc::heap_gc(self, roots);
    }

    /// Returns true if the given handle refers to a live value.
    pub fn is_live<T>(&self, handle: indexes::BaseIndex<T>) -> bool
    where
        Self: HeapVector<T>,
    {
        self.heap_vector()
            .get(handle.into_index())
            .is_some_and(Option::is_some)
    }
}

/// Access to the backing vector of a heap value type.
pub trait HeapVector<T> {
    fn heap_vector(&self) -> &[Option<T>];
}

macro_rules! impl_heap_data {
    ($field: ident, $data: ty, $handle: ty, $name: literal) => {
        impl HeapVector<$data> for Heap {
            fn heap_vector(&self) -> &[Option<$data>] {
                &self.$field
            }
        }

        impl CreateHeapData<$data, $handle> for Heap {
            fn create(&mut self, data: $data) -> $handle {
                self.$field.push(Some(data));
                <$handle>::last(&self.$field)
            }
        }

        impl Index<$handle> for Heap {
            type Output = $data;

            fn index(&self, index: $handle) -> &Self::Output {
                self.$field
                    .get(index.into_index())
                    .expect(concat!($name, " out of bounds"))
                    .as_ref()
                    .expect(concat!($name, " slot empty"))
            }
        }

        impl IndexMut<$handle> for Heap {
            fn index_mut(&mut self, index: $handle) -> &mut Self::Output {
                self.$field
                    .get_mut(index.into_index())
                    .expect(concat!($name, " out of bounds"))
                    .as_mut()
                    .expect(concat!($name, " slot empty"))
            }
        }
    };
}

impl_heap_data!(objects, ObjectHeapData, Object, "Object");
impl_heap_data!(shapes, ShapeHeapData, Shape, "Shape");
impl_heap_data!(property_keys, PropertyKeyHeapData, PropertyKey, "PropertyKey");
impl_heap_data!(property_boxes, PropertyBoxHeapData, PropertyBox, "PropertyBox");
impl_heap_data!(
    invalidation_cells,
    InvalidationCellHeapData,
    InvalidationCell,
    "InvalidationCell"
);
impl_heap_data!(
    prototype_handlers,
    PrototypeHandlerRecord,
    PrototypeHandler,
    "PrototypeHandler"
);
impl_heap_data!(
    transition_handlers,
    TransitionHandlerRecord,
    TransitionHandler,
    "TransitionHandler"
);

impl WeakReferences<Shape> for Heap {
    fn create_weak_reference(&mut self, value: Shape) -> WeakReference<Shape> {
        debug_assert!(self.is_live(value));
        WeakReference(value)
    }

    fn resolve_weak_reference(&self, weak: WeakReference<Shape>) -> Option<Shape> {
        self.is_live(weak.0).then_some(weak.0)
    }
}

impl WeakReferences<PropertyKey> for Heap {
    fn create_weak_reference(&mut self, value: PropertyKey) -> WeakReference<PropertyKey> {
        debug_assert!(self.is_live(value));
        WeakReference(value)
    }

    fn resolve_weak_reference(&self, weak: WeakReference<PropertyKey>) -> Option<PropertyKey> {
        self.is_live(weak.0).then_some(weak.0)
    }
}

impl ObjectModel for Heap {
    fn shape_of(&self, object: Object) -> Shape {
        self[object].shape
    }

    fn is_array(&self, object: Object) -> bool {
        self[object].is_array
    }

    fn is_dictionary_element(&self, shape: Shape) -> bool {
        self[shape].dictionary_elements
    }

    fn inlined_index_of(&self, shape: Shape, raw_index: u32) -> u32 {
        self[shape].inlined_properties_start + raw_index
    }

    fn enable_prototype_invalidation_cell(&mut self, shape: Shape) -> InvalidationCell {
        let current = self[shape].invalidation_cell;
        match current {
            Some(cell) if !self[cell].has_changed() => cell,
            _ => {
                let cell = self.create(InvalidationCellHeapData::default());
                self[shape].invalidation_cell = Some(cell);
                cell
            }
        }
    }

    fn invalidation_cell_has_changed(&self, cell: InvalidationCell) -> bool {
        self[cell].has_changed()
    }
}

#[cfg(test)]
mod test {
    use super::{CreateHeapData, Heap};
    use crate::{
        heap::{
            object::{ObjectHeapData, ShapeHeapData},
            weak_reference::WeakReference,
        },
        ic::ObjectModel,
    };

    #[test]
    fn property_keys_are_interned() {
        let mut heap = Heap::new();
        let x = heap.property_key("x");
        let y = heap.property_key("y");
        assert_ne!(x, y);
        assert_eq!(heap.property_key("x"), x);
        assert_eq!(heap[y].as_str(), "y");
    }

    #[test]
    fn invalidation_cell_is_replaced_after_a_change() {
        let mut heap = Heap::new();
        let shape = heap.create(ShapeHeapData::new(None));
        let cell = heap.enable_prototype_invalidation_cell(shape);
        assert_eq!(heap.enable_prototype_invalidation_cell(shape), cell);
        heap.mark_prototype_chain_changed(shape);
        assert!(heap.invalidation_cell_has_changed(cell));
        let fresh = heap.enable_prototype_invalidation_cell(shape);
        assert_ne!(fresh, cell);
        assert!(!heap.invalidation_cell_has_changed(fresh));
    }

    #[test]
    fn collection_clears_unreachable_shapes() {
        let mut heap = Heap::new();
        let kept = heap.create(ShapeHeapData::new(None));
        let dropped = heap.create(ShapeHeapData::new(None));
        let object = heap.create(ObjectHeapData::new(kept));
        let weak_kept = WeakReference::new(&mut heap, kept);
        let weak_dropped = WeakReference::new(&mut heap, dropped);
        let key = heap.property_key("temporary");
        let weak_key = WeakReference::new(&mut heap, key);

        heap.collect(&[&object]);

        assert_eq!(weak_kept.resolve(&heap), Some(kept));
        assert_eq!(weak_dropped.resolve(&heap), None);
        assert_eq!(weak_key.resolve(&heap), None);
        assert_eq!(heap.shape_of(object), kept);
        // A swept key is no longer interned.
        let fresh = heap.property_key("temporary");
        assert_ne!(fresh, key);
        assert!(heap.is_live(fresh));
        assert!(!heap.is_live(key));
    }
}
