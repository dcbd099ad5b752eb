// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heap data of the object model values that inline caches point at.
//!
//! Only the parts of objects and shapes that the caches observe are kept
//! here; property storage itself lives elsewhere.

use super::{
    heap_bits::{HeapMarkAndSweep, WorkQueues},
    indexes::{InvalidationCell, Object, Shape},
};

#[derive(Debug, Clone)]
pub struct ObjectHeapData {
    pub shape: Shape,
    /// Array exotic objects need their `length` adjusted on element stores.
    pub is_array: bool,
}

impl ObjectHeapData {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            is_array: false,
        }
    }

    pub fn new_array(shape: Shape) -> Self {
        Self {
            shape,
            is_array: true,
        }
    }
}

/// Data structure describing the shape of an object.
#[derive(Debug, Clone)]
pub struct ShapeHeapData {
    pub prototype: Option<Object>,
    /// Word offset of the first in-object property slot, counted from the
    /// start of the object. In-object property `n` lives at word
    /// `inlined_properties_start + n`.
    pub inlined_properties_start: u32,
    /// Elements are stored in a dictionary rather than a dense vector.
    pub dictionary_elements: bool,
    /// Prototype chain change marker, created lazily when the first
    /// prototype handler is built for this shape.
    pub(crate) invalidation_cell: Option<InvalidationCell>,
}

impl ShapeHeapData {
    /// Number of header words preceding the in-object properties of an
    /// ordinary object.
    pub const DEFAULT_INLINED_PROPERTIES_START: u32 = 2;

    pub fn new(prototype: Option<Object>) -> Self {
        Self {
            prototype,
            inlined_properties_start: Self::DEFAULT_INLINED_PROPERTIES_START,
            dictionary_elements: false,
            invalidation_cell: None,
        }
    }

    pub fn with_inlined_properties_start(mut self, start: u32) -> Self {
        self.inlined_properties_start = start;
        self
    }

    pub fn with_dictionary_elements(mut self) -> Self {
        self.dictionary_elements = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PropertyKeyHeapData {
    pub(crate) name: Box<str>,
}

impl PropertyKeyHeapData {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

/// Shared storage cell of a dictionary-mode or global property. The value
/// itself is owned by the global object model; caches only hold the cell's
/// identity.
#[derive(Debug, Clone, Default)]
pub struct PropertyBoxHeapData;

/// Marker flipped by the object model when the prototype chain layout of a
/// shape changes. Inline caches only ever read it.
#[derive(Debug, Clone, Default)]
pub struct InvalidationCellHeapData {
    pub(crate) has_changed: bool,
}

impl InvalidationCellHeapData {
    pub fn has_changed(&self) -> bool {
        self.has_changed
    }
}

impl HeapMarkAndSweep for ObjectHeapData {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self { shape, is_array: _ } = self;
        shape.mark_values(queues);
    }
}

impl HeapMarkAndSweep for ShapeHeapData {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self {
            prototype,
            inlined_properties_start: _,
            dictionary_elements: _,
            invalidation_cell,
        } = self;
        prototype.mark_values(queues);
        invalidation_cell.mark_values(queues);
    }
}

impl HeapMarkAndSweep for PropertyKeyHeapData {
    fn mark_values(&self, _queues: &mut WorkQueues) {}
}

impl HeapMarkAndSweep for PropertyBoxHeapData {
    fn mark_values(&self, _queues: &mut WorkQueues) {}
}

impl HeapMarkAndSweep for InvalidationCellHeapData {
    fn mark_values(&self, _queues: &mut WorkQueues) {}
}
