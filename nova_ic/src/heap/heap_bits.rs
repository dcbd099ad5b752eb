// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{
    Heap,
    indexes::{
        InvalidationCell, Object, PropertyBox, PropertyKey, PrototypeHandler, Shape,
        TransitionHandler,
    },
};

#[derive(Debug)]
pub(crate) struct HeapBits {
    pub objects: Box<[bool]>,
    pub shapes: Box<[bool]>,
    pub property_keys: Box<[bool]>,
    pub property_boxes: Box<[bool]>,
    pub invalidation_cells: Box<[bool]>,
    pub prototype_handlers: Box<[bool]>,
    pub transition_handlers: Box<[bool]>,
}

#[derive(Debug)]
pub struct WorkQueues {
    pub objects: Vec<Object>,
    pub shapes: Vec<Shape>,
    pub property_keys: Vec<PropertyKey>,
    pub property_boxes: Vec<PropertyBox>,
    pub invalidation_cells: Vec<InvalidationCell>,
    pub prototype_handlers: Vec<PrototypeHandler>,
    pub transition_handlers: Vec<TransitionHandler>,
}

impl HeapBits {
    pub(crate) fn new(heap: &Heap) -> Self {
        Self {
            objects: vec![false; heap.objects.len()].into_boxed_slice(),
            shapes: vec![false; heap.shapes.len()].into_boxed_slice(),
            property_keys: vec![false; heap.property_keys.len()].into_boxed_slice(),
            property_boxes: vec![false; heap.property_boxes.len()].into_boxed_slice(),
            invalidation_cells: vec![false; heap.invalidation_cells.len()].into_boxed_slice(),
            prototype_handlers: vec![false; heap.prototype_handlers.len()].into_boxed_slice(),
            transition_handlers: vec![false; heap.transition_handlers.len()].into_boxed_slice(),
        }
    }
}

impl WorkQueues {
    pub(crate) fn new(heap: &Heap) -> Self {
        Self {
            objects: Vec::with_capacity(heap.objects.len() / 4),
            shapes: Vec::with_capacity(heap.shapes.len() / 4),
            property_keys: Vec::with_capacity(heap.property_keys.len() / 4),
            property_boxes: Vec::with_capacity(heap.property_boxes.len() / 4),
            invalidation_cells: Vec::with_capacity(heap.invalidation_cells.len() / 4),
            prototype_handlers: Vec::with_capacity(heap.prototype_handlers.len() / 4),
            transition_handlers: Vec::with_capacity(heap.transition_handlers.len() / 4),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
            && self.shapes.is_empty()
            && self.property_keys.is_empty()
            && self.property_boxes.is_empty()
            && self.invalidation_cells.is_empty()
            && self.prototype_handlers.is_empty()
            && self.transition_handlers.is_empty()
    }
}

/// Strong tracing of heap values.
///
/// Implementors push every value they hold strongly onto the work queues.
/// Weakly held values must not be pushed.
pub trait HeapMarkAndSweep {
    fn mark_values(&self, queues: &mut WorkQueues);
}

impl<T: HeapMarkAndSweep + ?Sized> HeapMarkAndSweep for &T {
    fn mark_values(&self, queues: &mut WorkQueues) {
        (**self).mark_values(queues);
    }
}

impl<T: HeapMarkAndSweep> HeapMarkAndSweep for Option<T> {
    fn mark_values(&self, queues: &mut WorkQueues) {
        if let Some(value) = self {
            value.mark_values(queues);
        }
    }
}

impl<T: HeapMarkAndSweep> HeapMarkAndSweep for [T] {
    fn mark_values(&self, queues: &mut WorkQueues) {
        self.iter().for_each(|value| value.mark_values(queues));
    }
}

impl<T: HeapMarkAndSweep> HeapMarkAndSweep for Vec<T> {
    fn mark_values(&self, queues: &mut WorkQueues) {
        self.as_slice().mark_values(queues);
    }
}

impl<T: HeapMarkAndSweep> HeapMarkAndSweep for Box<[T]> {
    fn mark_values(&self, queues: &mut WorkQueues) {
        self.as_ref().mark_values(queues);
    }
}

macro_rules! impl_mark_handle {
    ($handle: ty, $queue: ident) => {
        impl HeapMarkAndSweep for $handle {
            fn mark_values(&self, queues: &mut WorkQueues) {
                queues.$queue.push(*self);
            }
        }
    };
}

impl_mark_handle!(Object, objects);
impl_mark_handle!(Shape, shapes);
impl_mark_handle!(PropertyKey, property_keys);
impl_mark_handle!(PropertyBox, property_boxes);
impl_mark_handle!(InvalidationCell, invalidation_cells);
impl_mark_handle!(PrototypeHandler, prototype_handlers);
impl_mark_handle!(TransitionHandler, transition_handlers);
