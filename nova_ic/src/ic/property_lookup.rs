// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::heap::indexes::{InvalidationCell, Object, PropertyBox, Shape};

/// Queries the inline caches make of the object model.
pub trait ObjectModel {
    fn shape_of(&self, object: Object) -> Shape;

    /// Returns true for Array exotic objects.
    fn is_array(&self, object: Object) -> bool;

    /// Returns true if objects of this shape keep their elements in a
    /// dictionary.
    fn is_dictionary_element(&self, shape: Shape) -> bool;

    /// Translate the index of an in-object property into its word offset
    /// inside an object of the given shape.
    fn inlined_index_of(&self, shape: Shape, raw_index: u32) -> u32;

    /// Get the prototype chain invalidation cell of a shape, creating a
    /// fresh one if the shape has none or its current cell has already
    /// been invalidated.
    fn enable_prototype_invalidation_cell(&mut self, shape: Shape) -> InvalidationCell;

    fn invalidation_cell_has_changed(&self, cell: InvalidationCell) -> bool;
}

/// Where the value of a found property lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupValue {
    /// Stored directly in the holder's property storage.
    Plain,
    /// Stored in a shared property box.
    PropertyBox(PropertyBox),
}

/// Summary of a completed slow path property lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyLookupResult {
    pub is_found: bool,
    /// False for dictionary-mode, proxy and other exotic receivers; such
    /// lookups must not be cached.
    pub is_fast_mode: bool,
    pub is_accessor_descriptor: bool,
    pub is_element: bool,
    pub is_inlined_props: bool,
    /// Index of the property among the in-object or out-of-line property
    /// slots of the holder.
    pub storage_index: u32,
    /// Object that owns the property. Equal to the receiver for own
    /// properties and None if the property was not found.
    pub holder: Option<Object>,
    pub receiver: Object,
    pub value: LookupValue,
    pub is_on_prototype: bool,
    /// The lookup performed a store that added a new property and moved
    /// the receiver to a new shape.
    pub is_transition: bool,
}

impl PropertyLookupResult {
    pub fn not_found(receiver: Object) -> Self {
        Self {
            is_found: false,
            is_fast_mode: true,
            is_accessor_descriptor: false,
            is_element: false,
            is_inlined_props: false,
            storage_index: 0,
            holder: None,
            receiver,
            value: LookupValue::Plain,
            is_on_prototype: false,
            is_transition: false,
        }
    }

    /// Own data property of the receiver.
    pub fn own_field(receiver: Object, storage_index: u32, is_inlined_props: bool) -> Self {
        Self {
            is_found: true,
            is_inlined_props,
            storage_index,
            holder: Some(receiver),
            ..Self::not_found(receiver)
        }
    }

    /// Integer-indexed element of the receiver.
    pub fn element(receiver: Object, is_found: bool) -> Self {
        Self {
            is_found,
            is_element: true,
            holder: is_found.then_some(receiver),
            ..Self::not_found(receiver)
        }
    }

    /// The property was found on the given prototype instead.
    pub fn on_prototype(mut self, holder: Object) -> Self {
        debug_assert!(self.is_found);
        self.holder = Some(holder);
        self.is_on_prototype = true;
        self
    }

    pub fn accessor(mut self) -> Self {
        self.is_accessor_descriptor = true;
        self
    }

    pub fn boxed(mut self, property_box: PropertyBox) -> Self {
        self.value = LookupValue::PropertyBox(property_box);
        self
    }

    pub fn transition(mut self) -> Self {
        self.is_transition = true;
        self
    }

    pub fn dictionary_mode(mut self) -> Self {
        self.is_fast_mode = false;
        self
    }
}
