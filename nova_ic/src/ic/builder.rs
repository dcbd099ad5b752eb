// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### Handler construction
//!
//! Turns a completed [`PropertyLookupResult`] into a [`Handler`] that the
//! dispatch loop can apply directly the next time it sees the same
//! receiver shape. Every builder returns None when the property location
//! cannot be expressed in a [`HandlerInfo`]; the site is then left
//! uncached.
//!
//! Building a handler from a lookup that was not in fast mode is a bug in
//! the caller.
//!
//! [`Handler`]: super::handler::Handler

use crate::heap::{
    CreateHeapData,
    indexes::{Object, PrototypeHandler, Shape, TransitionHandler},
};

use super::{
    handler::{HandlerInfo, PlainHandler, PrototypeHandlerRecord, TransitionHandlerRecord},
    property_lookup::{LookupValue, ObjectModel, PropertyLookupResult},
};

pub fn build_load_handler(
    model: &impl ObjectModel,
    lookup: &PropertyLookupResult,
) -> Option<PlainHandler> {
    debug_assert!(!lookup.is_element);
    if !lookup.is_found {
        return Some(PlainHandler::Packed(HandlerInfo::new_non_exist()));
    }
    debug_assert!(lookup.is_fast_mode, "load handler built from a slow lookup");
    let holder = lookup.holder.unwrap_or(lookup.receiver);
    build_property_handler(model, lookup, holder)
}

pub fn build_load_element_handler() -> HandlerInfo {
    HandlerInfo::new_element(false)
}

pub fn build_store_handler(
    model: &impl ObjectModel,
    lookup: &PropertyLookupResult,
) -> Option<PlainHandler> {
    debug_assert!(lookup.is_fast_mode, "store handler built from a slow lookup");
    if lookup.is_element {
        return Some(PlainHandler::Packed(build_store_element_handler(
            model,
            lookup.receiver,
        )));
    }
    debug_assert!(lookup.is_found);
    // In-object offsets of a store are always relative to the receiver,
    // including after a transition.
    build_property_handler(model, lookup, lookup.receiver)
}

pub fn build_store_element_handler(model: &impl ObjectModel, receiver: Object) -> HandlerInfo {
    HandlerInfo::new_element(model.is_array(receiver))
}

fn build_property_handler(
    model: &impl ObjectModel,
    lookup: &PropertyLookupResult,
    layout_object: Object,
) -> Option<PlainHandler> {
    if let LookupValue::PropertyBox(property_box) = lookup.value {
        return Some(PlainHandler::PropertyBox(property_box));
    }
    let offset = if lookup.is_inlined_props {
        let shape = model.shape_of(layout_object);
        model.inlined_index_of(shape, lookup.storage_index)
    } else {
        lookup.storage_index
    };
    HandlerInfo::new_field(
        lookup.is_accessor_descriptor,
        lookup.is_inlined_props,
        offset,
    )
    .map(PlainHandler::Packed)
}

/// Handler for a property that lives on the prototype chain, or that
/// does not exist at all.
pub fn build_prototype_load_handler<H>(
    host: &mut H,
    lookup: &PropertyLookupResult,
    receiver_shape: Shape,
) -> Option<PrototypeHandler>
where
    H: ObjectModel + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>,
{
    let handler_info = build_load_handler(&*host, lookup)?;
    let holder = if lookup.is_found { lookup.holder } else { None };
    Some(create_prototype_handler(
        host,
        handler_info,
        holder,
        receiver_shape,
    ))
}

/// Handler for a store that resolved to a setter on the prototype chain.
pub fn build_prototype_store_handler<H>(
    host: &mut H,
    lookup: &PropertyLookupResult,
    receiver_shape: Shape,
) -> Option<PrototypeHandler>
where
    H: ObjectModel + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>,
{
    debug_assert!(lookup.is_on_prototype);
    let handler_info = build_store_handler(&*host, lookup)?;
    Some(create_prototype_handler(
        host,
        handler_info,
        lookup.holder,
        receiver_shape,
    ))
}

fn create_prototype_handler<H>(
    host: &mut H,
    handler_info: PlainHandler,
    holder: Option<Object>,
    receiver_shape: Shape,
) -> PrototypeHandler
where
    H: ObjectModel + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>,
{
    let invalidation_cell = host.enable_prototype_invalidation_cell(receiver_shape);
    host.create(PrototypeHandlerRecord {
        handler_info,
        holder,
        invalidation_cell,
    })
}

/// Handler for a store that added a new property. The receiver must
/// already have its post-store shape.
pub fn build_transition_handler<H>(
    host: &mut H,
    lookup: &PropertyLookupResult,
) -> Option<TransitionHandler>
where
    H: ObjectModel + CreateHeapData<TransitionHandlerRecord, TransitionHandler>,
{
    debug_assert!(lookup.is_transition);
    let handler_info = match build_store_handler(&*host, lookup)? {
        PlainHandler::Packed(handler_info) => handler_info,
        PlainHandler::PropertyBox(_) => {
            debug_assert!(false, "transitioning store into a property box");
            return None;
        }
    };
    let transition_shape = host.shape_of(lookup.receiver);
    Some(host.create(TransitionHandlerRecord {
        handler_info,
        transition_shape,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        heap::{
            Heap,
            object::{ObjectHeapData, PropertyBoxHeapData, ShapeHeapData},
        },
        ic::handler::HandlerKind,
    };

    fn ordinary_object(heap: &mut Heap, prototype: Option<Object>) -> Object {
        let shape = heap.create(ShapeHeapData::new(prototype));
        heap.create(ObjectHeapData::new(shape))
    }

    #[test]
    fn missing_property_loads_as_non_exist() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let handler = build_load_handler(&heap, &PropertyLookupResult::not_found(receiver));
        let Some(PlainHandler::Packed(info)) = handler else {
            panic!("expected a packed handler");
        };
        assert_eq!(info.kind(), HandlerKind::NonExist);
    }

    #[test]
    fn inlined_field_offset_goes_through_the_shape() {
        let mut heap = Heap::new();
        let shape = heap.create(ShapeHeapData::new(None).with_inlined_properties_start(4));
        let receiver = heap.create(ObjectHeapData::new(shape));
        let lookup = PropertyLookupResult::own_field(receiver, 3, true);
        let Some(PlainHandler::Packed(info)) = build_load_handler(&heap, &lookup) else {
            panic!("expected a packed handler");
        };
        assert!(info.is_field());
        assert!(info.is_inlined_props());
        assert!(!info.is_accessor());
        assert_eq!(info.offset(), 7);

        let out_of_line = PropertyLookupResult::own_field(receiver, 3, false);
        let Some(PlainHandler::Packed(info)) = build_store_handler(&heap, &out_of_line) else {
            panic!("expected a packed handler");
        };
        assert!(!info.is_inlined_props());
        assert_eq!(info.offset(), 3);
    }

    #[test]
    fn accessor_and_boxed_properties() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let lookup = PropertyLookupResult::own_field(receiver, 0, false).accessor();
        let info = build_load_handler(&heap, &lookup);
        assert!(matches!(info, Some(PlainHandler::Packed(info)) if info.is_accessor()));

        let property_box = heap.create(PropertyBoxHeapData::default());
        let lookup = PropertyLookupResult::own_field(receiver, 0, false).boxed(property_box);
        assert_eq!(
            build_load_handler(&heap, &lookup),
            Some(PlainHandler::PropertyBox(property_box))
        );
    }

    #[test]
    fn oversized_offset_is_not_cached() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let lookup = PropertyLookupResult::own_field(receiver, HandlerInfo::MAX_OFFSET + 1, false);
        assert_eq!(build_load_handler(&heap, &lookup), None);
    }

    #[test]
    fn element_store_marks_arrays() {
        let mut heap = Heap::new();
        let shape = heap.create(ShapeHeapData::new(None));
        let array = heap.create(ObjectHeapData::new_array(shape));
        let plain = heap.create(ObjectHeapData::new(shape));
        let Some(PlainHandler::Packed(info)) =
            build_store_handler(&heap, &PropertyLookupResult::element(array, true))
        else {
            panic!("expected a packed handler");
        };
        assert!(info.is_element());
        assert!(info.is_receiver_array());
        assert!(!build_store_element_handler(&heap, plain).is_receiver_array());
        assert!(!build_load_element_handler().is_receiver_array());
    }

    #[test]
    fn prototype_handler_records_holder_and_cell() {
        let mut heap = Heap::new();
        let prototype = ordinary_object(&mut heap, None);
        let receiver = ordinary_object(&mut heap, Some(prototype));
        let receiver_shape = heap.shape_of(receiver);
        let lookup = PropertyLookupResult::own_field(prototype, 0, true).on_prototype(prototype);
        let lookup = PropertyLookupResult { receiver, ..lookup };

        let handler = build_prototype_load_handler(&mut heap, &lookup, receiver_shape).unwrap();
        let record = &heap[handler];
        assert_eq!(record.holder, Some(prototype));
        assert!(record.is_valid(&heap));
        let cell = record.invalidation_cell;
        assert_eq!(heap.enable_prototype_invalidation_cell(receiver_shape), cell);

        let missing = PropertyLookupResult::not_found(receiver);
        let handler = build_prototype_load_handler(&mut heap, &missing, receiver_shape).unwrap();
        assert_eq!(heap[handler].holder, None);
        assert_eq!(heap[handler].invalidation_cell, cell);
    }

    #[test]
    fn transition_records_post_store_shape() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let next_shape = heap.create(ShapeHeapData::new(None));
        heap.set_shape(receiver, next_shape);
        let lookup = PropertyLookupResult::own_field(receiver, 0, true).transition();
        let handler = build_transition_handler(&mut heap, &lookup).unwrap();
        assert_eq!(heap[handler].transition_shape, next_shape);
        assert!(heap[handler].handler_info.is_field());
    }
}
