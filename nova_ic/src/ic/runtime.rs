// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, trace};

use crate::heap::{
    CreateHeapData,
    indexes::{PropertyKey, PrototypeHandler, Shape, TransitionHandler},
    weak_reference::WeakReferences,
};

use super::{
    CacheAccessor, CacheSlotTable, IcKind, IcSite, IcState,
    builder::{
        build_load_element_handler, build_load_handler, build_prototype_load_handler,
        build_prototype_store_handler, build_store_handler, build_transition_handler,
    },
    handler::{Handler, PrototypeHandlerRecord, TransitionHandlerRecord},
    property_lookup::{LookupValue, ObjectModel, PropertyLookupResult},
};

/// Miss recorder of a single site.
///
/// After the slow path has resolved a property access that missed the
/// cache, the dispatch loop hands the lookup result to the site's runtime,
/// which builds a handler for it and installs it into the slot. Sites that
/// see accesses that cannot be cached are saturated.
///
/// `key` is the property key of computed-key sites. It is ignored by named
/// sites and by element accesses.
#[derive(Debug)]
pub struct IcRuntime<'a> {
    accessor: CacheAccessor<'a>,
}

impl<'a> IcRuntime<'a> {
    pub fn new(table: &'a mut CacheSlotTable, site: IcSite) -> Self {
        Self {
            accessor: table.accessor(site),
        }
    }

    pub fn kind(&self) -> IcKind {
        self.accessor.kind()
    }

    pub fn state(&self) -> IcState {
        self.accessor.state()
    }

    pub fn record_load_miss<H>(
        &mut self,
        host: &mut H,
        lookup: &PropertyLookupResult,
        key: Option<PropertyKey>,
    ) where
        H: ObjectModel
            + WeakReferences<Shape>
            + WeakReferences<PropertyKey>
            + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>,
    {
        if !self.accessor.options().ic_enabled {
            self.disable();
            return;
        }
        self.trace_miss(key);
        if lookup.is_found && !lookup.is_fast_mode {
            self.accessor.set_as_mega();
            return;
        }
        self.update_load_handler(host, lookup, key);
    }

    /// `receiver_shape` is the shape of the receiver before the store was
    /// performed.
    pub fn record_store_miss<H>(
        &mut self,
        host: &mut H,
        lookup: &PropertyLookupResult,
        receiver_shape: Shape,
        key: Option<PropertyKey>,
    ) where
        H: ObjectModel
            + WeakReferences<Shape>
            + WeakReferences<PropertyKey>
            + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>
            + CreateHeapData<TransitionHandlerRecord, TransitionHandler>,
    {
        if !self.accessor.options().ic_enabled {
            self.disable();
            return;
        }
        self.trace_miss(key);
        if !lookup.is_fast_mode {
            self.accessor.set_as_mega();
            return;
        }
        self.update_store_handler(host, lookup, receiver_shape, key);
    }

    fn update_load_handler<H>(
        &mut self,
        host: &mut H,
        lookup: &PropertyLookupResult,
        key: Option<PropertyKey>,
    ) where
        H: ObjectModel
            + WeakReferences<Shape>
            + WeakReferences<PropertyKey>
            + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>,
    {
        if self.state() == IcState::Mega {
            return;
        }
        let kind = self.kind();
        if !Self::is_cacheable_by_name(kind, lookup) {
            return;
        }
        let receiver_shape = host.shape_of(lookup.receiver);
        let handler: Option<Handler> = if lookup.is_element {
            if !lookup.is_found && host.is_dictionary_element(receiver_shape) {
                return;
            }
            Some(build_load_element_handler().into())
        } else if !lookup.is_found {
            build_prototype_load_handler(host, lookup, receiver_shape).map(Handler::from)
        } else if !lookup.is_on_prototype {
            build_load_handler(&*host, lookup).map(Handler::from)
        } else if kind.is_global() {
            return;
        } else {
            build_prototype_load_handler(host, lookup, receiver_shape).map(Handler::from)
        };
        let Some(handler) = handler else {
            trace!("{kind} miss left uncached: property offset out of range");
            return;
        };
        self.install(host, key, receiver_shape, handler, lookup.is_element);
    }

    fn update_store_handler<H>(
        &mut self,
        host: &mut H,
        lookup: &PropertyLookupResult,
        receiver_shape: Shape,
        key: Option<PropertyKey>,
    ) where
        H: ObjectModel
            + WeakReferences<Shape>
            + WeakReferences<PropertyKey>
            + CreateHeapData<PrototypeHandlerRecord, PrototypeHandler>
            + CreateHeapData<TransitionHandlerRecord, TransitionHandler>,
    {
        if self.state() == IcState::Mega {
            return;
        }
        let kind = self.kind();
        if !Self::is_cacheable_by_name(kind, lookup) {
            return;
        }
        let handler: Option<Handler> = if lookup.is_element {
            build_store_handler(&*host, lookup).map(Handler::from)
        } else {
            debug_assert!(lookup.is_found);
            if lookup.is_on_prototype {
                if kind.is_global() {
                    return;
                }
                build_prototype_store_handler(host, lookup, receiver_shape).map(Handler::from)
            } else if lookup.is_transition {
                build_transition_handler(host, lookup).map(Handler::from)
            } else {
                build_store_handler(&*host, lookup).map(Handler::from)
            }
        };
        let Some(handler) = handler else {
            trace!("{kind} miss left uncached: property offset out of range");
            return;
        };
        self.install(host, key, receiver_shape, handler, lookup.is_element);
    }

    fn install<H>(
        &mut self,
        host: &mut H,
        key: Option<PropertyKey>,
        receiver_shape: Shape,
        handler: Handler,
        is_element: bool,
    ) where
        H: WeakReferences<Shape> + WeakReferences<PropertyKey>,
    {
        let kind = self.kind();
        if kind.is_named() {
            debug_assert!(!kind.is_named_global() || matches!(handler, Handler::PropertyBox(_)));
            self.accessor
                .add_handler_without_key(host, receiver_shape, handler);
        } else if is_element {
            if kind.is_global() {
                return;
            }
            self.accessor
                .add_element_handler(host, receiver_shape, handler);
        } else if let Some(key) = key {
            self.accessor
                .add_handler_with_key(host, key, receiver_shape, handler);
        } else {
            debug_assert!(false, "{kind} miss recorded without a key");
        }
    }

    /// Named global sites only cache global bindings living in a property
    /// box.
    fn is_cacheable_by_name(kind: IcKind, lookup: &PropertyLookupResult) -> bool {
        !kind.is_named_global()
            || (lookup.is_found
                && !lookup.is_on_prototype
                && matches!(lookup.value, LookupValue::PropertyBox(_)))
    }

    fn disable(&mut self) {
        if self.state() != IcState::Mega {
            debug!("inline caches disabled, saturating {} site", self.kind());
        }
        self.accessor.set_as_mega();
    }

    fn trace_miss(&self, key: Option<PropertyKey>) {
        if !self.accessor.options().trace_misses {
            return;
        }
        match key {
            Some(key) => trace!(
                "{} miss key is: {:?}, state is {}",
                self.kind(),
                key,
                self.state()
            ),
            None => trace!("{} miss, state is {}", self.kind(), self.state()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::IcRuntime;
    use crate::{
        heap::{
            CreateHeapData, Heap,
            indexes::Object,
            object::{ObjectHeapData, PropertyBoxHeapData, ShapeHeapData},
        },
        ic::{
            CacheSlotTable, IcKind, IcSite, IcState, ObjectModel, PropertyLookupResult,
            handler::{Handler, HandlerInfo, PlainHandler},
            slot::IcLookup,
        },
        options::Options,
    };

    fn ordinary_object(heap: &mut Heap, prototype: Option<Object>) -> Object {
        let shape = heap.create(ShapeHeapData::new(prototype));
        heap.create(ObjectHeapData::new(shape))
    }

    #[test]
    fn load_miss_installs_field_handler() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let shape = heap.shape_of(receiver);
        let mut table = CacheSlotTable::new(&[IcKind::NamedLoadIC]);
        let site = IcSite::from_index(0);

        IcRuntime::new(&mut table, site).record_load_miss(
            &mut heap,
            &PropertyLookupResult::own_field(receiver, 1, true),
            None,
        );
        let handler = table.try_lookup(&heap, site, shape).hit().unwrap();
        let info = handler.as_handler_info().unwrap();
        assert!(info.is_field());
        assert_eq!(info.offset(), 3);
    }

    #[test]
    fn slow_lookup_saturates_site() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let mut table = CacheSlotTable::new(&[IcKind::LoadIC]);
        let site = IcSite::from_index(0);
        let key = heap.property_key("x");
        let lookup = PropertyLookupResult::own_field(receiver, 0, false).dictionary_mode();
        IcRuntime::new(&mut table, site).record_load_miss(&mut heap, &lookup, Some(key));
        assert_eq!(table.state(site), IcState::Mega);
    }

    #[test]
    fn disabled_caches_saturate_on_first_miss() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let shape = heap.shape_of(receiver);
        let options = Options {
            ic_enabled: false,
            ..Default::default()
        };
        let mut table = CacheSlotTable::with_options(&[IcKind::NamedStoreIC], options).unwrap();
        let site = IcSite::from_index(0);
        IcRuntime::new(&mut table, site).record_store_miss(
            &mut heap,
            &PropertyLookupResult::own_field(receiver, 0, false),
            shape,
            None,
        );
        assert_eq!(table.try_lookup(&heap, site, shape), IcLookup::Saturated);
    }

    #[test]
    fn missing_property_caches_prototype_handler() {
        let mut heap = Heap::new();
        let prototype = ordinary_object(&mut heap, None);
        let receiver = ordinary_object(&mut heap, Some(prototype));
        let shape = heap.shape_of(receiver);
        let mut table = CacheSlotTable::new(&[IcKind::NamedLoadIC]);
        let site = IcSite::from_index(0);
        IcRuntime::new(&mut table, site).record_load_miss(
            &mut heap,
            &PropertyLookupResult::not_found(receiver),
            None,
        );
        let Some(Handler::Prototype(handler)) = table.try_lookup(&heap, site, shape).hit() else {
            panic!("expected a prototype handler");
        };
        assert_eq!(
            heap[handler].handler_info,
            PlainHandler::Packed(HandlerInfo::new_non_exist())
        );
        assert_eq!(heap[handler].holder, None);
    }

    #[test]
    fn global_sites_skip_prototype_and_element_accesses() {
        let mut heap = Heap::new();
        let prototype = ordinary_object(&mut heap, None);
        let global = ordinary_object(&mut heap, Some(prototype));
        let mut table = CacheSlotTable::new(&[IcKind::GlobalLoadIC, IcKind::NamedGlobalLoadIC]);
        let key = heap.property_key("Array");

        let lookup = PropertyLookupResult::own_field(prototype, 0, false).on_prototype(prototype);
        let lookup = PropertyLookupResult {
            receiver: global,
            ..lookup
        };
        IcRuntime::new(&mut table, IcSite::from_index(0)).record_load_miss(
            &mut heap,
            &lookup,
            Some(key),
        );
        IcRuntime::new(&mut table, IcSite::from_index(0)).record_load_miss(
            &mut heap,
            &PropertyLookupResult::element(global, true),
            Some(key),
        );
        assert_eq!(table.state(IcSite::from_index(0)), IcState::Uninit);

        let property_box = heap.create(PropertyBoxHeapData::default());
        let lookup = PropertyLookupResult::own_field(global, 0, false).boxed(property_box);
        IcRuntime::new(&mut table, IcSite::from_index(1)).record_load_miss(&mut heap, &lookup, None);
        let shape = heap.shape_of(global);
        assert_eq!(
            table.try_lookup(&heap, IcSite::from_index(1), shape),
            IcLookup::Hit(Handler::PropertyBox(property_box))
        );
    }

    #[test]
    fn named_global_miss_without_a_box_allocates_nothing() {
        let mut heap = Heap::new();
        let global = ordinary_object(&mut heap, None);
        let shape = heap.shape_of(global);
        let mut table =
            CacheSlotTable::new(&[IcKind::NamedGlobalLoadIC, IcKind::NamedGlobalStoreIC]);

        IcRuntime::new(&mut table, IcSite::from_index(0)).record_load_miss(
            &mut heap,
            &PropertyLookupResult::not_found(global),
            None,
        );
        IcRuntime::new(&mut table, IcSite::from_index(0)).record_load_miss(
            &mut heap,
            &PropertyLookupResult::own_field(global, 0, true),
            None,
        );
        IcRuntime::new(&mut table, IcSite::from_index(1)).record_store_miss(
            &mut heap,
            &PropertyLookupResult::own_field(global, 1, true).transition(),
            shape,
            None,
        );
        assert!(heap.prototype_handlers.is_empty());
        assert!(heap.transition_handlers.is_empty());
        assert!(heap.invalidation_cells.is_empty());
        assert!(heap[shape].invalidation_cell.is_none());
        assert_eq!(table.state(IcSite::from_index(0)), IcState::Uninit);
        assert_eq!(table.state(IcSite::from_index(1)), IcState::Uninit);
    }

    #[test]
    fn element_load_on_dictionary_elements_is_not_cached() {
        let mut heap = Heap::new();
        let shape = heap.create(ShapeHeapData::new(None).with_dictionary_elements());
        let receiver = heap.create(ObjectHeapData::new(shape));
        let mut table = CacheSlotTable::new(&[IcKind::LoadIC]);
        let site = IcSite::from_index(0);
        IcRuntime::new(&mut table, site).record_load_miss(
            &mut heap,
            &PropertyLookupResult::element(receiver, false),
            None,
        );
        assert_eq!(table.state(site), IcState::Uninit);

        IcRuntime::new(&mut table, site).record_load_miss(
            &mut heap,
            &PropertyLookupResult::element(receiver, true),
            None,
        );
        assert_eq!(table.state(site), IcState::Mono);
        assert!(table.try_lookup_element(&heap, site, shape).hit().is_some());
    }

    #[test]
    fn transitioning_store_caches_transition_handler() {
        let mut heap = Heap::new();
        let receiver = ordinary_object(&mut heap, None);
        let before = heap.shape_of(receiver);
        let after = heap.create(ShapeHeapData::new(None));
        heap.set_shape(receiver, after);
        let mut table = CacheSlotTable::new(&[IcKind::NamedStoreIC]);
        let site = IcSite::from_index(0);
        IcRuntime::new(&mut table, site).record_store_miss(
            &mut heap,
            &PropertyLookupResult::own_field(receiver, 0, true).transition(),
            before,
            None,
        );
        let Some(Handler::Transition(handler)) = table.try_lookup(&heap, site, before).hit() else {
            panic!("expected a transition handler");
        };
        assert_eq!(heap[handler].transition_shape, after);
        assert!(table.try_lookup(&heap, site, after).is_miss());
    }
}
