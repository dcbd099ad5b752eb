// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::ops::Index;

use log::debug;

use crate::{
    heap::{
        HeapMarkAndSweep, WorkQueues,
        indexes::{PropertyKey, Shape},
        weak_reference::WeakReferences,
    },
    options::{Options, OptionsError},
};

use super::{
    IcKind, IcState,
    handler::Handler,
    slot::{AddHandlerResult, CacheSlot, GlobalCacheSlot, IcLookup, KeyedCacheSlot},
};

/// Index of an inline cache site within its [`CacheSlotTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct IcSite(u32);

impl IcSite {
    pub const fn from_index(index: usize) -> Self {
        assert!(index <= u32::MAX as usize);
        Self(index as u32)
    }

    pub const fn into_index(self) -> usize {
        self.0 as usize
    }
}

/// Slot of a single site, shaped by the site's [`IcKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcSlot {
    Keyless(CacheSlot),
    Keyed(KeyedCacheSlot),
    Global(GlobalCacheSlot),
}

impl IcSlot {
    fn new(kind: IcKind) -> Self {
        match kind {
            IcKind::NamedLoadIC | IcKind::NamedStoreIC => IcSlot::Keyless(CacheSlot::Empty),
            IcKind::LoadIC | IcKind::StoreIC => IcSlot::Keyed(KeyedCacheSlot::Empty),
            IcKind::NamedGlobalLoadIC
            | IcKind::NamedGlobalStoreIC
            | IcKind::GlobalLoadIC
            | IcKind::GlobalStoreIC => IcSlot::Global(GlobalCacheSlot::Empty),
        }
    }

    pub fn state(&self) -> IcState {
        match self {
            IcSlot::Keyless(slot) => slot.state(),
            IcSlot::Keyed(slot) => slot.state(),
            IcSlot::Global(slot) => slot.state(),
        }
    }
}

/// Inline cache slots of one piece of code, one per property access site.
#[derive(Debug)]
pub struct CacheSlotTable {
    kinds: Box<[IcKind]>,
    slots: Box<[IcSlot]>,
    options: Options,
}

impl CacheSlotTable {
    /// Create a table of empty slots for sites of the given kinds, in site
    /// order.
    pub fn new(kinds: &[IcKind]) -> Self {
        Self {
            kinds: kinds.into(),
            slots: kinds.iter().copied().map(IcSlot::new).collect(),
            options: Options::default(),
        }
    }

    pub fn with_options(kinds: &[IcKind], options: Options) -> Result<Self, OptionsError> {
        let options = options.validate()?;
        Ok(Self {
            options,
            ..Self::new(kinds)
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn kind(&self, site: IcSite) -> IcKind {
        *self
            .kinds
            .get(site.into_index())
            .expect("IcSite out of bounds")
    }

    pub fn state(&self, site: IcSite) -> IcState {
        self[site].state()
    }

    /// Mutable view of a single site's slot.
    pub fn accessor(&mut self, site: IcSite) -> CacheAccessor<'_> {
        let index = site.into_index();
        let kind = *self.kinds.get(index).expect("IcSite out of bounds");
        let slot = self.slots.get_mut(index).expect("IcSite out of bounds");
        CacheAccessor {
            kind,
            slot,
            options: &self.options,
        }
    }

    /// Look up the handler of a named site, or the binding of a named
    /// global site.
    pub fn try_lookup(
        &self,
        host: &impl WeakReferences<Shape>,
        site: IcSite,
        shape: Shape,
    ) -> IcLookup {
        match &self[site] {
            IcSlot::Keyless(slot) => slot.lookup(host, shape),
            IcSlot::Global(slot) => slot.lookup_global_by_name(),
            IcSlot::Keyed(_) => {
                debug_assert!(false, "keyed site looked up without a key");
                IcLookup::Miss
            }
        }
    }

    /// Look up the handler of a computed-key site, or of a computed-key
    /// global site. Global sites ignore the shape.
    pub fn try_lookup_with_key<H>(
        &self,
        host: &H,
        site: IcSite,
        key: PropertyKey,
        shape: Shape,
    ) -> IcLookup
    where
        H: WeakReferences<Shape> + WeakReferences<PropertyKey>,
    {
        match &self[site] {
            IcSlot::Keyed(slot) => slot.lookup_with_key(host, key, shape),
            IcSlot::Global(slot) => slot.lookup_global_by_value(host, key),
            IcSlot::Keyless(_) => {
                debug_assert!(false, "named site looked up with a key");
                IcLookup::Miss
            }
        }
    }

    /// Look up the element handler of a computed-key site.
    pub fn try_lookup_element(
        &self,
        host: &impl WeakReferences<Shape>,
        site: IcSite,
        shape: Shape,
    ) -> IcLookup {
        match &self[site] {
            IcSlot::Keyed(slot) => slot.lookup_element(host, shape),
            IcSlot::Global(GlobalCacheSlot::Saturated) | IcSlot::Keyless(CacheSlot::Saturated) => {
                IcLookup::Saturated
            }
            IcSlot::Keyless(_) | IcSlot::Global(_) => IcLookup::Miss,
        }
    }
}

impl Index<IcSite> for CacheSlotTable {
    type Output = IcSlot;

    fn index(&self, site: IcSite) -> &Self::Output {
        self.slots
            .get(site.into_index())
            .expect("IcSite out of bounds")
    }
}

/// Writer for the slot of a single site.
///
/// Every add that reports [`AddHandlerResult::Saturated`] seals the slot:
/// once saturated a site never caches anything again.
#[derive(Debug)]
pub struct CacheAccessor<'a> {
    kind: IcKind,
    slot: &'a mut IcSlot,
    options: &'a Options,
}

impl CacheAccessor<'_> {
    pub fn kind(&self) -> IcKind {
        self.kind
    }

    pub fn state(&self) -> IcState {
        self.slot.state()
    }

    pub fn options(&self) -> &Options {
        self.options
    }

    pub fn slot(&self) -> &IcSlot {
        &*self.slot
    }

    /// Record a handler on a named site. On a named global site the handler
    /// must be the binding's property box and replaces the cached one.
    pub fn add_handler_without_key(
        &mut self,
        host: &mut impl WeakReferences<Shape>,
        shape: Shape,
        handler: Handler,
    ) -> AddHandlerResult {
        let max_entries = self.options.max_poly_entries();
        let result = match &mut *self.slot {
            IcSlot::Keyless(slot) => slot.add_handler(host, shape, handler, max_entries),
            IcSlot::Global(slot) => {
                debug_assert!(self.kind.is_named_global());
                match handler {
                    Handler::PropertyBox(property_box) => {
                        slot.add_global_handler_without_key(property_box)
                    }
                    _ => {
                        debug_assert!(false, "named global handler is not a property box");
                        AddHandlerResult::Updated
                    }
                }
            }
            IcSlot::Keyed(_) => {
                debug_assert!(false, "keyed site recorded without a key");
                AddHandlerResult::Updated
            }
        };
        self.finish(result)
    }

    /// Record a handler on a computed-key site. Computed-key global sites
    /// append to their key list instead.
    pub fn add_handler_with_key<H>(
        &mut self,
        host: &mut H,
        key: PropertyKey,
        shape: Shape,
        handler: Handler,
    ) -> AddHandlerResult
    where
        H: WeakReferences<Shape> + WeakReferences<PropertyKey>,
    {
        if self.kind.is_value_global() {
            return self.add_global_handler_with_key(host, key, handler);
        }
        let max_entries = self.options.max_poly_entries();
        let result = match &mut *self.slot {
            IcSlot::Keyed(slot) => slot.add_handler_with_key(host, key, shape, handler, max_entries),
            IcSlot::Keyless(_) | IcSlot::Global(_) => {
                debug_assert!(false, "{} site recorded with a key", self.kind);
                AddHandlerResult::Updated
            }
        };
        self.finish(result)
    }

    pub fn add_element_handler(
        &mut self,
        host: &mut impl WeakReferences<Shape>,
        shape: Shape,
        handler: Handler,
    ) -> AddHandlerResult {
        let max_entries = self.options.max_poly_entries();
        let result = match &mut *self.slot {
            IcSlot::Keyed(slot) => slot.add_element_handler(host, shape, handler, max_entries),
            IcSlot::Keyless(_) | IcSlot::Global(_) => {
                debug_assert!(false, "element handler on a {} site", self.kind);
                AddHandlerResult::Updated
            }
        };
        self.finish(result)
    }

    pub fn add_global_handler_with_key(
        &mut self,
        host: &mut impl WeakReferences<PropertyKey>,
        key: PropertyKey,
        handler: Handler,
    ) -> AddHandlerResult {
        let max_entries = self.options.max_global_entries;
        let result = match &mut *self.slot {
            IcSlot::Global(slot) => slot.add_global_handler_with_key(host, key, handler, max_entries),
            IcSlot::Keyless(_) | IcSlot::Keyed(_) => {
                debug_assert!(false, "global handler on a {} site", self.kind);
                AddHandlerResult::Updated
            }
        };
        self.finish(result)
    }

    /// Saturate the site.
    pub fn set_as_mega(&mut self) {
        *self.slot = match &*self.slot {
            IcSlot::Keyless(_) => IcSlot::Keyless(CacheSlot::Saturated),
            IcSlot::Keyed(_) => IcSlot::Keyed(KeyedCacheSlot::Saturated),
            IcSlot::Global(_) => IcSlot::Global(GlobalCacheSlot::Saturated),
        };
    }

    fn finish(&mut self, result: AddHandlerResult) -> AddHandlerResult {
        if result == AddHandlerResult::Saturated && self.state() != IcState::Mega {
            debug!("{} site saturated", self.kind);
            self.set_as_mega();
        }
        result
    }
}

impl HeapMarkAndSweep for IcSlot {
    fn mark_values(&self, queues: &mut WorkQueues) {
        match self {
            IcSlot::Keyless(slot) => slot.mark_values(queues),
            IcSlot::Keyed(slot) => slot.mark_values(queues),
            IcSlot::Global(slot) => slot.mark_values(queues),
        }
    }
}

impl HeapMarkAndSweep for CacheSlotTable {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self {
            kinds: _,
            slots,
            options: _,
        } = self;
        slots.mark_values(queues);
    }
}

#[cfg(test)]
mod test {
    use super::{CacheSlotTable, IcSite};
    use crate::{
        heap::{CreateHeapData, Heap, object::ShapeHeapData},
        ic::{
            IcKind, IcState,
            handler::{Handler, HandlerInfo},
            slot::{AddHandlerResult, IcLookup},
        },
        options::{Options, OptionsError},
    };

    #[test]
    fn table_slots_follow_site_kinds() {
        let table = CacheSlotTable::new(&[IcKind::NamedLoadIC, IcKind::StoreIC, IcKind::GlobalLoadIC]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.kind(IcSite::from_index(1)), IcKind::StoreIC);
        for index in 0..3 {
            assert_eq!(table.state(IcSite::from_index(index)), IcState::Uninit);
        }
    }

    #[test]
    fn saturation_is_written_by_the_accessor() {
        let mut heap = Heap::new();
        let options = Options {
            max_cache_len: 4,
            ..Default::default()
        };
        let mut table = CacheSlotTable::with_options(&[IcKind::NamedLoadIC], options).unwrap();
        let site = IcSite::from_index(0);
        let handler: Handler = HandlerInfo::new_non_exist().into();
        let shapes: Vec<_> = (0..3).map(|_| heap.create(ShapeHeapData::new(None))).collect();

        let mut accessor = table.accessor(site);
        accessor.add_handler_without_key(&mut heap, shapes[0], handler);
        accessor.add_handler_without_key(&mut heap, shapes[1], handler);
        assert_eq!(accessor.state(), IcState::Poly);
        assert_eq!(
            accessor.add_handler_without_key(&mut heap, shapes[2], handler),
            AddHandlerResult::Saturated
        );
        assert_eq!(accessor.state(), IcState::Mega);
        assert_eq!(table.try_lookup(&heap, site, shapes[0]), IcLookup::Saturated);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = Options {
            max_cache_len: 5,
            ..Default::default()
        };
        assert_eq!(
            CacheSlotTable::with_options(&[], options).unwrap_err(),
            OptionsError::OddCacheLength(5)
        );
    }

    #[test]
    fn set_as_mega_keeps_slot_variant() {
        let mut table = CacheSlotTable::new(&[IcKind::LoadIC, IcKind::NamedGlobalStoreIC]);
        for index in 0..2 {
            let mut accessor = table.accessor(IcSite::from_index(index));
            accessor.set_as_mega();
            assert_eq!(accessor.state(), IcState::Mega);
        }
    }
}
