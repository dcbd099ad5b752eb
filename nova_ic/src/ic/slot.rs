// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Cache slot state machines
//!
//! Every inline cache site owns exactly one slot. Slots only ever move
//! forward: `Empty -> Mono -> Poly -> Saturated`, and `Saturated` is
//! terminal. Shapes and keys are held weakly; a cleared reference never
//! matches anything.

use crate::heap::{
    HeapMarkAndSweep, WorkQueues,
    indexes::{PropertyBox, PropertyKey, Shape},
    weak_reference::{WeakReference, WeakReferences},
};

use super::{IcState, handler::Handler};

/// Outcome of adding a handler to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddHandlerResult {
    /// The slot accepted the handler, or deliberately ignored it.
    Updated,
    /// The slot is or must become saturated. The slot itself has not been
    /// mutated; the accessor writes the saturated state.
    Saturated,
}

/// Outcome of looking up a handler in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcLookup {
    Hit(Handler),
    Miss,
    /// The site has given up caching; the caller must take the slow path
    /// without trying to record the miss.
    Saturated,
}

impl IcLookup {
    pub fn hit(self) -> Option<Handler> {
        match self {
            IcLookup::Hit(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn is_miss(self) -> bool {
        self == IcLookup::Miss
    }

    pub fn is_saturated(self) -> bool {
        self == IcLookup::Saturated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub shape: WeakReference<Shape>,
    pub handler: Handler,
}

impl CacheEntry {
    fn matches(&self, host: &impl WeakReferences<Shape>, shape: Shape) -> bool {
        self.shape.refers_to(host, shape)
    }
}

/// Slot of a site that accesses a constant property name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheSlot {
    #[default]
    Empty,
    Mono(CacheEntry),
    /// At least two and at most the configured maximum entries, in the
    /// order they were added.
    Poly(Vec<CacheEntry>),
    Saturated,
}

impl CacheSlot {
    /// Record a handler for the given receiver shape.
    ///
    /// The shape is not looked up first: a shape that is already cached
    /// gets a second entry, and the first one keeps winning lookups.
    pub fn add_handler(
        &mut self,
        host: &mut impl WeakReferences<Shape>,
        shape: Shape,
        handler: Handler,
        max_entries: usize,
    ) -> AddHandlerResult {
        match self {
            CacheSlot::Empty => {
                let shape = WeakReference::new(host, shape);
                *self = CacheSlot::Mono(CacheEntry { shape, handler });
                AddHandlerResult::Updated
            }
            CacheSlot::Mono(existing) => {
                debug_assert!(max_entries >= 2);
                let shape = WeakReference::new(host, shape);
                let mut entries = Vec::with_capacity(super::POLY_DEFAULT_LEN / 2);
                entries.push(*existing);
                entries.push(CacheEntry { shape, handler });
                *self = CacheSlot::Poly(entries);
                AddHandlerResult::Updated
            }
            CacheSlot::Poly(entries) => {
                debug_assert!(entries.len() >= 2, "malformed polymorphic slot");
                if entries.len() + 1 > max_entries {
                    return AddHandlerResult::Saturated;
                }
                let shape = WeakReference::new(host, shape);
                entries.push(CacheEntry { shape, handler });
                AddHandlerResult::Updated
            }
            CacheSlot::Saturated => AddHandlerResult::Saturated,
        }
    }

    pub fn lookup(&self, host: &impl WeakReferences<Shape>, shape: Shape) -> IcLookup {
        match self {
            CacheSlot::Empty => IcLookup::Miss,
            CacheSlot::Mono(entry) => {
                if entry.matches(host, shape) {
                    IcLookup::Hit(entry.handler)
                } else {
                    IcLookup::Miss
                }
            }
            CacheSlot::Poly(entries) => entries
                .iter()
                .find(|entry| entry.matches(host, shape))
                .map_or(IcLookup::Miss, |entry| IcLookup::Hit(entry.handler)),
            CacheSlot::Saturated => IcLookup::Saturated,
        }
    }

    pub fn state(&self) -> IcState {
        match self {
            CacheSlot::Empty => IcState::Uninit,
            CacheSlot::Mono(_) => IcState::Mono,
            CacheSlot::Poly(_) => IcState::Poly,
            CacheSlot::Saturated => IcState::Mega,
        }
    }

    /// Cached entries in insertion order.
    pub fn entries(&self) -> &[CacheEntry] {
        match self {
            CacheSlot::Mono(entry) => core::slice::from_ref(entry),
            CacheSlot::Poly(entries) => entries,
            CacheSlot::Empty | CacheSlot::Saturated => &[],
        }
    }

    fn is_cached(&self) -> bool {
        matches!(self, CacheSlot::Mono(_) | CacheSlot::Poly(_))
    }
}

/// Slot of a site that accesses a computed property key.
///
/// Such a site learns only the first named key it observes, and learns
/// again once that key has been collected. Element accesses are cached
/// independently of the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyedCacheSlot {
    #[default]
    Empty,
    Named {
        key: WeakReference<PropertyKey>,
        /// Always [`CacheSlot::Mono`] or [`CacheSlot::Poly`].
        entries: CacheSlot,
    },
    /// Always [`CacheSlot::Mono`] or [`CacheSlot::Poly`].
    Element(CacheSlot),
    Saturated,
}

impl KeyedCacheSlot {
    pub fn add_handler_with_key<H>(
        &mut self,
        host: &mut H,
        key: PropertyKey,
        shape: Shape,
        handler: Handler,
        max_entries: usize,
    ) -> AddHandlerResult
    where
        H: WeakReferences<Shape> + WeakReferences<PropertyKey>,
    {
        match self {
            KeyedCacheSlot::Empty => {
                *self = Self::learn_key(host, key, shape, handler, max_entries);
                AddHandlerResult::Updated
            }
            KeyedCacheSlot::Named {
                key: cached_key,
                entries,
            } => {
                debug_assert!(entries.is_cached());
                match cached_key.resolve(&*host) {
                    // A collected key no longer pins the site.
                    None => {
                        *self = Self::learn_key(host, key, shape, handler, max_entries);
                        AddHandlerResult::Updated
                    }
                    // Only the first live key is ever learned.
                    Some(cached) if cached != key => AddHandlerResult::Updated,
                    Some(_) => entries.add_handler(host, shape, handler, max_entries),
                }
            }
            KeyedCacheSlot::Element(_) => AddHandlerResult::Updated,
            KeyedCacheSlot::Saturated => AddHandlerResult::Saturated,
        }
    }

    fn learn_key<H>(
        host: &mut H,
        key: PropertyKey,
        shape: Shape,
        handler: Handler,
        max_entries: usize,
    ) -> Self
    where
        H: WeakReferences<Shape> + WeakReferences<PropertyKey>,
    {
        let key = WeakReference::new(host, key);
        let mut entries = CacheSlot::Empty;
        entries.add_handler(host, shape, handler, max_entries);
        KeyedCacheSlot::Named { key, entries }
    }

    /// Record an element handler. A site that has cached a named key
    /// drops it in favour of element access.
    pub fn add_element_handler(
        &mut self,
        host: &mut impl WeakReferences<Shape>,
        shape: Shape,
        handler: Handler,
        max_entries: usize,
    ) -> AddHandlerResult {
        match self {
            KeyedCacheSlot::Empty | KeyedCacheSlot::Named { .. } => {
                let mut entries = CacheSlot::Empty;
                entries.add_handler(host, shape, handler, max_entries);
                *self = KeyedCacheSlot::Element(entries);
                AddHandlerResult::Updated
            }
            KeyedCacheSlot::Element(entries) => {
                debug_assert!(entries.is_cached());
                entries.add_handler(host, shape, handler, max_entries)
            }
            KeyedCacheSlot::Saturated => AddHandlerResult::Saturated,
        }
    }

    /// Lookup for a named key. A key mismatch, including a cleared key, is
    /// a miss and never saturates the site.
    pub fn lookup_with_key<H>(&self, host: &H, key: PropertyKey, shape: Shape) -> IcLookup
    where
        H: WeakReferences<Shape> + WeakReferences<PropertyKey>,
    {
        match self {
            KeyedCacheSlot::Named {
                key: cached_key,
                entries,
            } if cached_key.refers_to(host, key) => entries.lookup(host, shape),
            KeyedCacheSlot::Empty | KeyedCacheSlot::Named { .. } | KeyedCacheSlot::Element(_) => {
                IcLookup::Miss
            }
            KeyedCacheSlot::Saturated => IcLookup::Saturated,
        }
    }

    pub fn lookup_element(&self, host: &impl WeakReferences<Shape>, shape: Shape) -> IcLookup {
        match self {
            KeyedCacheSlot::Element(entries) => entries.lookup(host, shape),
            KeyedCacheSlot::Empty | KeyedCacheSlot::Named { .. } => IcLookup::Miss,
            KeyedCacheSlot::Saturated => IcLookup::Saturated,
        }
    }

    pub fn state(&self) -> IcState {
        match self {
            KeyedCacheSlot::Empty => IcState::Uninit,
            KeyedCacheSlot::Named { entries, .. } | KeyedCacheSlot::Element(entries) => {
                entries.state()
            }
            KeyedCacheSlot::Saturated => IcState::Mega,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalCacheEntry {
    pub key: WeakReference<PropertyKey>,
    pub handler: Handler,
}

/// Slot of a site that accesses a global binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GlobalCacheSlot {
    #[default]
    Empty,
    /// Named global site: the storage cell of the binding, replaced on
    /// every record.
    ByName(PropertyBox),
    /// Computed-key global site: key and handler pairs in insertion order.
    /// Equal keys may appear more than once.
    ByValue(Vec<GlobalCacheEntry>),
    Saturated,
}

impl GlobalCacheSlot {
    pub fn add_global_handler_without_key(&mut self, property_box: PropertyBox) -> AddHandlerResult {
        match self {
            GlobalCacheSlot::Saturated => AddHandlerResult::Saturated,
            _ => {
                debug_assert!(
                    !matches!(self, GlobalCacheSlot::ByValue(_)),
                    "named record on a computed-key global site"
                );
                *self = GlobalCacheSlot::ByName(property_box);
                AddHandlerResult::Updated
            }
        }
    }

    /// Append a key and handler pair. Once the list holds `max_entries`
    /// pairs further calls are ignored.
    pub fn add_global_handler_with_key(
        &mut self,
        host: &mut impl WeakReferences<PropertyKey>,
        key: PropertyKey,
        handler: Handler,
        max_entries: usize,
    ) -> AddHandlerResult {
        match self {
            GlobalCacheSlot::Empty => {
                let key = WeakReference::new(host, key);
                *self = GlobalCacheSlot::ByValue(vec![GlobalCacheEntry { key, handler }]);
                AddHandlerResult::Updated
            }
            GlobalCacheSlot::ByValue(entries) => {
                if entries.len() < max_entries {
                    let key = WeakReference::new(host, key);
                    entries.push(GlobalCacheEntry { key, handler });
                }
                AddHandlerResult::Updated
            }
            GlobalCacheSlot::ByName(_) => {
                debug_assert!(false, "computed-key record on a named global site");
                AddHandlerResult::Updated
            }
            GlobalCacheSlot::Saturated => AddHandlerResult::Saturated,
        }
    }

    pub fn lookup_global_by_name(&self) -> IcLookup {
        match self {
            GlobalCacheSlot::ByName(property_box) => IcLookup::Hit(Handler::PropertyBox(*property_box)),
            GlobalCacheSlot::Empty | GlobalCacheSlot::ByValue(_) => IcLookup::Miss,
            GlobalCacheSlot::Saturated => IcLookup::Saturated,
        }
    }

    pub fn lookup_global_by_value(
        &self,
        host: &impl WeakReferences<PropertyKey>,
        key: PropertyKey,
    ) -> IcLookup {
        match self {
            GlobalCacheSlot::ByValue(entries) => entries
                .iter()
                .find(|entry| entry.key.refers_to(host, key))
                .map_or(IcLookup::Miss, |entry| IcLookup::Hit(entry.handler)),
            GlobalCacheSlot::Empty | GlobalCacheSlot::ByName(_) => IcLookup::Miss,
            GlobalCacheSlot::Saturated => IcLookup::Saturated,
        }
    }

    pub fn state(&self) -> IcState {
        match self {
            GlobalCacheSlot::Empty => IcState::Uninit,
            GlobalCacheSlot::ByName(_) => IcState::Mono,
            GlobalCacheSlot::ByValue(entries) if entries.len() == 1 => IcState::Mono,
            GlobalCacheSlot::ByValue(_) => IcState::Poly,
            GlobalCacheSlot::Saturated => IcState::Mega,
        }
    }
}

impl HeapMarkAndSweep for CacheEntry {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self { shape: _, handler } = self;
        handler.mark_values(queues);
    }
}

impl HeapMarkAndSweep for CacheSlot {
    fn mark_values(&self, queues: &mut WorkQueues) {
        self.entries().mark_values(queues);
    }
}

impl HeapMarkAndSweep for KeyedCacheSlot {
    fn mark_values(&self, queues: &mut WorkQueues) {
        match self {
            KeyedCacheSlot::Named { key: _, entries } | KeyedCacheSlot::Element(entries) => {
                entries.mark_values(queues)
            }
            KeyedCacheSlot::Empty | KeyedCacheSlot::Saturated => {}
        }
    }
}

impl HeapMarkAndSweep for GlobalCacheEntry {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self { key: _, handler } = self;
        handler.mark_values(queues);
    }
}

impl HeapMarkAndSweep for GlobalCacheSlot {
    fn mark_values(&self, queues: &mut WorkQueues) {
        match self {
            GlobalCacheSlot::ByName(property_box) => property_box.mark_values(queues),
            GlobalCacheSlot::ByValue(entries) => entries.mark_values(queues),
            GlobalCacheSlot::Empty | GlobalCacheSlot::Saturated => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::{AddHandlerResult, CacheSlot, GlobalCacheSlot, IcLookup, KeyedCacheSlot};
    use crate::{
        heap::{
            CreateHeapData, Heap,
            object::{PropertyBoxHeapData, ShapeHeapData},
        },
        ic::{
            IcState, MAX_POLY_ENTRIES,
            handler::{Handler, HandlerInfo},
        },
    };

    fn field(offset: u32) -> Handler {
        HandlerInfo::new_field(false, true, offset).unwrap().into()
    }

    #[test]
    fn keyless_slot_promotes_then_saturates() {
        let mut heap = Heap::new();
        let shapes: Vec<_> = (0..=MAX_POLY_ENTRIES)
            .map(|_| heap.create(ShapeHeapData::new(None)))
            .collect();
        let mut slot = CacheSlot::Empty;
        for (i, &shape) in shapes[..MAX_POLY_ENTRIES].iter().enumerate() {
            let result = slot.add_handler(&mut heap, shape, field(i as u32), MAX_POLY_ENTRIES);
            assert_eq!(result, AddHandlerResult::Updated);
            let expected = if i == 0 { IcState::Mono } else { IcState::Poly };
            assert_eq!(slot.state(), expected);
        }
        assert_eq!(slot.entries().len(), MAX_POLY_ENTRIES);

        let before = slot.clone();
        let result = slot.add_handler(&mut heap, shapes[MAX_POLY_ENTRIES], field(9), MAX_POLY_ENTRIES);
        assert_eq!(result, AddHandlerResult::Saturated);
        // The slot reports saturation but is left for the accessor to seal.
        assert_eq!(slot, before);
    }

    #[test]
    fn saturated_slot_is_terminal() {
        let mut heap = Heap::new();
        let shape = heap.create(ShapeHeapData::new(None));
        let mut slot = CacheSlot::Saturated;
        assert_eq!(
            slot.add_handler(&mut heap, shape, field(0), MAX_POLY_ENTRIES),
            AddHandlerResult::Saturated
        );
        assert_eq!(slot, CacheSlot::Saturated);
        assert_eq!(slot.lookup(&heap, shape), IcLookup::Saturated);
    }

    #[test]
    fn keyed_slot_keeps_first_key() {
        let mut heap = Heap::new();
        let s1 = heap.create(ShapeHeapData::new(None));
        let s2 = heap.create(ShapeHeapData::new(None));
        let k1 = heap.property_key("x");
        let k2 = heap.property_key("y");

        let mut slot = KeyedCacheSlot::Empty;
        slot.add_handler_with_key(&mut heap, k1, s1, field(1), MAX_POLY_ENTRIES);
        let before = slot.clone();
        assert_eq!(
            slot.add_handler_with_key(&mut heap, k2, s2, field(2), MAX_POLY_ENTRIES),
            AddHandlerResult::Updated
        );
        assert_eq!(slot, before);
        assert_eq!(slot.lookup_with_key(&heap, k1, s1), IcLookup::Hit(field(1)));
        assert_eq!(slot.lookup_with_key(&heap, k2, s2), IcLookup::Miss);
        assert_eq!(slot.lookup_with_key(&heap, k2, s1), IcLookup::Miss);
    }

    #[test]
    fn element_handler_replaces_named_key() {
        let mut heap = Heap::new();
        let s1 = heap.create(ShapeHeapData::new(None));
        let s2 = heap.create(ShapeHeapData::new(None));
        let key = heap.property_key("length");
        let element: Handler = HandlerInfo::new_element(true).into();

        let mut slot = KeyedCacheSlot::Empty;
        slot.add_handler_with_key(&mut heap, key, s1, field(0), MAX_POLY_ENTRIES);
        slot.add_element_handler(&mut heap, s1, element, MAX_POLY_ENTRIES);
        assert!(matches!(slot, KeyedCacheSlot::Element(CacheSlot::Mono(_))));
        assert_eq!(slot.lookup_with_key(&heap, key, s1), IcLookup::Miss);
        assert_eq!(slot.lookup_element(&heap, s1), IcLookup::Hit(element));

        slot.add_element_handler(&mut heap, s2, element, MAX_POLY_ENTRIES);
        assert_eq!(slot.state(), IcState::Poly);

        // Named keys are not learned once the site caches elements.
        let before = slot.clone();
        slot.add_handler_with_key(&mut heap, key, s1, field(0), MAX_POLY_ENTRIES);
        assert_eq!(slot, before);
    }

    #[test]
    fn global_by_value_list_is_capped_and_keeps_duplicates() {
        let mut heap = Heap::new();
        let key = heap.property_key("globalThis");
        let mut slot = GlobalCacheSlot::Empty;
        for i in 0..10 {
            assert_eq!(
                slot.add_global_handler_with_key(&mut heap, key, field(i), 4),
                AddHandlerResult::Updated
            );
        }
        let GlobalCacheSlot::ByValue(entries) = &slot else {
            panic!("expected a by-value global slot");
        };
        assert_eq!(entries.len(), 4);
        // The first equal key wins.
        assert_eq!(slot.lookup_global_by_value(&heap, key), IcLookup::Hit(field(0)));
        assert_eq!(slot.state(), IcState::Poly);
    }

    #[test]
    fn global_by_name_box_is_replaced() {
        let mut heap = Heap::new();
        let first = heap.create(PropertyBoxHeapData::default());
        let second = heap.create(PropertyBoxHeapData::default());
        let mut slot = GlobalCacheSlot::Empty;
        assert_eq!(slot.lookup_global_by_name(), IcLookup::Miss);
        slot.add_global_handler_without_key(first);
        slot.add_global_handler_without_key(second);
        assert_eq!(slot.lookup_global_by_name(), IcLookup::Hit(Handler::PropertyBox(second)));
        assert_eq!(slot.state(), IcState::Mono);
    }
}
