// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ### Property access handlers
//!
//! A handler tells the dispatch loop how to read or write a property that
//! a previous slow path lookup has already resolved. It takes one of four
//! forms:
//!
//! * a packed [`HandlerInfo`] word describing a field or element access,
//! * a [`PropertyBox`] referencing the shared storage cell of a dictionary
//!   or global property directly,
//! * a [`PrototypeHandler`] for properties found (or not found) through the
//!   prototype chain, guarded by an invalidation cell, and
//! * a [`TransitionHandler`] for stores that add a new field and thereby
//!   move the receiver to a new shape.

use crate::heap::{
    HeapMarkAndSweep, WorkQueues,
    indexes::{InvalidationCell, Object, PropertyBox, PrototypeHandler, Shape, TransitionHandler},
};

use super::ObjectModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerKind {
    None = 0,
    Field = 1,
    Element = 2,
    Dictionary = 3,
    NonExist = 4,
}

impl HandlerKind {
    const fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0 => Self::None,
            1 => Self::Field,
            2 => Self::Element,
            3 => Self::Dictionary,
            4 => Self::NonExist,
            _ => return None,
        })
    }
}

/// Packed handler descriptor.
///
/// Layout, from the least significant bit up:
///
/// | bits  | field                |
/// |-------|----------------------|
/// | 0..3  | [`HandlerKind`]      |
/// | 3     | inlined properties   |
/// | 4     | accessor             |
/// | 5     | internal accessor    |
/// | 6     | receiver is an array |
/// | 7..17 | property offset      |
///
/// The whole word fits in a small integer of the host's value encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HandlerInfo(u32);

impl HandlerInfo {
    const KIND_BITS: u32 = 3;
    const KIND_MASK: u32 = (1 << Self::KIND_BITS) - 1;
    const INLINED_PROPS_BIT: u32 = 1 << Self::KIND_BITS;
    const ACCESSOR_BIT: u32 = Self::INLINED_PROPS_BIT << 1;
    const INTERNAL_ACCESSOR_BIT: u32 = Self::ACCESSOR_BIT << 1;
    const RECEIVER_ARRAY_BIT: u32 = Self::INTERNAL_ACCESSOR_BIT << 1;
    const OFFSET_SHIFT: u32 = Self::KIND_BITS + 4;

    /// Width of the offset field: the object model allows at most
    /// `2^OFFSET_BITS` property slots per object.
    pub const OFFSET_BITS: u32 = 10;
    pub const MAX_OFFSET: u32 = (1 << Self::OFFSET_BITS) - 1;

    const TOTAL_BITS: u32 = Self::OFFSET_SHIFT + Self::OFFSET_BITS;

    /// Encode a handler descriptor.
    ///
    /// Returns None if the offset does not fit the offset field; such
    /// accesses are not cached.
    pub const fn encode(
        kind: HandlerKind,
        is_accessor: bool,
        is_inlined_props: bool,
        offset: u32,
        is_receiver_array: bool,
    ) -> Option<Self> {
        if offset > Self::MAX_OFFSET {
            return None;
        }
        let mut bits = kind as u32;
        if is_inlined_props {
            bits |= Self::INLINED_PROPS_BIT;
        }
        if is_accessor {
            bits |= Self::ACCESSOR_BIT;
        }
        if is_receiver_array {
            bits |= Self::RECEIVER_ARRAY_BIT;
        }
        bits |= offset << Self::OFFSET_SHIFT;
        Some(Self(bits))
    }

    pub const fn new(
        kind: HandlerKind,
        is_accessor: bool,
        is_inlined_props: bool,
        offset: u32,
    ) -> Option<Self> {
        Self::encode(kind, is_accessor, is_inlined_props, offset, false)
    }

    /// Field (or accessor) property stored at `offset`, either in-object or
    /// in the out-of-line property array.
    pub const fn new_field(is_accessor: bool, is_inlined_props: bool, offset: u32) -> Option<Self> {
        Self::new(HandlerKind::Field, is_accessor, is_inlined_props, offset)
    }

    /// Integer-indexed element access.
    pub const fn new_element(is_receiver_array: bool) -> Self {
        let mut bits = HandlerKind::Element as u32;
        if is_receiver_array {
            bits |= Self::RECEIVER_ARRAY_BIT;
        }
        Self(bits)
    }

    /// Property was not found on the receiver or its prototype chain.
    pub const fn new_non_exist() -> Self {
        Self(HandlerKind::NonExist as u32)
    }

    /// Reinterpret a raw word, e.g. one read back from a tagged small
    /// integer. Returns None if the kind field is not a valid kind or bits
    /// outside the layout are set.
    pub const fn from_raw(bits: u32) -> Option<Self> {
        if bits >> Self::TOTAL_BITS != 0 || HandlerKind::from_bits(bits & Self::KIND_MASK).is_none()
        {
            return None;
        }
        Some(Self(bits))
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn kind(self) -> HandlerKind {
        match HandlerKind::from_bits(self.0 & Self::KIND_MASK) {
            Some(kind) => kind,
            None => unreachable!("malformed handler info {:#x}", self.0),
        }
    }

    #[inline(always)]
    pub fn is_field(self) -> bool {
        self.kind() == HandlerKind::Field
    }

    #[inline(always)]
    pub fn is_element(self) -> bool {
        self.kind() == HandlerKind::Element
    }

    #[inline(always)]
    pub fn is_dictionary(self) -> bool {
        self.kind() == HandlerKind::Dictionary
    }

    #[inline(always)]
    pub fn is_non_exist(self) -> bool {
        self.kind() == HandlerKind::NonExist
    }

    #[inline(always)]
    pub const fn is_inlined_props(self) -> bool {
        self.0 & Self::INLINED_PROPS_BIT != 0
    }

    #[inline(always)]
    pub const fn is_accessor(self) -> bool {
        self.0 & Self::ACCESSOR_BIT != 0
    }

    #[inline(always)]
    pub const fn is_internal_accessor(self) -> bool {
        self.0 & Self::INTERNAL_ACCESSOR_BIT != 0
    }

    /// Only meaningful for element handlers.
    #[inline(always)]
    pub const fn is_receiver_array(self) -> bool {
        self.0 & Self::RECEIVER_ARRAY_BIT != 0
    }

    #[inline(always)]
    pub const fn offset(self) -> u32 {
        (self.0 >> Self::OFFSET_SHIFT) & Self::MAX_OFFSET
    }
}

const _HANDLER_INFO_FITS_SMALL_INTEGER: () = assert!(HandlerInfo::TOTAL_BITS <= 31);

impl core::fmt::Debug for HandlerInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerInfo")
            .field("kind", &self.kind())
            .field("inlined", &self.is_inlined_props())
            .field("accessor", &self.is_accessor())
            .field("receiver_array", &self.is_receiver_array())
            .field("offset", &self.offset())
            .finish()
    }
}

/// Handler that accesses the property directly on its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlainHandler {
    Packed(HandlerInfo),
    PropertyBox(PropertyBox),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Packed(HandlerInfo),
    PropertyBox(PropertyBox),
    Prototype(PrototypeHandler),
    Transition(TransitionHandler),
}

impl Handler {
    pub fn as_handler_info(self) -> Option<HandlerInfo> {
        match self {
            Handler::Packed(info) => Some(info),
            _ => None,
        }
    }
}

impl From<HandlerInfo> for Handler {
    fn from(value: HandlerInfo) -> Self {
        Handler::Packed(value)
    }
}

impl From<PlainHandler> for Handler {
    fn from(value: PlainHandler) -> Self {
        match value {
            PlainHandler::Packed(info) => Handler::Packed(info),
            PlainHandler::PropertyBox(property_box) => Handler::PropertyBox(property_box),
        }
    }
}

impl From<PrototypeHandler> for Handler {
    fn from(value: PrototypeHandler) -> Self {
        Handler::Prototype(value)
    }
}

impl From<TransitionHandler> for Handler {
    fn from(value: TransitionHandler) -> Self {
        Handler::Transition(value)
    }
}

/// Heap data of a [`PrototypeHandler`].
#[derive(Debug, Clone)]
pub struct PrototypeHandlerRecord {
    pub handler_info: PlainHandler,
    /// Object up the prototype chain that owns the property. None if the
    /// property was not found anywhere on the chain.
    pub holder: Option<Object>,
    /// Owned and written by the object model; only read here.
    pub invalidation_cell: InvalidationCell,
}

impl PrototypeHandlerRecord {
    /// Returns false once the prototype chain layout of the receiver shape
    /// has changed since the handler was built.
    pub fn is_valid(&self, model: &impl ObjectModel) -> bool {
        !model.invalidation_cell_has_changed(self.invalidation_cell)
    }
}

/// Heap data of a [`TransitionHandler`].
#[derive(Debug, Clone)]
pub struct TransitionHandlerRecord {
    pub handler_info: HandlerInfo,
    /// Shape of the receiver after the store.
    pub transition_shape: Shape,
}

impl HeapMarkAndSweep for PlainHandler {
    fn mark_values(&self, queues: &mut WorkQueues) {
        match self {
            PlainHandler::Packed(_) => {}
            PlainHandler::PropertyBox(property_box) => property_box.mark_values(queues),
        }
    }
}

impl HeapMarkAndSweep for Handler {
    fn mark_values(&self, queues: &mut WorkQueues) {
        match self {
            Handler::Packed(_) => {}
            Handler::PropertyBox(property_box) => property_box.mark_values(queues),
            Handler::Prototype(handler) => handler.mark_values(queues),
            Handler::Transition(handler) => handler.mark_values(queues),
        }
    }
}

impl HeapMarkAndSweep for PrototypeHandlerRecord {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self {
            handler_info,
            holder,
            invalidation_cell,
        } = self;
        handler_info.mark_values(queues);
        holder.mark_values(queues);
        invalidation_cell.mark_values(queues);
    }
}

impl HeapMarkAndSweep for TransitionHandlerRecord {
    fn mark_values(&self, queues: &mut WorkQueues) {
        let Self {
            handler_info: _,
            transition_shape,
        } = self;
        transition_shape.mark_values(queues);
    }
}
