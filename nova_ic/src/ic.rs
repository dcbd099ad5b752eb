// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Inline caches
//!
//! An inline cache remembers, per property access site, which receiver
//! shapes the site has seen and how the property was accessed on each of
//! them. The dispatch loop asks the [`CacheSlotTable`] for a handler before
//! running the slow path property lookup, and reports misses to
//! [`IcRuntime`] afterwards so that the next access can skip the lookup.

mod accessor;
pub mod builder;
pub mod handler;
mod property_lookup;
mod runtime;
pub mod slot;

use core::fmt;

pub use accessor::{CacheAccessor, CacheSlotTable, IcSite, IcSlot};
pub use property_lookup::{LookupValue, ObjectModel, PropertyLookupResult};
pub use runtime::IcRuntime;

/// Maximum length of a cache in words; every entry takes two words, one
/// for the shape and one for the handler.
pub const CACHE_MAX_LEN: usize = 8;
/// Length in words of a freshly promoted polymorphic cache.
pub const POLY_DEFAULT_LEN: usize = 4;
/// Maximum number of shape and handler entries in a polymorphic cache.
pub const MAX_POLY_ENTRIES: usize = CACHE_MAX_LEN / 2;
/// Maximum number of key and handler pairs in a computed-key global site.
pub const MAX_GLOBAL_ENTRIES: usize = CACHE_MAX_LEN / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcKind {
    /// `o.x`
    NamedLoadIC,
    /// `o.x = v`
    NamedStoreIC,
    /// `o[k]`
    LoadIC,
    /// `o[k] = v`
    StoreIC,
    /// Read of a global binding by name.
    NamedGlobalLoadIC,
    /// Write of a global binding by name.
    NamedGlobalStoreIC,
    GlobalLoadIC,
    GlobalStoreIC,
}

impl IcKind {
    /// The site's property key is a constant and never part of the cache.
    pub const fn is_named(self) -> bool {
        matches!(
            self,
            IcKind::NamedLoadIC
                | IcKind::NamedStoreIC
                | IcKind::NamedGlobalLoadIC
                | IcKind::NamedGlobalStoreIC
        )
    }

    pub const fn is_global(self) -> bool {
        matches!(
            self,
            IcKind::NamedGlobalLoadIC
                | IcKind::NamedGlobalStoreIC
                | IcKind::GlobalLoadIC
                | IcKind::GlobalStoreIC
        )
    }

    pub const fn is_named_global(self) -> bool {
        matches!(self, IcKind::NamedGlobalLoadIC | IcKind::NamedGlobalStoreIC)
    }

    /// Global site caching by property key rather than by name.
    pub const fn is_value_global(self) -> bool {
        matches!(self, IcKind::GlobalLoadIC | IcKind::GlobalStoreIC)
    }

    pub const fn is_load(self) -> bool {
        matches!(
            self,
            IcKind::NamedLoadIC | IcKind::LoadIC | IcKind::NamedGlobalLoadIC | IcKind::GlobalLoadIC
        )
    }

    pub const fn is_store(self) -> bool {
        !self.is_load()
    }
}

impl fmt::Display for IcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IcKind::NamedLoadIC => "NamedLoadIC",
            IcKind::NamedStoreIC => "NamedStoreIC",
            IcKind::LoadIC => "LoadIC",
            IcKind::StoreIC => "StoreIC",
            IcKind::NamedGlobalLoadIC => "NamedGlobalLoadIC",
            IcKind::NamedGlobalStoreIC => "NamedGlobalStoreIC",
            IcKind::GlobalLoadIC => "GlobalLoadIC",
            IcKind::GlobalStoreIC => "GlobalStoreIC",
        };
        f.write_str(name)
    }
}

/// Observable saturation level of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IcState {
    Uninit,
    Mono,
    Poly,
    Mega,
}

impl fmt::Display for IcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IcState::Uninit => "uninit",
            IcState::Mono => "mono",
            IcState::Poly => "poly",
            IcState::Mega => "mega",
        })
    }
}
