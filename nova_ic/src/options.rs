// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::ic::{CACHE_MAX_LEN, MAX_GLOBAL_ENTRIES, POLY_DEFAULT_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// When false every site saturates on its first miss.
    pub ic_enabled: bool,
    /// Maximum length of a keyless or keyed cache in words. Each entry
    /// takes two words.
    pub max_cache_len: usize,
    /// Maximum number of pairs in a computed-key global site.
    pub max_global_entries: usize,
    /// Log every recorded miss at trace level.
    pub trace_misses: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ic_enabled: true,
            max_cache_len: CACHE_MAX_LEN,
            max_global_entries: MAX_GLOBAL_ENTRIES,
            trace_misses: cfg!(feature = "trace-ic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("inline cache length must be a whole number of entries, got {0} words")]
    OddCacheLength(usize),
    #[error(
        "inline cache length of {0} words cannot hold a polymorphic cache of {min} words",
        min = POLY_DEFAULT_LEN
    )]
    CacheTooShort(usize),
    #[error("global inline caches must hold at least one entry")]
    NoGlobalEntries,
}

impl Options {
    pub fn validate(self) -> Result<Self, OptionsError> {
        if self.max_cache_len % 2 != 0 {
            return Err(OptionsError::OddCacheLength(self.max_cache_len));
        }
        if self.max_cache_len < POLY_DEFAULT_LEN {
            return Err(OptionsError::CacheTooShort(self.max_cache_len));
        }
        if self.max_global_entries == 0 {
            return Err(OptionsError::NoGlobalEntries);
        }
        Ok(self)
    }

    /// Maximum number of shape and handler entries in a polymorphic cache.
    pub fn max_poly_entries(&self) -> usize {
        self.max_cache_len / 2
    }
}
