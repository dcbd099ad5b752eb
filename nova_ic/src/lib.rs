// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Nova inline caches
//!
//! Per-site caches for property reads and writes. The [`ic`] module holds
//! the cache slots, the handler codec and the handler builders; the
//! [`heap`] module is a small reference host providing shapes, property
//! keys, weak references and a collector for the caches to run against.

pub mod heap;
pub mod ic;
mod options;

pub use options::{Options, OptionsError};
