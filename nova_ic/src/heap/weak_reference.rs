// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Non-owning reference to a heap value.
///
/// A weak reference does not keep its referent alive; the garbage collector
/// may clear it at any safepoint. The referent is only observable through
/// [`WeakReferences::resolve_weak_reference`], which reports a cleared
/// reference as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct WeakReference<T>(pub(crate) T);

/// Weak reference capability of the memory manager.
///
/// All weak access performed by the inline caches goes through this trait;
/// the caches never assume that a referent survives between two calls.
pub trait WeakReferences<T: Copy> {
    /// Create a weak reference to the given value.
    fn create_weak_reference(&mut self, value: T) -> WeakReference<T>;

    /// Resolve a weak reference, returning `None` if it has been cleared.
    fn resolve_weak_reference(&self, weak: WeakReference<T>) -> Option<T>;
}

impl<T: Copy + PartialEq> WeakReference<T> {
    #[inline]
    pub fn new(host: &mut impl WeakReferences<T>, value: T) -> Self {
        host.create_weak_reference(value)
    }

    #[inline]
    pub fn resolve(self, host: &impl WeakReferences<T>) -> Option<T> {
        host.resolve_weak_reference(self)
    }

    /// Returns true if the reference is still live and refers to `value`.
    /// A cleared reference never matches.
    #[inline]
    pub fn refers_to(self, host: &impl WeakReferences<T>, value: T) -> bool {
        self.resolve(host) == Some(value)
    }
}
