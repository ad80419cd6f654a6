/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::any::{type_name, Any};
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use tether_ffi::{out, wrap_index, RawHandle};

use super::proxy::{Promotion, Proxy};
use crate::meta::error::{TetherError, TetherResult};

/// Growable sequence that is backed either by host memory or by a foreign representation behind a [`Proxy`].
///
/// # Reference semantics
/// `Sequence` is a reference type: [`Clone`] yields another reference to the same storage, like arrays in the embedding
/// language. Use [`duplicate()`](Self::duplicate) for an independent copy.
///
/// # States
/// A sequence starts out either _local_ (elements in a host `Vec`) or _proxied_ (constructed with
/// [`through()`](Self::through)). A local sequence can be promoted exactly once, with [`as_proxy()`](Self::as_proxy);
/// the promotion happens in place, so every other reference observes the new backing. There is no way back.
/// While the promotion copies elements across, the sequence cannot be used at all.
///
/// # Indexing
/// Indices are `i64` and wrap around in both directions: `-1` is the last element, `len` the first one. This is the
/// indexing convention of the embedding language, not an out-of-bounds condition. Only empty sequences have no valid
/// index.
pub struct Sequence<T: 'static> {
    inner: Rc<RefCell<SeqState<T>>>,
}

/// Non-owning back-reference to a [`Sequence`], see [`Sequence::downgrade()`].
pub struct WeakSequence<T: 'static> {
    inner: Weak<RefCell<SeqState<T>>>,
}

enum SeqState<T: 'static> {
    Local(LocalStore<T>),
    /// Elements are being copied into new foreign storage, see [`Promotion`].
    Promoting,
    Proxied(Backing<T>),
}

struct LocalStore<T> {
    items: Vec<T>,
    read_only: bool,
}

struct Backing<T: 'static> {
    proxy: Rc<dyn Proxy<T>>,
    state: RawHandle,
}

impl<T: 'static> Clone for Backing<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: Rc::clone(&self.proxy),
            state: self.state,
        }
    }
}

impl<T: 'static> Drop for SeqState<T> {
    fn drop(&mut self) {
        if let Self::Proxied(backing) = self {
            out!("Sequence: release backing of `{}`", backing.proxy.proxy_name());
            backing.proxy.release(backing.state);
        }
    }
}

/// Either the borrowed local storage or a detached copy of the backing. Proxy calls never run under a borrow, since
/// they may reach the engine, and the engine may call back into the host.
enum Access<'a, T: 'static> {
    Local(RefMut<'a, LocalStore<T>>),
    Proxied(Backing<T>),
}

impl<T> Sequence<T>
where
    T: Clone + Default + 'static,
{
    /// Empty, local sequence.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self::from_state(SeqState::Local(LocalStore {
            items,
            read_only: false,
        }))
    }

    /// Wraps foreign storage without copying. The sequence delegates every operation to `proxy`, passing `state` along.
    ///
    /// When the last reference goes away, [`Proxy::release()`] is called with `state`.
    pub fn through<P: Proxy<T>>(proxy: Rc<P>, state: RawHandle) -> Self {
        let proxy: Rc<dyn Proxy<T>> = proxy;
        Self::from_state(SeqState::Proxied(Backing { proxy, state }))
    }

    fn from_state(state: SeqState<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// # Panics
    /// While the sequence is being promoted, e.g. when an engine callback reaches it from inside
    /// [`as_proxy()`](Self::as_proxy).
    fn access(&self) -> Access<'_, T> {
        let guard = self.inner.borrow_mut();
        match &*guard {
            SeqState::Local(_) => {}
            SeqState::Promoting => panic!("sequence accessed while it is being promoted to foreign storage"),
            SeqState::Proxied(backing) => return Access::Proxied(backing.clone()),
        }

        Access::Local(RefMut::map(guard, |state| match state {
            SeqState::Local(local) => local,
            SeqState::Promoting | SeqState::Proxied(_) => unreachable!("checked above"),
        }))
    }

    pub fn len(&self) -> usize {
        match self.access() {
            Access::Local(local) => local.items.len(),
            Access::Proxied(b) => b.proxy.len(&b.state),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// ⚠️ Returns the element at `index`, wrapping around in both directions.
    ///
    /// # Panics
    /// If the sequence is empty. Use [`get()`](Self::get) to handle that case.
    pub fn lookup(&self, index: i64) -> T {
        match self.access() {
            Access::Local(local) => {
                let i = wrap_index(index, local.items.len());
                local.items[i].clone()
            }
            Access::Proxied(b) => {
                let i = wrap_index(index, b.proxy.len(&b.state));
                b.proxy.index(&b.state, i)
            }
        }
    }

    /// Returns the element at `index` (wrapping around), or `None` if the sequence is empty.
    pub fn get(&self, index: i64) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            Some(self.lookup(index))
        }
    }

    /// ⚠️ Replaces the element at `index`, wrapping around in both directions.
    ///
    /// Fails with `ReadOnlyViolation` on a frozen sequence.
    ///
    /// # Panics
    /// If the sequence is empty.
    pub fn mutate(&self, index: i64, value: T) -> TetherResult<()> {
        match self.access() {
            Access::Local(mut local) => {
                check_writable(local.read_only, "mutate")?;
                let i = wrap_index(index, local.items.len());
                local.items[i] = value;
            }
            Access::Proxied(b) => {
                check_writable(b.proxy.is_read_only(&b.state), "mutate")?;
                let i = wrap_index(index, b.proxy.len(&b.state));
                b.proxy.set_index(&b.state, i, value);
            }
        }
        Ok(())
    }

    /// Grows by appending default (zero) elements, or truncates.
    pub fn resize(&self, len: usize) -> TetherResult<()> {
        match self.access() {
            Access::Local(mut local) => {
                check_writable(local.read_only, "resize")?;
                local.items.resize(len, T::default());
            }
            Access::Proxied(b) => {
                check_writable(b.proxy.is_read_only(&b.state), "resize")?;
                b.proxy.resize(&b.state, len);
            }
        }
        Ok(())
    }

    /// Appends an element.
    pub fn push(&self, value: T) -> TetherResult<()> {
        match self.access() {
            Access::Local(mut local) => {
                check_writable(local.read_only, "push")?;
                local.items.push(value);
            }
            Access::Proxied(b) => {
                check_writable(b.proxy.is_read_only(&b.state), "push")?;
                let len = b.proxy.len(&b.state);
                b.proxy.resize(&b.state, len + 1);
                b.proxy.set_index(&b.state, len, value);
            }
        }
        Ok(())
    }

    /// Removes and returns the last element, or `None` if empty.
    pub fn pop(&self) -> TetherResult<Option<T>> {
        match self.access() {
            Access::Local(mut local) => {
                check_writable(local.read_only, "pop")?;
                Ok(local.items.pop())
            }
            Access::Proxied(b) => {
                check_writable(b.proxy.is_read_only(&b.state), "pop")?;
                let len = b.proxy.len(&b.state);
                if len == 0 {
                    return Ok(None);
                }

                let last = b.proxy.index(&b.state, len - 1);
                b.proxy.resize(&b.state, len - 1);
                Ok(Some(last))
            }
        }
    }

    pub fn clear(&self) -> TetherResult<()> {
        self.resize(0)
    }

    pub fn front(&self) -> Option<T> {
        self.get(0)
    }

    pub fn back(&self) -> Option<T> {
        self.get(-1)
    }

    /// Makes the sequence read-only. All later mutations fail with `ReadOnlyViolation`. Cannot be undone.
    pub fn freeze(&self) {
        match self.access() {
            Access::Local(mut local) => local.read_only = true,
            Access::Proxied(b) => b.proxy.make_read_only(&b.state),
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self.access() {
            Access::Local(local) => local.read_only,
            Access::Proxied(b) => b.proxy.is_read_only(&b.state),
        }
    }

    pub fn is_proxied(&self) -> bool {
        matches!(*self.inner.borrow(), SeqState::Proxied(_))
    }

    /// State token of the backing, if proxied.
    pub fn proxy_state(&self) -> Option<RawHandle> {
        match &*self.inner.borrow() {
            SeqState::Local(_) | SeqState::Promoting => None,
            SeqState::Proxied(b) => Some(b.state),
        }
    }

    /// Returns the proxy of type `P` backing this sequence, promoting it first if it is still local.
    ///
    /// - **Proxied through `P`:** returns the existing proxy and state unchanged. Re-wrapping never creates a second
    ///   copy that could diverge.
    /// - **Local:** calls `alloc` for fresh foreign storage, copies all elements and the read-only flag across, then
    ///   switches this sequence (and thus every reference to it) over to the new backing.
    ///
    /// # Panics
    /// If the sequence is proxied through a proxy type other than `P` (`ProxyReassignment`). A container cannot be
    /// re-homed while the first backing still refers to it; use [`duplicate()`](Self::duplicate) to hand out a copy.
    pub fn as_proxy<P, F>(&self, alloc: F) -> (Rc<P>, RawHandle)
    where
        P: Proxy<T>,
        F: FnOnce() -> (Rc<P>, RawHandle),
    {
        let taken = match self.access() {
            Access::Proxied(b) => {
                let current = b.proxy.proxy_name();
                let any: Rc<dyn Any> = b.proxy;

                return match any.downcast::<P>() {
                    Ok(proxy) => (proxy, b.state),
                    Err(_) => TetherError::ProxyReassignment {
                        current,
                        requested: type_name::<P>(),
                    }
                    .fatal(),
                };
            }
            Access::Local(mut local) => LocalStore {
                items: mem::take(&mut local.items),
                read_only: local.read_only,
            },
        };

        let promotion = Promotion::begin(&*self.inner, taken, SeqState::Promoting, SeqState::Local);
        let (proxy, state) = alloc();
        let local = promotion.local();
        out!("Sequence: promote {} element(s) to `{}`", local.items.len(), proxy.proxy_name());

        proxy.resize(&state, local.items.len());
        for (i, item) in local.items.iter().enumerate() {
            proxy.set_index(&state, i, item.clone());
        }
        if local.read_only {
            proxy.make_read_only(&state);
        }

        let dynamic: Rc<dyn Proxy<T>> = proxy.clone();
        promotion.finish(SeqState::Proxied(Backing {
            proxy: dynamic,
            state,
        }));

        (proxy, state)
    }

    /// Copies all elements into a `Vec`. Reading through is always by copy.
    pub fn to_vec(&self) -> Vec<T> {
        match self.access() {
            Access::Local(local) => local.items.clone(),
            Access::Proxied(b) => {
                let len = b.proxy.len(&b.state);
                (0..len).map(|i| b.proxy.index(&b.state, i)).collect()
            }
        }
    }

    /// Independent, local, writable copy of the current elements.
    pub fn duplicate(&self) -> Self {
        Self::from_vec(self.to_vec())
    }

    /// Iterates over the elements, reading each one through the current backing.
    ///
    /// The iterator observes modifications made while iterating, like iterating an engine array by index would.
    pub fn iter_shared(&self) -> Iter<'_, T> {
        Iter {
            seq: self,
            next_idx: 0,
        }
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.iter_shared().any(|item| item == *value)
    }

    /// Back-reference that does not keep the storage alive.
    pub fn downgrade(&self) -> WeakSequence<T> {
        WeakSequence {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether both references point to the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn at(&self, index: usize) -> Option<T> {
        match self.access() {
            Access::Local(local) => local.items.get(index).cloned(),
            Access::Proxied(b) => {
                (index < b.proxy.len(&b.state)).then(|| b.proxy.index(&b.state, index))
            }
        }
    }
}

fn check_writable(read_only: bool, operation: &'static str) -> TetherResult<()> {
    if read_only {
        Err(TetherError::ReadOnlyViolation { operation })
    } else {
        Ok(())
    }
}

impl<T: 'static> Clone for Sequence<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Sequence<T>
where
    T: Clone + Default + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for Sequence<T>
where
    T: Clone + Default + 'static,
{
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> FromIterator<T> for Sequence<T>
where
    T: Clone + Default + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Element-wise comparison of the current contents, regardless of backing.
impl<T> PartialEq for Sequence<T>
where
    T: Clone + Default + PartialEq + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.to_vec() == other.to_vec()
    }
}

impl<T> fmt::Debug for Sequence<T>
where
    T: Clone + Default + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &*self.inner.borrow() {
            SeqState::Local(_) => "local",
            SeqState::Promoting => "promoting",
            SeqState::Proxied(b) => b.proxy.proxy_name(),
        };
        f.debug_struct("Sequence")
            .field("backing", &backing)
            .field("items", &self.to_vec())
            .finish()
    }
}

#[cfg(feature = "serde")]
mod serialize {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::*;

    impl<T> Serialize for Sequence<T>
    where
        T: Clone + Default + Serialize + 'static,
    {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(self.to_vec())
        }
    }

    /// Deserializes into a local, writable sequence.
    impl<'de, T> Deserialize<'de> for Sequence<T>
    where
        T: Clone + Default + Deserialize<'de> + 'static,
    {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            Vec::<T>::deserialize(deserializer).map(Self::from_vec)
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

impl<T: 'static> WeakSequence<T> {
    pub fn upgrade(&self) -> Option<Sequence<T>> {
        self.inner.upgrade().map(|inner| Sequence { inner })
    }
}

impl<T: 'static> Clone for WeakSequence<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for WeakSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakSequence {{ alive: {} }}", self.inner.strong_count() > 0)
    }
}

/// An iterator over the elements of a [`Sequence`].
pub struct Iter<'a, T: 'static> {
    seq: &'a Sequence<T>,
    next_idx: usize,
}

impl<T> Iterator for Iter<'_, T>
where
    T: Clone + Default + 'static,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.seq.at(self.next_idx)?;
        self.next_idx += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.seq.len().saturating_sub(self.next_idx);
        (remaining, Some(remaining))
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
