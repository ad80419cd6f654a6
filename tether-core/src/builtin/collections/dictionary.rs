/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::any::{type_name, Any};
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;

use tether_ffi::{out, Cookie, Frame, HandleKind, RawHandle, Word};

use super::element::ArrayElement;
use super::proxy::{MapProxy, Promotion};
use crate::binding::{Binding, WeakBinding};
use crate::meta::error::{TetherError, TetherResult};
use crate::meta::{FromReturn, ReturnConvention, ToArg};

/// Insertion-ordered map with reference semantics, local or backed by a [`MapProxy`].
///
/// Follows the same state machine as [`Sequence`](super::Sequence): local maps are promoted in place, once, with
/// [`as_proxy()`](Self::as_proxy); proxied maps never go back. Marshalled as an engine dictionary.
pub struct Dictionary<K: 'static, V: 'static> {
    inner: Rc<RefCell<MapState<K, V>>>,
}

enum MapState<K: 'static, V: 'static> {
    Local(LocalMap<K, V>),
    Promoting,
    Proxied(MapBacking<K, V>),
}

struct LocalMap<K, V> {
    entries: Vec<(K, V)>,
    read_only: bool,
}

struct MapBacking<K: 'static, V: 'static> {
    proxy: Rc<dyn MapProxy<K, V>>,
    state: RawHandle,
}

impl<K: 'static, V: 'static> Clone for MapBacking<K, V> {
    fn clone(&self) -> Self {
        Self {
            proxy: Rc::clone(&self.proxy),
            state: self.state,
        }
    }
}

impl<K: 'static, V: 'static> Drop for MapState<K, V> {
    fn drop(&mut self) {
        if let Self::Proxied(backing) = self {
            backing.proxy.release(backing.state);
        }
    }
}

enum Access<'a, K: 'static, V: 'static> {
    Local(RefMut<'a, LocalMap<K, V>>),
    Proxied(MapBacking<K, V>),
}

impl<K, V> Dictionary<K, V>
where
    K: ArrayElement + PartialEq,
    V: ArrayElement,
{
    pub fn new() -> Self {
        Self::from_state(MapState::Local(LocalMap {
            entries: Vec::new(),
            read_only: false,
        }))
    }

    /// Wraps foreign storage without copying; [`MapProxy::release()`] is called when the last reference goes away.
    pub fn through<P: MapProxy<K, V>>(proxy: Rc<P>, state: RawHandle) -> Self {
        let proxy: Rc<dyn MapProxy<K, V>> = proxy;
        Self::from_state(MapState::Proxied(MapBacking { proxy, state }))
    }

    /// Wraps an engine dictionary without copying, taking a reference of its own.
    pub fn from_engine(binding: &Binding, cookie: Cookie) -> Self {
        binding.engine().collection_ref(cookie);
        Self::adopt_engine(binding, cookie)
    }

    /// Wraps an engine dictionary, taking over a reference the caller already holds.
    pub fn adopt_engine(binding: &Binding, cookie: Cookie) -> Self {
        let proxy = Rc::new(EngineDictionaryProxy::<K, V>::new(binding));
        Self::through(proxy, RawHandle::single(HandleKind::Dictionary, cookie))
    }

    fn from_state(state: MapState<K, V>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    fn access(&self) -> Access<'_, K, V> {
        let guard = self.inner.borrow_mut();
        match &*guard {
            MapState::Local(_) => {}
            MapState::Promoting => panic!("dictionary accessed while it is being promoted to foreign storage"),
            MapState::Proxied(backing) => return Access::Proxied(backing.clone()),
        }

        Access::Local(RefMut::map(guard, |state| match state {
            MapState::Local(local) => local,
            MapState::Promoting | MapState::Proxied(_) => unreachable!("checked above"),
        }))
    }

    pub fn len(&self) -> usize {
        match self.access() {
            Access::Local(local) => local.entries.len(),
            Access::Proxied(b) => b.proxy.len(&b.state),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match self.access() {
            Access::Local(local) => local
                .entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            Access::Proxied(b) => b.proxy.get(&b.state, key),
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces. A new key goes to the end of the iteration order, a replaced one keeps its position.
    pub fn set(&self, key: K, value: V) -> TetherResult<()> {
        match self.access() {
            Access::Local(mut local) => {
                check_writable(local.read_only, "set")?;
                match local.entries.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, slot)) => *slot = value,
                    None => local.entries.push((key, value)),
                }
            }
            Access::Proxied(b) => {
                check_writable(b.proxy.is_read_only(&b.state), "set")?;
                b.proxy.set(&b.state, key, value);
            }
        }
        Ok(())
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> TetherResult<Option<V>> {
        match self.access() {
            Access::Local(mut local) => {
                check_writable(local.read_only, "remove")?;
                let pos = local.entries.iter().position(|(k, _)| k == key);
                Ok(pos.map(|pos| local.entries.remove(pos).1))
            }
            Access::Proxied(b) => {
                check_writable(b.proxy.is_read_only(&b.state), "remove")?;
                Ok(b.proxy.remove(&b.state, key))
            }
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        match self.access() {
            Access::Local(local) => local.entries.iter().map(|(k, _)| k.clone()).collect(),
            Access::Proxied(b) => b.proxy.keys(&b.state),
        }
    }

    /// Copies all entries, in insertion order.
    pub fn to_vec(&self) -> Vec<(K, V)> {
        match self.access() {
            Access::Local(local) => local.entries.clone(),
            Access::Proxied(b) => b
                .proxy
                .keys(&b.state)
                .into_iter()
                .filter_map(|k| b.proxy.get(&b.state, &k).map(|v| (k, v)))
                .collect(),
        }
    }

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
        matches!(*self.inner.borrow(), MapState::Proxied(_))
    }

    pub fn proxy_state(&self) -> Option<RawHandle> {
        match &*self.inner.borrow() {
            MapState::Local(_) | MapState::Promoting => None,
            MapState::Proxied(b) => Some(b.state),
        }
    }

    /// Returns the proxy of type `P` backing this map, promoting it in place first if it is still local.
    ///
    /// Same contract as [`Sequence::as_proxy()`](super::Sequence::as_proxy): identity for the same proxy type, entries
    /// and read-only flag copied on promotion.
    ///
    /// # Panics
    /// If the map is proxied through a different proxy type (`ProxyReassignment`).
    pub fn as_proxy<P, F>(&self, alloc: F) -> (Rc<P>, RawHandle)
    where
        P: MapProxy<K, V>,
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
            Access::Local(mut local) => LocalMap {
                entries: mem::take(&mut local.entries),
                read_only: local.read_only,
            },
        };

        let promotion = Promotion::begin(&*self.inner, taken, MapState::Promoting, MapState::Local);
        let (proxy, state) = alloc();
        let local = promotion.local();
        out!("Dictionary: promote {} entries to `{}`", local.entries.len(), proxy.proxy_name());

        for (key, value) in &local.entries {
            proxy.set(&state, key.clone(), value.clone());
        }
        if local.read_only {
            proxy.make_read_only(&state);
        }

        let dynamic: Rc<dyn MapProxy<K, V>> = proxy.clone();
        promotion.finish(MapState::Proxied(MapBacking {
            proxy: dynamic,
            state,
        }));

        (proxy, state)
    }

    /// Moves the entries into an engine dictionary (once, in place) and returns its cookie.
    pub fn promote(&self, binding: &Binding) -> Cookie {
        let (_proxy, state) = self.as_proxy(|| EngineDictionaryProxy::<K, V>::alloc(binding));
        state.first()
    }

    /// Independent, local, writable copy.
    pub fn duplicate(&self) -> Self {
        Self::from_state(MapState::Local(LocalMap {
            entries: self.to_vec(),
            read_only: false,
        }))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

fn check_writable(read_only: bool, operation: &'static str) -> TetherResult<()> {
    if read_only {
        Err(TetherError::ReadOnlyViolation { operation })
    } else {
        Ok(())
    }
}

impl<K: 'static, V: 'static> Clone for Dictionary<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for Dictionary<K, V>
where
    K: ArrayElement + PartialEq,
    V: ArrayElement,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Dictionary<K, V>
where
    K: ArrayElement + PartialEq,
    V: ArrayElement,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let dict = Self::new();
        for (key, value) in iter {
            // A fresh local map is writable.
            let _ = dict.set(key, value);
        }
        dict
    }
}

/// Same entries in the same order.
impl<K, V> PartialEq for Dictionary<K, V>
where
    K: ArrayElement + PartialEq,
    V: ArrayElement + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.to_vec() == other.to_vec()
    }
}

impl<K, V> fmt::Debug for Dictionary<K, V>
where
    K: ArrayElement + PartialEq + fmt::Debug,
    V: ArrayElement + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.to_vec()).finish()
    }
}

#[cfg(feature = "serde")]
mod serialize {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::*;

    impl<K, V> Serialize for Dictionary<K, V>
    where
        K: ArrayElement + PartialEq + Serialize,
        V: ArrayElement + Serialize,
    {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_map(self.to_vec())
        }
    }

    /// Deserializes into a local, writable map, keeping the input order.
    impl<'de, K, V> Deserialize<'de> for Dictionary<K, V>
    where
        K: ArrayElement + PartialEq + Deserialize<'de>,
        V: ArrayElement + Deserialize<'de>,
    {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct DictionaryVisitor<K, V>(PhantomData<fn() -> (K, V)>);

            impl<'de, K, V> Visitor<'de> for DictionaryVisitor<K, V>
            where
                K: ArrayElement + PartialEq + Deserialize<'de>,
                V: ArrayElement + Deserialize<'de>,
            {
                type Value = Dictionary<K, V>;

                fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                    formatter.write_str("a map")
                }

                fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                    let dict = Dictionary::new();
                    while let Some((key, value)) = access.next_entry()? {
                        dict.set(key, value).map_err(A::Error::custom)?;
                    }
                    Ok(dict)
                }
            }

            deserializer.deserialize_map(DictionaryVisitor(PhantomData))
        }
    }
}

/// Passes the engine cookie, promoting a local map first.
impl<K, V> ToArg for Dictionary<K, V>
where
    K: ArrayElement + PartialEq,
    V: ArrayElement,
{
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
        let cookie = self.promote(binding);
        frame.arg(&RawHandle::single(HandleKind::Dictionary, cookie));
        Ok(())
    }
}

impl<K, V> FromReturn for Dictionary<K, V>
where
    K: ArrayElement + PartialEq,
    V: ArrayElement,
{
    const WIDTH: usize = HandleKind::Dictionary.width();

    fn from_return(words: &[Word], binding: &Binding, convention: ReturnConvention) -> TetherResult<Self> {
        let cookie = words[0];
        let dict = match convention {
            ReturnConvention::Owned | ReturnConvention::Value => Self::adopt_engine(binding, cookie),
            ReturnConvention::Borrowed | ReturnConvention::Shared => Self::from_engine(binding, cookie),
        };
        Ok(dict)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// [`MapProxy`] over an engine dictionary, addressed by its cookie.
pub struct EngineDictionaryProxy<K, V> {
    binding: WeakBinding,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: ArrayElement, V: ArrayElement> EngineDictionaryProxy<K, V> {
    pub fn new(binding: &Binding) -> Self {
        Self {
            binding: binding.downgrade(),
            _marker: PhantomData,
        }
    }

    /// Fresh, empty engine dictionary with one reference held by the caller.
    pub fn alloc(binding: &Binding) -> (Rc<Self>, RawHandle) {
        let cookie = binding.engine().collection_new(HandleKind::Dictionary);
        (
            Rc::new(Self::new(binding)),
            RawHandle::single(HandleKind::Dictionary, cookie),
        )
    }
}

impl<K: ArrayElement, V: ArrayElement> MapProxy<K, V> for EngineDictionaryProxy<K, V> {
    fn get(&self, state: &RawHandle, key: &K) -> Option<V> {
        self.binding
            .expect_alive()
            .engine()
            .dictionary_get(state.first(), &key.to_element_words())
            .map(|words| V::from_element_words(&words))
    }

    fn set(&self, state: &RawHandle, key: K, value: V) {
        self.binding.expect_alive().engine().dictionary_set(
            state.first(),
            &key.to_element_words(),
            &value.to_element_words(),
        );
    }

    fn remove(&self, state: &RawHandle, key: &K) -> Option<V> {
        self.binding
            .expect_alive()
            .engine()
            .dictionary_remove(state.first(), &key.to_element_words())
            .map(|words| V::from_element_words(&words))
    }

    fn len(&self, state: &RawHandle) -> usize {
        self.binding
            .expect_alive()
            .engine()
            .dictionary_len(state.first())
    }

    fn keys(&self, state: &RawHandle) -> Vec<K> {
        self.binding
            .expect_alive()
            .engine()
            .dictionary_keys(state.first())
            .iter()
            .map(|words| K::from_element_words(words))
            .collect()
    }

    fn is_read_only(&self, state: &RawHandle) -> bool {
        self.binding
            .expect_alive()
            .engine()
            .collection_is_read_only(state.first())
    }

    fn make_read_only(&self, state: &RawHandle) {
        self.binding
            .expect_alive()
            .engine()
            .collection_make_read_only(state.first());
    }

    fn release(&self, state: RawHandle) {
        if let Some(binding) = self.binding.upgrade() {
            binding.engine().collection_unref(state.first());
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
