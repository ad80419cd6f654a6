/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::Rc;

use tether_ffi::{out, Cookie, Frame, HandleKind, RawHandle, Word};

use super::element::ArrayElement;
use super::proxy::Proxy;
use super::sequence::Sequence;
use crate::binding::{Binding, WeakBinding};
use crate::meta::error::TetherResult;
use crate::meta::{FromReturn, ReturnConvention, ToArg};

/// [`Proxy`] over an engine array or packed array, addressed by its cookie.
///
/// Holds only a weak back-reference to the binding: a container must not keep the engine context alive.
pub struct EngineArrayProxy<T> {
    binding: WeakBinding,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ArrayElement> EngineArrayProxy<T> {
    pub fn new(binding: &Binding) -> Self {
        Self {
            binding: binding.downgrade(),
            _marker: PhantomData,
        }
    }

    /// Fresh, empty engine storage of the given collection kind, with one reference held by the caller.
    pub fn alloc(binding: &Binding, kind: HandleKind) -> (Rc<Self>, RawHandle) {
        assert!(
            matches!(kind, HandleKind::Array | HandleKind::PackedArray),
            "{kind} is not an array kind"
        );

        let cookie = binding.engine().collection_new(kind);
        out!("EngineArrayProxy: alloc {kind} {cookie:#x}");
        (Rc::new(Self::new(binding)), RawHandle::single(kind, cookie))
    }
}

impl<T: ArrayElement> Proxy<T> for EngineArrayProxy<T> {
    fn index(&self, state: &RawHandle, index: usize) -> T {
        let binding = self.binding.expect_alive();
        let words = binding.engine().array_get(state.first(), index);
        T::from_element_words(&words)
    }

    fn set_index(&self, state: &RawHandle, index: usize, value: T) {
        let binding = self.binding.expect_alive();
        binding
            .engine()
            .array_set(state.first(), index, &value.to_element_words());
    }

    fn len(&self, state: &RawHandle) -> usize {
        self.binding.expect_alive().engine().array_len(state.first())
    }

    fn resize(&self, state: &RawHandle, len: usize) {
        let binding = self.binding.expect_alive();
        binding
            .engine()
            .array_resize(state.first(), len, &T::default().to_element_words());
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
        // Without the binding, the engine (and the storage) is gone already.
        if let Some(binding) = self.binding.upgrade() {
            out!("EngineArrayProxy: unref {:#x}", state.first());
            binding.engine().collection_unref(state.first());
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

macro_rules! impl_engine_array {
    (
        $( #[$attr:meta] )*
        $Array:ident => $Kind:ident
    ) => {
        $( #[$attr] )*
        #[derive(Clone)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $Array<T: ArrayElement> {
            seq: Sequence<T>,
        }

        impl<T: ArrayElement> $Array<T> {
            /// Handle kind this type is marshalled as.
            pub const KIND: HandleKind = HandleKind::$Kind;

            /// Empty, local array.
            pub fn new() -> Self {
                Self::from_vec(Vec::new())
            }

            pub fn from_vec(items: Vec<T>) -> Self {
                Self {
                    seq: Sequence::from_vec(items),
                }
            }

            /// Wraps an engine array without copying, taking a reference of its own.
            pub fn from_engine(binding: &Binding, cookie: Cookie) -> Self {
                binding.engine().collection_ref(cookie);
                Self::adopt_engine(binding, cookie)
            }

            /// Wraps an engine array without copying, taking over a reference the caller already holds.
            pub fn adopt_engine(binding: &Binding, cookie: Cookie) -> Self {
                let proxy = Rc::new(EngineArrayProxy::<T>::new(binding));
                Self {
                    seq: Sequence::through(proxy, RawHandle::single(Self::KIND, cookie)),
                }
            }

            /// Moves the elements into engine storage (once, in place) and returns the cookie.
            ///
            /// # Panics
            /// If the array is already proxied through another proxy type.
            pub fn promote(&self, binding: &Binding) -> Cookie {
                let (_proxy, state) = self
                    .seq
                    .as_proxy(|| EngineArrayProxy::<T>::alloc(binding, Self::KIND));
                state.first()
            }

            /// Engine cookie, if the array is engine-backed.
            pub fn cookie(&self) -> Option<Cookie> {
                self.seq
                    .proxy_state()
                    .filter(|state| state.kind() == Self::KIND)
                    .map(|state| state.first())
            }

            pub fn as_sequence(&self) -> &Sequence<T> {
                &self.seq
            }

            pub fn into_sequence(self) -> Sequence<T> {
                self.seq
            }

            /// Independent, local copy.
            pub fn duplicate(&self) -> Self {
                Self {
                    seq: self.seq.duplicate(),
                }
            }
        }

        impl<T: ArrayElement> Deref for $Array<T> {
            type Target = Sequence<T>;

            fn deref(&self) -> &Sequence<T> {
                &self.seq
            }
        }

        impl<T: ArrayElement> Default for $Array<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T: ArrayElement> From<Vec<T>> for $Array<T> {
            fn from(items: Vec<T>) -> Self {
                Self::from_vec(items)
            }
        }

        impl<T: ArrayElement> FromIterator<T> for $Array<T> {
            fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
                Self::from_vec(iter.into_iter().collect())
            }
        }

        impl<T: ArrayElement + PartialEq> PartialEq for $Array<T> {
            fn eq(&self, other: &Self) -> bool {
                self.seq == other.seq
            }
        }

        impl<T: ArrayElement + fmt::Debug> fmt::Debug for $Array<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($Array)).field(&self.seq.to_vec()).finish()
            }
        }

        /// Passes the engine cookie, promoting a local array first.
        impl<T: ArrayElement> ToArg for $Array<T> {
            fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
                let cookie = self.promote(binding);
                frame.arg(&RawHandle::single(Self::KIND, cookie));
                Ok(())
            }
        }

        impl<T: ArrayElement> FromReturn for $Array<T> {
            const WIDTH: usize = HandleKind::$Kind.width();

            fn from_return(words: &[Word], binding: &Binding, convention: ReturnConvention) -> TetherResult<Self> {
                let cookie = words[0];
                let array = match convention {
                    ReturnConvention::Owned | ReturnConvention::Value => Self::adopt_engine(binding, cookie),
                    ReturnConvention::Borrowed | ReturnConvention::Shared => Self::from_engine(binding, cookie),
                };
                Ok(array)
            }
        }
    };
}

impl_engine_array! {
    /// Typed array with reference semantics, marshalled as an engine array.
    ///
    /// Starts out local; passing it to the engine promotes it in place to engine storage, after which every clone
    /// observes the engine-side contents.
    Array => Array
}

impl_engine_array! {
    /// Contiguous array of plain values, marshalled as an engine packed array.
    PackedArray => PackedArray
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
