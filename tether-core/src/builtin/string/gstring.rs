/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tether_ffi::{out, Frame, HandleKind, RawHandle, StringPtr, Word};

use crate::binding::{Binding, WeakBinding};
use crate::builtin::collections::{Proxy, Sequence};
use crate::meta::error::TetherResult;
use crate::meta::{FromReturn, ReturnConvention, ToArg};

/// [`Proxy`] over an engine string buffer, one `char` per element.
///
/// Engine strings have no read-only flag of their own, so the proxy tracks it.
pub struct EngineStringProxy {
    binding: WeakBinding,
    read_only: Cell<bool>,
}

impl EngineStringProxy {
    pub fn new(binding: &Binding) -> Self {
        Self {
            binding: binding.downgrade(),
            read_only: Cell::new(false),
        }
    }

    /// Fresh, empty engine string owned by the caller.
    pub fn alloc(binding: &Binding) -> (Rc<Self>, RawHandle) {
        let ptr = binding.engine().string_new("");
        (Rc::new(Self::new(binding)), RawHandle::pair(HandleKind::String, ptr))
    }
}

impl Proxy<char> for EngineStringProxy {
    fn index(&self, state: &RawHandle, index: usize) -> char {
        self.binding
            .expect_alive()
            .engine()
            .string_char_at(state.as_pair(), index)
    }

    fn set_index(&self, state: &RawHandle, index: usize, value: char) {
        self.binding
            .expect_alive()
            .engine()
            .string_set_char(state.as_pair(), index, value);
    }

    fn len(&self, state: &RawHandle) -> usize {
        self.binding.expect_alive().engine().string_len(state.as_pair())
    }

    fn resize(&self, state: &RawHandle, len: usize) {
        self.binding
            .expect_alive()
            .engine()
            .string_resize(state.as_pair(), len);
    }

    fn is_read_only(&self, _state: &RawHandle) -> bool {
        self.read_only.get()
    }

    fn make_read_only(&self, _state: &RawHandle) {
        self.read_only.set(true);
    }

    fn release(&self, state: RawHandle) {
        if let Some(binding) = self.binding.upgrade() {
            out!("EngineStringProxy: destroy {:#x}", state.first());
            binding.engine().string_destroy(state.as_pair());
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// String with reference semantics: a sequence of `char`s, local or backed by an engine string buffer.
#[derive(Clone, Default)]
pub struct GString {
    chars: Sequence<char>,
}

impl GString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an engine string without copying. The `GString` now owns it and destroys it with its last reference.
    pub fn adopt_engine(binding: &Binding, ptr: StringPtr) -> Self {
        let proxy = Rc::new(EngineStringProxy::new(binding));
        Self {
            chars: Sequence::through(proxy, RawHandle::pair(HandleKind::String, ptr)),
        }
    }

    /// Copies an engine string the caller keeps owning.
    pub fn copy_engine(binding: &Binding, ptr: StringPtr) -> Self {
        Self::from(binding.engine().string_to_utf8(ptr).as_str())
    }

    /// Moves the characters into an engine string (once, in place) and returns its pointer.
    ///
    /// # Panics
    /// If the string is already proxied through another proxy type.
    pub fn promote(&self, binding: &Binding) -> StringPtr {
        let (_proxy, state) = self.chars.as_proxy(|| EngineStringProxy::alloc(binding));
        state.as_pair()
    }

    pub fn as_sequence(&self) -> &Sequence<char> {
        &self.chars
    }

    /// Independent, local copy.
    pub fn duplicate(&self) -> Self {
        Self {
            chars: self.chars.duplicate(),
        }
    }
}

impl Deref for GString {
    type Target = Sequence<char>;

    fn deref(&self) -> &Sequence<char> {
        &self.chars
    }
}

impl From<&str> for GString {
    fn from(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
        }
    }
}

impl PartialEq for GString {
    fn eq(&self, other: &Self) -> bool {
        self.chars == other.chars
    }
}

impl PartialEq<&str> for GString {
    fn eq(&self, other: &&str) -> bool {
        self.chars.iter_shared().eq(other.chars())
    }
}

impl fmt::Display for GString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chars.iter_shared().try_for_each(|ch| fmt::Write::write_char(f, ch))
    }
}

impl fmt::Debug for GString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(feature = "serde")]
mod serialize {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::*;

    impl Serialize for GString {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl<'de> Deserialize<'de> for GString {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            String::deserialize(deserializer).map(|s| GString::from(s.as_str()))
        }
    }
}

/// Passes the engine string, promoting a local string first.
impl ToArg for GString {
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
        let ptr = self.promote(binding);
        frame.arg(&RawHandle::pair(HandleKind::String, ptr));
        Ok(())
    }
}

/// Engine strings are not reference-counted: an `Owned` string is adopted, anything else is copied.
impl FromReturn for GString {
    const WIDTH: usize = HandleKind::String.width();

    fn from_return(words: &[Word], binding: &Binding, convention: ReturnConvention) -> TetherResult<Self> {
        let ptr = [words[0], words[1]];
        let string = match convention {
            ReturnConvention::Owned | ReturnConvention::Value => Self::adopt_engine(binding, ptr),
            ReturnConvention::Borrowed | ReturnConvention::Shared => Self::copy_engine(binding, ptr),
        };
        Ok(string)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
