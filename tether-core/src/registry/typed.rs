/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_ffi::{Cookie, HandleKind, ObjectPtr, RawHandle, StringNamePtr, StringPtr};

/// Statically typed view of a raw handle of one kind.
///
/// Obtained through [`HandleRegistry::downcast()`](super::HandleRegistry::downcast), which validates the kind tag first.
/// This replaces reinterpreting raw word buffers as typed pointers.
pub trait HandleType: Copy {
    const KIND: HandleKind;

    /// Reads the typed value out of raw words. The kind has already been checked.
    fn from_raw(raw: RawHandle) -> Self;

    fn to_raw(self) -> RawHandle;
}

macro_rules! impl_handle_types {
    ($(
        $( #[$attr:meta] )*
        $Name:ident($Repr:ty) => $Kind:ident, $read:ident, $write:ident;
    )*) => {$(
        $( #[$attr] )*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        pub struct $Name(pub $Repr);

        impl HandleType for $Name {
            const KIND: HandleKind = HandleKind::$Kind;

            fn from_raw(raw: RawHandle) -> Self {
                debug_assert_eq!(raw.kind(), Self::KIND);
                Self(raw.$read())
            }

            fn to_raw(self) -> RawHandle {
                RawHandle::$write(Self::KIND, self.0)
            }
        }
    )*};
}

impl_handle_types! {
    /// Plain engine object pointer.
    ObjectRef(ObjectPtr) => Object, first, single;
    /// Pointer to an engine object with an engine-side reference count.
    RefCountedRef(ObjectPtr) => RefCounted, first, single;
    /// Engine string: pointer and generation.
    StringRef(StringPtr) => String, as_pair, pair;
    /// Interned engine string: pointer and generation.
    StringNameRef(StringNamePtr) => StringName, as_pair, pair;
    ArrayCookie(Cookie) => Array, first, single;
    DictionaryCookie(Cookie) => Dictionary, first, single;
    PackedArrayCookie(Cookie) => PackedArray, first, single;
}
