/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use glam::{IVec2, IVec3, IVec4, Quat, Vec2, Vec3, Vec4};
use tether_ffi::{Frame, FrameReturn, HandleKind, Ownership, RawHandle, Word};

use crate::binding::Binding;
use crate::meta::error::{TetherError, TetherResult};
use crate::obj::RefGd;
use crate::registry::Handle;

/// How the engine hands out the value a method returns. Declared per method by generated code, never inferred.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ReturnConvention {
    /// Plain data (scalars, vectors). Nothing to track.
    Value,

    /// The caller receives ownership (e.g. a freshly constructed object). The host must release it.
    Owned,

    /// The engine keeps ownership and outlives the call. The host must never free it.
    Borrowed,

    /// Reference-counted: the host takes its own reference and gives it back when done.
    Shared,
}

/// Values that can be passed as arguments of an engine call.
pub trait ToArg {
    /// Packs the value into the next slot(s) of `frame`.
    ///
    /// Temporaries (e.g. engine strings built from `&str`) are registered as host-owned handles. They belong to the
    /// lifetime group of the current call and are released together after it returns.
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()>;
}

/// Values that can be read from the return slot of an engine call.
pub trait FromReturn: Sized {
    /// Width of the return slot, in words.
    const WIDTH: usize;

    fn from_return(words: &[Word], binding: &Binding, convention: ReturnConvention) -> TetherResult<Self>;
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
        (**self).push_arg(frame, binding)
    }
}

impl FromReturn for () {
    const WIDTH: usize = 0;

    fn from_return(_words: &[Word], _binding: &Binding, _convention: ReturnConvention) -> TetherResult<Self> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Plain data

macro_rules! impl_marshal_by_value {
    ($($T:ty),+ $(,)?) => {$(
        impl ToArg for $T {
            fn push_arg(&self, frame: &mut Frame<'_>, _binding: &Binding) -> TetherResult<()> {
                frame.arg(self);
                Ok(())
            }
        }

        impl FromReturn for $T {
            const WIDTH: usize = <$T as FrameReturn>::WIDTH;

            fn from_return(words: &[Word], _binding: &Binding, _convention: ReturnConvention) -> TetherResult<Self> {
                Ok(<$T as FrameReturn>::read_words(words))
            }
        }
    )+};
}

impl_marshal_by_value!(bool, i32, i64, u32, u64, f32, f64, char);
impl_marshal_by_value!(Vec2, Vec3, Vec4, IVec2, IVec3, IVec4, Quat);

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Strings

impl ToArg for str {
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
        let raw = binding.temporary_string(self);
        frame.arg(&raw);
        Ok(())
    }
}

impl ToArg for String {
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
        self.as_str().push_arg(frame, binding)
    }
}

/// Reads the engine string into host memory. An `Owned` string is destroyed afterwards.
impl FromReturn for String {
    const WIDTH: usize = HandleKind::String.width();

    fn from_return(words: &[Word], binding: &Binding, convention: ReturnConvention) -> TetherResult<Self> {
        let ptr = [words[0], words[1]];
        let engine = binding.engine();
        let text = engine.string_to_utf8(ptr);

        if matches!(convention, ReturnConvention::Owned | ReturnConvention::Value) {
            engine.string_destroy(ptr);
        }
        Ok(text)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Objects and handles

/// Passes the registered value. Fails with `StaleHandle` if it was released or freed by the engine.
impl ToArg for Handle {
    fn push_arg(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
        let raw = binding.registry().pack(*self)?;
        frame.arg(&raw);
        Ok(())
    }
}

impl ToArg for RawHandle {
    fn push_arg(&self, frame: &mut Frame<'_>, _binding: &Binding) -> TetherResult<()> {
        frame.arg(self);
        Ok(())
    }
}

/// Passes the object pointer. The engine takes its own reference if it keeps the object.
impl ToArg for RefGd {
    fn push_arg(&self, frame: &mut Frame<'_>, _binding: &Binding) -> TetherResult<()> {
        let obj = self.object_ptr()?;
        frame.arg(&RawHandle::single(HandleKind::RefCounted, obj));
        Ok(())
    }
}

/// Object returned from an engine call, registered according to its [`ReturnConvention`].
#[derive(Debug)]
pub enum ObjectReturn {
    /// The engine returned a null pointer.
    Null,

    /// A plain object: host-owned for `Owned`, engine-owned for `Borrowed`. Must be released by the caller.
    Handle(Handle),

    /// A reference-counted object, wrapped with its own reference.
    RefCounted(RefGd),
}

impl ObjectReturn {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            Self::Null => None,
            Self::Handle(handle) => Some(*handle),
            Self::RefCounted(obj) => Some(obj.handle()),
        }
    }

    pub fn into_ref_counted(self) -> Option<RefGd> {
        match self {
            Self::RefCounted(obj) => Some(obj),
            Self::Null | Self::Handle(_) => None,
        }
    }
}

impl FromReturn for ObjectReturn {
    const WIDTH: usize = HandleKind::Object.width();

    /// # Panics
    /// For [`ReturnConvention::Value`]: objects always need a declared ownership convention.
    fn from_return(words: &[Word], binding: &Binding, convention: ReturnConvention) -> TetherResult<Self> {
        let obj = words[0];
        if obj == 0 {
            return Ok(Self::Null);
        }

        let registry = binding.registry();
        let ref_counted = binding.engine().object_is_ref_counted(obj);
        let raw = if ref_counted {
            RawHandle::single(HandleKind::RefCounted, obj)
        } else {
            RawHandle::single(HandleKind::Object, obj)
        };

        let ret = match (convention, ref_counted) {
            (ReturnConvention::Value, _) => {
                panic!("object {obj:#x} returned by value; objects need an ownership convention")
            }
            (ReturnConvention::Owned | ReturnConvention::Shared, true) => {
                Self::RefCounted(RefGd::from_shared(registry, raw))
            }
            (ReturnConvention::Shared, false) => {
                return Err(TetherError::TypeMismatch {
                    expected: HandleKind::RefCounted,
                    actual: HandleKind::Object,
                });
            }
            (ReturnConvention::Owned, false) => {
                let handle = registry.adopt(raw, Ownership::EngineOwned);
                Self::Handle(registry.transfer(handle, Ownership::EngineOwned, Ownership::HostOwned)?)
            }
            (ReturnConvention::Borrowed, _) => Self::Handle(registry.adopt(raw, Ownership::EngineOwned)),
        };

        Ok(ret)
    }
}

