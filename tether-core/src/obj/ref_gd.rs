/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use tether_ffi::{out, HandleKind, ObjectPtr, Ownership, RawHandle};

use crate::meta::error::{TetherError, TetherResult};
use crate::registry::{Handle, HandleRegistry};

/// Smart pointer to an engine object whose lifetime is governed by the engine-side reference count.
///
/// Every `RefGd` holds exactly one engine reference:
/// - construction takes it synchronously, before the pointer is reachable from host code;
/// - [`Clone`] takes another one through [`HandleRegistry::duplicate()`];
/// - [`Drop`] gives it back and destroys the object if that was the last reference, engine-side or host-side.
///
/// Host and engine thus share one count, and every increment is paired with exactly one decrement.
pub struct RefGd {
    registry: HandleRegistry,
    handle: Handle,
    /// Cleared once the reference is handed out through [`into_handle()`](Self::into_handle).
    owns_reference: bool,
}

impl RefGd {
    /// Wraps a ref-counted object the engine handed out, taking one reference.
    ///
    /// # Panics
    /// If `raw` is not a [`HandleKind::RefCounted`] handle.
    pub fn from_shared(registry: &HandleRegistry, raw: RawHandle) -> Self {
        let handle = registry.adopt(raw, Ownership::SharedRefCounted);
        out!("RefGd: wrap {handle}");

        Self {
            registry: registry.clone(),
            handle,
            owns_reference: true,
        }
    }

    /// Takes over release duty for an already registered shared handle.
    ///
    /// Fails with `TypeMismatch` if the handle is not a ref-counted object, and `StaleHandle` if it is no longer live.
    ///
    /// # Panics
    /// If the handle is live but not `SharedRefCounted`.
    pub fn from_handle(registry: &HandleRegistry, handle: Handle) -> TetherResult<Self> {
        registry.assert_kind(handle, HandleKind::RefCounted)?;
        let ownership = registry.ownership(handle)?;
        assert_eq!(
            ownership,
            Ownership::SharedRefCounted,
            "RefGd requires a shared handle, {handle} is {ownership}"
        );

        Ok(Self {
            registry: registry.clone(),
            handle,
            owns_reference: true,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Object pointer, or `StaleHandle` if the engine freed the object behind the host's back.
    pub fn object_ptr(&self) -> TetherResult<ObjectPtr> {
        self.registry
            .pack(self.handle)
            .map(|raw| raw.first())
    }

    /// Current engine-side reference count.
    pub fn ref_count(&self) -> TetherResult<u32> {
        let obj = self.object_ptr()?;
        Ok(self.registry.engine().ref_count(obj))
    }

    /// Whether the object is still alive on the engine side.
    pub fn is_instance_valid(&self) -> bool {
        self.object_ptr().is_ok()
    }

    /// Gives up the wrapper without releasing its reference. The returned handle must be released manually.
    pub fn into_handle(mut self) -> Handle {
        self.owns_reference = false;
        self.handle
    }
}

impl Clone for RefGd {
    fn clone(&self) -> Self {
        let handle = self
            .registry
            .duplicate(self.handle)
            .unwrap_or_else(|err| panic!("cannot clone RefGd: {err}"));

        Self {
            registry: self.registry.clone(),
            handle,
            owns_reference: true,
        }
    }
}

impl Drop for RefGd {
    fn drop(&mut self) {
        if !self.owns_reference {
            return;
        }

        out!("RefGd: drop {}", self.handle);
        if let Err(err) = self.registry.try_release(self.handle) {
            err.raise_in_drop();
        }
    }
}

/// Two `RefGd`s are equal if they point to the same engine object.
impl PartialEq for RefGd {
    fn eq(&self, other: &Self) -> bool {
        match (self.object_ptr(), other.object_ptr()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for RefGd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object_ptr() {
            Ok(obj) => write!(f, "RefGd {{ handle: {}, object: {obj:#x} }}", self.handle),
            Err(TetherError::StaleHandle { .. }) => write!(f, "RefGd {{ handle: {}, <freed> }}", self.handle),
            Err(err) => write!(f, "RefGd {{ handle: {}, <{err}> }}", self.handle),
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
