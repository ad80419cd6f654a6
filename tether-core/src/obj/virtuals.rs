/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;
use std::fmt;

use tether_ffi::{out, Word};

/// Host-side implementation of one overridable engine callback: `(instance, args, ret)`.
pub type VirtualFn<T> = fn(&mut T, &[Word], &mut [Word]);

/// Capability of a host type to override engine callbacks.
///
/// Both methods have no-op defaults: a type that overrides nothing needs only an empty `impl`.
pub trait VirtualMethods: Sized + 'static {
    /// Adds this type's overrides to its dispatch table.
    fn register_virtuals(table: &mut VirtualTable<Self>) {
        let _ = table;
    }

    /// Invoked for callbacks the type does not override.
    fn unhandled_virtual(&mut self, name: &str) {
        let _ = name;
    }
}

/// Name-keyed dispatch table for the overrides of one host type.
///
/// This is the single seam through which the engine reaches host overrides; generated code never dispatches by itself.
pub struct VirtualTable<T> {
    entries: HashMap<&'static str, VirtualFn<T>>,
}

impl<T: VirtualMethods> VirtualTable<T> {
    /// Builds the table from [`VirtualMethods::register_virtuals()`].
    pub fn new() -> Self {
        let mut table = Self::empty();
        T::register_virtuals(&mut table);
        table
    }

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// # Panics
    /// If `name` is already registered.
    pub fn register(&mut self, name: &'static str, f: VirtualFn<T>) -> &mut Self {
        let previous = self.entries.insert(name, f);
        assert!(previous.is_none(), "virtual method `{name}` registered twice");
        self
    }

    /// Routes an engine callback to the override registered under `name`.
    ///
    /// Returns whether an override ran. Unknown names fall back to [`VirtualMethods::unhandled_virtual()`] and leave
    /// `ret` untouched.
    pub fn dispatch(&self, instance: &mut T, name: &str, args: &[Word], ret: &mut [Word]) -> bool {
        match self.entries.get(name) {
            Some(f) => {
                out!("virtual: dispatch `{name}` with {} arg word(s)", args.len());
                f(instance, args, ret);
                true
            }
            None => {
                instance.unhandled_virtual(name);
                false
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: VirtualMethods> Default for VirtualTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for VirtualTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("VirtualTable").field("overrides", &names).finish()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
