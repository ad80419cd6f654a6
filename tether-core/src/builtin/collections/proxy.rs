/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::any::{type_name, Any};
use std::cell::RefCell;

use tether_ffi::RawHandle;

/// Storage operations of a container whose elements live somewhere other than host memory.
///
/// A proxy is stateless with respect to the container: everything that identifies the backing storage is in the opaque
/// `state` token (typically a packed engine cookie) that the container passes back on every call. Indices are already
/// wrapped into `0..len` by the container.
///
/// Proxies are compared by their concrete type, see [`Sequence::as_proxy()`](super::Sequence::as_proxy).
pub trait Proxy<T>: Any {
    fn index(&self, state: &RawHandle, index: usize) -> T;
    fn set_index(&self, state: &RawHandle, index: usize, value: T);
    fn len(&self, state: &RawHandle) -> usize;

    /// Grows by appending default elements, or truncates.
    fn resize(&self, state: &RawHandle, len: usize);

    fn is_read_only(&self, state: &RawHandle) -> bool;
    fn make_read_only(&self, state: &RawHandle);

    /// Called once, when the last host reference to the proxied container goes away.
    fn release(&self, state: RawHandle) {
        let _ = state;
    }

    /// Name used in diagnostics.
    fn proxy_name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Storage operations of a map-like container, counterpart of [`Proxy`] for [`Dictionary`](super::Dictionary).
pub trait MapProxy<K, V>: Any {
    fn get(&self, state: &RawHandle, key: &K) -> Option<V>;
    fn set(&self, state: &RawHandle, key: K, value: V);
    fn remove(&self, state: &RawHandle, key: &K) -> Option<V>;
    fn len(&self, state: &RawHandle) -> usize;

    /// All keys, in insertion order.
    fn keys(&self, state: &RawHandle) -> Vec<K>;

    fn is_read_only(&self, state: &RawHandle) -> bool;
    fn make_read_only(&self, state: &RawHandle);

    fn release(&self, state: RawHandle) {
        let _ = state;
    }

    fn proxy_name(&self) -> &'static str {
        type_name::<Self>()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Local contents taken out of a container for the duration of its promotion.
///
/// While it is alive, the container is in its "promoting" state and rejects every access, including from engine
/// callbacks that `alloc` or the proxy run. If the promotion unwinds, the local contents are put back.
pub(super) struct Promotion<'a, S, L> {
    cell: &'a RefCell<S>,
    local: Option<L>,
    restore: fn(L) -> S,
}

impl<'a, S, L> Promotion<'a, S, L> {
    pub fn begin(cell: &'a RefCell<S>, local: L, promoting: S, restore: fn(L) -> S) -> Self {
        *cell.borrow_mut() = promoting;
        Self {
            cell,
            local: Some(local),
            restore,
        }
    }

    pub fn local(&self) -> &L {
        self.local.as_ref().expect("promotion already finished")
    }

    /// Installs the new backing and drops the local contents.
    pub fn finish(mut self, proxied: S) {
        self.local = None;
        *self.cell.borrow_mut() = proxied;
    }
}

impl<S, L> Drop for Promotion<'_, S, L> {
    fn drop(&mut self) {
        if let Some(local) = self.local.take() {
            *self.cell.borrow_mut() = (self.restore)(local);
        }
    }
}
