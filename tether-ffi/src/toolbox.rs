/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Functions and macros that are not very specific to tether, but come in handy.

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Macros

/// Verifies at compile time that a type does **not** implement a given auto trait, e.g. `Send` or `Sync`.
///
/// If `$T: $Trait` held, both blanket impls below would apply and the type inference of `_` would be ambiguous.
#[macro_export]
macro_rules! static_assert_not_impl {
    ($T:ty: $Trait:path) => {
        const _: fn() = || {
            trait AmbiguousIfImpl<A> {
                fn some_item() {}
            }

            impl<T: ?Sized> AmbiguousIfImpl<()> for T {}

            #[allow(dead_code)]
            struct Invalid;
            impl<T: ?Sized + $Trait> AmbiguousIfImpl<Invalid> for T {}

            let _ = <$T as AmbiguousIfImpl<_>>::some_item;
        };
    };
}

/// Trace output.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! out {
    ()                          => ({});
    ($fmt:literal)              => ($crate::__tracing::trace!(target: "tether::trace", $fmt));
    ($fmt:literal, $($arg:tt)*) => ($crate::__tracing::trace!(target: "tether::trace", $fmt, $($arg)*));
}

/// Trace output.
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! out {
    ()                          => ({});
    ($fmt:literal)              => ({ use std::io::{sink, Write}; let _ = write!(sink(), $fmt); });
    ($fmt:literal, $($arg:tt)*) => ({ use std::io::{sink, Write}; let _ = write!(sink(), $fmt, $($arg)*); };)
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Utility functions

/// Maps a possibly negative index onto `0..len`, wrapping around in both directions.
///
/// `-1` refers to the last element, `len` to the first one again. This mirrors the indexing convention of the
/// embedding language and is deliberately **not** a bounds check.
///
/// # Panics
/// If `len` is zero, as there is no element to wrap onto.
#[inline]
pub fn wrap_index(index: i64, len: usize) -> usize {
    assert!(len != 0, "cannot index into empty container (index {index})");

    let len = i64::try_from(len).expect("container length exceeds i64::MAX");
    index.rem_euclid(len) as usize
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
