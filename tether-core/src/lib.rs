/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! # Internal crate of **tether**
//!
//! Do not depend on this crate directly, instead use the `tether` crate.
//! No SemVer or other guarantees are provided.
//!
//! # Contributor docs
//!
//! The safe layer on top of `tether-ffi`:
//!
//! * [`registry`]: typed, lifetime-tagged handles with lifetime groups.
//! * [`obj`]: the ref-counted object pointer and virtual-callback dispatch.
//! * [`builtin`]: containers that are local or proxied to engine storage.
//! * [`meta`]: argument/return marshalling and the error taxonomy.
//! * [`binding`]: the context passed to every call site.

#![forbid(unsafe_code)]

pub mod binding;
pub mod builtin;
pub mod meta;
pub mod obj;
pub mod registry;

pub use meta::error::{TetherError, TetherResult};
pub use tether_ffi as sys;

#[doc(hidden)]
pub use tether_ffi::out;
