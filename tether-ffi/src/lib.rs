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
//! This is the lowest layer of the host/engine boundary. Nothing in here knows about lifetimes or ownership
//! bookkeeping; it only defines what crosses the boundary and how:
//!
//! * [`Word`] and [`Words`], the unit of the wire format.
//! * [`HandleKind`] and [`Ownership`], the tags that determine word width and release procedure.
//! * [`RawHandle`], a kind-tagged, width-validated encoding of foreign words.
//! * [`Engine`], the function table the engine exposes.
//! * [`FrameArena`], the stack-disciplined scratch buffer for one call's arguments and return slot.

#![cfg_attr(test, allow(unused))]

mod engine;
mod frame;
mod frame_codec;
mod handle;
mod toolbox;

#[cfg(feature = "mock-engine")]
pub mod mock;

#[doc(hidden)]
pub use tracing as __tracing;

pub use engine::{Cookie, Engine, MethodBind, ObjectPtr, StringNamePtr, StringPtr};
pub use frame::{Frame, FrameArena, FrameError, ReturnSlot, DEFAULT_FRAME_CAPACITY};
pub use frame_codec::{FrameArg, FrameReturn};
pub use handle::{HandleKind, Ownership, RawHandle, WidthMismatch, Word, Words, MAX_WORDS};
pub use toolbox::*;
