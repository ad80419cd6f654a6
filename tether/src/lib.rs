/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The **tether** library lets a host hold, pass and release references to values owned by an external engine, which
//! has its own memory management and reference counting.
//!
//! # Value categories
//!
//! Everything that crosses the boundary falls into one of these categories:
//!
//! 1. **Plain values**: `bool`, `i64`, `f64`, and vectors like `glam::Vec3`.
//!
//!    Encoded into a fixed number of words per call. No lifetime to track. <br><br>
//!
//! 2. **Handles**: [`Handle`][crate::registry::Handle] refers to an engine value tracked by the
//!    [`HandleRegistry`][crate::registry::HandleRegistry], which knows who owns it and how to release it.
//!
//!    Using a handle after its release yields `StaleHandle` instead of touching freed memory; releasing it twice is
//!    detected. <br><br>
//!
//! 3. **Reference-counted objects**: [`RefGd`][crate::obj::RefGd] holds one engine-side reference, taken on creation
//!    and on every clone, given back on drop. <br><br>
//!
//! 4. **Containers**: [`Array`][crate::builtin::Array], [`PackedArray`][crate::builtin::PackedArray],
//!    [`Dictionary`][crate::builtin::Dictionary] and [`GString`][crate::builtin::GString] have reference semantics.
//!
//!    They start out in host memory and are promoted in place to engine storage once they are passed to the engine.
//!    Every clone observes the promotion. Use `duplicate()` for an independent copy.
//!
//! # Threads
//!
//! The engine boundary is single-threaded. All types here are `!Send` and `!Sync`; embedders that drive the engine
//! from several threads must serialize access themselves.
//!
//! # Errors and panics
//!
//! Conditions that can legitimately occur at runtime (an object freed by the engine, a handle of the wrong kind,
//! writing to a frozen container) are returned as [`TetherError`]. Violations of the ABI or of the release discipline
//! (double release, frame overflow, re-homing a proxied container) panic: they mean the generated code and this
//! library disagree, and continuing would corrupt memory.
//!
//! # Cargo features
//!
//! * **`trace`**: trace-level logging of handle, frame and proxy operations through `tracing`.
//! * **`serde`**: `Serialize`/`Deserialize` for handle kinds, ownership tags and local container contents.
//! * **`mock-engine`**: an in-process engine for tests, in `sys::mock`.

#[doc(inline)]
pub use tether_core::{binding, builtin, meta, obj, registry};

pub use tether_core::{TetherError, TetherResult};

#[doc(hidden)]
pub use tether_core::sys;

/// Often-imported symbols.
pub mod prelude {
    pub use super::binding::{Binding, BindingConfig, MethodKey};
    pub use super::builtin::{Array, Dictionary, GString, PackedArray, Sequence};
    pub use super::meta::{FromReturn, ObjectReturn, ReturnConvention, ToArg};
    pub use super::obj::{RefGd, VirtualMethods, VirtualTable};
    pub use super::registry::{Handle, HandleRegistry, LifetimeGroup};
    pub use super::sys::{HandleKind, Ownership};
    pub use super::{TetherError, TetherResult};
}
