/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_ffi::DEFAULT_FRAME_CAPACITY;

/// Run-time settings of a [`Binding`](super::Binding).
///
/// Compile-time settings are Cargo features (`trace`, `serde`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BindingConfig {
    /// Capacity of the call-frame arena, in words. Calls that need more are a codegen error and panic.
    pub frame_capacity: usize,

    /// Ask the engine whether an object is still alive before handing out its words.
    ///
    /// Without this, an object freed on the engine side is only detected when the engine itself trips over it.
    pub check_liveness: bool,

    /// When the registry is dropped, report handles that were never released and release them.
    pub leak_check: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            check_liveness: true,
            leak_check: true,
        }
    }
}
