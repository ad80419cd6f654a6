/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! End-to-end tests of the host/engine boundary, run against the in-process mock engine.
//!
//! Each test builds its own engine and binding, so tests never share registry or arena state.

mod ownership;
mod proxies;
mod ptrcall;
mod scoping;
mod virtuals;

#[cfg(feature = "serde")]
mod serialization;

use std::rc::Rc;

use tether_core::binding::Binding;
use tether_ffi::mock::MockEngine;

pub(crate) fn setup() -> (Rc<MockEngine>, Binding) {
    let engine = Rc::new(MockEngine::new());
    let binding = Binding::new(engine.clone());
    (engine, binding)
}
