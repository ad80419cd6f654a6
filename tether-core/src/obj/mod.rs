/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Engine objects on the host side: the ref-counted smart pointer and overridable callbacks.

mod ref_gd;
mod virtuals;

pub use ref_gd::RefGd;
pub use virtuals::{VirtualFn, VirtualMethods, VirtualTable};
