/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Containers that are either local or proxied to foreign storage.

mod array;
mod dictionary;
mod element;
mod proxy;
mod sequence;

pub use array::{Array, EngineArrayProxy, PackedArray};
pub use dictionary::{Dictionary, EngineDictionaryProxy};
pub use element::ArrayElement;
pub use proxy::{MapProxy, Proxy};
pub use sequence::{Iter, Sequence, WeakSequence};
