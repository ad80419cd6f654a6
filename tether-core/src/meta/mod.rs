/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Marshalling of values across the engine boundary, and the error taxonomy.

pub mod error;
mod marshal;
mod param_tuple;

pub use marshal::{FromReturn, ObjectReturn, ReturnConvention, ToArg};
pub use param_tuple::ParamTuple;
