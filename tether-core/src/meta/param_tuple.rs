/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_ffi::Frame;

use crate::binding::Binding;
use crate::meta::error::TetherResult;
use crate::meta::ToArg;

/// Argument list of an engine call: a tuple of [`ToArg`] values, pushed in declaration order.
pub trait ParamTuple {
    /// Number of parameters.
    const LEN: usize;

    fn push_args(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()>;
}

macro_rules! count_idents {
    () => { 0 };
    ($id:ident $($rest:ident)*) => { 1 + count_idents!($($rest)*)};
}

macro_rules! impl_param_tuple {
    ($(($p:ident, $n:tt): $P:ident),*) => {
        impl<$($P),*> ParamTuple for ($($P,)*) where $($P: ToArg),* {
            const LEN: usize = count_idents!($($P)*);

            #[allow(unused_variables)]
            fn push_args(&self, frame: &mut Frame<'_>, binding: &Binding) -> TetherResult<()> {
                $(
                    self.$n.push_arg(frame, binding)?;
                )*
                Ok(())
            }
        }
    };
}

impl_param_tuple!();
impl_param_tuple!((p0, 0): P0);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4, (p5, 5): P5);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4, (p5, 5): P5, (p6, 6): P6);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4, (p5, 5): P5, (p6, 6): P6, (p7, 7): P7);
