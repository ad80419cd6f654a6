/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Word encodings of plain values.
//!
//! Integers are sign- or zero-extended into one word, floats always cross as `f64` bits, and vector types occupy one
//! word per component in `x, y, z, w` order. Matrices and affine transforms occupy one word per element, column by
//! column; an affine transform's translation is its last column.

use glam::{Affine2, Affine3A, IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::{RawHandle, Word};

/// Values that can be serialized into call-frame slots.
pub trait FrameArg {
    /// Number of words written by [`write_words()`](Self::write_words).
    fn width(&self) -> usize;

    /// `out` has exactly [`width()`](Self::width) words.
    fn write_words(&self, out: &mut [Word]);
}

/// Values that can be read back from a return slot.
pub trait FrameReturn: Sized {
    const WIDTH: usize;

    /// `words` has exactly [`WIDTH`](Self::WIDTH) words.
    fn read_words(words: &[Word]) -> Self;
}

impl<T: FrameArg + ?Sized> FrameArg for &T {
    fn width(&self) -> usize {
        (**self).width()
    }

    fn write_words(&self, out: &mut [Word]) {
        (**self).write_words(out)
    }
}

impl FrameReturn for () {
    const WIDTH: usize = 0;

    fn read_words(_words: &[Word]) -> Self {}
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Scalars

macro_rules! impl_frame_scalar {
    ($T:ty, |$v:ident| $encode:expr, |$w:ident| $decode:expr) => {
        impl FrameArg for $T {
            fn width(&self) -> usize {
                1
            }

            fn write_words(&self, out: &mut [Word]) {
                let $v = *self;
                out[0] = $encode;
            }
        }

        impl FrameReturn for $T {
            const WIDTH: usize = 1;

            fn read_words(words: &[Word]) -> Self {
                let $w = words[0];
                $decode
            }
        }
    };
}

impl_frame_scalar!(bool, |v| v as Word, |w| w != 0);
impl_frame_scalar!(i32, |v| v as i64 as Word, |w| w as i64 as i32);
impl_frame_scalar!(i64, |v| v as Word, |w| w as i64);
impl_frame_scalar!(u32, |v| v as Word, |w| w as u32);
impl_frame_scalar!(u64, |v| v, |w| w);
impl_frame_scalar!(f32, |v| f64::from(v).to_bits(), |w| f64::from_bits(w) as f32);
impl_frame_scalar!(f64, |v| v.to_bits(), |w| f64::from_bits(w));
impl_frame_scalar!(char, |v| v as Word, |w| {
    char::from_u32(w as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
});

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Vectors

macro_rules! impl_frame_vector {
    (@next $iter:ident, $c:ident) => {
        $iter.next().expect(concat!("missing component ", stringify!($c)))
    };

    ($T:ty, $N:literal, $Comp:ty, [$($c:ident),+]) => {
        impl FrameArg for $T {
            fn width(&self) -> usize {
                $N
            }

            fn write_words(&self, out: &mut [Word]) {
                let comps: [$Comp; $N] = [$(self.$c),+];
                for (slot, comp) in out.iter_mut().zip(comps) {
                    comp.write_words(std::slice::from_mut(slot));
                }
            }
        }

        impl FrameReturn for $T {
            const WIDTH: usize = $N;

            fn read_words(words: &[Word]) -> Self {
                let mut comps = words.iter().map(|w| <$Comp>::read_words(std::slice::from_ref(w)));
                Self::new($(impl_frame_vector!(@next comps, $c)),+)
            }
        }
    };
}

impl_frame_vector!(Vec2, 2, f32, [x, y]);
impl_frame_vector!(Vec3, 3, f32, [x, y, z]);
impl_frame_vector!(Vec4, 4, f32, [x, y, z, w]);
impl_frame_vector!(IVec2, 2, i32, [x, y]);
impl_frame_vector!(IVec3, 3, i32, [x, y, z]);
impl_frame_vector!(IVec4, 4, i32, [x, y, z, w]);

impl FrameArg for Quat {
    fn width(&self) -> usize {
        4
    }

    fn write_words(&self, out: &mut [Word]) {
        Vec4::from(*self).write_words(out)
    }
}

impl FrameReturn for Quat {
    const WIDTH: usize = 4;

    fn read_words(words: &[Word]) -> Self {
        Quat::from_vec4(Vec4::read_words(words))
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Matrices

macro_rules! impl_frame_matrix {
    ($T:ty, $N:literal) => {
        impl FrameArg for $T {
            fn width(&self) -> usize {
                $N
            }

            fn write_words(&self, out: &mut [Word]) {
                for (slot, elem) in out.iter_mut().zip(self.to_cols_array()) {
                    elem.write_words(std::slice::from_mut(slot));
                }
            }
        }

        impl FrameReturn for $T {
            const WIDTH: usize = $N;

            fn read_words(words: &[Word]) -> Self {
                let mut cols = [0.0f32; $N];
                for (elem, word) in cols.iter_mut().zip(words) {
                    *elem = f32::read_words(std::slice::from_ref(word));
                }
                Self::from_cols_array(&cols)
            }
        }
    };
}

impl_frame_matrix!(Mat2, 4);
impl_frame_matrix!(Mat3, 9);
impl_frame_matrix!(Mat4, 16);
impl_frame_matrix!(Affine2, 6);
impl_frame_matrix!(Affine3A, 12);

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Handles

impl FrameArg for RawHandle {
    fn width(&self) -> usize {
        self.kind().width()
    }

    fn write_words(&self, out: &mut [Word]) {
        out.copy_from_slice(self.decode().1);
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
