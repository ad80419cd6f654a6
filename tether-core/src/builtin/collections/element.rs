/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_ffi::{FrameArg, FrameReturn, Word, Words};

/// Element type of engine-backed arrays and dictionaries.
///
/// Elements cross the boundary in the same word encoding as call arguments, so every type with a frame codec
/// qualifies.
pub trait ArrayElement: Clone + Default + 'static {
    fn to_element_words(&self) -> Words;
    fn from_element_words(words: &[Word]) -> Self;
}

impl<T> ArrayElement for T
where
    T: FrameArg + FrameReturn + Clone + Default + 'static,
{
    fn to_element_words(&self) -> Words {
        let mut words = Words::zeroed(self.width());
        self.write_words(words.as_mut_slice());
        words
    }

    fn from_element_words(words: &[Word]) -> Self {
        T::read_words(words)
    }
}
