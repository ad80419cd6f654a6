/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::ops::Deref;

/// One machine word on the wire. All values crossing the boundary are sequences of words.
pub type Word = u64;

/// Maximum number of words a [`Words`] buffer holds; enough for every handle kind and vector.
///
/// Wider values such as matrices are decoded straight from the call frame and never pass through [`Words`].
pub const MAX_WORDS: usize = 4;

/// Inline buffer of up to [`MAX_WORDS`] words.
///
/// Used wherever a handle or other narrow value is moved across the boundary as words, without heap allocation.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct Words {
    buf: [Word; MAX_WORDS],
    len: u8,
}

impl Words {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_WORDS],
            len: 0,
        }
    }

    /// # Panics
    /// If `words` is longer than [`MAX_WORDS`].
    pub fn from_slice(words: &[Word]) -> Self {
        assert!(
            words.len() <= MAX_WORDS,
            "value of {} words exceeds the maximum of {MAX_WORDS}",
            words.len()
        );

        let mut buf = [0; MAX_WORDS];
        buf[..words.len()].copy_from_slice(words);

        Self {
            buf,
            len: words.len() as u8,
        }
    }

    /// A buffer of `len` zero words.
    pub fn zeroed(len: usize) -> Self {
        assert!(len <= MAX_WORDS, "{len} words exceed the maximum of {MAX_WORDS}");
        Self {
            buf: [0; MAX_WORDS],
            len: len as u8,
        }
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.buf[..self.len as usize]
    }

    pub fn as_mut_slice(&mut self) -> &mut [Word] {
        &mut self.buf[..self.len as usize]
    }
}

impl Deref for Words {
    type Target = [Word];

    fn deref(&self) -> &[Word] {
        self.as_slice()
    }
}

impl fmt::Debug for Words {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.as_slice().iter().copied().map(Hex))
            .finish()
    }
}

struct Hex(Word);

impl fmt::Debug for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// What a foreign value is. Determines its word width and the procedure to release it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HandleKind {
    /// Plain engine object, manually managed.
    Object,
    /// Engine object whose lifetime is governed by an engine-side reference count.
    RefCounted,
    /// Engine string buffer: pointer + generation.
    String,
    /// Interned engine string: pointer + generation.
    StringName,
    /// Engine array cookie, separately ref-counted on the engine side.
    Array,
    /// Engine dictionary cookie, separately ref-counted on the engine side.
    Dictionary,
    /// Engine packed-array cookie, separately ref-counted on the engine side.
    PackedArray,
}

impl HandleKind {
    pub const ALL: [HandleKind; 7] = [
        Self::Object,
        Self::RefCounted,
        Self::String,
        Self::StringName,
        Self::Array,
        Self::Dictionary,
        Self::PackedArray,
    ];

    /// Number of words this kind occupies in a call frame.
    ///
    /// Reading the wrong number of words shifts every subsequent argument, so this table is the single source of truth.
    pub const fn width(self) -> usize {
        match self {
            Self::Object | Self::RefCounted => 1,
            Self::String | Self::StringName => 2,
            Self::Array | Self::Dictionary | Self::PackedArray => 1,
        }
    }

    pub const fn is_object(self) -> bool {
        matches!(self, Self::Object | Self::RefCounted)
    }

    pub const fn is_string_like(self) -> bool {
        matches!(self, Self::String | Self::StringName)
    }

    /// Array, dictionary and packed array: single cookie word with an engine-side count.
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::Array | Self::Dictionary | Self::PackedArray)
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Who is responsible for releasing a foreign value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ownership {
    /// The host created the value (or took it over) and must release it exactly once.
    HostOwned,
    /// The engine owns the value and will outlive any host use; the host must never free it.
    EngineOwned,
    /// Shared through the engine reference count; every host reference holds one increment.
    SharedRefCounted,
    /// Valid for the duration of a call only. Nothing to release.
    Borrowed,
}

impl Ownership {
    /// Whether releasing the host-side reference must reach the engine (free or decrement).
    pub const fn must_release_foreign(self) -> bool {
        matches!(self, Self::HostOwned | Self::SharedRefCounted)
    }

    /// Whether handles with this tag are tracked in a lifetime group.
    pub const fn is_group_managed(self) -> bool {
        matches!(self, Self::HostOwned)
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Raw words did not match the width of the kind they were tagged with.
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[error("{kind} handle expects {expected} word(s), got {actual}")]
pub struct WidthMismatch {
    pub kind: HandleKind,
    pub expected: usize,
    pub actual: usize,
}

/// Kind-tagged foreign words, validated against the kind's width at construction.
///
/// This is the explicit encode/decode pair used instead of reinterpreting N-word buffers as typed values.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct RawHandle {
    kind: HandleKind,
    words: Words,
}

impl RawHandle {
    pub fn encode(kind: HandleKind, words: &[Word]) -> Result<Self, WidthMismatch> {
        if words.len() != kind.width() {
            return Err(WidthMismatch {
                kind,
                expected: kind.width(),
                actual: words.len(),
            });
        }

        Ok(Self {
            kind,
            words: Words::from_slice(words),
        })
    }

    /// Encodes a single-word kind (objects and collection cookies).
    ///
    /// # Panics
    /// If `kind` is not one word wide.
    pub fn single(kind: HandleKind, word: Word) -> Self {
        Self::encode(kind, &[word]).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Encodes a two-word kind (strings and string names).
    ///
    /// # Panics
    /// If `kind` is not two words wide.
    pub fn pair(kind: HandleKind, words: [Word; 2]) -> Self {
        Self::encode(kind, &words).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn decode(&self) -> (HandleKind, &[Word]) {
        (self.kind, self.words.as_slice())
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn words(&self) -> Words {
        self.words
    }

    /// First word; the full payload for single-word kinds.
    pub fn first(&self) -> Word {
        self.words[0]
    }

    /// Both words of a two-word kind.
    ///
    /// # Panics
    /// If the kind is not two words wide.
    pub fn as_pair(&self) -> [Word; 2] {
        assert_eq!(self.kind.width(), 2, "{} handle is not a word pair", self.kind);
        [self.words[0], self.words[1]]
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({}, {:?})", self.kind, self.words)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
