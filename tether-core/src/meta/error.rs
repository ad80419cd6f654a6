/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_ffi::{FrameError, HandleKind};

use crate::registry::Handle;

/// Result of an operation in this crate that can fail for dynamic reasons.
pub type TetherResult<T> = Result<T, TetherError>;

/// Every failure the core can report.
///
/// The variants fall into two classes:
/// - **Dynamic conditions** ([`StaleHandle`][Self::StaleHandle], [`TypeMismatch`][Self::TypeMismatch],
///   [`ReadOnlyViolation`][Self::ReadOnlyViolation]) can legitimately occur at runtime (an object freed by the engine,
///   a wrong value passed by user code). They are returned as `Err`.
/// - **Design violations** (all others) mean generated code and the core disagree about the ABI or the release
///   discipline. Operations raise them as panics; checked variants such as
///   [`HandleRegistry::try_release()`](crate::registry::HandleRegistry::try_release) return them instead.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum TetherError {
    #[error("stale handle: {handle} was released or freed by the engine")]
    StaleHandle { handle: Handle },

    #[error("type mismatch: expected {expected} handle, found {actual}")]
    TypeMismatch {
        expected: HandleKind,
        actual: HandleKind,
    },

    #[error("read-only violation: cannot {operation} a frozen container")]
    ReadOnlyViolation { operation: &'static str },

    #[error("double release of {handle}")]
    DoubleRelease { handle: Handle },

    #[error("unbalanced lifetime group: closing #{closing} while #{innermost} is innermost")]
    UnbalancedLifetimeGroup { closing: u64, innermost: u64 },

    #[error("call frame overflow: {requested} word(s) requested with {used} of {capacity} in use")]
    FrameOverflow {
        requested: usize,
        used: usize,
        capacity: usize,
    },

    #[error("proxy reassignment: container is proxied through `{current}`, cannot re-home it to `{requested}`")]
    ProxyReassignment {
        current: &'static str,
        requested: &'static str,
    },
}

impl TetherError {
    /// Whether this error signals a design violation rather than a dynamic condition.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::StaleHandle { .. } | Self::TypeMismatch { .. } | Self::ReadOnlyViolation { .. }
        )
    }

    /// Raises a design violation.
    #[track_caller]
    pub(crate) fn fatal(self) -> ! {
        debug_assert!(self.is_fatal(), "recoverable error raised as panic: {self}");
        panic!("{self}")
    }

    /// Reports an error on a drop path, where it can neither be returned nor raised during unwinding.
    pub(crate) fn raise_in_drop(self) {
        if std::thread::panicking() {
            tracing::error!(target: "tether", "{self} (while unwinding)");
        } else {
            panic!("{self}");
        }
    }
}

impl From<FrameError> for TetherError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Overflow {
                requested,
                used,
                capacity,
            } => Self::FrameOverflow {
                requested,
                used,
                capacity,
            },
            FrameError::Unbalanced { closing, innermost } => {
                Self::UnbalancedLifetimeGroup { closing, innermost }
            }
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
