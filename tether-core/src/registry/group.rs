/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use super::HandleRegistry;
use crate::meta::error::TetherResult;

/// Identifies a lifetime group. Ids are never reused within one registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct GroupId(u64);

impl GroupId {
    /// The implicit group that is always open. Handles registered outside any explicit group belong to it.
    pub const ROOT: Self = Self(0);

    pub(super) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scope guard for a set of host-owned handles that are released together.
///
/// Covers a scope of host code, or the argument temporaries of one foreign call. Groups are stack-like: they must close in reverse order of
/// opening. Dropping the guard closes the group; use [`close()`](Self::close) to observe ordering violations as a value.
#[must_use = "dropping a lifetime group immediately releases it"]
pub struct LifetimeGroup {
    registry: HandleRegistry,
    id: GroupId,
    closed: bool,
}

impl LifetimeGroup {
    pub(super) fn new(registry: HandleRegistry, id: GroupId) -> Self {
        Self {
            registry,
            id,
            closed: false,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Releases all handles in the group.
    ///
    /// Returns [`UnbalancedLifetimeGroup`][crate::TetherError::UnbalancedLifetimeGroup] if another group opened later is
    /// still open. The members are released in either case.
    pub fn close(mut self) -> TetherResult<()> {
        self.closed = true;
        self.registry.close_group(self.id)
    }
}

impl Drop for LifetimeGroup {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.registry.close_group(self.id) {
                err.raise_in_drop();
            }
        }
    }
}

impl fmt::Debug for LifetimeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeGroup").field("id", &self.id).finish()
    }
}
