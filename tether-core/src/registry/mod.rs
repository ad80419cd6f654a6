/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Typed, lifetime-tagged handles to foreign values.
//!
//! The registry is the single place that knows who owns a foreign value and how to release it. Every handle it hands
//! out addresses a generational slot: releasing poisons the slot, and reusing it bumps the generation, so a stale
//! [`Handle`] can never silently observe a different value.

mod group;
mod typed;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tether_ffi::{out, Engine, HandleKind, Ownership, RawHandle, Word, Words};

use crate::binding::BindingConfig;
use crate::meta::error::{TetherError, TetherResult};

pub use group::{GroupId, LifetimeGroup};
pub use typed::{
    ArrayCookie, DictionaryCookie, HandleType, ObjectRef, PackedArrayCookie, RefCountedRef, StringNameRef, StringRef,
};

/// Reference to one registered foreign value.
///
/// Handles are plain `Copy` data. They do not keep anything alive: validity is checked against the registry on every
/// access, which yields [`TetherError::StaleHandle`] once the value has been released.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Handle {
    index: u32,
    generation: u32,
    kind: HandleKind,
}

impl Handle {
    pub fn kind(self) -> HandleKind {
        self.kind
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", self.kind, self.index, self.generation)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Bookkeeping of all foreign values the host currently refers to.
///
/// Cloning yields another reference to the same registry. The registry is deliberately `!Send` and `!Sync`: the engine
/// boundary is single-threaded, and embedders that use it from several threads must serialize access themselves.
#[derive(Clone)]
pub struct HandleRegistry {
    inner: Rc<RegistryInner>,
}

struct RegistryInner {
    engine: Rc<dyn Engine>,
    check_liveness: bool,
    leak_check: bool,
    state: RefCell<RegistryState>,
}

struct RegistryState {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,

    /// Open lifetime groups, innermost last. Index 0 is always the root group.
    groups: Vec<GroupRecord>,
    next_group: u64,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Copy, Clone, Debug)]
struct Entry {
    raw: RawHandle,
    ownership: Ownership,
    group: Option<GroupId>,
}

struct GroupRecord {
    id: GroupId,
    purpose: GroupPurpose,
    members: Vec<Handle>,
}

/// Host code scopes the handles it keeps; a call only collects the temporaries it packed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum GroupPurpose {
    Scope,
    Call,
}

/// Foreign work that remains after a slot has been vacated. Run once the state is no longer borrowed, since the engine
/// may call back into the host while freeing.
enum ForeignRelease {
    Nothing,
    Free(RawHandle),
    Unreference(RawHandle),
}

impl ForeignRelease {
    fn for_entry(entry: &Entry) -> Self {
        match entry.ownership {
            Ownership::HostOwned => Self::Free(entry.raw),
            Ownership::SharedRefCounted => Self::Unreference(entry.raw),
            Ownership::EngineOwned | Ownership::Borrowed => Self::Nothing,
        }
    }
}

impl HandleRegistry {
    pub fn new(engine: Rc<dyn Engine>) -> Self {
        Self::with_config(engine, &BindingConfig::default())
    }

    pub fn with_config(engine: Rc<dyn Engine>, config: &BindingConfig) -> Self {
        let state = RegistryState {
            slots: Vec::new(),
            free_slots: Vec::new(),
            groups: vec![GroupRecord {
                id: GroupId::ROOT,
                purpose: GroupPurpose::Scope,
                members: Vec::new(),
            }],
            next_group: 1,
        };

        Self {
            inner: Rc::new(RegistryInner {
                engine,
                check_liveness: config.check_liveness,
                leak_check: config.leak_check,
                state: RefCell::new(state),
            }),
        }
    }

    pub fn engine(&self) -> &dyn Engine {
        &*self.inner.engine
    }

    pub(crate) fn engine_rc(&self) -> Rc<dyn Engine> {
        Rc::clone(&self.inner.engine)
    }

    /// Wraps raw foreign words with a kind tag. No ownership is taken: the handle is [`Ownership::Borrowed`].
    ///
    /// # Panics
    /// If `words` does not have the width of `kind`. That is an ABI mismatch, not a dynamic condition.
    pub fn new_handle(&self, kind: HandleKind, words: &[Word]) -> Handle {
        let raw = RawHandle::encode(kind, words).unwrap_or_else(|err| panic!("{err}"));
        self.adopt(raw, Ownership::Borrowed)
    }

    /// Registers a foreign value under the given ownership tag.
    ///
    /// - `HostOwned` handles join the [current group](Self::current_group). Groups opened for engine calls never adopt
    ///   them, so an object the host creates inside an engine callback outlives that call.
    /// - `SharedRefCounted` handles take one engine-side reference immediately, so the object cannot be freed before the
    ///   host wrapper is reachable.
    pub fn adopt(&self, raw: RawHandle, ownership: Ownership) -> Handle {
        if ownership == Ownership::SharedRefCounted {
            self.take_reference(raw);
        }

        let mut state = self.inner.state.borrow_mut();
        let group = ownership.is_group_managed().then(|| state.current_scope());
        let handle = state.insert(raw, ownership, group);
        drop(state);

        out!("registry: adopt {handle} as {ownership}");
        handle
    }

    /// Registers a host-owned temporary of the engine call that opened `group`. It is released when the call returns.
    ///
    /// # Panics
    /// If `group` is not an open call group.
    pub(crate) fn adopt_temporary(&self, raw: RawHandle, group: GroupId) -> Handle {
        let mut state = self.inner.state.borrow_mut();
        let is_call = state
            .groups
            .iter()
            .any(|record| record.id == group && record.purpose == GroupPurpose::Call);
        assert!(is_call, "temporary {raw:?} needs an open call group, {group} is none");

        let handle = state.insert(raw, Ownership::HostOwned, Some(group));
        drop(state);

        out!("registry: temporary {handle} in call group {group}");
        handle
    }

    /// Creates a fresh, empty foreign value of the given kind, owned by the host.
    ///
    /// # Panics
    /// For object kinds, which are constructed by class through [`Binding::construct_object()`](crate::binding::Binding::construct_object).
    pub fn acquire(&self, kind: HandleKind) -> Handle {
        let engine = self.engine();
        let raw = match kind {
            HandleKind::Object | HandleKind::RefCounted => {
                panic!("{kind} handles are constructed by class, not acquired")
            }
            HandleKind::String => RawHandle::pair(kind, engine.string_new("")),
            HandleKind::StringName => RawHandle::pair(kind, engine.string_name_new("")),
            HandleKind::Array | HandleKind::Dictionary | HandleKind::PackedArray => {
                RawHandle::single(kind, engine.collection_new(kind))
            }
        };

        self.adopt(raw, Ownership::HostOwned)
    }

    /// Creates a host-owned engine string holding `text`.
    pub fn acquire_string(&self, text: &str) -> Handle {
        let raw = RawHandle::pair(HandleKind::String, self.engine().string_new(text));
        self.adopt(raw, Ownership::HostOwned)
    }

    /// Returns the raw words of a live handle.
    pub fn get(&self, handle: Handle) -> TetherResult<Words> {
        self.pack(handle).map(|raw| raw.words())
    }

    /// Returns the kind-tagged raw value of a live handle.
    ///
    /// Object handles that the host tracks (everything but `Borrowed`) are checked for liveness when
    /// [`BindingConfig::check_liveness`] is set: an object freed by the engine yields `StaleHandle`.
    pub fn pack(&self, handle: Handle) -> TetherResult<RawHandle> {
        let entry = self.entry(handle)?;

        if self.inner.check_liveness
            && entry.raw.kind().is_object()
            && entry.ownership != Ownership::Borrowed
            && !self.engine().object_is_alive(entry.raw.first())
        {
            return Err(TetherError::StaleHandle { handle });
        }

        Ok(entry.raw)
    }

    /// Like [`pack()`](Self::pack), but additionally validates the kind tag.
    pub fn assert_kind(&self, handle: Handle, expected: HandleKind) -> TetherResult<RawHandle> {
        let raw = self.pack(handle)?;
        if raw.kind() != expected {
            return Err(TetherError::TypeMismatch {
                expected,
                actual: raw.kind(),
            });
        }

        Ok(raw)
    }

    /// Typed downcast of a handle, see [`HandleType`].
    pub fn downcast<T: HandleType>(&self, handle: Handle) -> TetherResult<T> {
        self.assert_kind(handle, T::KIND).map(T::from_raw)
    }

    /// Releases a handle, reaching the engine as its ownership tag demands.
    ///
    /// # Panics
    /// On double release. The underlying foreign free is not idempotent, so this is a design violation.
    #[track_caller]
    pub fn release(&self, handle: Handle) {
        if let Err(err) = self.try_release(handle) {
            err.fatal();
        }
    }

    /// Checked variant of [`release()`](Self::release), returning [`TetherError::DoubleRelease`] instead of panicking.
    pub fn try_release(&self, handle: Handle) -> TetherResult<()> {
        let entry = self
            .inner
            .state
            .borrow_mut()
            .remove(handle)
            .ok_or(TetherError::DoubleRelease { handle })?;

        out!("registry: release {handle} ({})", entry.ownership);
        self.inner.release_foreign(ForeignRelease::for_entry(&entry));
        Ok(())
    }

    /// Creates a second host reference to a shared object, taking one more engine-side reference.
    ///
    /// Each duplicate is its own handle and must be released on its own.
    ///
    /// # Panics
    /// If `handle` is not `SharedRefCounted`.
    pub fn duplicate(&self, handle: Handle) -> TetherResult<Handle> {
        let entry = self.entry(handle)?;
        assert_eq!(
            entry.ownership,
            Ownership::SharedRefCounted,
            "only shared handles can be duplicated, {handle} is {}",
            entry.ownership
        );

        let obj = entry.raw.first();
        if self.inner.check_liveness && !self.engine().object_is_alive(obj) {
            return Err(TetherError::StaleHandle { handle });
        }

        assert!(self.engine().ref_inc(obj), "engine refused reference on {obj:#x}");
        let copy = self.inner.state.borrow_mut().insert(entry.raw, entry.ownership, None);
        out!("registry: duplicate {handle} -> {copy}");
        Ok(copy)
    }

    /// Moves a handle from one ownership tag to another, at a call boundary.
    ///
    /// - `EngineOwned`/`Borrowed` to `HostOwned`: the host takes over and will free the value; it joins the current group.
    /// - `HostOwned` to `EngineOwned`/`Borrowed`: the engine takes over; releasing the handle no longer frees anything.
    /// - anything to `SharedRefCounted`: takes an engine-side reference (ref-counted objects only).
    ///
    /// Shared handles leave through their reference count, never through a transfer.
    ///
    /// # Panics
    /// If the handle is not currently tagged `from`, or `from` is `SharedRefCounted`.
    #[track_caller]
    pub fn transfer(&self, handle: Handle, from: Ownership, to: Ownership) -> TetherResult<Handle> {
        let entry = self.entry(handle)?;
        assert_eq!(
            entry.ownership, from,
            "ownership mismatch on {handle}: registered as {}, transfer expected {from}",
            entry.ownership
        );
        assert_ne!(
            from,
            Ownership::SharedRefCounted,
            "shared handle {handle} is released through its reference count, not transferred"
        );

        if from == to {
            return Ok(handle);
        }

        if to == Ownership::SharedRefCounted {
            if entry.raw.kind() != HandleKind::RefCounted {
                return Err(TetherError::TypeMismatch {
                    expected: HandleKind::RefCounted,
                    actual: entry.raw.kind(),
                });
            }
            self.take_reference(entry.raw);
        }

        self.inner.state.borrow_mut().retag(handle, to);
        out!("registry: transfer {handle} {from} -> {to}");
        Ok(handle)
    }

    /// Opens a new innermost lifetime group. Host-owned handles registered until it closes belong to it.
    pub fn open_group(&self) -> LifetimeGroup {
        self.push_group(GroupPurpose::Scope)
    }

    /// Opens the group of one engine call. Only temporaries registered through
    /// [`adopt_temporary()`](Self::adopt_temporary) belong to it.
    pub(crate) fn open_call_group(&self) -> LifetimeGroup {
        self.push_group(GroupPurpose::Call)
    }

    fn push_group(&self, purpose: GroupPurpose) -> LifetimeGroup {
        let id = {
            let mut state = self.inner.state.borrow_mut();
            let id = GroupId::new(state.next_group);
            state.next_group += 1;
            state.groups.push(GroupRecord {
                id,
                purpose,
                members: Vec::new(),
            });
            id
        };

        out!("registry: open {purpose:?} group {id}");
        LifetimeGroup::new(self.clone(), id)
    }

    /// Group that newly registered host-owned handles join: the innermost group opened through
    /// [`open_group()`](Self::open_group), or [`GroupId::ROOT`] if there is none.
    ///
    /// Groups of engine calls in progress are skipped.
    pub fn current_group(&self) -> GroupId {
        self.inner.state.borrow().current_scope()
    }

    /// Innermost group opened for an engine call that is still in progress.
    pub(crate) fn current_call_group(&self) -> Option<GroupId> {
        self.inner
            .state
            .borrow()
            .groups
            .iter()
            .rev()
            .find(|record| record.purpose == GroupPurpose::Call)
            .map(|record| record.id)
    }

    /// Number of explicitly opened groups that are not yet closed, including those of calls in progress.
    pub fn group_depth(&self) -> usize {
        self.inner.state.borrow().groups.len() - 1
    }

    pub fn ownership(&self, handle: Handle) -> TetherResult<Ownership> {
        self.entry(handle).map(|entry| entry.ownership)
    }

    pub fn kind(&self, handle: Handle) -> HandleKind {
        handle.kind
    }

    /// Group the handle belongs to, or `None` for unmanaged handles.
    pub fn group_of(&self, handle: Handle) -> TetherResult<Option<GroupId>> {
        self.entry(handle).map(|entry| entry.group)
    }

    /// Whether the handle has not been released yet. Does not consult the engine.
    pub fn is_live(&self, handle: Handle) -> bool {
        self.inner.state.borrow().entry(handle).is_some()
    }

    /// Number of registered handles.
    pub fn live_count(&self) -> usize {
        let state = self.inner.state.borrow();
        state.slots.len() - state.free_slots.len()
    }

    /// Whether both values refer to the same registry.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Closes a group, releasing every handle still in it (innermost registered first).
    ///
    /// Groups must close in reverse order of opening. Closing any other group still releases its members, then reports
    /// [`TetherError::UnbalancedLifetimeGroup`].
    pub(crate) fn close_group(&self, id: GroupId) -> TetherResult<()> {
        let (released, innermost) = {
            let mut state = self.inner.state.borrow_mut();
            let innermost = state.top_group();

            let pos = state
                .groups
                .iter()
                .rposition(|record| record.id == id)
                .unwrap_or_else(|| panic!("lifetime group {id} is not open"));
            assert!(!id.is_root(), "the root lifetime group cannot be closed");

            let record = state.groups.remove(pos);
            let released: Vec<Entry> = record
                .members
                .iter()
                .rev()
                .filter_map(|&member| state.vacate(member))
                .collect();

            (released, innermost)
        };

        out!("registry: close group {id}, releasing {} handle(s)", released.len());
        for entry in &released {
            self.inner.release_foreign(ForeignRelease::for_entry(entry));
        }

        if id == innermost {
            Ok(())
        } else {
            Err(TetherError::UnbalancedLifetimeGroup {
                closing: id.to_u64(),
                innermost: innermost.to_u64(),
            })
        }
    }

    fn entry(&self, handle: Handle) -> TetherResult<Entry> {
        self.inner
            .state
            .borrow()
            .entry(handle)
            .copied()
            .ok_or(TetherError::StaleHandle { handle })
    }

    fn take_reference(&self, raw: RawHandle) {
        assert_eq!(
            raw.kind(),
            HandleKind::RefCounted,
            "only ref-counted objects can be shared"
        );

        let obj = raw.first();
        assert!(
            self.engine().ref_init(obj),
            "engine refused initial reference on {obj:#x}"
        );
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("HandleRegistry")
            .field("live", &(state.slots.len() - state.free_slots.len()))
            .field("groups", &state.groups.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

impl RegistryInner {
    fn release_foreign(&self, release: ForeignRelease) {
        let engine = &*self.engine;
        match release {
            ForeignRelease::Nothing => {}

            ForeignRelease::Unreference(raw) => {
                let obj = raw.first();
                if !engine.object_is_alive(obj) {
                    out!("registry: {obj:#x} already freed by the engine");
                } else if engine.ref_dec(obj) {
                    out!("registry: last reference to {obj:#x} gone, destroying");
                    engine.object_destroy(obj);
                }
            }

            ForeignRelease::Free(raw) => match raw.kind() {
                HandleKind::Object => {
                    let obj = raw.first();
                    if engine.object_is_alive(obj) {
                        engine.object_destroy(obj);
                    }
                }
                HandleKind::RefCounted => {
                    // References held elsewhere keep the object alive; their holders free it.
                    let obj = raw.first();
                    if engine.object_is_alive(obj) && engine.ref_count(obj) == 0 {
                        engine.object_destroy(obj);
                    }
                }
                HandleKind::String => engine.string_destroy(raw.as_pair()),
                HandleKind::StringName => engine.string_name_destroy(raw.as_pair()),
                HandleKind::Array | HandleKind::Dictionary | HandleKind::PackedArray => {
                    engine.collection_unref(raw.first());
                }
            },
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let leaked: Vec<Entry> = self
            .state
            .get_mut()
            .slots
            .iter_mut()
            .filter_map(|slot| slot.entry.take())
            .filter(|entry| entry.ownership.must_release_foreign())
            .collect();

        if leaked.is_empty() || !self.leak_check {
            return;
        }

        tracing::warn!(
            target: "tether",
            "{} handle(s) still live when the registry was dropped; releasing them",
            leaked.len()
        );
        for entry in leaked.iter().rev() {
            tracing::warn!(target: "tether", "leaked {} ({})", entry.raw.kind(), entry.ownership);
            self.release_foreign(ForeignRelease::for_entry(entry));
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

impl RegistryState {
    fn top_group(&self) -> GroupId {
        self.groups.last().map_or(GroupId::ROOT, |record| record.id)
    }

    fn current_scope(&self) -> GroupId {
        self.groups
            .iter()
            .rev()
            .find(|record| record.purpose == GroupPurpose::Scope)
            .map_or(GroupId::ROOT, |record| record.id)
    }

    fn entry(&self, handle: Handle) -> Option<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: Handle) -> Option<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    fn insert(&mut self, raw: RawHandle, ownership: Ownership, group: Option<GroupId>) -> Handle {
        let entry = Entry {
            raw,
            ownership,
            group,
        };

        let (index, generation) = match self.free_slots.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.entry = Some(entry);
                (index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("handle registry exhausted");
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (index, 0)
            }
        };

        let handle = Handle {
            index,
            generation,
            kind: raw.kind(),
        };
        if let Some(group) = group {
            self.join(group, handle);
        }

        handle
    }

    /// Removes the entry and detaches it from its group.
    fn remove(&mut self, handle: Handle) -> Option<Entry> {
        let entry = self.vacate(handle)?;
        if let Some(group) = entry.group {
            self.leave(group, handle);
        }
        Some(entry)
    }

    /// Poisons the slot without touching group membership.
    fn vacate(&mut self, handle: Handle) -> Option<Entry> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;

        let entry = slot.entry.take()?;
        self.free_slots.push(handle.index);
        Some(entry)
    }

    fn retag(&mut self, handle: Handle, ownership: Ownership) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };

        let old_group = entry.group.take();
        entry.ownership = ownership;

        if let Some(group) = old_group {
            self.leave(group, handle);
        }
        if ownership.is_group_managed() {
            let group = self.current_scope();
            if let Some(entry) = self.entry_mut(handle) {
                entry.group = Some(group);
            }
            self.join(group, handle);
        }
    }

    fn join(&mut self, group: GroupId, handle: Handle) {
        if let Some(record) = self.groups.iter_mut().rev().find(|r| r.id == group) {
            record.members.push(handle);
        }
    }

    fn leave(&mut self, group: GroupId, handle: Handle) {
        if let Some(record) = self.groups.iter_mut().rev().find(|r| r.id == group) {
            if let Some(pos) = record.members.iter().rposition(|&m| m == handle) {
                record.members.remove(pos);
            }
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
