/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use proptest::prelude::*;
use tether_core::builtin::{Array, Dictionary, MapProxy, Proxy, Sequence};
use tether_core::TetherError;
use tether_ffi::{HandleKind, RawHandle, Word};

use crate::setup;

/// Foreign storage simulated in host memory. `TAG` only distinguishes otherwise identical proxy types.
#[derive(Default)]
struct VecProxy<const TAG: u8> {
    slots: RefCell<Vec<Slot>>,
    released: Cell<usize>,
}

#[derive(Default)]
struct Slot {
    items: Vec<i64>,
    read_only: bool,
}

type Primary = VecProxy<0>;
type Secondary = VecProxy<1>;

impl<const TAG: u8> VecProxy<TAG> {
    fn alloc(self: &Rc<Self>) -> (Rc<Self>, RawHandle) {
        let mut slots = self.slots.borrow_mut();
        slots.push(Slot::default());

        let state = RawHandle::single(HandleKind::Array, slots.len() as Word - 1);
        (Rc::clone(self), state)
    }

    fn items(&self, state: &RawHandle) -> Vec<i64> {
        self.slots.borrow()[state.first() as usize].items.clone()
    }

    fn with_slot<R>(&self, state: &RawHandle, f: impl FnOnce(&mut Slot) -> R) -> R {
        f(&mut self.slots.borrow_mut()[state.first() as usize])
    }
}

impl<const TAG: u8> Proxy<i64> for VecProxy<TAG> {
    fn index(&self, state: &RawHandle, index: usize) -> i64 {
        self.with_slot(state, |slot| slot.items[index])
    }

    fn set_index(&self, state: &RawHandle, index: usize, value: i64) {
        self.with_slot(state, |slot| slot.items[index] = value);
    }

    fn len(&self, state: &RawHandle) -> usize {
        self.with_slot(state, |slot| slot.items.len())
    }

    fn resize(&self, state: &RawHandle, len: usize) {
        self.with_slot(state, |slot| slot.items.resize(len, 0));
    }

    fn is_read_only(&self, state: &RawHandle) -> bool {
        self.with_slot(state, |slot| slot.read_only)
    }

    fn make_read_only(&self, state: &RawHandle) {
        self.with_slot(state, |slot| slot.read_only = true);
    }

    fn release(&self, _state: RawHandle) {
        self.released.set(self.released.get() + 1);
    }
}

/// Map counterpart of [`VecProxy`], keeping entries in insertion order.
#[derive(Default)]
struct MapStore<const TAG: u8> {
    slots: RefCell<Vec<MapSlot>>,
}

#[derive(Default)]
struct MapSlot {
    entries: Vec<(i64, i64)>,
    read_only: bool,
}

type PrimaryMap = MapStore<0>;
type SecondaryMap = MapStore<1>;

impl<const TAG: u8> MapStore<TAG> {
    fn alloc(self: &Rc<Self>) -> (Rc<Self>, RawHandle) {
        let mut slots = self.slots.borrow_mut();
        slots.push(MapSlot::default());

        let state = RawHandle::single(HandleKind::Dictionary, slots.len() as Word - 1);
        (Rc::clone(self), state)
    }

    fn with_slot<R>(&self, state: &RawHandle, f: impl FnOnce(&mut MapSlot) -> R) -> R {
        f(&mut self.slots.borrow_mut()[state.first() as usize])
    }
}

impl<const TAG: u8> MapProxy<i64, i64> for MapStore<TAG> {
    fn get(&self, state: &RawHandle, key: &i64) -> Option<i64> {
        self.with_slot(state, |slot| slot.entries.iter().find(|(k, _)| k == key).map(|&(_, v)| v))
    }

    fn set(&self, state: &RawHandle, key: i64, value: i64) {
        self.with_slot(state, |slot| match slot.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => slot.entries.push((key, value)),
        });
    }

    fn remove(&self, state: &RawHandle, key: &i64) -> Option<i64> {
        self.with_slot(state, |slot| {
            let pos = slot.entries.iter().position(|(k, _)| k == key)?;
            Some(slot.entries.remove(pos).1)
        })
    }

    fn len(&self, state: &RawHandle) -> usize {
        self.with_slot(state, |slot| slot.entries.len())
    }

    fn keys(&self, state: &RawHandle) -> Vec<i64> {
        self.with_slot(state, |slot| slot.entries.iter().map(|&(k, _)| k).collect())
    }

    fn is_read_only(&self, state: &RawHandle) -> bool {
        self.with_slot(state, |slot| slot.read_only)
    }

    fn make_read_only(&self, state: &RawHandle) {
        self.with_slot(state, |slot| slot.read_only = true);
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

#[test]
fn promotion_is_observed_through_every_reference() {
    let proxy = Rc::new(Primary::default());
    let seq = Sequence::from_vec(vec![1i64, 2, 3]);
    let alias = seq.clone();

    let (promoted, state) = seq.as_proxy(|| proxy.alloc());
    assert!(Rc::ptr_eq(&promoted, &proxy));
    assert!(alias.is_proxied());
    assert_eq!(alias.proxy_state(), Some(state));

    seq.mutate(0, 10).unwrap();
    alias.push(4).unwrap();

    assert_eq!(alias.lookup(0), 10);
    assert_eq!(seq.len(), 4);
    assert_eq!(proxy.items(&state), vec![10, 2, 3, 4]);
}

#[test]
fn repeated_promotion_through_the_same_proxy_is_identity() {
    let proxy = Rc::new(Primary::default());
    let seq = Sequence::from_vec(vec![5i64, 6]);

    let (first, state) = seq.as_proxy(|| proxy.alloc());
    let (second, again) = seq.as_proxy::<Primary, _>(|| unreachable!("already proxied"));

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(state, again);
    assert_eq!(proxy.slots.borrow().len(), 1);
}

#[test]
#[should_panic(expected = "proxy reassignment")]
fn promotion_through_a_second_proxy_type_is_fatal() {
    let primary = Rc::new(Primary::default());
    let secondary = Rc::new(Secondary::default());
    let seq = Sequence::from_vec(vec![1i64]);

    seq.as_proxy(|| primary.alloc());
    seq.as_proxy(|| secondary.alloc());
}

#[test]
fn sequence_is_unusable_while_being_promoted() {
    let proxy = Rc::new(Primary::default());
    let seq = Sequence::from_vec(vec![1i64, 2]);
    let alias = seq.clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        seq.as_proxy(|| {
            // A callback of the allocating engine reaching the same sequence.
            let _ = alias.push(3);
            proxy.alloc()
        })
    }));

    let message = result.err().and_then(|err| err.downcast_ref::<&str>().map(|s| s.to_string()));
    assert_eq!(
        message.as_deref(),
        Some("sequence accessed while it is being promoted to foreign storage")
    );

    // The local contents are back, unchanged, and a later promotion goes through.
    assert!(!seq.is_proxied());
    assert_eq!(alias.to_vec(), vec![1, 2]);

    let (_, state) = seq.as_proxy(|| proxy.alloc());
    assert_eq!(proxy.items(&state), vec![1, 2]);
}

#[test]
fn duplicate_of_a_proxied_sequence_is_local() {
    let proxy = Rc::new(Primary::default());
    let seq = Sequence::from_vec(vec![1i64, 2]);
    seq.as_proxy(|| proxy.alloc());

    let copy = seq.duplicate();
    assert!(!copy.is_proxied());

    copy.mutate(-1, 20).unwrap();
    assert_eq!(seq.to_vec(), vec![1, 2]);
    assert_eq!(copy.to_vec(), vec![1, 20]);
}

#[test]
fn frozen_backing_rejects_mutation() {
    let proxy = Rc::new(Primary::default());
    let (proxy, state) = proxy.alloc();
    proxy.with_slot(&state, |slot| slot.items = vec![1, 2, 3]);

    let seq = Sequence::<i64>::through(Rc::clone(&proxy), state);
    seq.freeze();

    assert!(proxy.is_read_only(&state));
    assert_eq!(
        seq.resize(1),
        Err(TetherError::ReadOnlyViolation { operation: "resize" })
    );
    assert_eq!(seq.len(), 3);
}

#[test]
fn backing_released_once_with_the_last_reference() {
    let proxy = Rc::new(Primary::default());
    let seq = Sequence::from_vec(vec![1i64]);
    seq.as_proxy(|| proxy.alloc());

    let weak = seq.downgrade();
    let alias = seq.clone();
    drop(seq);
    assert_eq!(proxy.released.get(), 0);
    assert!(weak.upgrade().is_some());

    drop(alias);
    assert_eq!(proxy.released.get(), 1);
    assert!(weak.upgrade().is_none());
}

#[test]
fn engine_array_aliases_after_promotion() {
    let (engine, binding) = setup();
    let array = Array::from_vec(vec![1i64, 2, 3]);
    let alias = array.clone();

    let cookie = array.promote(&binding);
    assert_eq!(alias.cookie(), Some(cookie));
    assert_eq!(engine.collection_refs(cookie), Some(1));

    alias.mutate(-1, 30).unwrap();
    assert_eq!(array.to_vec(), vec![1, 2, 30]);

    drop(array);
    drop(alias);
    assert_eq!(engine.collection_refs(cookie), None);
}

#[test]
fn repeated_map_promotion_through_the_same_proxy_is_identity() {
    let store = Rc::new(PrimaryMap::default());
    let dict: Dictionary<i64, i64> = [(1, 10), (2, 20)].into_iter().collect();
    let alias = dict.clone();

    let (first, state) = dict.as_proxy(|| store.alloc());
    let (second, again) = alias.as_proxy::<PrimaryMap, _>(|| unreachable!("already proxied"));

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(state, again);
    assert_eq!(store.slots.borrow().len(), 1);

    alias.set(3, 30).unwrap();
    assert_eq!(dict.get(&3), Some(30));
    assert_eq!(store.keys(&state), vec![1, 2, 3]);
}

#[test]
#[should_panic(expected = "proxy reassignment")]
fn map_promotion_through_a_second_proxy_type_is_fatal() {
    let primary = Rc::new(PrimaryMap::default());
    let secondary = Rc::new(SecondaryMap::default());
    let dict: Dictionary<i64, i64> = [(1, 1)].into_iter().collect();

    dict.as_proxy(|| primary.alloc());
    dict.as_proxy(|| secondary.alloc());
}

#[test]
fn frozen_map_stays_frozen_after_promotion() {
    let store = Rc::new(PrimaryMap::default());
    let dict: Dictionary<i64, i64> = [(5, 50)].into_iter().collect();
    dict.freeze();

    let (_, state) = dict.as_proxy(|| store.alloc());
    assert!(store.is_read_only(&state));
    assert_eq!(
        dict.set(6, 60),
        Err(TetherError::ReadOnlyViolation { operation: "set" })
    );
    assert_eq!(dict.len(), 1);
}

#[test]
fn dictionary_is_unusable_while_being_promoted() {
    let store = Rc::new(PrimaryMap::default());
    let dict: Dictionary<i64, i64> = [(1, 1)].into_iter().collect();
    let alias = dict.clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        dict.as_proxy(|| {
            let _ = alias.set(2, 2);
            store.alloc()
        })
    }));

    assert!(result.is_err());
    assert!(!dict.is_proxied());
    assert_eq!(alias.to_vec(), vec![(1, 1)]);
}

proptest! {
    #[test]
    fn map_promotion_preserves_entries(entries in prop::collection::btree_map(any::<i64>(), any::<i64>(), 0..16), frozen in any::<bool>()) {
        let store = Rc::new(PrimaryMap::default());
        let dict: Dictionary<i64, i64> = entries.clone().into_iter().collect();
        if frozen {
            dict.freeze();
        }

        let (_, state) = dict.as_proxy(|| store.alloc());

        prop_assert_eq!(dict.len(), entries.len());
        for (key, value) in &entries {
            prop_assert_eq!(dict.get(key), Some(*value));
        }
        prop_assert_eq!(dict.is_read_only(), frozen);
        prop_assert_eq!(store.keys(&state), entries.keys().copied().collect::<Vec<_>>());
        prop_assert_eq!(dict.to_vec().into_iter().collect::<BTreeMap<_, _>>(), entries);
    }

    #[test]
    fn promotion_preserves_content(items in prop::collection::vec(any::<i64>(), 0..16), frozen in any::<bool>()) {
        let proxy = Rc::new(Primary::default());
        let seq = Sequence::from_vec(items.clone());
        if frozen {
            seq.freeze();
        }

        let (_, state) = seq.as_proxy(|| proxy.alloc());

        prop_assert_eq!(seq.len(), items.len());
        for (i, item) in items.iter().enumerate() {
            prop_assert_eq!(seq.lookup(i as i64), *item);
        }
        prop_assert_eq!(seq.is_read_only(), frozen);
        prop_assert_eq!(proxy.items(&state), items);
    }

    #[test]
    fn negative_indices_wrap_through_the_backing(items in prop::collection::vec(any::<i64>(), 1..16), value in any::<i64>()) {
        let proxy = Rc::new(Primary::default());
        let seq = Sequence::from_vec(items.clone());
        seq.as_proxy(|| proxy.alloc());

        prop_assert_eq!(seq.lookup(-1), items[items.len() - 1]);

        seq.mutate(-1, value).unwrap();
        prop_assert_eq!(seq.lookup(-1), value);
        prop_assert_eq!(seq.lookup(items.len() as i64 - 1), value);
    }
}
