/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use proptest::prelude::*;
use tether_core::obj::RefGd;
use tether_core::TetherError;
use tether_ffi::{Engine, HandleKind, Ownership, RawHandle};

use crate::setup;

fn arbitrary_kind() -> impl Strategy<Value = HandleKind> {
    prop::sample::select(HandleKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn get_returns_the_words_of_new(kind in arbitrary_kind(), words in prop::collection::vec(any::<u64>(), 2)) {
        let (_engine, binding) = setup();
        let registry = binding.registry();
        let words = &words[..kind.width()];

        let handle = registry.new_handle(kind, words);
        let got = registry.get(handle).unwrap();
        prop_assert_eq!(got.as_slice(), words);
        prop_assert_eq!(handle.kind(), kind);
        prop_assert_eq!(registry.ownership(handle).unwrap(), Ownership::Borrowed);

        registry.release(handle);
        prop_assert_eq!(registry.get(handle), Err(TetherError::StaleHandle { handle }));
    }

    #[test]
    fn duplicates_and_releases_pair_up(duplicates in 0usize..8) {
        let (engine, binding) = setup();
        let registry = binding.registry();
        let obj = engine.object_construct(binding.string_name("RefCounted"));

        let first = registry.adopt(RawHandle::single(HandleKind::RefCounted, obj), Ownership::SharedRefCounted);
        let mut handles = vec![first];
        for _ in 0..duplicates {
            handles.push(registry.duplicate(first).unwrap());
        }
        prop_assert_eq!(engine.ref_count(obj), duplicates as u32 + 1);

        let destroyed_before = engine.destroy_count();
        for handle in &handles {
            prop_assert!(!engine.is_destroyed(obj));
            registry.try_release(*handle).unwrap();
        }

        prop_assert!(engine.is_destroyed(obj));
        prop_assert_eq!(engine.destroy_count(), destroyed_before + 1);
        prop_assert_eq!(registry.try_release(first), Err(TetherError::DoubleRelease { handle: first }));
    }
}

#[test]
fn ref_gd_clones_hold_one_reference_each() {
    let (engine, binding) = setup();
    let first = binding.construct_ref_counted("RefCounted");
    let obj = first.object_ptr().unwrap();

    let clones: Vec<RefGd> = (0..4).map(|_| first.clone()).collect();
    assert_eq!(engine.ref_count(obj), 5);
    assert!(clones.iter().all(|c| *c == first));

    drop(clones);
    assert_eq!(engine.ref_count(obj), 1);
    assert!(!engine.is_destroyed(obj));

    drop(first);
    assert!(engine.is_destroyed(obj));
    assert_eq!(binding.registry().live_count(), 0);
}

#[test]
#[should_panic(expected = "double release")]
fn releasing_twice_is_fatal() {
    let (_engine, binding) = setup();
    let registry = binding.registry();

    let handle = registry.acquire_string("once");
    registry.release(handle);
    registry.release(handle);
}

#[test]
fn constructed_object_is_host_owned() {
    let (engine, binding) = setup();
    let registry = binding.registry();

    let node = binding.construct_object("Object");
    assert_eq!(registry.ownership(node), Ok(Ownership::HostOwned));

    let obj = registry.get(node).unwrap()[0];
    registry.release(node);
    assert!(engine.is_destroyed(obj));
}

#[test]
fn handing_over_to_the_engine_stops_the_host_free() {
    let (engine, binding) = setup();
    let registry = binding.registry();

    let node = binding.construct_object("Object");
    let obj = registry.get(node).unwrap()[0];

    let node = registry
        .transfer(node, Ownership::HostOwned, Ownership::EngineOwned)
        .unwrap();
    assert_eq!(registry.group_of(node), Ok(None));

    registry.release(node);
    assert!(!engine.is_destroyed(obj));
}

#[test]
fn sharing_a_plain_object_is_a_type_mismatch() {
    let (_engine, binding) = setup();
    let registry = binding.registry();

    let node = binding.construct_object("Object");
    let err = registry
        .transfer(node, Ownership::HostOwned, Ownership::SharedRefCounted)
        .unwrap_err();

    assert_eq!(
        err,
        TetherError::TypeMismatch {
            expected: HandleKind::RefCounted,
            actual: HandleKind::Object,
        }
    );
    assert!(!err.is_fatal());
    registry.release(node);
}

#[test]
fn object_freed_by_the_engine_is_stale() {
    let (engine, binding) = setup();
    let registry = binding.registry();

    let obj = engine.object_construct(binding.string_name("Object"));
    let handle = registry.adopt(RawHandle::single(HandleKind::Object, obj), Ownership::EngineOwned);
    assert!(registry.pack(handle).is_ok());

    engine.free_externally(obj);
    assert_eq!(registry.pack(handle), Err(TetherError::StaleHandle { handle }));

    // Engine-owned: forgetting it does not touch the freed object.
    registry.release(handle);
}

#[test]
fn downcast_checks_the_kind_tag() {
    use tether_core::registry::{ArrayCookie, StringRef};

    let (_engine, binding) = setup();
    let registry = binding.registry();
    let text = registry.acquire_string("tag");

    assert!(registry.downcast::<StringRef>(text).is_ok());
    assert_eq!(
        registry.downcast::<ArrayCookie>(text).unwrap_err(),
        TetherError::TypeMismatch {
            expected: HandleKind::Array,
            actual: HandleKind::String,
        }
    );
    registry.release(text);
}
