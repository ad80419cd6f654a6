/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use tether_core::binding::MethodKey;
use tether_core::builtin::{Array, GString};
use tether_core::meta::{ObjectReturn, ReturnConvention};
use tether_core::registry::GroupId;
use tether_core::TetherError;
use tether_ffi::{Engine, FrameArg, FrameReturn, HandleKind, Ownership, Words};

use crate::setup;

const SCALE: MethodKey = MethodKey {
    class: "Node2D",
    method: "scale",
    hash: 101,
};

#[test]
fn scalars_and_vectors_cross_in_call_order() {
    let (engine, binding) = setup();
    engine.register_method("Node2D", "scale", 101, |_engine, _obj, args, ret| {
        assert_eq!(args.len(), 4, "i64 + Vec2 + bool");

        let factor = i64::read_words(&args[0..1]) as f32;
        let v = Vec2::read_words(&args[1..3]);
        let flip = bool::read_words(&args[3..4]);

        let scaled = if flip { -v * factor } else { v * factor };
        scaled.write_words(ret);
    });

    let ret: Vec2 = binding
        .ptrcall(SCALE, 0, (3i64, Vec2::new(1.0, -2.0), false), ReturnConvention::Value)
        .unwrap();
    assert_eq!(ret, Vec2::new(3.0, -6.0));

    let ret: Vec2 = binding
        .ptrcall(SCALE, 0, (2i64, Vec2::new(0.5, 4.0), true), ReturnConvention::Value)
        .unwrap();
    assert_eq!(ret, Vec2::new(-1.0, -8.0));

    assert_eq!(engine.bind_lookups(), 1);
    assert_eq!(binding.arena().depth(), 0);
}

#[test]
fn string_temporaries_are_released_after_the_call() {
    let (engine, binding) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    engine.register_method("Label", "set_text", 7, move |engine, _obj, args, _ret| {
        sink.borrow_mut().push(engine.string_to_utf8([args[0], args[1]]));
    });

    let key = MethodKey {
        class: "Label",
        method: "set_text",
        hash: 7,
    };
    let baseline = engine.live_strings();

    let () = binding.ptrcall(key, 0, ("hello",), ReturnConvention::Value).unwrap();
    let () = binding
        .ptrcall(key, 0, (String::from("world"),), ReturnConvention::Value)
        .unwrap();

    assert_eq!(*seen.borrow(), ["hello", "world"]);
    assert_eq!(engine.live_strings(), baseline);
    assert_eq!(binding.registry().live_count(), 0);
}

#[test]
fn arrays_are_promoted_when_passed() {
    let (engine, binding) = setup();
    engine.register_method("Math", "sum", 3, |engine, _obj, args, ret| {
        let cookie = args[0];
        let sum: i64 = (0..engine.array_len(cookie))
            .map(|i| i64::read_words(&engine.array_get(cookie, i)))
            .sum();
        sum.write_words(ret);
    });

    let key = MethodKey {
        class: "Math",
        method: "sum",
        hash: 3,
    };
    let numbers = Array::from_vec(vec![1i64, 2, 3, 4]);
    assert_eq!(numbers.cookie(), None);

    let sum: i64 = binding
        .ptrcall(key, 0, (&numbers,), ReturnConvention::Value)
        .unwrap();
    assert_eq!(sum, 10);

    let cookie = numbers.cookie().expect("promoted by the call");
    assert_eq!(engine.collection_refs(cookie), Some(1));

    // Still the same storage on the second call.
    numbers.push(5).unwrap();
    let sum: i64 = binding
        .ptrcall(key, 0, (&numbers,), ReturnConvention::Value)
        .unwrap();
    assert_eq!(sum, 15);
    assert_eq!(numbers.cookie(), Some(cookie));
}

#[test]
fn returned_collections_follow_the_convention() {
    let (engine, binding) = setup();
    let kept = Rc::new(RefCell::new(None));

    engine.register_method("Node", "make_range", 11, |engine, _obj, _args, ret| {
        let items = (0..3i64).map(|i| Words::from_slice(&[i as u64])).collect();
        ret[0] = engine.create_array(HandleKind::Array, items);
    });

    let kept_by_engine = Rc::clone(&kept);
    engine.register_method("Node", "get_cached", 12, move |engine, _obj, _args, ret| {
        let cookie = *kept_by_engine
            .borrow_mut()
            .get_or_insert_with(|| engine.create_array(HandleKind::Array, vec![Words::from_slice(&[9])]));
        ret[0] = cookie;
    });

    let owned: Array<i64> = binding
        .ptrcall(
            MethodKey {
                class: "Node",
                method: "make_range",
                hash: 11,
            },
            0,
            (),
            ReturnConvention::Owned,
        )
        .unwrap();
    let owned_cookie = owned.cookie().unwrap();
    assert_eq!(owned.to_vec(), vec![0, 1, 2]);
    assert_eq!(engine.collection_refs(owned_cookie), Some(1));

    drop(owned);
    assert_eq!(engine.collection_refs(owned_cookie), None);

    let borrowed: Array<i64> = binding
        .ptrcall(
            MethodKey {
                class: "Node",
                method: "get_cached",
                hash: 12,
            },
            0,
            (),
            ReturnConvention::Borrowed,
        )
        .unwrap();
    let cached = kept.borrow().unwrap();
    assert_eq!(engine.collection_refs(cached), Some(2));
    assert_eq!(borrowed.lookup(-1), 9);

    drop(borrowed);
    assert_eq!(engine.collection_refs(cached), Some(1));
}

#[test]
fn gstring_round_trips_through_the_engine() {
    let (engine, binding) = setup();
    engine.register_method("Label", "shout", 21, |engine, _obj, args, ret| {
        let text = engine.string_to_utf8([args[0], args[1]]).to_uppercase();
        let [ptr, generation] = engine.string_new(&text);
        ret[0] = ptr;
        ret[1] = generation;
    });

    let key = MethodKey {
        class: "Label",
        method: "shout",
        hash: 21,
    };
    let text = GString::from("quiet");
    let baseline = engine.live_strings();

    let loud: GString = binding
        .ptrcall(key, 0, (&text,), ReturnConvention::Owned)
        .unwrap();
    assert_eq!(loud, "QUIET");
    assert!(text.is_proxied());

    // Argument promoted in place, plus the adopted return value.
    assert_eq!(engine.live_strings(), baseline + 2);
    drop(loud);
    drop(text);
    assert_eq!(engine.live_strings(), baseline);
}

#[test]
fn plain_string_return_is_copied_and_destroyed() {
    let (engine, binding) = setup();
    engine.register_method("OS", "get_name", 5, |engine, _obj, _args, ret| {
        ret.copy_from_slice(&engine.string_new("mock"));
    });

    let baseline = engine.live_strings();
    let name: String = binding
        .ptrcall(
            MethodKey {
                class: "OS",
                method: "get_name",
                hash: 5,
            },
            0,
            (),
            ReturnConvention::Owned,
        )
        .unwrap();

    assert_eq!(name, "mock");
    assert_eq!(engine.live_strings(), baseline);
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Objects

fn object_key(method: &'static str, hash: i64) -> MethodKey {
    MethodKey {
        class: "Node",
        method,
        hash,
    }
}

#[test]
fn borrowed_object_is_never_freed_by_the_host() {
    let (engine, binding) = setup();
    let registry = binding.registry();

    let parent = binding.construct_object("Object");
    let parent_ptr = registry.get(parent).unwrap()[0];
    engine.register_method("Node", "get_parent", 31, move |_engine, _obj, _args, ret| {
        ret[0] = parent_ptr;
    });

    let ret: ObjectReturn = binding
        .ptrcall(object_key("get_parent", 31), 0, (), ReturnConvention::Borrowed)
        .unwrap();
    let handle = ret.handle().unwrap();
    assert_eq!(registry.ownership(handle), Ok(Ownership::EngineOwned));
    assert_eq!(registry.get(handle).unwrap()[0], parent_ptr);

    registry.release(handle);
    assert!(!engine.is_destroyed(parent_ptr));
    registry.release(parent);
}

#[test]
fn owned_object_is_handed_to_the_host() {
    let (engine, binding) = setup();
    engine.register_method("Node", "duplicate", 32, |engine, _obj, _args, ret| {
        let class = engine.string_name_new("Object");
        ret[0] = engine.object_construct(class);
        engine.string_name_destroy(class);
    });

    let ret: ObjectReturn = binding
        .ptrcall(object_key("duplicate", 32), 0, (), ReturnConvention::Owned)
        .unwrap();
    let handle = ret.handle().unwrap();
    let registry = binding.registry();
    assert_eq!(registry.ownership(handle), Ok(Ownership::HostOwned));

    let obj = registry.get(handle).unwrap()[0];
    registry.release(handle);
    assert!(engine.is_destroyed(obj));
}

#[test]
fn shared_object_takes_its_own_reference() {
    let (engine, binding) = setup();
    engine.register_method("Node", "load", 33, |engine, _obj, _args, ret| {
        let class = engine.string_name_new("RefCounted");
        ret[0] = engine.object_construct(class);
        engine.string_name_destroy(class);
    });

    let ret: ObjectReturn = binding
        .ptrcall(object_key("load", 33), 0, (), ReturnConvention::Shared)
        .unwrap();
    let resource = ret.into_ref_counted().expect("ref-counted class");
    let obj = resource.object_ptr().unwrap();
    assert_eq!(resource.ref_count(), Ok(1));

    drop(resource);
    assert!(engine.is_destroyed(obj));
}

#[test]
fn shared_convention_on_plain_object_is_a_type_mismatch() {
    let (engine, binding) = setup();
    let node = binding.construct_object("Object");
    let node_ptr = binding.registry().get(node).unwrap()[0];
    engine.register_method("Node", "get_owner", 34, move |_engine, _obj, _args, ret| {
        ret[0] = node_ptr;
    });

    let err = binding
        .ptrcall::<_, ObjectReturn>(object_key("get_owner", 34), 0, (), ReturnConvention::Shared)
        .unwrap_err();
    assert_eq!(
        err,
        TetherError::TypeMismatch {
            expected: HandleKind::RefCounted,
            actual: HandleKind::Object,
        }
    );
    binding.registry().release(node);
}

#[test]
fn null_object_return() {
    let (engine, binding) = setup();
    engine.register_method("Node", "get_child", 35, |_engine, _obj, _args, ret| ret[0] = 0);

    let ret: ObjectReturn = binding
        .ptrcall(object_key("get_child", 35), 0, (), ReturnConvention::Borrowed)
        .unwrap();
    assert!(ret.is_null());
}

#[test]
fn stale_argument_aborts_before_the_engine_is_reached() {
    let (engine, binding) = setup();
    engine.register_method("Node", "add_child", 36, |_engine, _obj, _args, _ret| {
        unreachable!("must not be called with a stale argument");
    });

    let registry = binding.registry();
    let child = binding.construct_object("Object");
    let child_ptr = registry.get(child).unwrap()[0];
    engine.free_externally(child_ptr);

    let baseline = engine.live_strings();
    let calls = engine.call_count();

    let err = binding
        .ptrcall::<_, ()>(object_key("add_child", 36), 0, ("child", child), ReturnConvention::Value)
        .unwrap_err();
    assert_eq!(err, TetherError::StaleHandle { handle: child });

    assert_eq!(engine.call_count(), calls);
    assert_eq!(engine.live_strings(), baseline);
    assert_eq!(binding.arena().depth(), 0);
    assert_eq!(registry.group_depth(), 0);
}

#[test]
fn engine_may_call_back_into_the_host() {
    let (engine, binding) = setup();
    engine.register_method("Math", "double", 41, |_engine, _obj, args, ret| {
        (i64::read_words(args) * 2).write_words(ret);
    });

    let weak = binding.downgrade();
    engine.register_method("Math", "double_plus_one", 42, move |_engine, _obj, args, ret| {
        let binding = weak.expect_alive();
        let inner = MethodKey {
            class: "Math",
            method: "double",
            hash: 41,
        };

        // Nested frame on the same arena while the outer one is open.
        let doubled: i64 = binding
            .ptrcall(inner, 0, (i64::read_words(args),), ReturnConvention::Value)
            .unwrap();
        (doubled + 1).write_words(ret);
    });

    let outer = MethodKey {
        class: "Math",
        method: "double_plus_one",
        hash: 42,
    };
    let ret: i64 = binding
        .ptrcall(outer, 0, (20i64,), ReturnConvention::Value)
        .unwrap();

    assert_eq!(ret, 41);
    assert_eq!(binding.arena().depth(), 0);
}

#[test]
fn handles_created_in_callbacks_outlive_the_call() {
    let (engine, binding) = setup();
    engine.register_method("Node", "duplicate", 32, |engine, _obj, _args, ret| {
        let class = engine.string_name_new("Object");
        ret[0] = engine.object_construct(class);
        engine.string_name_destroy(class);
    });

    let kept = Rc::new(RefCell::new(Vec::new()));
    let (weak, sink) = (binding.downgrade(), Rc::clone(&kept));
    engine.register_method("SceneTree", "notify", 61, move |_engine, _obj, _args, _ret| {
        let binding = weak.expect_alive();
        let mut sink = sink.borrow_mut();

        sink.push(binding.construct_object("Object"));
        sink.push(binding.registry().acquire_string("label"));

        let copy: ObjectReturn = binding
            .ptrcall(object_key("duplicate", 32), 0, ("temporary",), ReturnConvention::Owned)
            .unwrap();
        sink.push(copy.handle().unwrap());
    });

    let notify = MethodKey {
        class: "SceneTree",
        method: "notify",
        hash: 61,
    };
    let strings_before = engine.live_strings();
    let () = binding
        .ptrcall(notify, 0, ("event",), ReturnConvention::Value)
        .unwrap();

    let registry = binding.registry();
    let kept = kept.borrow();
    assert_eq!(kept.len(), 3);
    for &handle in kept.iter() {
        assert!(registry.is_live(handle), "{handle} released with the call");
        assert_eq!(registry.ownership(handle), Ok(Ownership::HostOwned));
        assert_eq!(registry.group_of(handle), Ok(Some(GroupId::ROOT)));
        assert!(registry.get(handle).is_ok());
    }

    // Only the label survives; both string arguments went with their calls.
    assert_eq!(engine.live_strings(), strings_before + 1);

    let objects: Vec<_> = [kept[0], kept[2]]
        .iter()
        .map(|&handle| registry.get(handle).unwrap()[0])
        .collect();
    for &handle in kept.iter() {
        registry.release(handle);
    }
    assert!(objects.iter().all(|&obj| engine.is_destroyed(obj)));
    assert_eq!(engine.live_strings(), strings_before);
}

#[test]
#[should_panic(expected = "failed to load method Node::missing")]
fn unknown_method_is_fatal() {
    let (_engine, binding) = setup();
    let _ = binding.ptrcall::<_, ()>(object_key("missing", 1), 0, (), ReturnConvention::Value);
}
