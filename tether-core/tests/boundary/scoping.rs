/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_core::registry::GroupId;
use tether_core::TetherError;

use crate::setup;

#[test]
fn nested_groups_release_their_own_members() {
    let (engine, binding) = setup();
    let registry = binding.registry();
    let baseline = engine.live_strings();

    let outer = registry.open_group();
    let kept = registry.acquire_string("outer");
    {
        let inner = registry.open_group();
        assert_eq!(registry.current_group(), inner.id());
        registry.acquire_string("inner one");
        registry.acquire_string("inner two");
        assert_eq!(engine.live_strings(), baseline + 3);

        inner.close().unwrap();
    }

    assert_eq!(engine.live_strings(), baseline + 1);
    assert!(registry.is_live(kept));
    assert_eq!(registry.current_group(), outer.id());

    outer.close().unwrap();
    assert!(!registry.is_live(kept));
    assert_eq!(registry.current_group(), GroupId::ROOT);
    assert_eq!(engine.live_strings(), baseline);
}

#[test]
fn out_of_order_group_close_is_reported() {
    let (engine, binding) = setup();
    let registry = binding.registry();
    let baseline = engine.live_strings();

    let outer = registry.open_group();
    let inner = registry.open_group();
    registry.acquire_string("member of inner");

    let (outer_id, inner_id) = (outer.id(), inner.id());
    assert_eq!(
        outer.close(),
        Err(TetherError::UnbalancedLifetimeGroup {
            closing: outer_id.to_u64(),
            innermost: inner_id.to_u64(),
        })
    );

    inner.close().unwrap();
    assert_eq!(registry.group_depth(), 0);
    assert_eq!(engine.live_strings(), baseline);
}

#[test]
fn out_of_order_frame_close_is_reported() {
    let (_engine, binding) = setup();
    let arena = binding.arena();

    let mut outer = arena.acquire();
    outer.arg(&1i64);
    let mut inner = arena.acquire();
    inner.arg(&2i64);

    let err = TetherError::from(outer.close().unwrap_err());
    assert!(matches!(err, TetherError::UnbalancedLifetimeGroup { .. }));
    assert!(err.is_fatal());

    inner.close().unwrap();
    assert_eq!(arena.depth(), 0);
}

#[test]
#[should_panic(expected = "call frame overflow")]
fn frame_overflow_is_fatal() {
    use std::rc::Rc;

    use tether_core::binding::{Binding, BindingConfig};
    use tether_ffi::mock::MockEngine;

    let config = BindingConfig {
        frame_capacity: 2,
        ..BindingConfig::default()
    };
    let binding = Binding::with_config(Rc::new(MockEngine::new()), config);

    let mut frame = binding.arena().acquire();
    frame.arg(&glam::Vec3::ZERO);
}

#[test]
fn leaked_handles_are_released_with_the_binding() {
    let (engine, binding) = setup();
    let baseline = engine.live_strings();

    binding.registry().acquire_string("forgotten");
    let node = binding.construct_object("Object");
    let node_ptr = binding.registry().get(node).unwrap()[0];
    assert_eq!(engine.live_strings(), baseline + 1);

    drop(binding);
    assert_eq!(engine.live_strings(), baseline);
    assert!(engine.is_destroyed(node_ptr));
}
