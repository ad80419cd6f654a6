/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::RefCell;
use std::rc::Rc;

use tether_core::binding::MethodKey;
use tether_core::meta::ReturnConvention;
use tether_core::obj::{VirtualMethods, VirtualTable};
use tether_ffi::{FrameArg, FrameReturn};

use crate::setup;

#[derive(Default)]
struct Player {
    elapsed: f64,
    ignored: Vec<String>,
}

impl VirtualMethods for Player {
    fn register_virtuals(table: &mut VirtualTable<Self>) {
        table
            .register("_process", |this, args, _ret| {
                this.elapsed += f64::read_words(args);
            })
            .register("_get_elapsed", |this, _args, ret| {
                this.elapsed.write_words(ret);
            });
    }

    fn unhandled_virtual(&mut self, name: &str) {
        self.ignored.push(name.to_string());
    }
}

/// Engine loop that drives the host overrides through the table, as the engine would on every frame.
#[test]
fn engine_callbacks_reach_host_overrides() {
    let (engine, binding) = setup();
    let table = Rc::new(VirtualTable::<Player>::new());
    let player = Rc::new(RefCell::new(Player::default()));

    let (t, p) = (Rc::clone(&table), Rc::clone(&player));
    engine.register_method("SceneTree", "step", 60, move |_engine, _obj, args, ret| {
        let mut player = p.borrow_mut();
        assert!(t.dispatch(&mut player, "_process", args, &mut []));
        assert!(!t.dispatch(&mut player, "_physics_process", args, &mut []));
        t.dispatch(&mut player, "_get_elapsed", &[], ret);
    });

    let step = MethodKey {
        class: "SceneTree",
        method: "step",
        hash: 60,
    };
    for _ in 0..3 {
        let _: f64 = binding
            .ptrcall(step, 0, (0.5f64,), ReturnConvention::Value)
            .unwrap();
    }
    let elapsed: f64 = binding
        .ptrcall(step, 0, (0.25f64,), ReturnConvention::Value)
        .unwrap();

    assert_eq!(elapsed, 1.75);
    assert_eq!(player.borrow().ignored.len(), 4);
    assert!(player.borrow().ignored.iter().all(|name| name == "_physics_process"));
}

#[test]
fn types_without_overrides_dispatch_nothing() {
    struct Inert;
    impl VirtualMethods for Inert {}

    let table = VirtualTable::<Inert>::new();
    assert!(table.is_empty());
    assert!(!table.dispatch(&mut Inert, "_ready", &[], &mut []));
}
