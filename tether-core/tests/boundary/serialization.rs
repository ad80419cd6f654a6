/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use tether_core::builtin::{Array, Dictionary, GString, PackedArray};
use tether_ffi::{HandleKind, Ownership};

use crate::setup;

#[test]
fn tags_serialize_by_name() {
    assert_eq!(serde_json::to_string(&HandleKind::StringName).unwrap(), "\"StringName\"");

    let tag: Ownership = serde_json::from_str("\"SharedRefCounted\"").unwrap();
    assert_eq!(tag, Ownership::SharedRefCounted);
}

#[test]
fn containers_serialize_their_contents() {
    let array = Array::from_vec(vec![3i64, 1, 2]);
    assert_eq!(serde_json::to_string(&array).unwrap(), "[3,1,2]");

    let text = GString::from("tether");
    assert_eq!(serde_json::to_string(&text).unwrap(), "\"tether\"");

    let dict: Dictionary<i64, bool> = [(2, true), (1, false)].into_iter().collect();
    assert_eq!(serde_json::to_string(&dict).unwrap(), r#"{"2":true,"1":false}"#);
}

#[test]
fn engine_backed_containers_serialize_through_the_engine() {
    let (_engine, binding) = setup();
    let floats = PackedArray::from_vec(vec![0.5f64, 1.5]);
    floats.promote(&binding);

    assert!(floats.is_proxied());
    assert_eq!(serde_json::to_string(&floats).unwrap(), "[0.5,1.5]");
}

#[test]
fn deserialized_containers_are_local_and_writable() {
    let array: Array<i64> = serde_json::from_str("[1,2,3]").unwrap();
    assert!(!array.is_proxied());
    array.push(4).unwrap();
    assert_eq!(array.to_vec(), vec![1, 2, 3, 4]);

    let dict: Dictionary<i64, f64> = serde_json::from_str(r#"{"7":0.25,"3":1.0}"#).unwrap();
    assert_eq!(dict.keys(), vec![7, 3]);
    assert_eq!(dict.get(&3), Some(1.0));

    let text: GString = serde_json::from_str("\"abc\"").unwrap();
    assert_eq!(text, "abc");
}
