/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A mock implementation of the engine function table in pure Rust.
//!
//! Used so the whole handle/frame/proxy stack can be tested (and run under miri) without an engine process. The mock
//! behaves like a strict engine: freeing a dead object, using a destroyed string or touching an unknown cookie panics,
//! so bookkeeping bugs on the host side surface as test failures instead of silent corruption.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::{
    out, Cookie, Engine, HandleKind, MethodBind, ObjectPtr, StringNamePtr, StringPtr, Word, Words,
};

/// Host-side implementation of a mock method: `(engine, object, args, ret)`.
pub type MockMethod = Rc<dyn Fn(&MockEngine, ObjectPtr, &[Word], &mut [Word])>;

struct MockObject {
    class: String,
    ref_counted: bool,
    refs: u32,
    alive: bool,
}

struct MockString {
    generation: Word,
    chars: Vec<char>,
}

struct MockCollection {
    kind: HandleKind,
    refs: u32,
    read_only: bool,
    items: Vec<Words>,
    entries: Vec<(Words, Words)>,
}

#[derive(Default)]
struct MockState {
    next_ptr: Word,
    next_generation: Word,
    classes: HashMap<String, bool>,
    objects: HashMap<ObjectPtr, MockObject>,
    strings: HashMap<Word, MockString>,
    string_names: HashMap<Word, MockString>,
    collections: HashMap<Cookie, MockCollection>,
    binds_by_name: HashMap<(String, String, i64), MethodBind>,
    methods: HashMap<MethodBind, MockMethod>,
    destroy_count: usize,
    call_count: usize,
    bind_lookups: usize,
    string_name_creations: usize,
}

impl MockState {
    fn alloc_ptr(&mut self) -> Word {
        self.next_ptr += 0x10;
        0x1000 + self.next_ptr
    }

    fn alloc_generation(&mut self) -> Word {
        self.next_generation += 1;
        self.next_generation
    }

    fn object(&self, obj: ObjectPtr) -> &MockObject {
        let object = self
            .objects
            .get(&obj)
            .unwrap_or_else(|| panic!("mock engine: unknown object {obj:#x}"));
        assert!(object.alive, "mock engine: use of freed object {obj:#x}");
        object
    }

    fn object_mut(&mut self, obj: ObjectPtr) -> &mut MockObject {
        let object = self
            .objects
            .get_mut(&obj)
            .unwrap_or_else(|| panic!("mock engine: unknown object {obj:#x}"));
        assert!(object.alive, "mock engine: use of freed object {obj:#x}");
        object
    }

    fn string(&mut self, s: StringPtr) -> &mut MockString {
        let string = self
            .strings
            .get_mut(&s[0])
            .unwrap_or_else(|| panic!("mock engine: dangling string {:#x}", s[0]));
        assert_eq!(string.generation, s[1], "mock engine: stale string generation");
        string
    }

    fn collection(&mut self, cookie: Cookie) -> &mut MockCollection {
        self.collections
            .get_mut(&cookie)
            .unwrap_or_else(|| panic!("mock engine: unknown collection {cookie:#x}"))
    }
}

/// In-process engine with inspection hooks for tests.
#[derive(Default)]
pub struct MockEngine {
    state: RefCell<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        let engine = Self::default();
        engine.register_class("Object", false);
        engine.register_class("RefCounted", true);
        engine
    }

    pub fn register_class(&self, name: &str, ref_counted: bool) {
        self.state
            .borrow_mut()
            .classes
            .insert(name.to_string(), ref_counted);
    }

    /// Registers a callable method and returns the bind it will resolve to.
    pub fn register_method(
        &self,
        class: &str,
        method: &str,
        hash: i64,
        f: impl Fn(&MockEngine, ObjectPtr, &[Word], &mut [Word]) + 'static,
    ) -> MethodBind {
        let mut state = self.state.borrow_mut();
        let bind = MethodBind(state.methods.len() as Word + 1);

        state
            .binds_by_name
            .insert((class.to_string(), method.to_string(), hash), bind);
        state.methods.insert(bind, Rc::new(f));
        bind
    }

    /// Frees an object behind the host's back, as the engine may do at any time for objects it owns.
    pub fn free_externally(&self, obj: ObjectPtr) {
        let mut state = self.state.borrow_mut();
        state.object_mut(obj).alive = false;
        state.destroy_count += 1;
    }

    /// Creates an engine-owned array with the given element words and a count of one.
    pub fn create_array(&self, kind: HandleKind, items: Vec<Words>) -> Cookie {
        let cookie = self.collection_new(kind);
        self.state.borrow_mut().collection(cookie).items = items;
        cookie
    }

    pub fn live_objects(&self) -> usize {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|o| o.alive)
            .count()
    }

    pub fn is_destroyed(&self, obj: ObjectPtr) -> bool {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .is_some_and(|o| !o.alive)
    }

    pub fn destroy_count(&self) -> usize {
        self.state.borrow().destroy_count
    }

    pub fn object_class(&self, obj: ObjectPtr) -> Option<String> {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .map(|o| o.class.clone())
    }

    pub fn live_strings(&self) -> usize {
        self.state.borrow().strings.len()
    }

    pub fn live_string_names(&self) -> usize {
        self.state.borrow().string_names.len()
    }

    pub fn string_name_creations(&self) -> usize {
        self.state.borrow().string_name_creations
    }

    pub fn live_collections(&self) -> usize {
        self.state.borrow().collections.len()
    }

    /// Engine-side count of a collection, or `None` if it was freed.
    pub fn collection_refs(&self, cookie: Cookie) -> Option<u32> {
        self.state.borrow().collections.get(&cookie).map(|c| c.refs)
    }

    pub fn collection_kind(&self, cookie: Cookie) -> Option<HandleKind> {
        self.state.borrow().collections.get(&cookie).map(|c| c.kind)
    }

    pub fn call_count(&self) -> usize {
        self.state.borrow().call_count
    }

    pub fn bind_lookups(&self) -> usize {
        self.state.borrow().bind_lookups
    }

    fn name_text(&self, s: StringNamePtr) -> String {
        let state = self.state.borrow();
        let name = state
            .string_names
            .get(&s[0])
            .unwrap_or_else(|| panic!("mock engine: dangling string name {:#x}", s[0]));
        assert_eq!(name.generation, s[1], "mock engine: stale string name generation");
        name.chars.iter().collect()
    }
}

impl Engine for MockEngine {
    fn object_construct(&self, class: StringNamePtr) -> ObjectPtr {
        let class = self.name_text(class);
        let mut state = self.state.borrow_mut();

        let Some(&ref_counted) = state.classes.get(&class) else {
            return 0;
        };

        let ptr = state.alloc_ptr();
        state.objects.insert(
            ptr,
            MockObject {
                class,
                ref_counted,
                refs: 0,
                alive: true,
            },
        );
        out!("mock: construct {ptr:#x}");
        ptr
    }

    fn object_destroy(&self, obj: ObjectPtr) {
        let mut state = self.state.borrow_mut();
        state.object_mut(obj).alive = false;
        state.destroy_count += 1;
        out!("mock: destroy {obj:#x}");
    }

    fn object_is_alive(&self, obj: ObjectPtr) -> bool {
        self.state
            .borrow()
            .objects
            .get(&obj)
            .is_some_and(|o| o.alive)
    }

    fn object_is_ref_counted(&self, obj: ObjectPtr) -> bool {
        self.state.borrow().object(obj).ref_counted
    }

    fn ref_init(&self, obj: ObjectPtr) -> bool {
        self.ref_inc(obj)
    }

    fn ref_inc(&self, obj: ObjectPtr) -> bool {
        let mut state = self.state.borrow_mut();
        let object = state.object_mut(obj);
        if !object.ref_counted {
            return false;
        }

        object.refs += 1;
        true
    }

    fn ref_dec(&self, obj: ObjectPtr) -> bool {
        let mut state = self.state.borrow_mut();
        let object = state.object_mut(obj);
        assert!(object.ref_counted, "mock engine: unreference on plain object");
        assert!(object.refs > 0, "mock engine: reference count underflow on {obj:#x}");

        object.refs -= 1;
        object.refs == 0
    }

    fn ref_count(&self, obj: ObjectPtr) -> u32 {
        self.state.borrow().objects.get(&obj).map_or(0, |o| o.refs)
    }

    fn string_new(&self, text: &str) -> StringPtr {
        let mut state = self.state.borrow_mut();
        let ptr = state.alloc_ptr();
        let generation = state.alloc_generation();
        state.strings.insert(
            ptr,
            MockString {
                generation,
                chars: text.chars().collect(),
            },
        );
        [ptr, generation]
    }

    fn string_to_utf8(&self, s: StringPtr) -> String {
        self.state.borrow_mut().string(s).chars.iter().collect()
    }

    fn string_len(&self, s: StringPtr) -> usize {
        self.state.borrow_mut().string(s).chars.len()
    }

    fn string_char_at(&self, s: StringPtr, index: usize) -> char {
        self.state.borrow_mut().string(s).chars[index]
    }

    fn string_set_char(&self, s: StringPtr, index: usize, ch: char) {
        self.state.borrow_mut().string(s).chars[index] = ch;
    }

    fn string_resize(&self, s: StringPtr, len: usize) {
        self.state.borrow_mut().string(s).chars.resize(len, '\0');
    }

    fn string_destroy(&self, s: StringPtr) {
        let mut state = self.state.borrow_mut();
        state.string(s);
        state.strings.remove(&s[0]);
    }

    fn string_name_new(&self, text: &str) -> StringNamePtr {
        let mut state = self.state.borrow_mut();
        let ptr = state.alloc_ptr();
        let generation = state.alloc_generation();
        state.string_name_creations += 1;
        state.string_names.insert(
            ptr,
            MockString {
                generation,
                chars: text.chars().collect(),
            },
        );
        [ptr, generation]
    }

    fn string_name_to_utf8(&self, s: StringNamePtr) -> String {
        self.name_text(s)
    }

    fn string_name_destroy(&self, s: StringNamePtr) {
        let removed = self.state.borrow_mut().string_names.remove(&s[0]);
        let name = removed.expect("mock engine: string name destroyed twice");
        assert_eq!(name.generation, s[1], "mock engine: stale string name generation");
    }

    fn collection_new(&self, kind: HandleKind) -> Cookie {
        assert!(kind.is_collection(), "mock engine: {kind} is not a collection");

        let mut state = self.state.borrow_mut();
        let cookie = state.alloc_ptr();
        state.collections.insert(
            cookie,
            MockCollection {
                kind,
                refs: 1,
                read_only: false,
                items: Vec::new(),
                entries: Vec::new(),
            },
        );
        cookie
    }

    fn collection_ref(&self, cookie: Cookie) {
        self.state.borrow_mut().collection(cookie).refs += 1;
    }

    fn collection_unref(&self, cookie: Cookie) -> bool {
        let mut state = self.state.borrow_mut();
        let collection = state.collection(cookie);
        collection.refs -= 1;

        if collection.refs == 0 {
            state.collections.remove(&cookie);
            true
        } else {
            false
        }
    }

    fn collection_is_read_only(&self, cookie: Cookie) -> bool {
        self.state.borrow_mut().collection(cookie).read_only
    }

    fn collection_make_read_only(&self, cookie: Cookie) {
        self.state.borrow_mut().collection(cookie).read_only = true;
    }

    fn array_len(&self, cookie: Cookie) -> usize {
        self.state.borrow_mut().collection(cookie).items.len()
    }

    fn array_get(&self, cookie: Cookie, index: usize) -> Words {
        self.state.borrow_mut().collection(cookie).items[index]
    }

    fn array_set(&self, cookie: Cookie, index: usize, value: &[Word]) {
        let mut state = self.state.borrow_mut();
        let collection = state.collection(cookie);
        assert!(!collection.read_only, "mock engine: write to read-only array");
        collection.items[index] = Words::from_slice(value);
    }

    fn array_resize(&self, cookie: Cookie, len: usize, fill: &[Word]) {
        let mut state = self.state.borrow_mut();
        let collection = state.collection(cookie);
        assert!(!collection.read_only, "mock engine: resize of read-only array");
        collection.items.resize(len, Words::from_slice(fill));
    }

    fn dictionary_len(&self, cookie: Cookie) -> usize {
        self.state.borrow_mut().collection(cookie).entries.len()
    }

    fn dictionary_get(&self, cookie: Cookie, key: &[Word]) -> Option<Words> {
        let mut state = self.state.borrow_mut();
        state
            .collection(cookie)
            .entries
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| *v)
    }

    fn dictionary_set(&self, cookie: Cookie, key: &[Word], value: &[Word]) {
        let mut state = self.state.borrow_mut();
        let collection = state.collection(cookie);
        assert!(!collection.read_only, "mock engine: write to read-only dictionary");

        let value = Words::from_slice(value);
        match collection.entries.iter_mut().find(|(k, _)| k.as_slice() == key) {
            Some((_, existing)) => *existing = value,
            None => collection.entries.push((Words::from_slice(key), value)),
        }
    }

    fn dictionary_remove(&self, cookie: Cookie, key: &[Word]) -> Option<Words> {
        let mut state = self.state.borrow_mut();
        let collection = state.collection(cookie);
        assert!(!collection.read_only, "mock engine: removal from read-only dictionary");

        let pos = collection.entries.iter().position(|(k, _)| k.as_slice() == key)?;
        Some(collection.entries.remove(pos).1)
    }

    fn dictionary_keys(&self, cookie: Cookie) -> Vec<Words> {
        let mut state = self.state.borrow_mut();
        state.collection(cookie).entries.iter().map(|(k, _)| *k).collect()
    }

    fn method_bind(
        &self,
        class: StringNamePtr,
        method: StringNamePtr,
        hash: i64,
    ) -> Option<MethodBind> {
        let key = (self.name_text(class), self.name_text(method), hash);

        let mut state = self.state.borrow_mut();
        state.bind_lookups += 1;
        state.binds_by_name.get(&key).copied()
    }

    fn call(&self, bind: MethodBind, object: ObjectPtr, args: &[Word], ret: &mut [Word]) {
        let method = {
            let mut state = self.state.borrow_mut();
            state.call_count += 1;
            if object != 0 {
                state.object(object);
            }

            state
                .methods
                .get(&bind)
                .cloned()
                .unwrap_or_else(|| panic!("mock engine: unknown method bind {bind:?}"))
        };

        // State is released here, so the method may call back into the engine.
        method(self, object, args, ret);
    }
}
