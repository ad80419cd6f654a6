/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tether_ffi::{out, Engine, StringNamePtr};

/// Interns class and method names as engine `StringName`s.
///
/// Each name is constructed once, on first use, and reused for every later call. All names are destroyed when the cache
/// is dropped.
pub struct StringCache {
    names_by_str: RefCell<HashMap<&'static str, StringNamePtr>>,
    engine: Rc<dyn Engine>,
}

impl StringCache {
    pub fn new(engine: Rc<dyn Engine>) -> Self {
        Self {
            names_by_str: RefCell::new(HashMap::new()),
            engine,
        }
    }

    /// Returns the interned name for `key`, constructing it on first use.
    pub fn fetch(&self, key: &'static str) -> StringNamePtr {
        if let Some(&name) = self.names_by_str.borrow().get(key) {
            return name;
        }

        let name = self.engine.string_name_new(key);
        out!("StringCache: intern `{key}`");
        self.names_by_str.borrow_mut().insert(key, name);
        name
    }

    pub fn len(&self) -> usize {
        self.names_by_str.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destroy all string names.
impl Drop for StringCache {
    fn drop(&mut self) {
        for (_, name) in self.names_by_str.get_mut().drain() {
            self.engine.string_name_destroy(name);
        }
    }
}
