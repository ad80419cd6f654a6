/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::RefCell;
use std::collections::HashMap;

use tether_ffi::{out, Engine, MethodBind};

use super::string_cache::StringCache;

/// Key of a method bind: class, method and the hash that disambiguates its signature.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct MethodKey {
    pub class: &'static str,
    pub method: &'static str,
    pub hash: i64,
}

/// Lazily resolved table of method binds.
///
/// Generated code refers to engine methods by name; the table resolves each one once and serves the cached bind on
/// every later call.
#[derive(Default)]
pub struct MethodTable {
    binds: RefCell<HashMap<MethodKey, MethodBind>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ⚠️ Returns the bind for `key`, resolving it through the engine on first use.
    ///
    /// # Panics
    /// If the engine does not know the method. Generated code and engine disagree about the API, which cannot be
    /// recovered from at runtime.
    pub fn fetch(&self, engine: &dyn Engine, names: &StringCache, key: MethodKey) -> MethodBind {
        if let Some(&bind) = self.binds.borrow().get(&key) {
            return bind;
        }

        let class = names.fetch(key.class);
        let method = names.fetch(key.method);
        let bind = engine
            .method_bind(class, method, key.hash)
            .unwrap_or_else(|| {
                panic!(
                    "failed to load method {}::{} (hash {}); make sure engine and bindings versions match",
                    key.class, key.method, key.hash
                )
            });

        out!("MethodTable: {}::{} -> {:?}", key.class, key.method, bind);
        self.binds.borrow_mut().insert(key, bind);
        bind
    }

    pub fn len(&self) -> usize {
        self.binds.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
