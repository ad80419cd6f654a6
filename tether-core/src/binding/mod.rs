/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The context every generated call site goes through.
//!
//! There is no process-wide state: a [`Binding`] owns the handle registry, the call-frame arena and the name/method
//! caches for one engine, and is passed by reference to whatever needs them. Tests create as many isolated bindings as
//! they like.

mod config;
mod method_table;
mod string_cache;

use std::fmt;
use std::rc::{Rc, Weak};

use tether_ffi::{out, Engine, FrameArena, HandleKind, ObjectPtr, Ownership, RawHandle, StringNamePtr};

use crate::meta::error::{TetherError, TetherResult};
use crate::meta::{FromReturn, ParamTuple, ReturnConvention};
use crate::obj::RefGd;
use crate::registry::{Handle, HandleRegistry};

pub use config::BindingConfig;
pub use method_table::{MethodKey, MethodTable};
pub use string_cache::StringCache;

/// Shared context of all calls into one engine.
///
/// Cloning yields another reference to the same context.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<BindingInner>,
}

/// Non-owning reference to a [`Binding`], held by engine-backed containers so they do not keep the context alive.
#[derive(Clone)]
pub struct WeakBinding {
    inner: Weak<BindingInner>,
}

struct BindingInner {
    registry: HandleRegistry,
    arena: FrameArena,
    names: StringCache,
    methods: MethodTable,
    config: BindingConfig,
}

impl Binding {
    pub fn new(engine: Rc<dyn Engine>) -> Self {
        Self::with_config(engine, BindingConfig::default())
    }

    pub fn with_config(engine: Rc<dyn Engine>, config: BindingConfig) -> Self {
        out!("Binding: init with {config:?}");

        Self {
            inner: Rc::new(BindingInner {
                registry: HandleRegistry::with_config(Rc::clone(&engine), &config),
                arena: FrameArena::new(config.frame_capacity),
                names: StringCache::new(engine),
                methods: MethodTable::new(),
                config,
            }),
        }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.inner.registry.engine()
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.inner.registry
    }

    pub fn arena(&self) -> &FrameArena {
        &self.inner.arena
    }

    pub fn config(&self) -> &BindingConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakBinding {
        WeakBinding {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Interned engine name for `name`. Constructed on first use.
    pub fn string_name(&self, name: &'static str) -> StringNamePtr {
        self.inner.names.fetch(name)
    }

    /// Resolves (once) and returns the bind of an engine method.
    pub fn method_bind(&self, key: MethodKey) -> tether_ffi::MethodBind {
        self.inner.methods.fetch(self.engine(), &self.inner.names, key)
    }

    /// Calls an engine method through the call-frame arena.
    ///
    /// 1. A lifetime group is opened for the temporaries of this call. Host-owned handles that host code registers while
    ///    the engine runs (e.g. from a callback) do not join it.
    /// 2. `args` are pushed in order, then the return slot is reserved.
    /// 3. The engine is invoked with `receiver` (`0` for static methods).
    /// 4. Frame and group are closed, releasing all temporaries.
    /// 5. The returned words are decoded according to `convention`.
    ///
    /// Arguments that cannot be packed (e.g. a stale handle) abort the call before the engine is reached.
    ///
    /// # Panics
    /// If the method is unknown, or the arguments do not fit the arena. Both indicate a codegen/ABI mismatch.
    pub fn ptrcall<A, R>(
        &self,
        key: MethodKey,
        receiver: ObjectPtr,
        args: A,
        convention: ReturnConvention,
    ) -> TetherResult<R>
    where
        A: ParamTuple,
        R: FromReturn,
    {
        let bind = self.method_bind(key);
        out!("ptrcall: {}::{} with {} arg(s)", key.class, key.method, A::LEN);

        let group = self.registry().open_call_group();
        let ret = {
            let mut frame = self.inner.arena.acquire();
            args.push_args(&mut frame, self)?;

            let slot = frame.ret_words(R::WIDTH);
            frame.invoke(|arg_words, ret_words| self.engine().call(bind, receiver, arg_words, ret_words));
            let ret = frame.read_words(&slot);

            if let Err(err) = frame.close() {
                TetherError::from(err).fatal();
            }
            ret
        };

        if let Err(err) = group.close() {
            err.fatal();
        }

        // Decoded after the group is closed: returned values must not belong to the call's temporaries.
        R::from_return(&ret, self, convention)
    }

    /// Constructs a plain engine object. The engine hands it over, and the host now owns it and must release it.
    ///
    /// # Panics
    /// If the class is unknown or reference-counted; see [`construct_ref_counted()`](Self::construct_ref_counted).
    pub fn construct_object(&self, class: &'static str) -> Handle {
        let obj = self.construct_raw(class);
        if self.engine().object_is_ref_counted(obj) {
            self.engine().object_destroy(obj);
            panic!("class `{class}` is reference-counted; use construct_ref_counted()");
        }

        let registry = self.registry();
        let handle = registry.adopt(RawHandle::single(HandleKind::Object, obj), Ownership::EngineOwned);
        registry
            .transfer(handle, Ownership::EngineOwned, Ownership::HostOwned)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Constructs a reference-counted engine object, holding the first reference.
    ///
    /// # Panics
    /// If the class is unknown or not reference-counted.
    pub fn construct_ref_counted(&self, class: &'static str) -> RefGd {
        let obj = self.construct_raw(class);
        if !self.engine().object_is_ref_counted(obj) {
            self.engine().object_destroy(obj);
            panic!("class `{class}` is not reference-counted; use construct_object()");
        }

        RefGd::from_shared(self.registry(), RawHandle::single(HandleKind::RefCounted, obj))
    }

    fn construct_raw(&self, class: &'static str) -> ObjectPtr {
        let obj = self.engine().object_construct(self.string_name(class));
        assert_ne!(obj, 0, "engine cannot construct unknown class `{class}`");
        obj
    }

    /// Engine string that lives until the call whose arguments are being packed returns.
    ///
    /// # Panics
    /// Outside of [`ptrcall()`](Self::ptrcall).
    pub(crate) fn temporary_string(&self, text: &str) -> RawHandle {
        let registry = self.registry();
        let group = registry
            .current_call_group()
            .unwrap_or_else(|| panic!("string argument `{text}` packed outside of an engine call"));

        let raw = RawHandle::pair(HandleKind::String, self.engine().string_new(text));
        registry.adopt_temporary(raw, group);
        raw
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("registry", &self.inner.registry)
            .field("names", &self.inner.names.len())
            .field("methods", &self.inner.methods.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl WeakBinding {
    pub fn upgrade(&self) -> Option<Binding> {
        self.inner.upgrade().map(|inner| Binding { inner })
    }

    /// ⚠️ Upgrades, or panics if the binding is gone.
    ///
    /// Engine-backed containers use this: once the binding is dropped, the engine storage they refer to is gone too.
    #[track_caller]
    pub fn expect_alive(&self) -> Binding {
        self.upgrade()
            .unwrap_or_else(|| panic!("binding was dropped while an engine-backed container still refers to it"))
    }
}

impl fmt::Debug for WeakBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakBinding {{ alive: {} }}", self.inner.strong_count() > 0)
    }
}
