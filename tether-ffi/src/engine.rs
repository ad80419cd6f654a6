/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{HandleKind, Word, Words};

/// Single-word object pointer, as handed out by the engine. Zero is null.
pub type ObjectPtr = Word;

/// String buffer pointer plus generation.
pub type StringPtr = [Word; 2];

/// Interned string pointer plus generation.
pub type StringNamePtr = [Word; 2];

/// Engine-side collection cookie (array, dictionary, packed array).
pub type Cookie = Word;

/// Opaque ID of a resolved engine method, the first key of [`Engine::call`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MethodBind(pub Word);

/// Function table exposed by the engine.
///
/// Every function here is a raw boundary operation: no bookkeeping, no ownership tracking. Implementations are free to
/// abort on invalid input (like the engine itself would), so callers validate through the handle registry first.
///
/// The engine is assumed not to be reentrant across threads. Methods take `&self` because the engine may call back into
/// the host during [`call()`](Self::call), which in turn may issue more engine calls.
pub trait Engine {
    // Objects.

    /// Constructs an object of the given class. Returns null if the class is unknown.
    ///
    /// Ref-counted objects start with a count of zero; the first host reference calls [`ref_init()`](Self::ref_init).
    fn object_construct(&self, class: StringNamePtr) -> ObjectPtr;
    fn object_destroy(&self, obj: ObjectPtr);
    fn object_is_alive(&self, obj: ObjectPtr) -> bool;
    fn object_is_ref_counted(&self, obj: ObjectPtr) -> bool;

    /// Takes the first reference (or an additional one, if the engine already holds some). Returns `false` on failure.
    fn ref_init(&self, obj: ObjectPtr) -> bool;
    fn ref_inc(&self, obj: ObjectPtr) -> bool;

    /// Decrements the count. Returns `true` if it reached zero, in which case the caller must destroy the object.
    fn ref_dec(&self, obj: ObjectPtr) -> bool;
    fn ref_count(&self, obj: ObjectPtr) -> u32;

    // Strings.

    fn string_new(&self, text: &str) -> StringPtr;
    fn string_to_utf8(&self, s: StringPtr) -> String;
    fn string_len(&self, s: StringPtr) -> usize;
    fn string_char_at(&self, s: StringPtr, index: usize) -> char;
    fn string_set_char(&self, s: StringPtr, index: usize, ch: char);
    fn string_resize(&self, s: StringPtr, len: usize);
    fn string_destroy(&self, s: StringPtr);

    fn string_name_new(&self, text: &str) -> StringNamePtr;
    fn string_name_to_utf8(&self, s: StringNamePtr) -> String;
    fn string_name_destroy(&self, s: StringNamePtr);

    // Collections.

    /// Creates an empty collection with an engine-side count of one.
    fn collection_new(&self, kind: HandleKind) -> Cookie;
    fn collection_ref(&self, cookie: Cookie);

    /// Returns `true` if this was the last reference and the engine freed the collection.
    fn collection_unref(&self, cookie: Cookie) -> bool;
    fn collection_is_read_only(&self, cookie: Cookie) -> bool;
    fn collection_make_read_only(&self, cookie: Cookie);

    fn array_len(&self, cookie: Cookie) -> usize;
    fn array_get(&self, cookie: Cookie, index: usize) -> Words;
    fn array_set(&self, cookie: Cookie, index: usize, value: &[Word]);

    /// Grows by appending `fill` or truncates.
    fn array_resize(&self, cookie: Cookie, len: usize, fill: &[Word]);

    fn dictionary_len(&self, cookie: Cookie) -> usize;
    fn dictionary_get(&self, cookie: Cookie, key: &[Word]) -> Option<Words>;
    fn dictionary_set(&self, cookie: Cookie, key: &[Word], value: &[Word]);
    fn dictionary_remove(&self, cookie: Cookie, key: &[Word]) -> Option<Words>;

    /// Keys in insertion order.
    fn dictionary_keys(&self, cookie: Cookie) -> Vec<Words>;

    // Calls.

    /// Looks up a method by interned class and method name. `hash` disambiguates signatures.
    fn method_bind(&self, class: StringNamePtr, method: StringNamePtr, hash: i64) -> Option<MethodBind>;

    /// Invokes a method. `args` holds the packed argument words in call order, `ret` the reserved return slot.
    fn call(&self, bind: MethodBind, object: ObjectPtr, args: &[Word], ret: &mut [Word]);
}
