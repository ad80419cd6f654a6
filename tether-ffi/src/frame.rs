/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cell::{Cell, RefCell, UnsafeCell};
use std::marker::PhantomData;
use std::ptr;

use crate::{out, FrameArg, FrameReturn, Word, Words};

/// Number of words a [`FrameArena`] holds unless configured otherwise.
pub const DEFAULT_FRAME_CAPACITY: usize = 64;

/// Violations of the call-frame discipline.
///
/// Both indicate a mismatch between generated call sites and the ABI; the frame API panics with these unless the
/// checked [`Frame::close()`] is used.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum FrameError {
    #[error("call frame overflow: {requested} word(s) requested with {used} of {capacity} in use")]
    Overflow {
        requested: usize,
        used: usize,
        capacity: usize,
    },

    /// Reads the same as the lifetime-group violation it converts into in the safe layer.
    #[error("unbalanced lifetime group: closing #{closing} while #{innermost} is innermost")]
    Unbalanced { closing: u64, innermost: u64 },
}

#[derive(Debug)]
struct FrameRecord {
    id: u64,
    base: usize,
    /// Words in use, including the return slot.
    len: usize,
    /// Offset of the return slot relative to `base`, once reserved.
    ret: Option<(usize, usize)>,
}

/// Stack-disciplined scratch buffer for call arguments and return slots.
///
/// Each [`Frame`] occupies a contiguous region directly above the previously opened frame. Frames must be closed in
/// reverse order of acquisition; this holds naturally when frames are scoped, including nested calls the engine makes
/// back into the host while an outer frame is being invoked.
///
/// The buffer is allocated on first use and never reallocated afterwards, so word slices handed to the engine stay
/// valid for the whole call. Every region is derived from one base pointer taken at allocation, never from a
/// reference to the whole buffer, so slices of different frames stay valid side by side.
///
/// Not `Sync`: the arena has no internal locking, concurrent use from several threads is undefined and thus rejected.
pub struct FrameArena {
    buffer: UnsafeCell<Vec<Word>>,
    base: Cell<*mut Word>,
    capacity: usize,
    stack: RefCell<Vec<FrameRecord>>,
    next_id: Cell<u64>,
}

thread_local! {
    static LOCAL_ARENA: FrameArena = FrameArena::default();
}

impl FrameArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: UnsafeCell::new(Vec::new()),
            base: Cell::new(ptr::null_mut()),
            capacity,
            stack: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    /// Runs `f` with this thread's arena of [`DEFAULT_FRAME_CAPACITY`] words.
    pub fn with_local<R>(f: impl FnOnce(&FrameArena) -> R) -> R {
        LOCAL_ARENA.with(f)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently open frames.
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Words currently occupied by all open frames.
    pub fn used(&self) -> usize {
        self.stack
            .borrow()
            .last()
            .map_or(0, |top| top.base + top.len)
    }

    /// Opens a new frame on top of all currently open ones.
    pub fn acquire(&self) -> Frame<'_> {
        let mut stack = self.stack.borrow_mut();

        if stack.is_empty() {
            // SAFETY: no frame is open, so no slice into the buffer exists.
            let buffer = unsafe { &mut *self.buffer.get() };
            if buffer.len() < self.capacity {
                *buffer = vec![0; self.capacity];
                self.base.set(buffer.as_mut_ptr());
            }
        }

        let base = stack.last().map_or(0, |top| top.base + top.len);
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        stack.push(FrameRecord {
            id,
            base,
            len: 0,
            ret: None,
        });
        out!("frame #{id} acquired at word {base}");

        Frame {
            arena: self,
            id,
            closed: false,
        }
    }

    fn with_top<R>(&self, id: u64, op: &str, f: impl FnOnce(&mut FrameRecord) -> R) -> R {
        let mut stack = self.stack.borrow_mut();
        let innermost = stack.last().map_or(0, |top| top.id);
        match stack.last_mut() {
            Some(top) if top.id == id => f(top),
            _ => {
                let err = FrameError::Unbalanced {
                    closing: id,
                    innermost,
                };
                panic!("{op}() on frame that is not innermost: {err}");
            }
        }
    }

    /// Reserves `width` words at the end of frame `id` and returns their start.
    fn reserve(&self, id: u64, op: &str, width: usize) -> usize {
        self.with_top(id, op, |record| {
            let start = record.base + record.len;
            if start + width > self.capacity {
                let err = FrameError::Overflow {
                    requested: width,
                    used: start,
                    capacity: self.capacity,
                };
                panic!("{err}");
            }

            record.len += width;
            start
        })
    }

    /// # Safety
    /// `start..start + len` must lie within a region reserved by an open frame, with no other slice into it alive.
    #[allow(clippy::mut_from_ref)]
    unsafe fn region_mut(&self, start: usize, len: usize) -> &mut [Word] {
        debug_assert!(start + len <= self.capacity);
        if len == 0 {
            return &mut [];
        }

        unsafe { std::slice::from_raw_parts_mut(self.base.get().add(start), len) }
    }

    /// # Safety
    /// As for [`region_mut()`](Self::region_mut), except that shared slices into the region may coexist.
    unsafe fn region(&self, start: usize, len: usize) -> &[Word] {
        debug_assert!(start + len <= self.capacity);
        if len == 0 {
            return &[];
        }

        unsafe { std::slice::from_raw_parts(self.base.get().add(start), len) }
    }

    fn pop(&self, id: u64) -> Result<(), FrameError> {
        let mut stack = self.stack.borrow_mut();
        let innermost = stack.last().map_or(0, |top| top.id);

        let pos = stack
            .iter()
            .rposition(|record| record.id == id)
            .expect("frame closed twice");

        stack.remove(pos);
        out!("frame #{id} released");

        if id == innermost {
            Ok(())
        } else {
            Err(FrameError::Unbalanced {
                closing: id,
                innermost,
            })
        }
    }
}

impl Default for FrameArena {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Typed location of a frame's return value.
#[derive(Debug)]
pub struct ReturnSlot<R> {
    offset: usize,
    width: usize,
    _marker: PhantomData<fn() -> R>,
}

impl<R> ReturnSlot<R> {
    pub fn width(&self) -> usize {
        self.width
    }
}

/// One call's arguments followed by its return slot.
///
/// Arguments are appended in call order and never reordered. The frame is released exactly once: either explicitly
/// through [`close()`](Self::close), or when dropped (including during unwinding).
pub struct Frame<'a> {
    arena: &'a FrameArena,
    id: u64,
    closed: bool,
}

impl<'a> Frame<'a> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serializes `value` into the next slot(s).
    ///
    /// # Panics
    /// On overflow, after the return slot has been reserved, or if this frame is not the innermost one.
    pub fn arg<A>(&mut self, value: &A)
    where
        A: FrameArg + ?Sized,
    {
        self.arena.with_top(self.id, "arg", |record| {
            assert!(
                record.ret.is_none(),
                "frame #{}: argument pushed after the return slot",
                record.id
            );
        });

        let width = value.width();
        let start = self.arena.reserve(self.id, "arg", width);

        // SAFETY: region freshly reserved by the innermost frame; nothing else refers to it.
        let region = unsafe { self.arena.region_mut(start, width) };
        value.write_words(region);
    }

    /// Reserves the trailing return slot sized for `R`.
    pub fn ret<R: FrameReturn>(&mut self) -> ReturnSlot<R> {
        self.reserve_return(R::WIDTH)
    }

    /// Reserves the trailing return slot with a dynamic width, e.g. for a handle whose kind is only known at runtime.
    pub fn ret_words(&mut self, width: usize) -> ReturnSlot<Words> {
        self.reserve_return(width)
    }

    fn reserve_return<R>(&mut self, width: usize) -> ReturnSlot<R> {
        let offset = self.arena.with_top(self.id, "ret", |record| {
            assert!(
                record.ret.is_none(),
                "frame #{}: return slot reserved twice",
                record.id
            );
            record.len
        });

        let start = self.arena.reserve(self.id, "ret", width);

        // SAFETY: see arg().
        unsafe { self.arena.region_mut(start, width) }.fill(0);

        self.arena
            .with_top(self.id, "ret", |record| record.ret = Some((offset, width)));

        ReturnSlot {
            offset,
            width,
            _marker: PhantomData,
        }
    }

    /// Number of argument words pushed so far.
    pub fn args_len(&self) -> usize {
        let stack = self.arena.stack.borrow();
        let record = stack
            .iter()
            .find(|r| r.id == self.id)
            .expect("frame record missing");

        record.ret.map_or(record.len, |(offset, _)| offset)
    }

    /// Hands the argument words and the return slot to `f`, typically the foreign entry point.
    ///
    /// `f` may acquire nested frames from the same arena.
    pub fn invoke<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&[Word], &mut [Word]) -> R,
    {
        let (base, args_len, ret_width) = self.arena.with_top(self.id, "invoke", |record| {
            let (offset, width) = record.ret.unwrap_or((record.len, 0));
            (record.base, offset, width)
        });

        // SAFETY: both regions belong to this frame, which is innermost. Nested frames acquired inside `f` are placed
        // strictly above `base + args_len + ret_width`, so they cannot alias these slices.
        let (args, ret) = unsafe {
            (
                self.arena.region(base, args_len),
                self.arena.region_mut(base + args_len, ret_width),
            )
        };

        f(args, ret)
    }

    /// Reads the return value after [`invoke()`](Self::invoke), decoding it directly from the frame.
    pub fn read<R: FrameReturn>(&self, slot: &ReturnSlot<R>) -> R {
        R::read_words(self.return_region(slot.offset, slot.width))
    }

    /// Reads a dynamically sized return value, at most [`MAX_WORDS`](crate::MAX_WORDS) wide.
    pub fn read_words(&self, slot: &ReturnSlot<Words>) -> Words {
        Words::from_slice(self.return_region(slot.offset, slot.width))
    }

    fn return_region(&self, offset: usize, width: usize) -> &[Word] {
        let base = self.arena.with_top(self.id, "read", |record| record.base);

        // SAFETY: shared read of this frame's own return slot; no mutable slice is alive outside invoke().
        unsafe { self.arena.region(base + offset, width) }
    }

    /// Releases the frame, reporting out-of-order release instead of panicking.
    pub fn close(mut self) -> Result<(), FrameError> {
        self.closed = true;
        self.arena.pop(self.id)
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(err) = self.arena.pop(self.id) {
            if std::thread::panicking() {
                tracing::error!(target: "tether::frame", "{err} (while unwinding)");
            } else {
                panic!("{err}");
            }
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
