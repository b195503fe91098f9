//! Untracked allocations for single-owner, long-lived objects.
//!
//! Shaders, vertex buffers and textures belong to one thread for the whole
//! program, so they skip the header, the signature and the owner slot.
//! [`UncheckedPool`] carves them from the top of the arena buffer,
//! growing downward, while tracked regions grow upward from offset 0; the
//! two families meet at the pool's floor and never overlap.
//!
//! Returned blocks go on a coalescing free list and are reused first-fit.
//! When a returned block touches the floor, the floor rises instead, so
//! freeing every unchecked allocation hands the whole top of the buffer
//! back to tracked allocation.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use lode_core::Span;
use smallvec::SmallVec;

use crate::arena::Arena;

/// Bookkeeping for the downward-growing unchecked allocator.
pub(crate) struct UncheckedPool {
    /// Lowest byte handed out so far. Everything in `[floor, top)` is
    /// either live or on the free list.
    floor: u32,
    /// Returned blocks above the floor, sorted by start and coalesced.
    free: SmallVec<[Span; 8]>,
    live_bytes: usize,
    live_blocks: usize,
}

impl UncheckedPool {
    /// Create a pool whose floor starts at `top` (the aligned end of the
    /// buffer).
    pub fn new(top: u32) -> Self {
        Self {
            floor: top,
            free: SmallVec::new(),
            live_bytes: 0,
            live_blocks: 0,
        }
    }

    /// Lowest byte the pool may have handed out. Tracked regions must end
    /// at or below it.
    pub fn floor(&self) -> u32 {
        self.floor
    }

    /// Bytes held by live unchecked blocks.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Number of live unchecked blocks.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Reserve `size` bytes (already padded). `ceiling` is the tracked
    /// high-water mark the floor may not cross.
    ///
    /// Returns the largest available gap on failure.
    pub fn alloc(&mut self, size: u32, ceiling: u32) -> Result<Span, u32> {
        let span = if let Some(pos) = self.free.iter().position(|s| s.len() >= size) {
            let block = self.free[pos];
            if block.len() == size {
                self.free.remove(pos);
            } else {
                self.free[pos].start += size;
            }
            Span::new(block.start, block.start + size)
        } else {
            let new_floor = self
                .floor
                .checked_sub(size)
                .filter(|&f| f >= ceiling)
                .ok_or_else(|| self.largest_gap(ceiling))?;
            self.floor = new_floor;
            Span::new(new_floor, new_floor + size)
        };
        self.live_bytes += span.len() as usize;
        self.live_blocks += 1;
        Ok(span)
    }

    /// Return a block reserved by [`alloc`](Self::alloc).
    pub fn release(&mut self, span: Span) {
        debug_assert!(span.start >= self.floor, "block {span} below the pool floor");
        self.live_bytes -= span.len() as usize;
        self.live_blocks -= 1;

        let idx = self.free.partition_point(|s| s.start < span.start);
        self.free.insert(idx, span);
        // Coalesce with the successor, then the predecessor.
        if idx + 1 < self.free.len() && self.free[idx].end == self.free[idx + 1].start {
            self.free[idx].end = self.free[idx + 1].end;
            self.free.remove(idx + 1);
        }
        if idx > 0 && self.free[idx - 1].end == self.free[idx].start {
            self.free[idx - 1].end = self.free[idx].end;
            self.free.remove(idx);
        }
        // A free block resting on the floor is just unclaimed space.
        if let Some(first) = self.free.first().copied() {
            if first.start == self.floor {
                self.floor = first.end;
                self.free.remove(0);
            }
        }
    }

    fn largest_gap(&self, ceiling: u32) -> u32 {
        let below_floor = self.floor.saturating_sub(ceiling);
        self.free
            .iter()
            .map(Span::len)
            .max()
            .unwrap_or(0)
            .max(below_floor)
    }
}

/// Sole owner of an unchecked allocation.
///
/// Dereferences to the payload. Dropping the box (or passing it to
/// [`Arena::free_unchecked`] / [`Arena::delete_unchecked`]) runs the
/// payload's destructor and returns the bytes to the pool. Objects meant
/// to live as long as the arena can be [`leak`](Self::leak)ed; their
/// bytes are reclaimed only when the arena itself is destroyed, and their
/// destructors never run.
pub struct UncheckedBox<'a, T: ?Sized> {
    arena: &'a Arena,
    block: Span,
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

// SAFETY: the box is the only path to its block, exactly like `Box<T>`.
unsafe impl<T: ?Sized + Send> Send for UncheckedBox<'_, T> {}
unsafe impl<T: ?Sized + Sync> Sync for UncheckedBox<'_, T> {}

impl<'a, T: ?Sized> UncheckedBox<'a, T> {
    /// Wrap an initialised payload.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an initialised `T` inside `block`, and `block`
    /// must have been reserved from `arena`'s pool for this box alone.
    pub(crate) unsafe fn from_raw(arena: &'a Arena, block: Span, ptr: NonNull<T>) -> Self {
        Self {
            arena,
            block,
            ptr,
            _owns: PhantomData,
        }
    }

    /// Byte range of the block inside the arena buffer.
    pub fn block(&self) -> Span {
        self.block
    }

    /// Whether this box was carved from `arena`.
    pub fn belongs_to(&self, arena: &Arena) -> bool {
        ptr::eq(self.arena, arena)
    }

    /// Give up ownership, keeping the payload alive for the arena's
    /// lifetime.
    pub fn leak(self) -> &'a mut T {
        let this = ManuallyDrop::new(self);
        // SAFETY: the block stays reserved forever since the box is never
        // dropped, and the returned reference is the only path to it.
        unsafe { &mut *this.ptr.as_ptr() }
    }
}

impl<T: ?Sized> Deref for UncheckedBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` is initialised and uniquely owned by this box.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for UncheckedBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`, and `&mut self` guarantees uniqueness.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: ?Sized> Drop for UncheckedBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the payload is initialised and nothing else refers to it;
        // the block is released only after the destructor finishes.
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        self.arena.release_unchecked(self.block);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for UncheckedBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UncheckedBox")
            .field("block", &self.block)
            .field("value", &&**self)
            .finish()
    }
}
