//! Typed construction and destruction on top of both allocation families.

#![allow(unsafe_code)]

use std::mem;
use std::ptr::{self, NonNull};

use bytemuck::Pod;
use lode_core::{ArenaError, Span};

use crate::arena::Arena;
use crate::guard::{RegionLock, RegionRef};
use crate::handle::{Handle, Payload};
use crate::region::PayloadType;
use crate::unchecked::UncheckedBox;
use crate::REGION_ALIGN;

fn check_align<T>() -> Result<(), ArenaError> {
    let align = mem::align_of::<T>();
    if align > REGION_ALIGN {
        return Err(ArenaError::UnsupportedAlignment {
            align,
            max: REGION_ALIGN,
        });
    }
    Ok(())
}

/// Byte length of `len` elements of `P`, saturating so oversized arrays
/// surface as exhaustion.
fn array_bytes<P>(len: usize) -> usize {
    len.checked_mul(mem::size_of::<P>()).unwrap_or(usize::MAX)
}

impl Arena {
    /// Move `value` into a new tracked region.
    ///
    /// Fails with [`ArenaError::UnsupportedAlignment`] if `T` needs more
    /// than [`REGION_ALIGN`] bytes of alignment.
    pub fn new_value<T: Send + 'static>(&self, value: T) -> Result<Handle<T>, ArenaError> {
        check_align::<T>()?;
        let addr = self.allocate_region(mem::size_of::<T>(), PayloadType::of::<T>(), |base| {
            // SAFETY: `base` is aligned to REGION_ALIGN >= align_of::<T>(),
            // spans size_of::<T>() bytes and is unreachable by anyone else.
            unsafe { base.cast::<T>().as_ptr().write(value) }
        })?;
        Ok(Handle::new(addr))
    }

    /// Create a tracked array of `len` zeroed elements.
    ///
    /// Fails with [`ArenaError::ZeroSizedElement`] if `P` is zero-sized.
    pub fn new_array<P: Pod + Send>(&self, len: usize) -> Result<Handle<[P]>, ArenaError> {
        check_align::<P>()?;
        if mem::size_of::<P>() == 0 {
            return Err(ArenaError::ZeroSizedElement {
                type_name: std::any::type_name::<P>(),
            });
        }
        let addr = self.allocate_region(array_bytes::<P>(len), PayloadType::of::<[P]>(), |_| {})?;
        Ok(Handle::new(addr))
    }

    /// Shared access to a typed region. See [`get`](Self::get).
    pub fn get_typed<T: Payload + ?Sized>(
        &self,
        handle: Handle<T>,
    ) -> Result<Option<RegionRef<'_, T>>, ArenaError> {
        match self.claim(handle.addr(), PayloadType::of::<T>())? {
            Some(claim) => RegionRef::new(claim).map(Some),
            None => Ok(None),
        }
    }

    /// Exclusive ownership of a typed region. See [`lock`](Self::lock).
    pub fn lock_typed<T: Payload + ?Sized>(
        &self,
        handle: Handle<T>,
    ) -> Result<Option<RegionLock<'_, T>>, ArenaError> {
        Ok(self
            .claim(handle.addr(), PayloadType::of::<T>())?
            .map(RegionLock::new))
    }

    /// Drop the value in a tracked region and free the region.
    ///
    /// The region must be unowned ([`ArenaError::StillLocked`] otherwise).
    /// While the destructor runs the handle already reads as stale, and
    /// the arena mutex is not held, so the destructor may use the arena.
    /// Stale handles follow the validation policy, as in
    /// [`free`](Self::free).
    pub fn delete<T: Payload + ?Sized>(&self, handle: Handle<T>) -> Result<(), ArenaError> {
        let addr = handle.addr();
        let Some((base, len)) = self.begin_retire(addr, PayloadType::of::<T>())? else {
            return Ok(());
        };

        // Frees the region even if the destructor panics.
        struct Retire<'a> {
            arena: &'a Arena,
            addr: lode_core::VAddr,
        }
        impl Drop for Retire<'_> {
            fn drop(&mut self) {
                self.arena.finish_retire(self.addr);
            }
        }
        let _retire = Retire { arena: self, addr };

        // SAFETY: the region holds an initialised `T`, is owned by this
        // thread and no longer validates, so nothing else can reach it.
        unsafe { ptr::drop_in_place(T::project(base, len).as_ptr()) };
        Ok(())
    }

    /// Move `value` into a new unchecked block.
    pub fn new_unchecked<T>(&self, value: T) -> Result<UncheckedBox<'_, T>, ArenaError> {
        check_align::<T>()?;
        let block = self.allocate_block(mem::size_of::<T>())?;
        let ptr = self.block_ptr(block).cast::<T>();
        // SAFETY: the block is freshly reserved, aligned to REGION_ALIGN and
        // at least size_of::<T>() bytes; after the write it holds a `T`
        // owned by the box alone.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(UncheckedBox::from_raw(self, block, ptr))
        }
    }

    /// Create an unchecked array of `len` zeroed elements.
    pub fn new_array_unchecked<P: Pod>(&self, len: usize) -> Result<UncheckedBox<'_, [P]>, ArenaError> {
        check_align::<P>()?;
        let block: Span = self.allocate_block(array_bytes::<P>(len))?;
        let ptr = NonNull::slice_from_raw_parts(self.block_ptr(block).cast::<P>(), len);
        // SAFETY: the block is zero-filled and large enough for `len`
        // elements; all-zero bytes are a valid `P` because `P: Pod`.
        Ok(unsafe { UncheckedBox::from_raw(self, block, ptr) })
    }
}
