//! Scoped ownership of tracked regions.
//!
//! Two layers of protection sit between a thread and a region's payload:
//!
//! - **Ownership** (thread level). A region is unowned or owned by exactly
//!   one thread. `get` and `lock` wait until the region is unowned (or
//!   already owned by the caller, which makes them reentrant) and claim
//!   it. The claim is released when the guard drops.
//! - **Borrowing** (within the owning thread). Reentrant guards on the
//!   same thread would otherwise alias, so each payload view registers a
//!   shared or exclusive borrow, in the manner of `RefCell`.
//!
//! Guards are `!Send`: ownership belongs to the thread that claimed it,
//! so a release can never come from anywhere else.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use lode_core::{ArenaError, VAddr};

use crate::arena::Arena;
use crate::handle::Payload;

/// Marker that keeps guards on the thread that created them.
type NotSend = PhantomData<*const ()>;

/// One level of ownership of a region by the current thread.
pub(crate) struct Claim<'a> {
    arena: &'a Arena,
    addr: VAddr,
    base: NonNull<u8>,
    len: usize,
    _not_send: NotSend,
}

impl<'a> Claim<'a> {
    /// # Safety
    ///
    /// The current thread must have just taken one level of ownership of
    /// `addr` in `arena`, and `base`/`len` must describe its payload.
    pub(crate) unsafe fn new(arena: &'a Arena, addr: VAddr, base: NonNull<u8>, len: usize) -> Self {
        Self {
            arena,
            addr,
            base,
            len,
            _not_send: PhantomData,
        }
    }

    /// Register a payload view and project the payload as `T`.
    fn view<T: Payload + ?Sized>(&self, exclusive: bool) -> Result<(BorrowToken<'a>, NonNull<T>), ArenaError> {
        self.arena.begin_borrow(self.addr, exclusive)?;
        let token = BorrowToken {
            arena: self.arena,
            addr: self.addr,
            exclusive,
            _not_send: PhantomData,
        };
        Ok((token, T::project(self.base, self.len)))
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.arena.release(self.addr);
    }
}

/// Registration of one payload view; unregisters on drop.
struct BorrowToken<'a> {
    arena: &'a Arena,
    addr: VAddr,
    exclusive: bool,
    _not_send: NotSend,
}

impl Drop for BorrowToken<'_> {
    fn drop(&mut self) {
        self.arena.end_borrow(self.addr, self.exclusive);
    }
}

/// Shared view of a payload, borrowed from a [`RegionLock`].
pub struct Ref<'g, T: ?Sized> {
    value: &'g T,
    _token: BorrowToken<'g>,
}

impl<T: ?Sized> Deref for Ref<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Ref<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// Exclusive view of a payload, borrowed from a [`RegionLock`].
pub struct RefMut<'g, T: ?Sized> {
    value: &'g mut T,
    _token: BorrowToken<'g>,
}

impl<T: ?Sized> Deref for RefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: ?Sized> DerefMut for RefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RefMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// Read access to a region, returned by [`Arena::get`] and
/// [`Arena::get_typed`].
///
/// While the guard lives the current thread owns the region, so other
/// threads' `get`/`lock` calls on it wait. Dropping the guard releases
/// ownership and wakes them.
pub struct RegionRef<'a, T: ?Sized = [u8]> {
    // Declared first so the view is unregistered before the claim ends.
    view: Ref<'a, T>,
    claim: Claim<'a>,
}

impl<'a, T: Payload + ?Sized> RegionRef<'a, T> {
    pub(crate) fn new(claim: Claim<'a>) -> Result<Self, ArenaError> {
        let (token, ptr) = claim.view::<T>(false)?;
        // SAFETY: the current thread owns the region and has registered a
        // shared borrow, so no `&mut` to the payload exists or can be
        // created until the token drops. The region cannot be freed while
        // owned, and the payload was initialised at allocation.
        let value = unsafe { ptr.as_ref() };
        Ok(Self {
            view: Ref {
                value,
                _token: token,
            },
            claim,
        })
    }
}

impl<T: ?Sized> RegionRef<'_, T> {
    /// Address of the region.
    pub fn addr(&self) -> VAddr {
        self.claim.addr
    }
}

impl<T: ?Sized> Deref for RegionRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.view
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RegionRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionRef")
            .field("addr", &self.claim.addr)
            .field("value", &&*self.view)
            .finish()
    }
}

/// Exclusive ownership of a region, returned by [`Arena::lock`] and
/// [`Arena::lock_typed`].
///
/// Locking is reentrant: the owning thread may lock or `get` the same
/// region again without blocking, and ownership is released when the
/// last of its guards drops. Payload views come from [`get`](Self::get)
/// and [`get_mut`](Self::get_mut).
///
/// The guard is invariant in `T`, so the payload type checked when the
/// region was claimed is the only one it can be viewed as:
///
/// ```compile_fail
/// use lode_arena::RegionLock;
///
/// fn widen<'a>(lock: RegionLock<'a, fn(&'static u8)>) -> RegionLock<'a, for<'x> fn(&'x u8)> {
///     lock
/// }
/// ```
pub struct RegionLock<'a, T: ?Sized = [u8]> {
    claim: Claim<'a>,
    _ty: PhantomData<fn(&T) -> &T>,
}

impl<'a, T: Payload + ?Sized> RegionLock<'a, T> {
    pub(crate) fn new(claim: Claim<'a>) -> Self {
        Self {
            claim,
            _ty: PhantomData,
        }
    }

    /// Shared view of the payload.
    ///
    /// Fails with [`ArenaError::BorrowConflict`] if this thread holds an
    /// exclusive view of the same region through another guard.
    pub fn get(&self) -> Result<Ref<'_, T>, ArenaError> {
        let (token, ptr) = self.claim.view::<T>(false)?;
        // SAFETY: see `RegionRef::new`; the shared borrow is registered.
        let value = unsafe { ptr.as_ref() };
        Ok(Ref {
            value,
            _token: token,
        })
    }

    /// Exclusive view of the payload.
    ///
    /// Fails with [`ArenaError::BorrowConflict`] if any other view of the
    /// region is live on this thread.
    pub fn get_mut(&mut self) -> Result<RefMut<'_, T>, ArenaError> {
        let (token, mut ptr) = self.claim.view::<T>(true)?;
        // SAFETY: the current thread owns the region and holds the only
        // registered borrow, which is exclusive; no other reference to the
        // payload exists until the token drops.
        let value = unsafe { ptr.as_mut() };
        Ok(RefMut {
            value,
            _token: token,
        })
    }
}

impl RegionLock<'_, [u8]> {
    /// Shared view of a raw region's bytes.
    pub fn bytes(&self) -> Result<Ref<'_, [u8]>, ArenaError> {
        self.get()
    }

    /// Exclusive view of a raw region's bytes.
    pub fn bytes_mut(&mut self) -> Result<RefMut<'_, [u8]>, ArenaError> {
        self.get_mut()
    }
}

impl<T: ?Sized> RegionLock<'_, T> {
    /// Address of the region.
    pub fn addr(&self) -> VAddr {
        self.claim.addr
    }

    /// Release this level of ownership. Equivalent to dropping the guard.
    pub fn unlock(self) {}
}

impl<T: ?Sized> fmt::Debug for RegionLock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionLock")
            .field("addr", &self.claim.addr)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}
