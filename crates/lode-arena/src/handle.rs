//! Typed handles and the payload types tracked regions can hold.
//!
//! A [`Handle<T>`] is a [`VAddr`] that remembers what was constructed in
//! the region. Handles are `Copy` like the raw address: copying one does
//! not duplicate the value, and every copy goes stale together when the
//! region is deleted.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ptr::NonNull;

use bytemuck::Pod;
use lode_core::VAddr;

mod sealed {
    pub trait Sealed {}

    impl<T: Send + 'static> Sealed for T {}
    impl<P: bytemuck::Pod + Send> Sealed for [P] {}
}

/// Types that can live in a tracked region.
///
/// Implemented for every sized `Send + 'static` type (constructed with
/// [`Arena::new_value`](crate::Arena::new_value)) and for slices of
/// [`Pod`] elements (zero-initialised by
/// [`Arena::new_array`](crate::Arena::new_array)). Raw byte regions from
/// [`Arena::allocate`](crate::Arena::allocate) are `[u8]`.
///
/// `Send` is required because a region's ownership migrates between
/// threads; the arena never hands out views on two threads at once, so
/// `Sync` is not.
pub trait Payload: sealed::Sealed + 'static {
    /// Pointer to the payload given its first byte and length in bytes.
    #[doc(hidden)]
    fn project(base: NonNull<u8>, len: usize) -> NonNull<Self>;
}

impl<T: Send + 'static> Payload for T {
    fn project(base: NonNull<u8>, _len: usize) -> NonNull<Self> {
        base.cast()
    }
}

impl<P: Pod + Send> Payload for [P] {
    fn project(base: NonNull<u8>, len: usize) -> NonNull<Self> {
        // `new_array` rejects zero-sized elements, so this only guards the division.
        let count = len.checked_div(std::mem::size_of::<P>()).unwrap_or(0);
        NonNull::slice_from_raw_parts(base.cast::<P>(), count)
    }
}

/// Typed handle to a tracked region holding a `T`.
///
/// Handles are invariant in `T`: a handle cannot be coerced to a handle
/// of a subtype or supertype, since the region stores one exact type.
///
/// ```compile_fail
/// use lode_arena::Handle;
///
/// fn widen(handle: Handle<fn(&'static u8)>) -> Handle<for<'x> fn(&'x u8)> {
///     handle
/// }
/// ```
#[must_use]
pub struct Handle<T: ?Sized> {
    addr: VAddr,
    _ty: PhantomData<fn(&T) -> &T>,
}

impl<T: ?Sized> Handle<T> {
    pub(crate) fn new(addr: VAddr) -> Self {
        Self {
            addr,
            _ty: PhantomData,
        }
    }

    /// The untyped address of the region.
    pub fn addr(&self) -> VAddr {
        self.addr
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Handle<T> {}

impl<T: ?Sized> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", std::any::type_name::<T>(), self.addr)
    }
}

impl<T: ?Sized> From<Handle<T>> for VAddr {
    fn from(handle: Handle<T>) -> Self {
        handle.addr
    }
}
