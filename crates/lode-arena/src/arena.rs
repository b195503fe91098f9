//! The arena: one fixed buffer, two allocation families, one lock.
//!
//! All bookkeeping (the region table, the unchecked pool, byte counters
//! and the signature counter) lives in [`ArenaState`] behind a single
//! `parking_lot` mutex. Threads waiting for a region to become unowned
//! park on one condition variable, which is notified whenever ownership
//! of any region drops to zero.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use lode_core::{ArenaError, Span, VAddr};
use parking_lot::{Condvar, Mutex};

use crate::config::{ArenaConfig, Validation};
use crate::guard::{Claim, RegionLock, RegionRef};
use crate::raw::{RawBuffer, RegionHeader, HEADER_MAGIC, HEADER_SIZE};
use crate::region::{BorrowState, Owner, PayloadType, Region, RegionTable};
use crate::stats::ArenaStats;
use crate::unchecked::{UncheckedBox, UncheckedPool};
use crate::REGION_ALIGN;

/// Shared handle for passing one arena between threads.
pub type SharedArena = Arc<Arena>;

/// Round `len` up to [`REGION_ALIGN`], or `None` if it leaves the offset
/// space.
fn padded(len: usize) -> Option<u32> {
    let rounded = len.checked_add(REGION_ALIGN - 1)? & !(REGION_ALIGN - 1);
    u32::try_from(rounded).ok()
}

/// Header plus padded payload.
fn region_size(len: usize) -> Option<u32> {
    padded(len)?.checked_add(HEADER_SIZE)
}

struct ArenaState {
    regions: RegionTable,
    unchecked: UncheckedPool,
    /// Header and padded payload bytes of live tracked regions.
    used: usize,
    next_signature: u32,
}

impl ArenaState {
    fn next_signature(&mut self) -> u32 {
        let signature = self.next_signature;
        // Zero never appears in a live header.
        self.next_signature = self.next_signature.wrapping_add(1).max(1);
        signature
    }

    /// Largest gap a tracked region could currently occupy.
    fn tracked_gap(&self) -> u32 {
        self.regions
            .first_fit(u32::MAX, self.unchecked.floor())
            .err()
            .unwrap_or_default()
    }

    /// A region that still validates: present, signature intact and not
    /// in the middle of `delete`.
    fn live_mut(&mut self, addr: VAddr) -> Option<&mut Region> {
        self.regions.find_mut(addr).filter(|r| !r.retiring)
    }
}

/// A fixed-size memory arena shared between threads.
///
/// Tracked allocations ([`allocate`](Self::allocate),
/// [`new_value`](Self::new_value)) carry a header and an owner slot and
/// are reached through [`VAddr`] handles that go stale when the region is
/// freed. Access goes through [`get`](Self::get) and
/// [`lock`](Self::lock), which wait while another thread owns the region.
///
/// Unchecked allocations ([`allocate_unchecked`](Self::allocate_unchecked),
/// [`new_unchecked`](Self::new_unchecked)) are single-owner boxes with no
/// header and no locking.
///
/// The buffer is allocated once, zero-filled, and never moves.
pub struct Arena {
    buffer: RawBuffer,
    state: Mutex<ArenaState>,
    released: Condvar,
    config: ArenaConfig,
}

// Compile-time assertion: the arena is shared across threads by `Arc`.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Arena>();
};

impl Arena {
    /// Allocate the backing buffer described by `config`.
    ///
    /// Returns [`ArenaError::InvalidConfig`] if the capacity is unusable.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let buffer = RawBuffer::zeroed(config.capacity)?;
        let top = u32::try_from(config.capacity & !(REGION_ALIGN - 1)).map_err(|_| {
            ArenaError::InvalidConfig {
                reason: format!("capacity {} exceeds the u32 offset space", config.capacity),
            }
        })?;
        log::debug!(
            "arena created: {} bytes, {:?} validation",
            config.capacity,
            config.validation
        );
        Ok(Self {
            buffer,
            state: Mutex::new(ArenaState {
                regions: RegionTable::new(),
                unchecked: UncheckedPool::new(top),
                used: 0,
                next_signature: 1,
            }),
            released: Condvar::new(),
            config,
        })
    }

    /// Allocate an arena of `capacity` bytes with default settings.
    pub fn with_capacity(capacity: usize) -> Result<Self, ArenaError> {
        Self::new(ArenaConfig::new(capacity))
    }

    /// Wrap this arena in an `Arc` for sharing.
    pub fn into_shared(self) -> SharedArena {
        Arc::new(self)
    }

    /// The configuration this arena was built with.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Size of the backing buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Header and payload bytes held by live tracked regions.
    pub fn used(&self) -> usize {
        self.state.lock().used
    }

    /// Snapshot of the arena's byte accounting.
    pub fn stats(&self) -> ArenaStats {
        let state = self.state.lock();
        let unchecked_used = state.unchecked.live_bytes();
        ArenaStats {
            capacity: self.capacity(),
            used: state.used,
            unchecked_used,
            live_regions: state.regions.len(),
            unchecked_blocks: state.unchecked.live_blocks(),
            free_bytes: self.capacity() - state.used - unchecked_used,
        }
    }

    /// Spans of all live tracked regions, in address order.
    pub fn spans(&self) -> Vec<Span> {
        self.state.lock().regions.spans().collect()
    }

    /// Whether `addr` still names a live tracked region.
    pub fn is_live(&self, addr: VAddr) -> bool {
        self.state.lock().live_mut(addr).is_some()
    }

    /// The thread currently owning `addr`, if any.
    pub fn owner_of(&self, addr: VAddr) -> Option<ThreadId> {
        match self.state.lock().regions.find(addr)?.owner {
            Owner::Thread { id, .. } => Some(id),
            Owner::Unowned => None,
        }
    }

    /// Tear the arena down and return its final accounting.
    ///
    /// Tracked regions still live are reported at `warn` level. Their
    /// payload destructors do not run.
    pub fn destroy(self) -> ArenaStats {
        let stats = self.stats();
        if stats.live_regions > 0 {
            log::warn!(
                "arena destroyed with {} live regions ({} bytes)",
                stats.live_regions,
                stats.used
            );
        }
        if stats.unchecked_blocks > 0 {
            log::debug!(
                "arena destroyed with {} leaked unchecked blocks ({} bytes)",
                stats.unchecked_blocks,
                stats.unchecked_used
            );
        }
        stats
    }

    // ── Tracked allocation ──────────────────────────────────────────

    /// Reserve a zero-filled tracked region with `len` payload bytes.
    ///
    /// The region is placed in the first gap that fits, starting from
    /// offset 0. Fails with [`ArenaError::Exhausted`] when no gap is large
    /// enough for the header plus the padded payload.
    pub fn allocate(&self, len: usize) -> Result<VAddr, ArenaError> {
        self.allocate_region(len, PayloadType::of::<[u8]>(), |_| {})
    }

    /// Reserve a tracked region and run `init` on its zeroed payload
    /// before the handle exists anywhere else.
    ///
    /// `init` receives a pointer to `len` bytes aligned to
    /// [`REGION_ALIGN`] that no other reference can reach.
    pub(crate) fn allocate_region(
        &self,
        len: usize,
        payload_type: PayloadType,
        init: impl FnOnce(NonNull<u8>),
    ) -> Result<VAddr, ArenaError> {
        let mut state = self.state.lock();
        let Some(size) = region_size(len) else {
            return Err(ArenaError::Exhausted {
                requested: len.saturating_add(HEADER_SIZE as usize),
                available: state.tracked_gap() as usize,
            });
        };
        let start = match state.regions.first_fit(size, state.unchecked.floor()) {
            Ok(start) => start,
            Err(largest) => {
                let err = ArenaError::Exhausted {
                    requested: size as usize,
                    available: largest as usize,
                };
                log::warn!("tracked allocation of {len} bytes failed: {err}");
                return Err(err);
            }
        };

        let signature = state.next_signature();
        let span = Span::new(start, start + size);
        // `size` fit in a u32 after padding, so the unpadded length does too.
        let payload_len = len as u32;
        // SAFETY: `span` is a gap in the region table below the unchecked
        // floor, so no guard or box refers to it, and the mutex is held.
        unsafe {
            self.buffer.zero(span);
            self.buffer
                .write_header(start, RegionHeader::live(signature, payload_len));
        }
        init(self.buffer.ptr_at(start + HEADER_SIZE));
        state
            .regions
            .insert(Region::new(span, payload_len, signature, payload_type));
        state.used += size as usize;

        let addr = VAddr::from_raw_parts(start, signature);
        log::trace!("allocated {len} bytes at {addr}");
        Ok(addr)
    }

    /// Release a tracked region.
    ///
    /// The region must be unowned; freeing a locked region fails with
    /// [`ArenaError::StillLocked`]. Freeing a stale handle is an error
    /// under strict validation and a no-op under lenient validation.
    ///
    /// Regions created by [`new_value`](Self::new_value) can be freed
    /// here, but their destructor does not run; use
    /// [`delete`](Self::delete) for that.
    pub fn free(&self, addr: VAddr) -> Result<(), ArenaError> {
        let mut state = self.state.lock();
        let Some(region) = state.live_mut(addr) else {
            drop(state);
            return self.tolerate::<()>(ArenaError::UnknownHandle { addr }).map(drop);
        };
        if !region.is_unowned() {
            return Err(ArenaError::StillLocked { addr });
        }
        self.remove_region(&mut state, addr);
        Ok(())
    }

    fn remove_region(&self, state: &mut ArenaState, addr: VAddr) {
        if let Some(region) = state.regions.remove(addr) {
            // SAFETY: the region was unowned or retiring by this thread, so
            // no guard references it, and the mutex is held.
            unsafe { self.buffer.clear_header(region.span.start) };
            state.used -= region.span.len() as usize;
            log::trace!("freed region {addr} ({} bytes)", region.span.len());
        }
    }

    // ── Ownership ───────────────────────────────────────────────────

    /// Shared access to a region's bytes, waiting while another thread
    /// owns it.
    ///
    /// Under lenient validation a stale handle yields `Ok(None)`; under
    /// strict validation it is [`ArenaError::UnknownHandle`].
    pub fn get(&self, addr: VAddr) -> Result<Option<RegionRef<'_>>, ArenaError> {
        match self.claim(addr, PayloadType::of::<[u8]>())? {
            Some(claim) => RegionRef::new(claim).map(Some),
            None => Ok(None),
        }
    }

    /// Take exclusive, reentrant ownership of a region.
    ///
    /// Returns immediately if the calling thread already owns the region.
    /// Otherwise waits until the region is unowned. Stale handles behave
    /// as in [`get`](Self::get).
    pub fn lock(&self, addr: VAddr) -> Result<Option<RegionLock<'_>>, ArenaError> {
        Ok(self
            .claim(addr, PayloadType::of::<[u8]>())?
            .map(RegionLock::new))
    }

    /// Release a lock. Equivalent to dropping it.
    pub fn unlock<T: ?Sized>(&self, lock: RegionLock<'_, T>) {
        lock.unlock();
    }

    /// Take one level of ownership of `addr` for the current thread,
    /// waiting while another thread holds it.
    pub(crate) fn claim(
        &self,
        addr: VAddr,
        payload_type: PayloadType,
    ) -> Result<Option<Claim<'_>>, ArenaError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let (offset, len) = loop {
            let Some(region) = state.live_mut(addr) else {
                drop(state);
                return self.tolerate(ArenaError::UnknownHandle { addr });
            };
            if region.payload_type.id != payload_type.id {
                return Err(ArenaError::TypeMismatch {
                    addr,
                    stored: region.payload_type.name,
                    requested: payload_type.name,
                });
            }
            if self.config.validation == Validation::Strict {
                self.check_header(region)?;
            }
            match region.owner {
                Owner::Unowned => {
                    region.owner = Owner::Thread { id: me, depth: 1 };
                    break (region.payload_offset(), region.payload_len);
                }
                Owner::Thread { id, depth } if id == me => {
                    region.owner = Owner::Thread { id, depth: depth + 1 };
                    break (region.payload_offset(), region.payload_len);
                }
                Owner::Thread { .. } => {
                    log::trace!("waiting for region {addr}");
                    self.released.wait(&mut state);
                }
            }
        };
        drop(state);
        log::trace!("claimed region {addr}");
        // SAFETY: the current thread just took one level of ownership of
        // `addr`, and `offset`/`len` describe its payload.
        Ok(Some(unsafe {
            Claim::new(self, addr, self.buffer.ptr_at(offset), len as usize)
        }))
    }

    /// Give back one level of ownership taken by [`claim`](Self::claim).
    pub(crate) fn release(&self, addr: VAddr) {
        let mut state = self.state.lock();
        let Some(region) = state.regions.find_mut(addr) else {
            log::error!("release of unknown region {addr}");
            return;
        };
        match region.owner {
            Owner::Thread { id, depth } if depth > 1 => {
                region.owner = Owner::Thread { id, depth: depth - 1 };
            }
            Owner::Thread { .. } => {
                if region.borrow != BorrowState::Free {
                    // A view was leaked with `mem::forget`; it is unreachable
                    // once the last guard is gone.
                    log::warn!("region {addr} released with a leaked {:?} view", region.borrow);
                }
                region.owner = Owner::Unowned;
                region.borrow = BorrowState::Free;
                drop(state);
                log::trace!("released region {addr}");
                self.released.notify_all();
            }
            Owner::Unowned => log::error!("release of unowned region {addr}"),
        }
    }

    /// Register a payload view on a region the current thread owns.
    pub(crate) fn begin_borrow(&self, addr: VAddr, exclusive: bool) -> Result<(), ArenaError> {
        let mut state = self.state.lock();
        let region = state
            .regions
            .find_mut(addr)
            .ok_or(ArenaError::UnknownHandle { addr })?;
        region.borrow = match (region.borrow, exclusive) {
            (BorrowState::Free, false) => BorrowState::Shared(1),
            (BorrowState::Free, true) => BorrowState::Exclusive,
            (BorrowState::Shared(n), false) => BorrowState::Shared(n + 1),
            _ => return Err(ArenaError::BorrowConflict { addr }),
        };
        Ok(())
    }

    /// Unregister a view registered by [`begin_borrow`](Self::begin_borrow).
    pub(crate) fn end_borrow(&self, addr: VAddr, exclusive: bool) {
        let mut state = self.state.lock();
        if let Some(region) = state.regions.find_mut(addr) {
            region.borrow = match region.borrow {
                BorrowState::Shared(n) if n > 1 && !exclusive => BorrowState::Shared(n - 1),
                _ => BorrowState::Free,
            };
        }
    }

    fn check_header(&self, region: &Region) -> Result<(), ArenaError> {
        // SAFETY: the region is live and the mutex is held.
        let header = unsafe { self.buffer.read_header(region.span.start) };
        if header.magic != HEADER_MAGIC
            || header.signature != region.signature
            || header.payload_len != region.payload_len
        {
            log::warn!("corrupted header at {}: {header:?}", region.addr());
            return Err(ArenaError::CorruptHeader {
                addr: region.addr(),
            });
        }
        Ok(())
    }

    /// Apply the validation policy to a stale-handle error.
    fn tolerate<T>(&self, err: ArenaError) -> Result<Option<T>, ArenaError> {
        match self.config.validation {
            Validation::Strict => Err(err),
            Validation::Lenient => {
                log::debug!("ignoring {err}");
                Ok(None)
            }
        }
    }

    // ── Retirement (typed delete) ───────────────────────────────────

    /// Mark a region as retiring so its destructor can run outside the
    /// mutex. Returns the payload pointer and length.
    ///
    /// The region must be unowned; it becomes owned by the current thread
    /// and stops validating until [`finish_retire`](Self::finish_retire).
    pub(crate) fn begin_retire(
        &self,
        addr: VAddr,
        payload_type: PayloadType,
    ) -> Result<Option<(NonNull<u8>, usize)>, ArenaError> {
        let mut state = self.state.lock();
        let Some(region) = state.live_mut(addr) else {
            drop(state);
            return self.tolerate(ArenaError::UnknownHandle { addr });
        };
        if region.payload_type.id != payload_type.id {
            return Err(ArenaError::TypeMismatch {
                addr,
                stored: region.payload_type.name,
                requested: payload_type.name,
            });
        }
        if !region.is_unowned() {
            return Err(ArenaError::StillLocked { addr });
        }
        region.owner = Owner::Thread {
            id: thread::current().id(),
            depth: 1,
        };
        region.retiring = true;
        let payload = (
            self.buffer.ptr_at(region.payload_offset()),
            region.payload_len as usize,
        );
        Ok(Some(payload))
    }

    /// Remove a region marked by [`begin_retire`](Self::begin_retire).
    pub(crate) fn finish_retire(&self, addr: VAddr) {
        let mut state = self.state.lock();
        self.remove_region(&mut state, addr);
    }

    // ── Unchecked allocation ────────────────────────────────────────

    /// Reserve a zero-filled unchecked block of `len` bytes.
    ///
    /// The block has no header and no owner slot; the returned box is its
    /// only owner. Fails with [`ArenaError::Exhausted`] when the pool
    /// cannot grow down past the tracked regions.
    pub fn allocate_unchecked(&self, len: usize) -> Result<UncheckedBox<'_, [u8]>, ArenaError> {
        let block = self.allocate_block(len)?;
        let ptr = NonNull::slice_from_raw_parts(self.block_ptr(block), len);
        // SAFETY: the block is freshly reserved for this box, zero-filled,
        // and at least `len` bytes long; zeroed bytes are valid `u8`s.
        Ok(unsafe { UncheckedBox::from_raw(self, block, ptr) })
    }

    /// Return an unchecked block. Equivalent to dropping the box.
    pub fn free_unchecked(&self, block: UncheckedBox<'_, [u8]>) {
        debug_assert!(block.belongs_to(self), "block from another arena");
        drop(block);
    }

    /// Drop an unchecked value and return its block. Equivalent to
    /// dropping the box.
    pub fn delete_unchecked<T: ?Sized>(&self, value: UncheckedBox<'_, T>) {
        debug_assert!(value.belongs_to(self), "box from another arena");
        drop(value);
    }

    /// Reserve and zero an unchecked block for at least `len` bytes.
    pub(crate) fn allocate_block(&self, len: usize) -> Result<Span, ArenaError> {
        let mut state = self.state.lock();
        let Some(size) = padded(len).map(|s| s.max(REGION_ALIGN as u32)) else {
            return Err(ArenaError::Exhausted {
                requested: len,
                available: 0,
            });
        };
        let ceiling = state.regions.high_water();
        let block = state.unchecked.alloc(size, ceiling).map_err(|largest| {
            let err = ArenaError::Exhausted {
                requested: size as usize,
                available: largest as usize,
            };
            log::warn!("unchecked allocation of {len} bytes failed: {err}");
            err
        })?;
        drop(state);
        // SAFETY: the block was just reserved for the caller alone.
        unsafe { self.buffer.zero(block) };
        log::trace!("allocated unchecked block {block}");
        Ok(block)
    }

    /// First byte of an unchecked block.
    pub(crate) fn block_ptr(&self, block: Span) -> NonNull<u8> {
        self.buffer.ptr_at(block.start)
    }

    /// Return a block to the unchecked pool. Called by `UncheckedBox`.
    pub(crate) fn release_unchecked(&self, block: Span) {
        self.state.lock().unchecked.release(block);
        log::trace!("released unchecked block {block}");
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
