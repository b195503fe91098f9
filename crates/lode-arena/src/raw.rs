//! Backing buffer and in-buffer region headers.
//!
//! This is the only module that touches arena memory through raw
//! pointers. The buffer is one zeroed heap allocation that never moves;
//! everything above it hands out disjoint spans, so every `unsafe` entry
//! point here states which span the caller must exclusively hold.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use lode_core::{ArenaError, Span};

use crate::REGION_ALIGN;

/// Marker word at the start of every live region header ("LODE").
pub(crate) const HEADER_MAGIC: u32 = 0x4C4F_4445;

/// Bytes reserved in front of every tracked payload.
pub(crate) const HEADER_SIZE: u32 = 16;

/// Decoded region header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RegionHeader {
    pub magic: u32,
    pub signature: u32,
    pub payload_len: u32,
}

impl RegionHeader {
    pub fn live(signature: u32, payload_len: u32) -> Self {
        Self {
            magic: HEADER_MAGIC,
            signature,
            payload_len,
        }
    }

    fn to_words(self) -> [u32; 4] {
        [self.magic, self.signature, self.payload_len, 0]
    }

    fn from_words(words: [u32; 4]) -> Self {
        Self {
            magic: words[0],
            signature: words[1],
            payload_len: words[2],
        }
    }
}

/// One fixed-size, zero-initialised heap allocation.
pub(crate) struct RawBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is plain bytes. Concurrent access is coordinated by
// the arena: header and bookkeeping writes happen under its mutex, and
// payload bytes are only reachable through ownership-checked guards or
// the single owner of an unchecked block.
unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    /// Allocate `len` zeroed bytes aligned to [`REGION_ALIGN`].
    pub fn zeroed(len: usize) -> Result<Self, ArenaError> {
        let layout = Self::layout(len)?;
        // SAFETY: `layout` has non-zero size (checked in `layout`).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(ArenaError::Exhausted {
            requested: len,
            available: 0,
        })?;
        Ok(Self { ptr, len })
    }

    fn layout(len: usize) -> Result<Layout, ArenaError> {
        if len == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "backing buffer must not be empty".into(),
            });
        }
        Layout::from_size_align(len, REGION_ALIGN).map_err(|e| ArenaError::InvalidConfig {
            reason: format!("backing buffer layout: {e}"),
        })
    }

    /// Size of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Pointer to the byte at `offset`. Computing it is always safe;
    /// dereferencing it is governed by the span rules above.
    pub fn ptr_at(&self, offset: u32) -> NonNull<u8> {
        let offset = offset as usize;
        assert!(offset <= self.len, "offset {offset} outside buffer of {} bytes", self.len);
        // SAFETY: `offset <= len`, so the result stays within (or one past)
        // the allocation and cannot be null.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }

    /// Zero every byte of `span`.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to `span`: no live reference
    /// into it may exist and no other thread may touch it concurrently.
    pub unsafe fn zero(&self, span: Span) {
        debug_assert!(span.end as usize <= self.len);
        // SAFETY: in bounds per the assertion; exclusivity per contract.
        unsafe { ptr::write_bytes(self.ptr_at(span.start).as_ptr(), 0, span.len() as usize) };
    }

    /// Write a region header at `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must be [`REGION_ALIGN`]-aligned, `offset + HEADER_SIZE`
    /// must lie in the buffer, and the caller must hold the arena mutex
    /// for a region starting at `offset`.
    pub unsafe fn write_header(&self, offset: u32, header: RegionHeader) {
        debug_assert_eq!(offset as usize % REGION_ALIGN, 0);
        let dst = self.ptr_at(offset).cast::<[u32; 4]>();
        // SAFETY: aligned and in bounds per contract; header bytes belong to
        // no payload, and the mutex serialises header access.
        unsafe { dst.as_ptr().write(header.to_words()) };
    }

    /// Read the region header at `offset`.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_header`](Self::write_header).
    pub unsafe fn read_header(&self, offset: u32) -> RegionHeader {
        debug_assert_eq!(offset as usize % REGION_ALIGN, 0);
        let src = self.ptr_at(offset).cast::<[u32; 4]>();
        // SAFETY: aligned and in bounds per contract.
        RegionHeader::from_words(unsafe { src.as_ptr().read() })
    }

    /// Clear the region header at `offset` so the bytes no longer carry a
    /// signature.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_header`](Self::write_header).
    pub unsafe fn clear_header(&self, offset: u32) {
        let dst = self.ptr_at(offset).cast::<[u32; 4]>();
        // SAFETY: aligned and in bounds per contract.
        unsafe { dst.as_ptr().write([0; 4]) };
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // The layout was valid at construction and `len` never changes.
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: `ptr` came from `alloc_zeroed` with this same layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_starts_zeroed_and_aligned() {
        let buf = RawBuffer::zeroed(256).unwrap();
        assert_eq!(buf.len(), 256);
        assert_eq!(buf.ptr_at(0).as_ptr() as usize % REGION_ALIGN, 0);
        // SAFETY: nothing else references the buffer in this test.
        let header = unsafe { buf.read_header(0) };
        assert_eq!(header, RegionHeader::from_words([0; 4]));
    }

    #[test]
    fn header_round_trip_and_clear() {
        let buf = RawBuffer::zeroed(64).unwrap();
        // SAFETY: single-threaded test with exclusive access.
        unsafe {
            buf.write_header(16, RegionHeader::live(7, 24));
            let read = buf.read_header(16);
            assert_eq!(read.magic, HEADER_MAGIC);
            assert_eq!(read.signature, 7);
            assert_eq!(read.payload_len, 24);
            buf.clear_header(16);
            assert_eq!(buf.read_header(16).magic, 0);
        }
    }

    #[test]
    fn zero_clears_only_the_span() {
        let buf = RawBuffer::zeroed(64).unwrap();
        // SAFETY: single-threaded test with exclusive access.
        unsafe {
            buf.write_header(0, RegionHeader::live(1, 1));
            buf.write_header(16, RegionHeader::live(2, 2));
            buf.zero(Span::new(0, 16));
            assert_eq!(buf.read_header(0).magic, 0);
            assert_eq!(buf.read_header(16).signature, 2);
        }
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(
            RawBuffer::zeroed(0),
            Err(ArenaError::InvalidConfig { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "outside buffer")]
    fn ptr_past_end_panics() {
        let buf = RawBuffer::zeroed(32).unwrap();
        let _ = buf.ptr_at(33);
    }
}
