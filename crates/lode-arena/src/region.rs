//! Live-region bookkeeping for tracked allocations.
//!
//! [`RegionTable`] keeps every live tracked region in a `Vec` sorted by
//! start offset. The sorted order serves both free-space search (gaps
//! between neighbours) and handle validation (binary search by offset,
//! then signature comparison). Regions never overlap.

use std::any::TypeId;
use std::thread::ThreadId;

use lode_core::{Span, VAddr};

use crate::raw::HEADER_SIZE;

/// Which thread, if any, currently holds a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Owner {
    Unowned,
    /// Held by `id`; `depth` counts reentrant claims by that thread.
    Thread { id: ThreadId, depth: u32 },
}

/// Payload views handed out by the owning thread's guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BorrowState {
    Free,
    Shared(u32),
    Exclusive,
}

/// Runtime identity of the payload stored in a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PayloadType {
    pub id: TypeId,
    pub name: &'static str,
}

impl PayloadType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// A live tracked allocation.
#[derive(Clone, Debug)]
pub(crate) struct Region {
    /// Header plus padded payload.
    pub span: Span,
    /// Payload length as requested, before padding.
    pub payload_len: u32,
    pub signature: u32,
    pub payload_type: PayloadType,
    pub owner: Owner,
    pub borrow: BorrowState,
    /// Set while `delete` runs the payload destructor. A retiring region
    /// is still reserved but no longer validates.
    pub retiring: bool,
}

impl Region {
    pub fn new(span: Span, payload_len: u32, signature: u32, payload_type: PayloadType) -> Self {
        Self {
            span,
            payload_len,
            signature,
            payload_type,
            owner: Owner::Unowned,
            borrow: BorrowState::Free,
            retiring: false,
        }
    }

    pub fn addr(&self) -> VAddr {
        VAddr::from_raw_parts(self.span.start, self.signature)
    }

    pub fn payload_offset(&self) -> u32 {
        self.span.start + HEADER_SIZE
    }

    pub fn is_unowned(&self) -> bool {
        self.owner == Owner::Unowned
    }
}

/// Sorted, non-overlapping list of live tracked regions.
#[derive(Default)]
pub(crate) struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    fn index_of(&self, addr: VAddr) -> Option<usize> {
        let idx = self
            .regions
            .binary_search_by_key(&addr.offset(), |r| r.span.start)
            .ok()?;
        (self.regions[idx].signature == addr.signature()).then_some(idx)
    }

    /// The region named by `addr`, if its signature still matches.
    pub fn find(&self, addr: VAddr) -> Option<&Region> {
        self.index_of(addr).map(|idx| &self.regions[idx])
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, addr: VAddr) -> Option<&mut Region> {
        self.index_of(addr).map(move |idx| &mut self.regions[idx])
    }

    /// First offset where `size` bytes fit below `limit`.
    ///
    /// Scans every gap in address order, including the one before the
    /// first region and the tail up to `limit`. On failure returns the
    /// largest gap seen.
    pub fn first_fit(&self, size: u32, limit: u32) -> Result<u32, u32> {
        let mut cursor = 0u32;
        let mut largest = 0u32;
        for region in &self.regions {
            let gap = region.span.start - cursor;
            if gap >= size {
                return Ok(cursor);
            }
            largest = largest.max(gap);
            cursor = region.span.end;
        }
        let tail = limit.saturating_sub(cursor);
        if tail >= size {
            return Ok(cursor);
        }
        Err(largest.max(tail))
    }

    /// Insert a region, keeping the table sorted by start offset.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the region overlaps a neighbour.
    pub fn insert(&mut self, region: Region) {
        let idx = self
            .regions
            .partition_point(|r| r.span.start < region.span.start);
        debug_assert!(
            idx == 0 || self.regions[idx - 1].span.end <= region.span.start,
            "region {} overlaps its predecessor",
            region.span
        );
        debug_assert!(
            idx == self.regions.len() || region.span.end <= self.regions[idx].span.start,
            "region {} overlaps its successor",
            region.span
        );
        self.regions.insert(idx, region);
    }

    /// Remove and return the region named by `addr`.
    pub fn remove(&mut self, addr: VAddr) -> Option<Region> {
        let idx = self.index_of(addr)?;
        Some(self.regions.remove(idx))
    }

    /// End of the highest region, or 0 when empty.
    pub fn high_water(&self) -> u32 {
        self.regions.last().map_or(0, |r| r.span.end)
    }

    /// Live region spans in address order.
    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        self.regions.iter().map(|r| r.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: u32, end: u32, signature: u32) -> Region {
        Region::new(
            Span::new(start, end),
            end - start - HEADER_SIZE,
            signature,
            PayloadType::of::<[u8]>(),
        )
    }

    #[test]
    fn empty_table_fits_at_zero() {
        let table = RegionTable::new();
        assert_eq!(table.first_fit(64, 1024), Ok(0));
        assert_eq!(table.high_water(), 0);
    }

    #[test]
    fn first_fit_reuses_interior_gap() {
        let mut table = RegionTable::new();
        table.insert(region(0, 32, 1));
        table.insert(region(96, 128, 2));
        assert_eq!(table.first_fit(64, 1024), Ok(32));
        assert_eq!(table.first_fit(65, 1024), Ok(128));
    }

    #[test]
    fn first_fit_considers_leading_gap() {
        let mut table = RegionTable::new();
        table.insert(region(64, 96, 1));
        assert_eq!(table.first_fit(48, 1024), Ok(0));
    }

    #[test]
    fn first_fit_reports_largest_gap_on_failure() {
        let mut table = RegionTable::new();
        table.insert(region(0, 32, 1));
        table.insert(region(80, 128, 2));
        assert_eq!(table.first_fit(64, 160), Err(48));
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut table = RegionTable::new();
        table.insert(region(64, 96, 1));
        table.insert(region(0, 32, 2));
        table.insert(region(32, 64, 3));
        let starts: Vec<u32> = table.spans().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 32, 64]);
    }

    #[test]
    fn find_requires_matching_signature() {
        let mut table = RegionTable::new();
        table.insert(region(0, 32, 5));
        assert!(table.find(VAddr::from_raw_parts(0, 5)).is_some());
        assert!(table.find(VAddr::from_raw_parts(0, 6)).is_none());
        assert!(table.find(VAddr::from_raw_parts(16, 5)).is_none());
    }

    #[test]
    fn remove_returns_region_and_updates_high_water() {
        let mut table = RegionTable::new();
        table.insert(region(0, 32, 1));
        table.insert(region(32, 80, 2));
        assert_eq!(table.high_water(), 80);
        let removed = table.remove(VAddr::from_raw_parts(32, 2)).unwrap();
        assert_eq!(removed.span, Span::new(32, 80));
        assert_eq!(table.high_water(), 32);
        assert_eq!(table.len(), 1);
        assert!(table.remove(VAddr::from_raw_parts(32, 2)).is_none());
    }

    #[test]
    fn new_region_is_unowned_and_unborrowed() {
        let r = region(16, 48, 3);
        assert!(r.is_unowned());
        assert_eq!(r.borrow, BorrowState::Free);
        assert_eq!(r.payload_offset(), 32);
        assert_eq!(r.addr(), VAddr::from_raw_parts(16, 3));
    }
}
