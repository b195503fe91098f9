//! Arena handles and byte spans.

use std::fmt;

/// Opaque handle to a tracked arena region.
///
/// A `VAddr` pairs the region's start offset with the signature that was
/// stamped into the region when it was allocated. Offsets are stable for
/// the arena's lifetime, and offset 0 is an ordinary address: the first
/// allocation in an empty arena lands there. Code that needs to express
/// "no allocation" must use `Option<VAddr>`, never a zero offset.
///
/// Signatures are drawn from a per-arena monotonic counter, so a handle
/// to a freed region does not validate against a later region that reuses
/// the same offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VAddr {
    offset: u32,
    signature: u32,
}

impl VAddr {
    /// Build a handle from its raw parts.
    ///
    /// Only the arena mints handles that validate; a hand-built handle is
    /// treated like any other stale address.
    pub const fn from_raw_parts(offset: u32, signature: u32) -> Self {
        Self { offset, signature }
    }

    /// Byte offset of the region start (its header) within the arena.
    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// Allocation signature this handle expects to find at `offset`.
    pub const fn signature(self) -> u32 {
        self.signature
    }
}

impl fmt::Display for VAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}#{}", self.offset, self.signature)
    }
}

/// Half-open byte range `[start, end)` inside the arena buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    /// First byte of the range.
    pub start: u32,
    /// One past the last byte of the range.
    pub end: u32,
}

impl Span {
    /// Create a span. `end` must not precede `start`.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span end {end} precedes start {start}");
        Self { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span covers zero bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two spans share at least one byte.
    pub fn overlaps(&self, other: &Span) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_offset_is_a_regular_address() {
        let addr = VAddr::from_raw_parts(0, 1);
        assert_eq!(addr.offset(), 0);
        assert_eq!(addr.signature(), 1);
        let maybe: Option<VAddr> = Some(addr);
        assert!(maybe.is_some());
    }

    #[test]
    fn same_offset_different_signature_are_distinct() {
        let a = VAddr::from_raw_parts(64, 3);
        let b = VAddr::from_raw_parts(64, 4);
        assert_ne!(a, b);
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(0, 32);
        let b = Span::new(32, 64);
        let c = Span::new(16, 48);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert_eq!(a.len(), 32);
        assert!(Span::new(8, 8).is_empty());
    }

    #[test]
    fn display_shows_offset_and_signature() {
        let addr = VAddr::from_raw_parts(0x40, 7);
        assert_eq!(addr.to_string(), "0x00000040#7");
        assert_eq!(Span::new(1, 5).to_string(), "[1, 5)");
    }

    proptest! {
        #[test]
        fn overlap_matches_shared_bytes(
            a in 0u32..64, alen in 0u32..32,
            b in 0u32..64, blen in 0u32..32,
        ) {
            let x = Span::new(a, a + alen);
            let y = Span::new(b, b + blen);
            let shared = (x.start..x.end).any(|byte| (y.start..y.end).contains(&byte));
            prop_assert_eq!(x.overlaps(&y), shared);
            prop_assert_eq!(x.overlaps(&y), y.overlaps(&x));
        }
    }
}
