//! Byte accounting snapshots.

use std::fmt;

/// Point-in-time accounting of an [`Arena`](crate::Arena).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Size of the backing buffer.
    pub capacity: usize,
    /// Header and padded payload bytes of live tracked regions.
    pub used: usize,
    /// Padded bytes of live unchecked blocks.
    pub unchecked_used: usize,
    /// Number of live tracked regions.
    pub live_regions: usize,
    /// Number of live unchecked blocks.
    pub unchecked_blocks: usize,
    /// Bytes held by neither family. Not necessarily contiguous.
    pub free_bytes: usize,
}

impl ArenaStats {
    /// Fraction of the buffer in use by either family, in `0.0..=1.0`.
    pub fn occupancy(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.used + self.unchecked_used) as f64 / self.capacity as f64
    }
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} regions / {} bytes tracked, {} blocks / {} bytes unchecked, {} of {} bytes free",
            self.live_regions,
            self.used,
            self.unchecked_blocks,
            self.unchecked_used,
            self.free_bytes,
            self.capacity
        )
    }
}
