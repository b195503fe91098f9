//! Payload types for arena tests.
//!
//! - [`Voxel`]: a `Pod` cell, stored in bulk with `new_array`.
//! - [`ChunkMeta`]: a non-`Pod` chunk header with an owned neighbour list.
//! - [`DropCounter`]: counts destructor runs to check exactly-once drops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

/// Cells in one 16×16×16 chunk.
pub const CHUNK_VOLUME: usize = 16 * 16 * 16;

/// One voxel cell. All-zero is air.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Voxel {
    pub block: u16,
    pub light: u8,
    pub flags: u8,
}

impl Voxel {
    pub fn solid(block: u16) -> Self {
        Self {
            block,
            light: 0,
            flags: 0,
        }
    }
}

/// Per-chunk bookkeeping the logic thread keeps next to the voxel data.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkMeta {
    pub origin: [i32; 3],
    pub dirty: bool,
    pub neighbours: Vec<[i32; 3]>,
}

impl ChunkMeta {
    pub fn at(origin: [i32; 3]) -> Self {
        Self {
            origin,
            dirty: false,
            neighbours: Vec::new(),
        }
    }
}

/// Payload whose destructor bumps a shared counter.
#[derive(Debug)]
pub struct DropCounter {
    drops: Arc<AtomicUsize>,
}

impl DropCounter {
    /// Create a payload and the counter it increments.
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            Self {
                drops: drops.clone(),
            },
            drops,
        )
    }

    /// Another payload sharing the same counter.
    pub fn sibling(&self) -> Self {
        Self {
            drops: self.drops.clone(),
        }
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
