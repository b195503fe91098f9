//! Seeded allocate/free workloads.
//!
//! A [`ChurnPlan`] is a reproducible sequence of tracked allocations and
//! frees, drawn from a ChaCha8 RNG so the same seed always yields the
//! same fragmentation pattern.

use lode_arena::{Arena, ArenaError, VAddr};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// One step of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChurnOp {
    /// Allocate a tracked region with this many payload bytes.
    Allocate(usize),
    /// Free the live region at this index (modulo the live count).
    Free(usize),
}

/// A reproducible workload.
#[derive(Clone, Debug)]
pub struct ChurnPlan {
    pub ops: Vec<ChurnOp>,
}

impl ChurnPlan {
    /// Generate `steps` operations with payloads of `1..=max_len` bytes.
    ///
    /// Roughly one step in three is a free.
    pub fn generate(seed: u64, steps: usize, max_len: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ops = (0..steps)
            .map(|_| {
                if rng.gen_ratio(1, 3) {
                    ChurnOp::Free(rng.gen())
                } else {
                    ChurnOp::Allocate(rng.gen_range(1..=max_len.max(1)))
                }
            })
            .collect();
        Self { ops }
    }

    /// Apply the plan to `arena` and return the handles still live.
    ///
    /// Exhaustion is skipped so a plan can be replayed on any capacity;
    /// every other error is returned.
    pub fn run(&self, arena: &Arena) -> Result<Vec<VAddr>, ArenaError> {
        let mut live = Vec::new();
        for op in &self.ops {
            match *op {
                ChurnOp::Allocate(len) => match arena.allocate(len) {
                    Ok(addr) => live.push(addr),
                    Err(ArenaError::Exhausted { .. }) => {}
                    Err(e) => return Err(e),
                },
                ChurnOp::Free(pick) if !live.is_empty() => {
                    let addr = live.swap_remove(pick % live.len());
                    arena.free(addr)?;
                }
                ChurnOp::Free(_) => {}
            }
        }
        Ok(live)
    }
}
