//! Benchmark profiles for the Lode arena.
//!
//! - [`chunk_arena`]: an empty arena sized for chunk workloads
//! - [`fragmented_arena`]: an arena pre-churned into a realistic mix of
//!   live regions and holes, via a seeded [`ChurnPlan`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use lode_arena::{Arena, ArenaConfig, VAddr, Validation};
use lode_test_utils::ChurnPlan;

/// Default benchmark arena size: 64MB.
pub const BENCH_CAPACITY: usize = 64 * 1024 * 1024;

/// Build an empty arena of `capacity` bytes.
pub fn chunk_arena(capacity: usize, validation: Validation) -> Arena {
    Arena::new(ArenaConfig::new(capacity).with_validation(validation))
        .unwrap_or_else(|e| panic!("benchmark arena: {e}"))
}

/// Build a [`BENCH_CAPACITY`] arena after replaying `steps` seeded
/// allocate/free operations of up to 1KB each.
///
/// Returns the arena and the handles left live.
pub fn fragmented_arena(seed: u64, steps: usize) -> (Arena, Vec<VAddr>) {
    let arena = chunk_arena(BENCH_CAPACITY, Validation::Lenient);
    let live = ChurnPlan::generate(seed, steps, 1024)
        .run(&arena)
        .unwrap_or_else(|e| panic!("churn replay: {e}"));
    (arena, live)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragmented_arena_is_deterministic() {
        let (a, live_a) = fragmented_arena(42, 500);
        let (b, live_b) = fragmented_arena(42, 500);
        assert_eq!(live_a, live_b);
        assert_eq!(a.spans(), b.spans());
        assert!(a.stats().live_regions > 0);
    }

    #[test]
    fn fragmented_arena_has_holes() {
        let (arena, _) = fragmented_arena(7, 2000);
        let spans = arena.spans();
        let holes = spans.windows(2).filter(|w| w[0].end < w[1].start).count();
        assert!(holes > 0);
    }
}
