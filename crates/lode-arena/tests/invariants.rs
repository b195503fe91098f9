//! Property tests for allocator bookkeeping under arbitrary workloads.

use lode_arena::{Span, UncheckedBox};
use lode_test_utils::{strict_arena, ChurnOp, ChurnPlan};
use proptest::prelude::*;

const CAPACITY: usize = 16 * 1024;

fn arb_op() -> impl Strategy<Value = ChurnOp> {
    prop_oneof![
        2 => (0usize..600).prop_map(ChurnOp::Allocate),
        1 => any::<usize>().prop_map(ChurnOp::Free),
    ]
}

fn assert_sorted_disjoint(spans: &[Span]) -> Result<(), TestCaseError> {
    for pair in spans.windows(2) {
        prop_assert!(
            pair[0].end <= pair[1].start,
            "regions {} and {} out of order or overlapping",
            pair[0],
            pair[1]
        );
    }
    Ok(())
}

proptest! {
    #[test]
    fn regions_stay_sorted_and_disjoint(ops in prop::collection::vec(arb_op(), 1..200)) {
        let arena = strict_arena(CAPACITY);
        let live = ChurnPlan { ops }.run(&arena).unwrap();
        let spans = arena.spans();
        assert_sorted_disjoint(&spans)?;
        prop_assert_eq!(spans.len(), live.len());
        prop_assert!(spans.last().map_or(0, |s| s.end as usize) <= CAPACITY);
        let used: usize = spans.iter().map(|s| s.len() as usize).sum();
        prop_assert_eq!(arena.used(), used);
        for addr in live {
            prop_assert!(arena.is_live(addr));
        }
    }

    #[test]
    fn freeing_everything_restores_used(ops in prop::collection::vec(arb_op(), 1..200)) {
        let arena = strict_arena(CAPACITY);
        let live = ChurnPlan { ops }.run(&arena).unwrap();
        for addr in live {
            arena.free(addr).unwrap();
        }
        prop_assert_eq!(arena.used(), 0);
        prop_assert!(arena.spans().is_empty());
    }

    #[test]
    fn allocate_then_free_is_neutral(
        seed in any::<u64>(),
        len in 0usize..2048,
    ) {
        let arena = strict_arena(CAPACITY);
        let _live = ChurnPlan::generate(seed, 64, 256).run(&arena).unwrap();
        let before = arena.used();
        let spans_before = arena.spans();
        if let Ok(addr) = arena.allocate(len) {
            prop_assert!(arena.used() > before);
            arena.free(addr).unwrap();
        }
        prop_assert_eq!(arena.used(), before);
        prop_assert_eq!(arena.spans(), spans_before);
    }

    #[test]
    fn unchecked_blocks_avoid_tracked_regions(
        tracked in prop::collection::vec(1usize..400, 1..20),
        unchecked in prop::collection::vec(1usize..400, 1..20),
    ) {
        let arena = strict_arena(CAPACITY);
        let mut boxes: Vec<UncheckedBox<'_, [u8]>> = Vec::new();
        for (&t, &u) in tracked.iter().zip(&unchecked) {
            let _ = arena.allocate(t);
            if let Ok(block) = arena.allocate_unchecked(u) {
                boxes.push(block);
            }
        }
        let spans = arena.spans();
        for block in &boxes {
            prop_assert!(block.block().end as usize <= CAPACITY);
            for span in &spans {
                prop_assert!(!block.block().overlaps(span));
            }
        }
        let stats = arena.stats();
        prop_assert_eq!(stats.used + stats.unchecked_used + stats.free_bytes, CAPACITY);
    }
}
