//! Integration tests: typed lifecycles, validation policies and the
//! split between tracked and unchecked allocations.

use std::sync::atomic::Ordering;

use lode_arena::{ArenaConfig, ArenaError, Validation};
use lode_test_utils::{lenient_arena, strict_arena, ChunkMeta, DropCounter, Voxel, CHUNK_VOLUME};

#[test]
fn new_value_equals_directly_built_value() {
    let arena = strict_arena(64 * 1024);
    let mut expected = ChunkMeta::at([16, 0, -32]);
    expected.neighbours = vec![[0, 0, -32], [32, 0, -32]];

    let handle = arena.new_value(expected.clone()).unwrap();
    assert_eq!(*arena.get_typed(handle).unwrap().unwrap(), expected);
}

#[test]
fn deleted_handle_reads_as_invalid() {
    let arena = strict_arena(64 * 1024);
    let handle = arena.new_value(ChunkMeta::at([0, 0, 0])).unwrap();
    arena.delete(handle).unwrap();

    assert!(!arena.is_live(handle.addr()));
    assert_eq!(
        arena.get_typed(handle).unwrap_err(),
        ArenaError::UnknownHandle {
            addr: handle.addr()
        }
    );
}

#[test]
fn stale_handle_stays_stale_after_reuse() {
    let arena = strict_arena(4096);
    let old = arena.allocate(32).unwrap();
    arena.free(old).unwrap();
    let new = arena.allocate(32).unwrap();

    assert_eq!(old.offset(), new.offset());
    assert!(arena.get(new).unwrap().is_some());
    assert!(arena.get(old).is_err());
}

#[test]
fn destructors_run_exactly_once() {
    let arena = strict_arena(64 * 1024);
    let (first, drops) = DropCounter::new();
    let handles: Vec<_> = std::iter::once(first)
        .chain((0..9).map(|_| DropCounter::new().0))
        .map(|payload| arena.new_value(payload).unwrap())
        .collect();
    // Only the first payload shares `drops`; the rest have their own.
    for handle in &handles {
        arena.delete(*handle).unwrap();
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    let (payload, drops) = DropCounter::new();
    let siblings: Vec<_> = (0..5)
        .map(|_| arena.new_value(payload.sibling()).unwrap())
        .collect();
    drop(payload);
    for handle in siblings {
        arena.delete(handle).unwrap();
    }
    assert_eq!(drops.load(Ordering::SeqCst), 6);
    assert_eq!(arena.stats().live_regions, 0);
}

#[test]
fn free_does_not_run_destructor() {
    let arena = strict_arena(4096);
    let (payload, drops) = DropCounter::new();
    let handle = arena.new_value(payload).unwrap();
    arena.free(handle.addr()).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(arena.used(), 0);
}

#[test]
fn chunk_arrays_are_zeroed_over_reused_bytes() {
    let arena = strict_arena(64 * 1024);
    let dirty = arena.new_array::<Voxel>(CHUNK_VOLUME).unwrap();
    {
        let mut lock = arena.lock_typed(dirty).unwrap().unwrap();
        lock.get_mut().unwrap().fill(Voxel::solid(9));
    }
    arena.delete(dirty).unwrap();

    let fresh = arena.new_array::<Voxel>(CHUNK_VOLUME).unwrap();
    assert_eq!(fresh.addr().offset(), dirty.addr().offset());
    let voxels = arena.get_typed(fresh).unwrap().unwrap();
    assert!(voxels.iter().all(|v| *v == Voxel::default()));
}

#[test]
fn filling_past_capacity_is_exhausted() {
    let arena = strict_arena(1024);
    let mut live = Vec::new();
    let err = loop {
        match arena.allocate(100) {
            Ok(addr) => live.push(addr),
            Err(e) => break e,
        }
    };
    // 1024 bytes hold eight 128-byte regions (16 header + 112 padded).
    assert_eq!(live.len(), 8);
    assert!(matches!(err, ArenaError::Exhausted { requested: 128, .. }));
    assert!(err.is_fatal());

    for addr in live {
        arena.free(addr).unwrap();
    }
    assert!(arena.allocate(1000).is_ok());
}

#[test]
fn offset_zero_is_a_real_address() {
    let arena = strict_arena(1024);
    let addr = arena.allocate(8).unwrap();
    assert_eq!(addr.offset(), 0);
    assert!(arena.is_live(addr));
    {
        let mut lock = arena.lock(addr).unwrap().unwrap();
        lock.bytes_mut().unwrap()[0] = 42;
    }
    assert_eq!(arena.get(addr).unwrap().unwrap()[0], 42);
    arena.free(addr).unwrap();
}

#[test]
fn lenient_policy_absorbs_stale_handles() {
    let arena = lenient_arena(4096);
    let meta = arena.new_value(ChunkMeta::at([1, 2, 3])).unwrap();
    arena.delete(meta).unwrap();

    assert!(arena.get_typed(meta).unwrap().is_none());
    assert!(arena.lock_typed(meta).unwrap().is_none());
    assert!(arena.delete(meta).is_ok());
    assert!(arena.free(meta.addr()).is_ok());
}

#[test]
fn lenient_policy_still_reports_protocol_errors() {
    let arena = lenient_arena(4096);
    let addr = arena.allocate(16).unwrap();
    let lock = arena.lock(addr).unwrap().unwrap();
    assert_eq!(arena.free(addr), Err(ArenaError::StillLocked { addr }));
    drop(lock);
    assert!(matches!(
        arena.allocate(1 << 20),
        Err(ArenaError::Exhausted { .. })
    ));
}

#[test]
fn config_is_validated_at_construction() {
    let err = lode_arena::Arena::new(ArenaConfig::new(4).with_validation(Validation::Strict))
        .unwrap_err();
    assert!(matches!(err, ArenaError::InvalidConfig { .. }));
}

#[test]
fn unchecked_and_tracked_never_overlap() {
    let arena = strict_arena(8192);
    let mut boxes = Vec::new();
    let mut regions = Vec::new();
    for i in 0..16 {
        if i % 2 == 0 {
            boxes.push(arena.allocate_unchecked(100 + i * 8).unwrap());
        } else {
            regions.push(arena.allocate(100 + i * 8).unwrap());
        }
    }
    let spans = arena.spans();
    for block in &boxes {
        for span in &spans {
            assert!(
                !block.block().overlaps(span),
                "unchecked {} overlaps tracked {}",
                block.block(),
                span
            );
        }
    }
    for pair in boxes.windows(2) {
        assert!(!pair[0].block().overlaps(&pair[1].block()));
    }
}

#[test]
fn freeing_every_unchecked_block_restores_the_floor() {
    let arena = strict_arena(4096);
    let boxes: Vec<_> = (1..=8)
        .map(|i| arena.allocate_unchecked(i * 24).unwrap())
        .collect();
    // Interleaved release order exercises coalescing.
    let (even, odd): (Vec<_>, Vec<_>) = boxes.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);
    for (_, block) in odd {
        arena.free_unchecked(block);
    }
    for (_, block) in even {
        arena.free_unchecked(block);
    }
    assert_eq!(arena.stats().unchecked_used, 0);
    // The whole buffer is available to tracked allocation again.
    assert!(arena.allocate(4096 - 16).is_ok());
}

#[test]
fn leaked_unchecked_value_lives_until_destroy() {
    let arena = strict_arena(4096);
    let (payload, drops) = DropCounter::new();
    {
        let boxed = arena.new_unchecked(payload).unwrap();
        let _forever: &mut DropCounter = boxed.leak();
    }
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    let stats = arena.destroy();
    assert_eq!(stats.unchecked_blocks, 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
}
