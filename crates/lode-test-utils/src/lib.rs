//! Test utilities for Lode development.
//!
//! Provides arena builders with a fixed validation policy, payload types
//! shaped like the client's real workloads ([`fixtures`]), and a seeded
//! allocate/free workload generator ([`churn`]).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod churn;
pub mod fixtures;

pub use churn::{ChurnOp, ChurnPlan};
pub use fixtures::{ChunkMeta, DropCounter, Voxel, CHUNK_VOLUME};

use lode_arena::{Arena, ArenaConfig, SharedArena, Validation};

/// Arena of `capacity` bytes that reports stale handles as errors.
pub fn strict_arena(capacity: usize) -> Arena {
    build(capacity, Validation::Strict)
}

/// Arena of `capacity` bytes that absorbs stale handles.
pub fn lenient_arena(capacity: usize) -> Arena {
    build(capacity, Validation::Lenient)
}

/// Strict arena wrapped for sharing between threads.
pub fn shared_strict_arena(capacity: usize) -> SharedArena {
    strict_arena(capacity).into_shared()
}

fn build(capacity: usize, validation: Validation) -> Arena {
    Arena::new(ArenaConfig::new(capacity).with_validation(validation))
        .unwrap_or_else(|e| panic!("test arena of {capacity} bytes: {e}"))
}
