//! Lode: the memory arena of a voxel game client.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Lode sub-crates. For most users, adding `lode` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use lode::prelude::*;
//!
//! let arena: SharedArena = Arena::new(ArenaConfig::new(1024 * 1024))?.into_shared();
//!
//! // Tracked allocation: validated handle, cross-thread ownership.
//! let heights = arena.new_array::<u16>(16 * 16)?;
//! {
//!     let mut lock = arena.lock_typed(heights)?.expect("just allocated");
//!     lock.get_mut()?.fill(64);
//! }
//! let view = arena.get_typed(heights)?.expect("still live");
//! assert!(view.iter().all(|&h| h == 64));
//! drop(view);
//! arena.delete(heights)?;
//!
//! // Unchecked allocation: single owner, no header, no locking.
//! let mut mesh = arena.new_array_unchecked::<f32>(3 * 1024)?;
//! mesh[0] = 1.0;
//! # Ok::<(), ArenaError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `lode-arena` | `Arena`, guards, handles, unchecked boxes, config |
//! | [`types`] | `lode-core` | `VAddr`, `Span`, `ArenaError` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// The arena and its access guards (`lode-arena`).
///
/// Most users only need the types in the [`prelude`].
pub use lode_arena as arena;

/// Handle, span and error types (`lode-core`).
pub use lode_core as types;

/// Common imports for typical Lode usage.
///
/// ```rust
/// use lode::prelude::*;
/// ```
pub mod prelude {
    // Arena and configuration
    pub use lode_arena::{Arena, ArenaConfig, ArenaStats, SharedArena, Validation};

    // Handles and guards
    pub use lode_arena::{Handle, RegionLock, RegionRef, UncheckedBox};

    // Core types
    pub use lode_core::{ArenaError, VAddr};
}
