//! Fixed-buffer memory arena with region-granularity locking.
//!
//! One zero-filled buffer is allocated up front and every dynamic object
//! in the client (chunk storage, mesh buffers, shaders, world objects) is
//! carved from it. Instead of one mutex per object, ownership is tracked
//! per byte range: a logic thread can mutate a chunk while a render thread
//! reads its neighbours, and a thread touching an owned region waits only
//! for that region.
//!
//! # Architecture
//!
//! ```text
//! Arena
//! ├── RawBuffer            (one aligned allocation, never moves)
//! ├── Mutex<ArenaState>
//! │   ├── RegionTable      (tracked regions, sorted, grow up from 0)
//! │   └── UncheckedPool    (unchecked blocks, grow down from the top)
//! └── Condvar              (wakes waiters when a region is released)
//! ```
//!
//! # Allocation families
//!
//! - **Tracked:** [`Arena::allocate`] / [`Arena::new_value`] return a
//!   [`VAddr`] or [`Handle`] that is validated on every access. Access
//!   goes through [`RegionRef`] and [`RegionLock`] guards, which own the
//!   region for the current thread until dropped.
//! - **Unchecked:** [`Arena::allocate_unchecked`] / [`Arena::new_unchecked`]
//!   return an [`UncheckedBox`], a single-owner box with no header and no
//!   locking.
//!
//! # Safety
//!
//! `unsafe` is confined to the buffer (`raw`), the places that turn
//! reserved bytes into values (`arena`, `typed`, `unchecked`) and the
//! guards that hand out payload references (`guard`).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod guard;
pub mod handle;
mod raw;
mod region;
pub mod stats;
mod typed;
pub mod unchecked;

/// Alignment of every region start, payload and unchecked block.
pub const REGION_ALIGN: usize = 16;

// Public re-exports for the primary API surface.
pub use arena::{Arena, SharedArena};
pub use config::{ArenaConfig, Validation};
pub use guard::{Ref, RefMut, RegionLock, RegionRef};
pub use handle::{Handle, Payload};
pub use lode_core::{ArenaError, Span, VAddr};
pub use stats::ArenaStats;
pub use unchecked::UncheckedBox;
