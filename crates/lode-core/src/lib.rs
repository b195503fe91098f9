//! Core types for the Lode memory arena.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! handle and error types shared by the arena and by the world, chunk and
//! renderer layers that consume it, so those layers can pass handles
//! around without depending on the allocator itself.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;

pub use error::ArenaError;
pub use id::{Span, VAddr};
