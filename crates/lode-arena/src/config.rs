//! Arena configuration parameters.

use lode_core::ArenaError;
use serde::{Deserialize, Serialize};

/// How the arena reacts to handles that no longer name a live region.
///
/// A handle can go stale legitimately: the logic thread frees a chunk
/// while the render thread still holds its address. Lenient arenas treat
/// that as "data no longer relevant" and hand back `None`; strict arenas
/// report it so stale-address bugs surface during development.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// Stale handles on `get`/`lock`/`free` are errors, and region headers
    /// are cross-checked against the region table on every access.
    Strict,
    /// Stale handles yield `None` (or a no-op for `free`) and are logged
    /// at debug level.
    Lenient,
}

impl Validation {
    /// `Strict` in debug builds, `Lenient` in release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::for_build()
    }
}

/// Configuration for an [`Arena`](crate::Arena).
///
/// Validated at construction; all values are immutable afterwards. The
/// struct deserializes from a host application's settings file, with
/// missing keys falling back to the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Size of the backing buffer in bytes.
    ///
    /// Default: 268_435_456 (256MB). Must be at least
    /// [`MIN_CAPACITY`](Self::MIN_CAPACITY) and fit in a `u32` offset.
    pub capacity: usize,

    /// Stale-handle policy. Default: [`Validation::for_build`].
    pub validation: Validation,
}

impl ArenaConfig {
    /// Default backing buffer size: 256MB.
    pub const DEFAULT_CAPACITY: usize = 256 * 1024 * 1024;

    /// Smallest usable arena: one header plus one aligned payload block.
    pub const MIN_CAPACITY: usize = 2 * crate::REGION_ALIGN;

    /// Largest arena addressable by `u32` offsets.
    pub const MAX_CAPACITY: usize = u32::MAX as usize;

    /// Create a config for a buffer of `capacity` bytes with the build's
    /// default validation.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            validation: Validation::for_build(),
        }
    }

    /// Override the validation policy.
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.capacity < Self::MIN_CAPACITY {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "capacity must be at least {} bytes (got {})",
                    Self::MIN_CAPACITY,
                    self.capacity
                ),
            });
        }
        if self.capacity > Self::MAX_CAPACITY {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "capacity {} exceeds the u32 offset space ({} bytes)",
                    self.capacity,
                    Self::MAX_CAPACITY
                ),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
