//! Error taxonomy for arena operations.
//!
//! Errors fall into two classes. Configuration and protocol errors
//! ([`ArenaError::is_fatal`]) mean the arena was sized wrong or a caller
//! broke the ownership protocol; the surrounding application usually
//! treats them as unrecoverable. Tolerated races (a handle whose region
//! was freed by another thread) are only reported under strict
//! validation; lenient arenas absorb them.

use thiserror::Error;

use crate::id::VAddr;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// No gap in the arena can hold the request.
    #[error("arena exhausted: requested {requested} bytes, largest free gap {available} bytes")]
    Exhausted {
        /// Bytes requested, including the region header for tracked allocations.
        requested: usize,
        /// Largest contiguous gap that was available.
        available: usize,
    },
    /// The handle does not name a live region (never allocated, already
    /// freed, or freed concurrently).
    #[error("unknown or stale handle {addr}")]
    UnknownHandle {
        /// The handle that failed validation.
        addr: VAddr,
    },
    /// The region is owned by a thread and cannot be freed.
    #[error("region {addr} is still locked")]
    StillLocked {
        /// The owned region.
        addr: VAddr,
    },
    /// The in-buffer header no longer matches the region table, usually
    /// because a neighbouring payload overran its bounds.
    #[error("region header at {addr} is corrupted")]
    CorruptHeader {
        /// The region whose header was damaged.
        addr: VAddr,
    },
    /// The region holds a different payload type than the one requested.
    #[error("region {addr} holds {stored}, not {requested}")]
    TypeMismatch {
        /// The region that was accessed.
        addr: VAddr,
        /// Type name of the stored payload.
        stored: &'static str,
        /// Type name the caller asked for.
        requested: &'static str,
    },
    /// The owning thread asked for a payload view that would alias one it
    /// already holds.
    #[error("payload of region {addr} is already borrowed")]
    BorrowConflict {
        /// The region whose payload is borrowed.
        addr: VAddr,
    },
    /// The payload type needs stricter alignment than regions provide.
    #[error("alignment {align} exceeds the arena maximum of {max}")]
    UnsupportedAlignment {
        /// Alignment the type requires.
        align: usize,
        /// Largest alignment the arena guarantees.
        max: usize,
    },
    /// Tracked arrays cannot hold zero-sized elements; the region length
    /// would not record how many there are.
    #[error("tracked arrays of zero-sized {type_name} are not supported")]
    ZeroSizedElement {
        /// Name of the element type.
        type_name: &'static str,
    },
    /// The arena configuration is not usable.
    #[error("invalid arena configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with it.
        reason: String,
    },
}

impl ArenaError {
    /// Whether this error reports a sizing or protocol bug rather than a
    /// benign cross-thread race.
    ///
    /// Callers that want abort-on-exhaustion behaviour can escalate every
    /// fatal error to a panic.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownHandle { .. })
    }

    /// The handle involved in the failure, if any.
    pub fn addr(&self) -> Option<VAddr> {
        match self {
            Self::UnknownHandle { addr }
            | Self::StillLocked { addr }
            | Self::CorruptHeader { addr }
            | Self::TypeMismatch { addr, .. }
            | Self::BorrowConflict { addr } => Some(*addr),
            Self::Exhausted { .. }
            | Self::UnsupportedAlignment { .. }
            | Self::ZeroSizedElement { .. }
            | Self::InvalidConfig { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handles_are_not_fatal() {
        let addr = VAddr::from_raw_parts(0, 1);
        assert!(!ArenaError::UnknownHandle { addr }.is_fatal());
        assert!(ArenaError::StillLocked { addr }.is_fatal());
        assert!(ArenaError::Exhausted {
            requested: 64,
            available: 0
        }
        .is_fatal());
    }

    #[test]
    fn addr_is_reported_for_region_errors() {
        let addr = VAddr::from_raw_parts(32, 9);
        assert_eq!(ArenaError::BorrowConflict { addr }.addr(), Some(addr));
        assert_eq!(
            ArenaError::InvalidConfig {
                reason: "zero".into()
            }
            .addr(),
            None
        );
    }

    #[test]
    fn display_mentions_sizes() {
        let err = ArenaError::Exhausted {
            requested: 4096,
            available: 128,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("128"));
    }
}
