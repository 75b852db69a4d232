//! # Integration Error Types
//!
//! Failures of the layer around the strategies: loading configuration,
//! delivering lifecycle events, and verifying soak workloads.

use std::path::PathBuf;

use strata_core::{AllocError, LifecycleEvent};
use thiserror::Error;

use crate::roles::AllocatorRole;

/// Errors that can occur while loading or validating a [`MemoryConfig`](crate::MemoryConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A block-backed role was configured with zero bytes.
    #[error("role {role} has a zero-sized block")]
    ZeroBlockSize {
        /// Offending role.
        role: AllocatorRole,
    },

    /// A pool role was configured with zero slots.
    #[error("role {role} has a pool of zero slots")]
    ZeroPoolSlots {
        /// Offending role.
        role: AllocatorRole,
    },

    /// A pool's block size does not fit in `usize`.
    #[error("role {role} pool of {slots} slots overflows the address space")]
    PoolTooLarge {
        /// Offending role.
        role: AllocatorRole,
        /// Configured slot count.
        slots: usize,
    },

    /// The routing table names an event that does not exist.
    #[error("unknown lifecycle event in routing table: {name}")]
    UnknownEvent {
        /// Name as written in the config.
        name: String,
    },

    /// The routing table names a role that does not exist.
    #[error("unknown role {name} routed from {event}")]
    UnknownRole {
        /// Event whose route names the role.
        event: LifecycleEvent,
        /// Name as written in the config.
        name: String,
    },
}

/// A subscribed strategy failed to apply a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{role} failed to handle {event}: {source}")]
pub struct DispatchError {
    /// Event being delivered.
    pub event: LifecycleEvent,
    /// Role whose strategy rejected it.
    pub role: AllocatorRole,
    /// The strategy's error.
    pub source: AllocError,
}

/// Failures of the soak harness workload.
#[derive(Debug, Error)]
pub enum SoakError {
    /// A strategy refused an allocation or release.
    #[error("{phase}: {role} allocator error: {source}")]
    Alloc {
        /// Workload phase.
        phase: &'static str,
        /// Role being exercised.
        role: AllocatorRole,
        /// The strategy's error.
        source: AllocError,
    },

    /// Event delivery failed.
    #[error("{phase}: {source}")]
    Dispatch {
        /// Workload phase.
        phase: &'static str,
        /// Delivery failure.
        source: DispatchError,
    },

    /// An allocation came back with the wrong alignment.
    #[error("{phase}: address {addr:#x} is not aligned to {alignment}")]
    Misaligned {
        /// Workload phase.
        phase: &'static str,
        /// Returned address.
        addr: usize,
        /// Requested alignment.
        alignment: usize,
    },

    /// Data written into an allocation did not survive.
    #[error("{phase}: allocation {index} lost its tag (expected {expected:#010x}, found {found:#010x})")]
    TagMismatch {
        /// Workload phase.
        phase: &'static str,
        /// Index of the allocation within the phase.
        index: usize,
        /// Tag that was written.
        expected: u32,
        /// Tag read back.
        found: u32,
    },
}

/// Result alias for soak workloads.
pub type SoakResult<T> = Result<T, SoakError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_message() {
        let err = DispatchError {
            event: LifecycleEvent::LevelUnload,
            role: AllocatorRole::LevelGpu,
            source: AllocError::NoMarkerSet,
        };
        assert_eq!(
            err.to_string(),
            "level_gpu failed to handle level_unload: rollback requested but no marker is set"
        );
    }

    #[test]
    fn test_tag_mismatch_message() {
        let err = SoakError::TagMismatch {
            phase: "frames",
            index: 3,
            expected: 0xAB,
            found: 0,
        };
        assert_eq!(
            err.to_string(),
            "frames: allocation 3 lost its tag (expected 0x000000ab, found 0x00000000)"
        );
    }
}
