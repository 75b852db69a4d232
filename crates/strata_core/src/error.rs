//! # Allocator Error Types
//!
//! All recoverable failures of the strategy layer. Exhaustion is never
//! fatal here: the caller decides whether running dry matters.

use thiserror::Error;

/// Errors that can occur while allocating or releasing memory.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Every slot of the system block registry is occupied.
    #[error("out of system blocks: all {capacity} registry slots are live")]
    OutOfSystemBlocks {
        /// Registry capacity.
        capacity: usize,
    },

    /// The owned block cannot satisfy the size and alignment.
    #[error("out of space: need {requested} bytes aligned to {alignment}, {remaining} bytes remain")]
    OutOfSpace {
        /// Bytes requested.
        requested: usize,
        /// Alignment requested.
        alignment: usize,
        /// Bytes left in the block before the request.
        remaining: usize,
    },

    /// The fixed pool free list is empty.
    #[error("pool exhausted: all {capacity} slots are live")]
    PoolExhausted {
        /// Number of slots in the pool.
        capacity: usize,
    },

    /// Rollback requested without a marker in place.
    #[error("rollback requested but no marker is set")]
    NoMarkerSet,

    /// The pointer does not belong to the releasing allocator.
    #[error("pointer does not belong to this allocator")]
    InvalidRelease,

    /// The request does not fit a fixed pool slot.
    #[error("request of {requested} bytes aligned to {alignment} exceeds slot capacity of {slot_capacity} bytes")]
    RequestTooLarge {
        /// Bytes requested.
        requested: usize,
        /// Alignment requested.
        alignment: usize,
        /// Payload bytes available in one slot.
        slot_capacity: usize,
    },

    /// Alignment is zero or not a power of two.
    #[error("invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(usize),

    /// A system block of zero bytes was requested.
    #[error("system blocks must be at least one byte")]
    ZeroSizedBlock,
}

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;
