//! # Allocator Contract
//!
//! The operation set every strategy implements, independent of how it
//! carves its memory.

use std::fmt;
use std::ptr::NonNull;

use crate::error::AllocResult;
use crate::events::LifecycleHandler;
use crate::memory::{MappingType, UsageStats};

/// Which strategy an allocator instance uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Aligned platform heap.
    Heap,
    /// Bump allocator over one block.
    Linear,
    /// Bump allocator with a single rollback marker.
    MarkerRollback,
    /// Bump allocator that wraps every few frames.
    RingFrame,
    /// Fixed-size slot free list.
    FixedPool,
}

impl StrategyKind {
    /// Stable lowercase name, used in configuration files and reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Heap => "heap",
            Self::Linear => "linear",
            Self::MarkerRollback => "marker",
            Self::RingFrame => "ring",
            Self::FixedPool => "pool",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The allocation contract.
///
/// # Thread Safety
///
/// Implementations are NOT thread-safe; every call runs to completion on
/// the caller's thread.
pub trait Allocator {
    /// Returns `size` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// Strategy-specific exhaustion or validation errors; a request is never
    /// served with a different size or alignment.
    fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>>;

    /// Gives memory back according to the strategy's release semantics.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidRelease`](crate::AllocError::InvalidRelease) if
    /// `ptr` does not belong to this allocator.
    fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()>;

    /// Usage counters.
    fn stats(&self) -> &UsageStats;

    /// Strategy used by this instance.
    fn kind(&self) -> StrategyKind;

    /// Mapping classification of the memory served.
    fn mapping(&self) -> MappingType;

    /// Bytes of backing storage, if bounded.
    fn capacity(&self) -> Option<usize>;

    /// Bytes still available, if bounded.
    fn remaining(&self) -> Option<usize>;
}

/// An allocator that also reacts to lifecycle events.
///
/// Blanket-implemented; this is the object type role sets store.
pub trait ManagedAllocator: Allocator + LifecycleHandler {}

impl<T: Allocator + LifecycleHandler + ?Sized> ManagedAllocator for T {}
