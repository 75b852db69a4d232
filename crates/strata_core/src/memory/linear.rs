//! # Linear Allocator
//!
//! A bump allocator over one lazily-acquired system block. The base
//! strategy: the marker and ring allocators embed one.

use std::ptr::NonNull;

use crate::allocator::{Allocator, StrategyKind};
use crate::error::AllocResult;
use crate::events::{EventResponse, LifecycleEvent, LifecycleHandler};
use crate::memory::cursor::BumpCursor;
use crate::memory::registry::{MappingType, SystemBlock, SystemBlockRegistry};
use crate::memory::stats::UsageStats;

/// A bump-pointer stack allocator.
///
/// Allocations are fast (just bump an offset). Individual allocations are
/// never freed; the block is reset as a whole or handed back to the
/// registry.
///
/// ```text
/// Empty ──first allocate──> Active ──release(block base)──> Empty
///                             │  ▲
///                             └──┘ FlushScratch (cursor -> block start)
/// ```
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one allocator per thread.
///
/// # Example
///
/// ```rust
/// use strata_core::{Allocator, LinearAllocator, MappingType, SystemBlockRegistry};
///
/// let registry = SystemBlockRegistry::new();
/// let mut scratch = LinearAllocator::new(&registry, 1024 * 1024, MappingType::Unclassified);
///
/// let ptr = scratch.allocate(4096, 16)?;
/// assert_eq!(ptr.as_ptr() as usize % 16, 0);
///
/// // Drop everything at once
/// scratch.reset();
/// # Ok::<(), strata_core::AllocError>(())
/// ```
#[derive(Debug)]
pub struct LinearAllocator<'r> {
    cursor: BumpCursor<'r>,
    stats: UsageStats,
}

impl<'r> LinearAllocator<'r> {
    /// Creates an allocator that will lease `capacity` bytes of `mapping` memory.
    ///
    /// No memory is acquired until the first allocation.
    #[must_use]
    pub const fn new(registry: &'r SystemBlockRegistry, capacity: usize, mapping: MappingType) -> Self {
        Self {
            cursor: BumpCursor::new(registry, capacity, mapping),
            stats: UsageStats::new(),
        }
    }

    /// Current offset from the block start.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.cursor.offset()
    }

    /// Bytes left in the block.
    #[inline]
    #[must_use]
    pub const fn remaining_bytes(&self) -> usize {
        self.cursor.remaining()
    }

    /// Configured block size.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.cursor.capacity()
    }

    /// The owned block, if acquired.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> Option<SystemBlock> {
        self.cursor.block()
    }

    /// Whether a block is currently owned.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.cursor.is_active()
    }

    /// Resets the cursor to the block start, invalidating every allocation.
    ///
    /// The current usage window is closed.
    pub fn reset(&mut self) {
        let reclaimed = self.cursor.reset();
        self.stats.roll_window();
        tracing::trace!(reclaimed, mapping = %self.cursor.mapping(), "linear allocator reset");
    }

    /// Moves the cursor back to `offset` and un-counts what was reclaimed.
    pub(crate) fn rewind_to(&mut self, offset: usize, allocations: usize) -> usize {
        let reclaimed = self.cursor.rewind_to(offset);
        self.stats.record_rewind(reclaimed, allocations);
        reclaimed
    }
}

impl Allocator for LinearAllocator<'_> {
    fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        let bump = self.cursor.bump(size, alignment)?;
        if bump.activated {
            tracing::debug!(
                capacity = self.cursor.capacity(),
                mapping = %self.cursor.mapping(),
                "linear allocator activated"
            );
        }
        self.stats.record_allocation(size, bump.footprint);
        Ok(bump.ptr)
    }

    /// Whole-block release: `ptr` must be the block base.
    fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        self.cursor.release_block(ptr)?;
        self.stats.roll_window();
        Ok(())
    }

    fn stats(&self) -> &UsageStats {
        &self.stats
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Linear
    }

    fn mapping(&self) -> MappingType {
        self.cursor.mapping()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.cursor.capacity())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.cursor.remaining())
    }
}

impl LifecycleHandler for LinearAllocator<'_> {
    fn on_event(&mut self, event: LifecycleEvent) -> AllocResult<EventResponse> {
        match event {
            LifecycleEvent::FlushScratch => {
                self.reset();
                Ok(EventResponse::Applied)
            }
            LifecycleEvent::GameInit
            | LifecycleEvent::LevelBeginLoad
            | LifecycleEvent::LevelLoadComplete
            | LifecycleEvent::LevelUnload
            | LifecycleEvent::GameShutdown
            | LifecycleEvent::NextFrame => Ok(EventResponse::Ignored),
        }
    }
}
