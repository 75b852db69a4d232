//! # Marker Rollback Allocator
//!
//! A linear allocator with one saved position. Everything allocated after
//! the marker is freed in O(1) by rolling back; everything before it
//! survives.
//!
//! ```text
//! block start          marker               cursor
//! │ persistent data    │ level data          │ free
//! ├────────────────────┼─────────────────────┼──────────────┤
//!                      ◄──── rollback ───────┘
//! ```

use std::ptr::NonNull;

use crate::allocator::{Allocator, StrategyKind};
use crate::error::{AllocError, AllocResult};
use crate::events::{EventResponse, LifecycleEvent, LifecycleHandler};
use crate::memory::linear::LinearAllocator;
use crate::memory::registry::{MappingType, SystemBlock, SystemBlockRegistry};
use crate::memory::stats::UsageStats;

/// A saved cursor position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Marker {
    /// Offset from the block start.
    offset: usize,
    /// Live allocation count when the marker was placed.
    allocations: usize,
}

/// Level-scoped bump allocator.
///
/// Single marker depth: placing a marker overwrites the previous one.
/// A marker is consumed by the rollback that uses it, and dropped when the
/// block is released.
#[derive(Debug)]
pub struct MarkerRollbackAllocator<'r> {
    linear: LinearAllocator<'r>,
    marker: Option<Marker>,
}

impl<'r> MarkerRollbackAllocator<'r> {
    /// Creates an allocator that will lease `capacity` bytes of `mapping` memory.
    #[must_use]
    pub const fn new(registry: &'r SystemBlockRegistry, capacity: usize, mapping: MappingType) -> Self {
        Self {
            linear: LinearAllocator::new(registry, capacity, mapping),
            marker: None,
        }
    }

    /// Saves the current cursor as the rollback target.
    pub fn place_marker(&mut self) {
        let marker = Marker {
            offset: self.linear.offset(),
            allocations: self.linear.stats().active_allocations(),
        };
        if let Some(previous) = self.marker.replace(marker) {
            tracing::debug!(previous = previous.offset, offset = marker.offset, "marker replaced");
        } else {
            tracing::debug!(offset = marker.offset, "marker placed");
        }
    }

    /// Frees everything allocated since the marker.
    ///
    /// Returns the number of bytes reclaimed.
    ///
    /// # Errors
    ///
    /// [`AllocError::NoMarkerSet`] if no marker is in place.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is behind the marker, which the allocator never
    /// allows to happen.
    pub fn rollback_to_marker(&mut self) -> AllocResult<usize> {
        let marker = self.marker.take().ok_or(AllocError::NoMarkerSet)?;
        let allocations = self
            .linear
            .stats()
            .active_allocations()
            .saturating_sub(marker.allocations);
        let reclaimed = self.linear.rewind_to(marker.offset, allocations);
        tracing::debug!(offset = marker.offset, reclaimed, allocations, "rolled back to marker");
        Ok(reclaimed)
    }

    /// Offset of the active marker, if any.
    #[inline]
    #[must_use]
    pub fn marker(&self) -> Option<usize> {
        self.marker.map(|marker| marker.offset)
    }

    /// Current offset from the block start.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.linear.offset()
    }

    /// The owned block, if acquired.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> Option<SystemBlock> {
        self.linear.block()
    }
}

impl Allocator for MarkerRollbackAllocator<'_> {
    fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        self.linear.allocate(size, alignment)
    }

    /// Whole-block release. Drops the marker.
    fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        self.linear.release(ptr)?;
        self.marker = None;
        Ok(())
    }

    fn stats(&self) -> &UsageStats {
        self.linear.stats()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::MarkerRollback
    }

    fn mapping(&self) -> MappingType {
        self.linear.mapping()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.linear.block_size())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.linear.remaining_bytes())
    }
}

impl LifecycleHandler for MarkerRollbackAllocator<'_> {
    fn on_event(&mut self, event: LifecycleEvent) -> AllocResult<EventResponse> {
        match event {
            LifecycleEvent::LevelBeginLoad => {
                self.place_marker();
                Ok(EventResponse::Applied)
            }
            LifecycleEvent::LevelUnload => {
                self.rollback_to_marker()?;
                Ok(EventResponse::Applied)
            }
            LifecycleEvent::FlushScratch
            | LifecycleEvent::GameInit
            | LifecycleEvent::LevelLoadComplete
            | LifecycleEvent::GameShutdown
            | LifecycleEvent::NextFrame => Ok(EventResponse::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_law() {
        let registry = SystemBlockRegistry::new();
        let mut level = MarkerRollbackAllocator::new(&registry, 1024, MappingType::Gpu);

        level.place_marker();
        let mark = level.offset();

        let first = level.allocate(300, 16).unwrap();
        let mut served = 1;
        for _ in 0..2 {
            if level.allocate(300, 16).is_ok() {
                served += 1;
            }
        }
        assert_eq!(served, 3);

        level.rollback_to_marker().unwrap();
        assert_eq!(level.offset(), mark);
        assert_eq!(level.allocate(300, 16).unwrap(), first);
    }

    #[test]
    fn test_data_before_marker_survives() {
        let registry = SystemBlockRegistry::new();
        let mut level = MarkerRollbackAllocator::new(&registry, 4096, MappingType::Cpu);

        let persistent = level.allocate(100, 16).unwrap();
        level.place_marker();
        let level_data = level.allocate(500, 16).unwrap();
        assert!(level_data > persistent);

        assert_eq!(level.rollback_to_marker(), Ok(512));
        assert_eq!(level.offset(), 100);
        assert_eq!(level.stats().active_allocations(), 1);
        assert_eq!(level.stats().active_bytes(), 100);
    }

    #[test]
    fn test_rollback_without_marker() {
        let registry = SystemBlockRegistry::new();
        let mut level = MarkerRollbackAllocator::new(&registry, 256, MappingType::Cpu);
        assert_eq!(level.rollback_to_marker(), Err(AllocError::NoMarkerSet));

        level.place_marker();
        level.rollback_to_marker().unwrap();
        assert_eq!(level.rollback_to_marker(), Err(AllocError::NoMarkerSet));
    }

    #[test]
    fn test_marker_overwritten_not_stacked() {
        let registry = SystemBlockRegistry::new();
        let mut level = MarkerRollbackAllocator::new(&registry, 1024, MappingType::Cpu);

        level.place_marker();
        level.allocate(64, 16).unwrap();
        level.place_marker();
        level.allocate(64, 16).unwrap();

        level.rollback_to_marker().unwrap();
        assert_eq!(level.offset(), 64);
        assert_eq!(level.marker(), None);
    }

    #[test]
    fn test_block_release_invalidates_marker() {
        let registry = SystemBlockRegistry::new();
        let mut level = MarkerRollbackAllocator::new(&registry, 1024, MappingType::Gpu);

        let base = level.allocate(64, 16).unwrap();
        level.place_marker();
        level.release(base).unwrap();

        assert_eq!(level.rollback_to_marker(), Err(AllocError::NoMarkerSet));
    }

    #[test]
    fn test_level_events() {
        let registry = SystemBlockRegistry::new();
        let mut level = MarkerRollbackAllocator::new(&registry, 1024, MappingType::Gpu);
        level.allocate(32, 16).unwrap();

        assert_eq!(level.on_event(LifecycleEvent::LevelBeginLoad), Ok(EventResponse::Applied));
        level.allocate(128, 16).unwrap();
        assert_eq!(level.on_event(LifecycleEvent::LevelLoadComplete), Ok(EventResponse::Ignored));
        assert_eq!(level.on_event(LifecycleEvent::FlushScratch), Ok(EventResponse::Ignored));
        assert_eq!(level.on_event(LifecycleEvent::LevelUnload), Ok(EventResponse::Applied));
        assert_eq!(level.offset(), 32);

        assert_eq!(level.on_event(LifecycleEvent::LevelUnload), Err(AllocError::NoMarkerSet));
    }
}
