//! # Ring Frame Allocator
//!
//! N-deep frame buffering without per-allocation release.
//!
//! ```text
//! NextFrame:   1      2      3      4 (wrap)   5
//! counter:     1      2      3      0          1
//! cursor:     ───────bumps────────> start ──bumps──>
//! ```
//!
//! Memory written in frame *k* stays addressable until the wraparound that
//! follows it, at least three frame boundaries later. Callers must not keep
//! pointers past the window; nothing detects use after wraparound.

use std::ptr::NonNull;

use crate::allocator::{Allocator, StrategyKind};
use crate::error::AllocResult;
use crate::events::{EventResponse, LifecycleEvent, LifecycleHandler};
use crate::memory::linear::LinearAllocator;
use crate::memory::registry::{MappingType, SystemBlock, SystemBlockRegistry};
use crate::memory::stats::UsageStats;

/// The cursor wraps once the frame counter exceeds this value.
pub const RING_FRAME_WINDOW: usize = 3;

/// Per-frame bump allocator that wraps to the block start every
/// `RING_FRAME_WINDOW + 1` frame boundaries.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one allocator per thread.
#[derive(Debug)]
pub struct RingFrameAllocator<'r> {
    linear: LinearAllocator<'r>,
    frame_count: usize,
    wraps: u64,
}

impl<'r> RingFrameAllocator<'r> {
    /// Creates an allocator that will lease `capacity` bytes of `mapping` memory.
    #[must_use]
    pub const fn new(registry: &'r SystemBlockRegistry, capacity: usize, mapping: MappingType) -> Self {
        Self {
            linear: LinearAllocator::new(registry, capacity, mapping),
            frame_count: 0,
            wraps: 0,
        }
    }

    /// Advances the frame clock, wrapping the cursor when the window is spent.
    ///
    /// Returns `true` if this boundary wrapped the cursor.
    pub fn on_frame_boundary(&mut self) -> bool {
        self.frame_count += 1;
        if self.frame_count <= RING_FRAME_WINDOW {
            return false;
        }

        self.linear.reset();
        self.frame_count = 0;
        self.wraps += 1;
        tracing::trace!(
            wraps = self.wraps,
            last_window_bytes = self.linear.stats().last_window_peak_bytes(),
            "ring allocator wrapped"
        );
        true
    }

    /// Frame boundaries seen since the last wraparound.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of wraparounds so far.
    #[inline]
    #[must_use]
    pub const fn wraps(&self) -> u64 {
        self.wraps
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

impl Allocator for RingFrameAllocator<'_> {
    fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        self.linear.allocate(size, alignment)
    }

    /// Whole-block release. The frame clock restarts.
    fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        self.linear.release(ptr)?;
        self.frame_count = 0;
        Ok(())
    }

    fn stats(&self) -> &UsageStats {
        self.linear.stats()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RingFrame
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

impl LifecycleHandler for RingFrameAllocator<'_> {
    fn on_event(&mut self, event: LifecycleEvent) -> AllocResult<EventResponse> {
        match event {
            LifecycleEvent::NextFrame => {
                self.on_frame_boundary();
                Ok(EventResponse::Applied)
            }
            LifecycleEvent::FlushScratch
            | LifecycleEvent::GameInit
            | LifecycleEvent::LevelBeginLoad
            | LifecycleEvent::LevelLoadComplete
            | LifecycleEvent::LevelUnload
            | LifecycleEvent::GameShutdown => Ok(EventResponse::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_on_fourth_boundary() {
        let registry = SystemBlockRegistry::new();
        let mut ring = RingFrameAllocator::new(&registry, 4 * 1024, MappingType::Cpu);

        for frame in 1..=3 {
            ring.allocate(256, 16).unwrap();
            assert!(!ring.on_frame_boundary());
            assert_eq!(ring.frame_count(), frame);
            assert_eq!(ring.offset(), frame * 256);
        }

        ring.allocate(256, 16).unwrap();
        assert!(ring.on_frame_boundary());
        assert_eq!(ring.offset(), 0);
        assert_eq!(ring.frame_count(), 0);

        assert!(!ring.on_frame_boundary());
        assert_eq!(ring.offset(), 0);
        assert_eq!(ring.wraps(), 1);
    }

    #[test]
    fn test_window_stats_roll_over() {
        let registry = SystemBlockRegistry::new();
        let mut ring = RingFrameAllocator::new(&registry, 4 * 1024, MappingType::Gpu);

        for _ in 0..4 {
            ring.allocate(100, 4).unwrap();
            ring.on_frame_boundary();
        }

        assert_eq!(ring.stats().active_bytes(), 0);
        assert_eq!(ring.stats().last_window_peak_bytes(), 400);
        assert_eq!(ring.stats().last_window_peak_allocations(), 4);
        assert_eq!(ring.stats().peak_active_bytes(), 400);
    }

    #[test]
    fn test_reuses_addresses_after_wrap() {
        let registry = SystemBlockRegistry::new();
        let mut ring = RingFrameAllocator::new(&registry, 1024, MappingType::Cpu);
        let first = ring.allocate(64, 32).unwrap();

        for _ in 0..=RING_FRAME_WINDOW {
            ring.on_event(LifecycleEvent::NextFrame).unwrap();
        }
        assert_eq!(ring.allocate(64, 32).unwrap(), first);
    }

    #[test]
    fn test_ignores_non_frame_events() {
        let registry = SystemBlockRegistry::new();
        let mut ring = RingFrameAllocator::new(&registry, 1024, MappingType::Cpu);
        ring.allocate(64, 16).unwrap();

        for event in LifecycleEvent::ALL {
            if event != LifecycleEvent::NextFrame {
                assert_eq!(ring.on_event(event), Ok(EventResponse::Ignored));
            }
        }
        assert_eq!(ring.frame_count(), 0);
        assert_eq!(ring.offset(), 64);
    }
}
