//! # Heap Allocator
//!
//! General-purpose aligned allocation straight from the platform heap, for
//! data with no better-suited strategy. Not backed by the block registry.
//!
//! ## Safety Note
//!
//! Every live allocation's layout is kept in `live`; memory is only freed
//! through a layout taken out of that map, so each pointer is deallocated
//! exactly once and with the layout it was allocated with.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;

use crate::allocator::{Allocator, StrategyKind};
use crate::error::{AllocError, AllocResult};
use crate::events::{EventResponse, LifecycleEvent, LifecycleHandler};
use crate::memory::cursor::validate_alignment;
use crate::memory::registry::MappingType;
use crate::memory::stats::UsageStats;

/// Aligned platform-heap allocator with per-allocation release.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one allocator per thread.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    live: HashMap<usize, Layout>,
    stats: UsageStats,
}

impl HeapAllocator {
    /// Creates an empty heap allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocations not yet released.
    #[inline]
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }
}

impl Allocator for HeapAllocator {
    fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        validate_alignment(alignment)?;
        // Zero-sized requests still get a unique, releasable address.
        let layout = Layout::from_size_align(size.max(1), alignment).map_err(|_| AllocError::OutOfSpace {
            requested: size,
            alignment,
            remaining: 0,
        })?;

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        self.live.insert(ptr.as_ptr() as usize, layout);
        self.stats.record_allocation(size, layout.size());
        Ok(ptr)
    }

    fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        let Some(layout) = self.live.remove(&(ptr.as_ptr() as usize)) else {
            tracing::warn!(addr = ptr.as_ptr() as usize, "release of pointer not owned by the heap allocator");
            return Err(AllocError::InvalidRelease);
        };

        // SAFETY: `ptr` was returned by `alloc::alloc(layout)` and has just
        // been removed from the live map.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
        self.stats.record_release(layout.size());
        Ok(())
    }

    fn stats(&self) -> &UsageStats {
        &self.stats
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Heap
    }

    fn mapping(&self) -> MappingType {
        MappingType::Unclassified
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    fn remaining(&self) -> Option<usize> {
        None
    }
}

impl LifecycleHandler for HeapAllocator {
    fn on_event(&mut self, event: LifecycleEvent) -> AllocResult<EventResponse> {
        match event {
            LifecycleEvent::FlushScratch
            | LifecycleEvent::GameInit
            | LifecycleEvent::LevelBeginLoad
            | LifecycleEvent::LevelLoadComplete
            | LifecycleEvent::LevelUnload
            | LifecycleEvent::GameShutdown
            | LifecycleEvent::NextFrame => Ok(EventResponse::Ignored),
        }
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        if self.live.is_empty() {
            return;
        }
        tracing::warn!(leaked = self.live.len(), "heap allocator dropped with live allocations");
        for (addr, layout) in self.live.drain() {
            // SAFETY: every entry is a live allocation made with `layout`.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_alignment_and_release() {
        let mut heap = HeapAllocator::new();
        let mut ptrs = Vec::new();
        for alignment in [1, 4, 16, 64, 4096] {
            let ptr = heap.allocate(24, alignment).unwrap();
            assert_eq!(ptr.as_ptr() as usize % alignment, 0);
            ptrs.push(ptr);
        }
        assert_eq!(heap.live_allocations(), 5);

        for ptr in ptrs {
            heap.release(ptr).unwrap();
        }
        assert_eq!(heap.live_allocations(), 0);
        assert_eq!(heap.stats().active_bytes(), 0);
        assert_eq!(heap.stats().total_allocations(), 5);
    }

    #[test]
    fn test_heap_rejects_foreign_and_double_release() {
        let mut heap = HeapAllocator::new();
        let ptr = heap.allocate(8, 8).unwrap();
        heap.release(ptr).unwrap();
        assert_eq!(heap.release(ptr), Err(AllocError::InvalidRelease));

        let foreign = NonNull::dangling();
        assert_eq!(heap.release(foreign), Err(AllocError::InvalidRelease));
    }

    #[test]
    fn test_heap_invalid_alignment() {
        let mut heap = HeapAllocator::new();
        assert_eq!(heap.allocate(8, 12), Err(AllocError::InvalidAlignment(12)));
        assert_eq!(heap.allocate(8, 0), Err(AllocError::InvalidAlignment(0)));
    }

    #[test]
    fn test_heap_ignores_events() {
        let mut heap = HeapAllocator::new();
        heap.allocate(8, 8).unwrap();
        for event in LifecycleEvent::ALL {
            assert_eq!(heap.on_event(event), Ok(EventResponse::Ignored));
        }
        assert_eq!(heap.live_allocations(), 1);
    }
}
