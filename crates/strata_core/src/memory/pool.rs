//! # Fixed Pool Allocator
//!
//! Fixed-size slot allocator for small objects that are frequently
//! allocated and freed in any order.
//!
//! ## Safety Note
//!
//! Slot headers live inside the leased block, next to the payloads handed
//! to callers. Header access is confined to `header`/`set_header`, which
//! only ever touch the header bytes of an in-bounds slot.

#![allow(unsafe_code)]
//!
//! ## Slot Layout
//!
//! ```text
//! ┌──────────── slot (80 bytes) ────────────┐
//! │ next: u64 │ live: u64 │ payload: 64 B   │
//! └───────────┴───────────┴─────────────────┘
//!   header (16 bytes)     ▲
//!                         └─ pointer returned to the caller
//! ```

use std::ptr::NonNull;

use bytemuck::{Pod, Zeroable};

use crate::allocator::{Allocator, StrategyKind};
use crate::error::{AllocError, AllocResult};
use crate::events::{EventResponse, LifecycleEvent, LifecycleHandler};
use crate::memory::cursor::validate_alignment;
use crate::memory::registry::{BlockLease, MappingType, SystemBlock, SystemBlockRegistry};
use crate::memory::stats::UsageStats;

/// Payload bytes per slot (eight `f64`s).
pub const POOL_SLOT_PAYLOAD: usize = 8 * std::mem::size_of::<f64>();

/// Bytes of bookkeeping in front of each payload.
pub const POOL_SLOT_HEADER: usize = std::mem::size_of::<SlotHeader>();

/// Total bytes per slot.
pub const POOL_SLOT_FOOTPRINT: usize = POOL_SLOT_HEADER + POOL_SLOT_PAYLOAD;

/// Largest alignment a payload is guaranteed to satisfy.
pub const POOL_PAYLOAD_ALIGNMENT: usize = 16;

const NO_SLOT: u64 = u64::MAX;

const _: () = assert!(POOL_SLOT_HEADER % POOL_PAYLOAD_ALIGNMENT == 0);
const _: () = assert!(POOL_SLOT_FOOTPRINT % POOL_PAYLOAD_ALIGNMENT == 0);

/// In-block bookkeeping for one slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
struct SlotHeader {
    /// Index of the next free slot, or `NO_SLOT`.
    next: u64,
    /// Non-zero while the slot is handed out.
    live: u64,
}

/// A pool allocator for fixed-size slots.
///
/// All slots have the same size, whatever the caller asks for, so requests
/// that do not fit a slot are rejected. Release is O(1) and LIFO: the most
/// recently freed slot is the next one returned.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread.
///
/// # Example
///
/// ```rust
/// use strata_core::{Allocator, FixedPoolAllocator, MappingType, SystemBlockRegistry};
///
/// let registry = SystemBlockRegistry::new();
/// let mut pool = FixedPoolAllocator::new(&registry, 1024, MappingType::Unclassified);
///
/// // Allocate - O(1), no platform allocation after the first call
/// let particle = pool.allocate(48, 16)?;
///
/// // Free - O(1)
/// pool.release(particle)?;
/// # Ok::<(), strata_core::AllocError>(())
/// ```
#[derive(Debug)]
pub struct FixedPoolAllocator<'r> {
    lease: BlockLease<'r>,
    max_slots: usize,
    first_available: Option<usize>,
    live_slots: usize,
    stats: UsageStats,
}

impl<'r> FixedPoolAllocator<'r> {
    /// Creates a pool of `max_slots` slots backed by one `mapping` block.
    ///
    /// No memory is acquired until the first allocation.
    ///
    /// # Panics
    ///
    /// Panics if `max_slots` is zero or the block size overflows.
    #[must_use]
    pub fn new(registry: &'r SystemBlockRegistry, max_slots: usize, mapping: MappingType) -> Self {
        assert!(max_slots > 0, "Capacity must be greater than zero");
        let block_size = max_slots
            .checked_mul(POOL_SLOT_FOOTPRINT)
            .unwrap_or_else(|| panic!("pool of {max_slots} slots overflows usize"));

        Self {
            lease: BlockLease::new(registry, block_size, mapping),
            max_slots,
            first_available: None,
            live_slots: 0,
            stats: UsageStats::new(),
        }
    }

    /// Returns the total number of slots.
    #[inline]
    #[must_use]
    pub const fn slot_capacity(&self) -> usize {
        self.max_slots
    }

    /// Returns the number of slots currently handed out.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.live_slots
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.max_slots - self.live_slots
    }

    /// The owned block, if acquired.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> Option<SystemBlock> {
        self.lease.block()
    }

    /// Threads every slot onto the free list in array order.
    fn format_block(&mut self, block: SystemBlock) {
        for index in 0..self.max_slots {
            let next = if index + 1 < self.max_slots {
                (index + 1) as u64
            } else {
                NO_SLOT
            };
            Self::set_header(block, index, SlotHeader { next, live: 0 });
        }
        self.first_available = Some(0);
        self.live_slots = 0;
        tracing::debug!(
            slots = self.max_slots,
            mapping = %block.mapping(),
            "fixed pool activated"
        );
    }

    /// Slot index owning payload pointer `ptr`, if `ptr` is a payload start.
    fn slot_of(&self, block: SystemBlock, ptr: NonNull<u8>) -> Option<usize> {
        let offset = block.offset_of(ptr.as_ptr())?;
        let slot_offset = offset.checked_sub(POOL_SLOT_HEADER)?;
        if slot_offset % POOL_SLOT_FOOTPRINT != 0 {
            return None;
        }
        let index = slot_offset / POOL_SLOT_FOOTPRINT;
        (index < self.max_slots).then_some(index)
    }

    fn slot_ptr(block: SystemBlock, index: usize) -> *mut u8 {
        debug_assert!((index + 1) * POOL_SLOT_FOOTPRINT <= block.size());
        block.base().as_ptr().wrapping_add(index * POOL_SLOT_FOOTPRINT)
    }

    fn header(block: SystemBlock, index: usize) -> SlotHeader {
        // SAFETY: the slot lies inside the live block, its first
        // `POOL_SLOT_HEADER` bytes are never handed to callers, and the block
        // was zero-initialised by the registry.
        let bytes = unsafe { std::slice::from_raw_parts(Self::slot_ptr(block, index), POOL_SLOT_HEADER) };
        *bytemuck::from_bytes::<SlotHeader>(bytes)
    }

    fn set_header(block: SystemBlock, index: usize, header: SlotHeader) {
        // SAFETY: as in `header`; no other reference to these bytes exists
        // while the pool is borrowed mutably.
        let bytes = unsafe { std::slice::from_raw_parts_mut(Self::slot_ptr(block, index), POOL_SLOT_HEADER) };
        *bytemuck::from_bytes_mut::<SlotHeader>(bytes) = header;
    }

    fn payload_ptr(block: SystemBlock, index: usize) -> NonNull<u8> {
        let ptr = Self::slot_ptr(block, index).wrapping_add(POOL_SLOT_HEADER);
        NonNull::new(ptr).unwrap_or_else(|| unreachable!("payload inside a live block is non-null"))
    }
}

impl Allocator for FixedPoolAllocator<'_> {
    fn allocate(&mut self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        validate_alignment(alignment)?;
        if size > POOL_SLOT_PAYLOAD || alignment > POOL_PAYLOAD_ALIGNMENT {
            return Err(AllocError::RequestTooLarge {
                requested: size,
                alignment,
                slot_capacity: POOL_SLOT_PAYLOAD,
            });
        }

        let (block, activated) = self.lease.get_or_acquire()?;
        if activated {
            self.format_block(block);
        }

        let Some(index) = self.first_available else {
            tracing::warn!(capacity = self.max_slots, "fixed pool exhausted");
            return Err(AllocError::PoolExhausted {
                capacity: self.max_slots,
            });
        };

        let mut header = Self::header(block, index);
        assert!(header.live == 0, "free list reached live slot {index}");
        self.first_available = (header.next != NO_SLOT).then(|| header.next as usize);
        header.live = 1;
        header.next = NO_SLOT;
        Self::set_header(block, index, header);

        self.live_slots += 1;
        self.stats.record_allocation(size, POOL_SLOT_FOOTPRINT);
        Ok(Self::payload_ptr(block, index))
    }

    fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        let block = self.lease.block().ok_or(AllocError::InvalidRelease)?;
        let Some(index) = self.slot_of(block, ptr) else {
            tracing::warn!(addr = ptr.as_ptr() as usize, "release of pointer outside the pool");
            return Err(AllocError::InvalidRelease);
        };

        let header = Self::header(block, index);
        if header.live == 0 {
            tracing::warn!(slot = index, "release of a slot that is already free");
            return Err(AllocError::InvalidRelease);
        }

        let next = self.first_available.map_or(NO_SLOT, |head| head as u64);
        Self::set_header(block, index, SlotHeader { next, live: 0 });
        self.first_available = Some(index);

        self.live_slots -= 1;
        self.stats.record_release(POOL_SLOT_FOOTPRINT);
        Ok(())
    }

    fn stats(&self) -> &UsageStats {
        &self.stats
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::FixedPool
    }

    fn mapping(&self) -> MappingType {
        self.lease.mapping()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.lease.size())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.free_count() * POOL_SLOT_FOOTPRINT)
    }
}

impl LifecycleHandler for FixedPoolAllocator<'_> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocate_free() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 10, MappingType::Unclassified);

        let p1 = pool.allocate(42, 8).unwrap();
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(p1.as_ptr() as usize % POOL_PAYLOAD_ALIGNMENT, 0);

        pool.release(p1).unwrap();
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), 10);
    }

    #[test]
    fn test_pool_full() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 2, MappingType::Cpu);

        pool.allocate(1, 1).unwrap();
        pool.allocate(2, 1).unwrap();
        assert_eq!(
            pool.allocate(3, 1),
            Err(AllocError::PoolExhausted { capacity: 2 })
        );
    }

    #[test]
    fn test_pool_reuse_is_lifo() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 4, MappingType::Cpu);

        let slots: Vec<_> = (0..4).map(|_| pool.allocate(16, 16).unwrap()).collect();
        pool.release(slots[1]).unwrap();
        pool.release(slots[3]).unwrap();

        assert_eq!(pool.allocate(16, 16).unwrap(), slots[3]);
        assert_eq!(pool.allocate(16, 16).unwrap(), slots[1]);
    }

    #[test]
    fn test_slots_in_array_order() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 3, MappingType::Gpu);
        let base = pool.allocate(8, 8).unwrap();
        let next = pool.allocate(8, 8).unwrap();

        assert_eq!(base.as_ptr() as usize - pool.block().unwrap().start_addr(), POOL_SLOT_HEADER);
        assert_eq!(next.as_ptr() as usize - base.as_ptr() as usize, POOL_SLOT_FOOTPRINT);
        assert!(registry.contains(next.as_ptr(), MappingType::Gpu));
    }

    #[test]
    fn test_request_too_large() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 4, MappingType::Cpu);

        assert_eq!(
            pool.allocate(POOL_SLOT_PAYLOAD + 1, 8),
            Err(AllocError::RequestTooLarge {
                requested: POOL_SLOT_PAYLOAD + 1,
                alignment: 8,
                slot_capacity: POOL_SLOT_PAYLOAD,
            })
        );
        assert!(matches!(
            pool.allocate(8, 32),
            Err(AllocError::RequestTooLarge { .. })
        ));
        assert!(pool.allocate(POOL_SLOT_PAYLOAD, POOL_PAYLOAD_ALIGNMENT).is_ok());
    }

    #[test]
    fn test_invalid_releases() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 4, MappingType::Cpu);
        let unused = NonNull::new(0x1000 as *mut u8).unwrap();
        assert_eq!(pool.release(unused), Err(AllocError::InvalidRelease));

        let slot = pool.allocate(8, 8).unwrap();
        let interior = NonNull::new(slot.as_ptr().wrapping_add(8)).unwrap();
        assert_eq!(pool.release(interior), Err(AllocError::InvalidRelease));

        pool.release(slot).unwrap();
        assert_eq!(pool.release(slot), Err(AllocError::InvalidRelease));
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn test_payload_is_writable_and_isolated() {
        let registry = SystemBlockRegistry::new();
        let mut pool = FixedPoolAllocator::new(&registry, 8, MappingType::Unclassified);
        let a = pool.allocate(POOL_SLOT_PAYLOAD, 16).unwrap();
        let b = pool.allocate(POOL_SLOT_PAYLOAD, 16).unwrap();

        // SAFETY: both payloads are live, POOL_SLOT_PAYLOAD bytes long, and disjoint.
        unsafe {
            std::ptr::write_bytes(a.as_ptr(), 0xAA, POOL_SLOT_PAYLOAD);
            std::ptr::write_bytes(b.as_ptr(), 0xBB, POOL_SLOT_PAYLOAD);
        }
        pool.release(a).unwrap();
        let c = pool.allocate(4, 4).unwrap();
        assert_eq!(c, a);

        // SAFETY: `b` is still live.
        let b_bytes = unsafe { std::slice::from_raw_parts(b.as_ptr(), POOL_SLOT_PAYLOAD) };
        assert!(b_bytes.iter().all(|&byte| byte == 0xBB));
    }
}
