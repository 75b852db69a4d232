//! # System Block Registry
//!
//! The only component that talks to the platform allocator.
//!
//! ## Safety Note
//!
//! This module owns the raw `std::alloc` calls. Every block is allocated
//! with a layout that is recorded in its registry slot and freed with the
//! same layout exactly once.

#![allow(unsafe_code)]
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────── SystemBlockRegistry ────────────────────────┐
//! │ slot 0 │ slot 1 │ slot 2 │ slot 3 │ slot 4 │ slot 5 │ slot 6 │ slot 7 │
//! └───┬────┴───┬────┴────────┴────────┴────────┴────────┴────────┴────────┘
//!     │        │
//!     ▼        ▼
//!  [ CPU 10 KiB ]  [ GPU 156 MiB ]   <- 256-byte aligned, zeroed
//! ```
//!
//! There are very few blocks, so strategies lease one each and subdivide
//! it themselves.

use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{AllocError, AllocResult};

/// Maximum number of system blocks alive at once.
pub const MAX_SYSTEM_BLOCKS: usize = 8;

/// Base alignment of every system block.
pub const SYSTEM_BLOCK_ALIGNMENT: usize = 256;

/// Hardware mapping classification of a system block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MappingType {
    /// CPU-visible memory.
    Cpu,
    /// GPU-visible memory.
    Gpu,
    /// No mapping requirement.
    Unclassified,
}

impl MappingType {
    /// All mapping classifications.
    pub const ALL: [Self; 3] = [Self::Cpu, Self::Gpu, Self::Unclassified];

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw block handed out by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemBlock {
    base: NonNull<u8>,
    size: usize,
    mapping: MappingType,
}

impl SystemBlock {
    /// First byte of the block.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Mapping classification.
    #[inline]
    #[must_use]
    pub const fn mapping(&self) -> MappingType {
        self.mapping
    }

    /// Address of the first byte.
    #[inline]
    #[must_use]
    pub fn start_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Address one past the last byte.
    #[inline]
    #[must_use]
    pub fn end_addr(&self) -> usize {
        self.start_addr() + self.size
    }

    /// Whether `ptr` lies in `[base, base + size)`.
    #[inline]
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.start_addr() <= addr && addr < self.end_addr()
    }

    /// Offset of `ptr` from the block base, if it lies inside the block.
    #[inline]
    #[must_use]
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        self.contains(ptr).then(|| ptr as usize - self.start_addr())
    }

    fn layout(&self) -> Layout {
        // Validated when the block was created.
        Layout::from_size_align(self.size, SYSTEM_BLOCK_ALIGNMENT)
            .unwrap_or_else(|_| unreachable!("system block layout was validated on acquire"))
    }
}

/// Fixed-capacity table of live system blocks.
///
/// The registry is an explicit context object: whoever builds the
/// allocators owns it and lends it to each strategy.
///
/// # Thread Safety
///
/// This registry is NOT thread-safe. It is meant for a single update loop.
pub struct SystemBlockRegistry {
    slots: RefCell<[Option<SystemBlock>; MAX_SYSTEM_BLOCKS]>,
}

impl SystemBlockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RefCell::new([None; MAX_SYSTEM_BLOCKS]),
        }
    }

    /// Number of slots in the registry.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        MAX_SYSTEM_BLOCKS
    }

    /// Number of blocks currently live.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.slots.borrow().iter().flatten().count()
    }

    /// Total bytes held across live blocks.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.slots.borrow().iter().flatten().map(SystemBlock::size).sum()
    }

    /// Acquires a zeroed block of `size` bytes aligned to [`SYSTEM_BLOCK_ALIGNMENT`].
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfSystemBlocks`] when every slot is live,
    /// [`AllocError::ZeroSizedBlock`] for `size == 0`, and
    /// [`AllocError::OutOfSpace`] when `size` cannot form a valid layout.
    pub fn acquire(&self, size: usize, mapping: MappingType) -> AllocResult<SystemBlock> {
        if size == 0 {
            return Err(AllocError::ZeroSizedBlock);
        }

        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots.iter_mut().find(|slot| slot.is_none()) else {
            tracing::warn!(size, %mapping, capacity = MAX_SYSTEM_BLOCKS, "system block registry exhausted");
            return Err(AllocError::OutOfSystemBlocks {
                capacity: MAX_SYSTEM_BLOCKS,
            });
        };

        let layout = Layout::from_size_align(size, SYSTEM_BLOCK_ALIGNMENT).map_err(|_| {
            AllocError::OutOfSpace {
                requested: size,
                alignment: SYSTEM_BLOCK_ALIGNMENT,
                remaining: 0,
            }
        })?;

        // SAFETY: `layout` has a non-zero size (checked above).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        let block = SystemBlock {
            base,
            size,
            mapping,
        };
        *slot = Some(block);

        tracing::debug!(size, %mapping, addr = block.start_addr(), "system block acquired");
        Ok(block)
    }

    /// Releases the block whose base pointer is exactly `ptr`.
    ///
    /// Partial-pointer release is not supported.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidRelease`] if no live block starts at `ptr`.
    pub fn release(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .iter_mut()
            .find(|slot| slot.is_some_and(|block| block.base == ptr))
            .ok_or(AllocError::InvalidRelease)?;

        if let Some(block) = slot.take() {
            // SAFETY: the block was allocated in `acquire` with exactly this
            // layout and is removed from the table before being freed, so it
            // is freed once.
            unsafe { alloc::dealloc(block.base.as_ptr(), block.layout()) };
            tracing::debug!(size = block.size, mapping = %block.mapping, "system block released");
        }
        Ok(())
    }

    /// Whether `ptr` lies inside some live block of the given mapping.
    ///
    /// The query is exact for every tag, [`MappingType::Unclassified`] included.
    #[must_use]
    pub fn contains(&self, ptr: *const u8, mapping: MappingType) -> bool {
        self.slots
            .borrow()
            .iter()
            .flatten()
            .any(|block| block.mapping == mapping && block.contains(ptr))
    }

    /// The live block that contains `ptr`, if any.
    #[must_use]
    pub fn block_containing(&self, ptr: *const u8) -> Option<SystemBlock> {
        self.slots
            .borrow()
            .iter()
            .flatten()
            .find(|block| block.contains(ptr))
            .copied()
    }
}

impl Default for SystemBlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SystemBlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemBlockRegistry")
            .field("live_blocks", &self.live_blocks())
            .field("live_bytes", &self.live_bytes())
            .finish()
    }
}

impl Drop for SystemBlockRegistry {
    fn drop(&mut self) {
        for block in self.slots.get_mut().iter_mut().filter_map(Option::take) {
            tracing::warn!(size = block.size, mapping = %block.mapping, "system block leaked, freeing at shutdown");
            // SAFETY: same layout as in `acquire`, and the slot was cleared.
            unsafe { alloc::dealloc(block.base.as_ptr(), block.layout()) };
        }
    }
}

/// One strategy's claim on a system block.
///
/// The block is acquired lazily on first use and returned to the registry
/// on [`BlockLease::release`] or drop.
pub struct BlockLease<'r> {
    registry: &'r SystemBlockRegistry,
    block: Option<SystemBlock>,
    size: usize,
    mapping: MappingType,
}

impl<'r> BlockLease<'r> {
    /// Creates an empty lease for a block of `size` bytes.
    #[must_use]
    pub const fn new(registry: &'r SystemBlockRegistry, size: usize, mapping: MappingType) -> Self {
        Self {
            registry,
            block: None,
            size,
            mapping,
        }
    }

    /// The leased block, if acquired.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> Option<SystemBlock> {
        self.block
    }

    /// Configured block size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Mapping classification the block is requested with.
    #[inline]
    #[must_use]
    pub const fn mapping(&self) -> MappingType {
        self.mapping
    }

    /// The registry the block is leased from.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &'r SystemBlockRegistry {
        self.registry
    }

    /// Returns the block, acquiring it from the registry on first call.
    ///
    /// The `bool` is `true` when this call performed the acquisition.
    ///
    /// # Errors
    ///
    /// Propagates registry failures such as [`AllocError::OutOfSystemBlocks`].
    pub fn get_or_acquire(&mut self) -> AllocResult<(SystemBlock, bool)> {
        if let Some(block) = self.block {
            return Ok((block, false));
        }
        let block = self.registry.acquire(self.size, self.mapping)?;
        self.block = Some(block);
        Ok((block, true))
    }

    /// Returns the whole block to the registry.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidRelease`] if no block is held or `ptr` is not its base.
    pub fn release(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        match self.block {
            Some(block) if block.base == ptr => {
                self.registry.release(ptr)?;
                self.block = None;
                Ok(())
            }
            _ => Err(AllocError::InvalidRelease),
        }
    }
}

impl Drop for BlockLease<'_> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            if self.registry.release(block.base).is_err() {
                tracing::error!(size = block.size, "leased block missing from registry");
            }
        }
    }
}

impl fmt::Debug for BlockLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockLease")
            .field("block", &self.block)
            .field("size", &self.size)
            .field("mapping", &self.mapping)
            .finish()
    }
}
