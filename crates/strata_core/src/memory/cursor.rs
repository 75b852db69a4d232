//! # Bump Cursor
//!
//! The shared primitive behind every linear-style strategy: one leased
//! system block plus an offset marking the boundary between used and
//! free space.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::memory::registry::{BlockLease, MappingType, SystemBlock, SystemBlockRegistry};

/// Rounds `addr` up to the next multiple of `alignment`.
///
/// Returns `None` on overflow. `alignment` must be a power of two.
#[inline]
#[must_use]
pub const fn align_up(addr: usize, alignment: usize) -> Option<usize> {
    match addr.checked_add(alignment - 1) {
        Some(bumped) => Some(bumped & !(alignment - 1)),
        None => None,
    }
}

/// Checks that `alignment` is a non-zero power of two.
///
/// # Errors
///
/// [`AllocError::InvalidAlignment`] otherwise.
#[inline]
pub const fn validate_alignment(alignment: usize) -> AllocResult<()> {
    if alignment.is_power_of_two() {
        Ok(())
    } else {
        Err(AllocError::InvalidAlignment(alignment))
    }
}

/// Result of a successful bump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bump {
    /// Aligned start of the allocation.
    pub ptr: NonNull<u8>,
    /// Bytes consumed, alignment padding included.
    pub footprint: usize,
    /// Whether this bump acquired the block.
    pub activated: bool,
}

/// A lazily-acquired block with a bump offset.
///
/// Positions are offsets from the block start, never raw pointers, so a
/// saved position cannot outlive the block it was taken from unnoticed.
///
/// # Thread Safety
///
/// This cursor is NOT thread-safe. Use one cursor per thread.
#[derive(Debug)]
pub struct BumpCursor<'r> {
    lease: BlockLease<'r>,
    offset: usize,
}

impl<'r> BumpCursor<'r> {
    /// Creates an empty cursor that will lease `capacity` bytes on first use.
    #[must_use]
    pub const fn new(registry: &'r SystemBlockRegistry, capacity: usize, mapping: MappingType) -> Self {
        Self {
            lease: BlockLease::new(registry, capacity, mapping),
            offset: 0,
        }
    }

    /// Configured block size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.lease.size()
    }

    /// Current offset from the block start.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left between the cursor and the block end.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    /// Mapping classification of the block.
    #[inline]
    #[must_use]
    pub const fn mapping(&self) -> MappingType {
        self.lease.mapping()
    }

    /// The owned block, if acquired.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> Option<SystemBlock> {
        self.lease.block()
    }

    /// Whether a block is currently owned.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.lease.block().is_some()
    }

    /// Carves `size` bytes aligned to `alignment` off the front of the free space.
    ///
    /// Acquires the block on first call.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidAlignment`], [`AllocError::OutOfSystemBlocks`]
    /// when the block cannot be leased, or [`AllocError::OutOfSpace`].
    pub fn bump(&mut self, size: usize, alignment: usize) -> AllocResult<Bump> {
        validate_alignment(alignment)?;
        let (block, activated) = self.lease.get_or_acquire()?;
        if activated {
            self.offset = 0;
        }

        let out_of_space = AllocError::OutOfSpace {
            requested: size,
            alignment,
            remaining: self.remaining(),
        };

        let cursor_addr = block.start_addr() + self.offset;
        let aligned_addr = align_up(cursor_addr, alignment).ok_or(out_of_space)?;
        let padding = aligned_addr - cursor_addr;
        let footprint = padding.checked_add(size).ok_or(out_of_space)?;
        let start = self.offset + padding;
        // Even an empty request needs an address inside the block.
        if footprint > self.remaining() || start >= self.capacity() {
            return Err(out_of_space);
        }

        self.offset += footprint;
        assert!(self.offset <= self.capacity(), "cursor escaped its block");

        let ptr = Self::block_ptr(block, start);
        debug_assert!(
            self.lease.registry().contains(ptr.as_ptr(), block.mapping()),
            "allocation outside its mapped block"
        );

        Ok(Bump {
            ptr,
            footprint,
            activated,
        })
    }

    /// Moves the cursor back to `offset`.
    ///
    /// Returns the number of bytes reclaimed.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is ahead of the cursor.
    pub fn rewind_to(&mut self, offset: usize) -> usize {
        assert!(
            offset <= self.offset,
            "rewind target {offset} is ahead of cursor {}",
            self.offset
        );
        let reclaimed = self.offset - offset;
        self.offset = offset;
        reclaimed
    }

    /// Moves the cursor back to the block start.
    ///
    /// This is a **zero-cost** operation - no memory is freed or reallocated.
    /// Previous allocations become invalid and must not be used.
    #[inline]
    pub fn reset(&mut self) -> usize {
        self.rewind_to(0)
    }

    /// Returns the whole block to the registry.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidRelease`] unless `ptr` is the block base.
    pub fn release_block(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
        self.lease.release(ptr)?;
        self.offset = 0;
        Ok(())
    }

    /// Pointer to `offset` bytes into `block`.
    #[inline]
    fn block_ptr(block: SystemBlock, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= block.size());
        // SAFETY: `offset` is at most the block size, so the result stays
        // within (or one past the end of) the same live allocation and is
        // derived from a non-null base.
        unsafe { NonNull::new_unchecked(block.base().as_ptr().add(offset)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), Some(0));
        assert_eq!(align_up(1, 16), Some(16));
        assert_eq!(align_up(16, 16), Some(16));
        assert_eq!(align_up(17, 4), Some(20));
        assert_eq!(align_up(usize::MAX, 16), None);
    }

    #[test]
    fn test_lazy_block_and_alignment() {
        let registry = SystemBlockRegistry::new();
        let mut cursor = BumpCursor::new(&registry, 1024, MappingType::Cpu);
        assert!(!cursor.is_active());
        assert_eq!(registry.live_blocks(), 0);

        let first = cursor.bump(3, 1).unwrap();
        assert!(first.activated);
        assert_eq!(first.footprint, 3);

        let second = cursor.bump(8, 64).unwrap();
        assert!(!second.activated);
        assert_eq!(second.ptr.as_ptr() as usize % 64, 0);
        assert_eq!(second.footprint, 61 + 8);
        assert_eq!(cursor.offset(), 72);
        assert_eq!(cursor.remaining(), 1024 - 72);
        assert_eq!(registry.live_blocks(), 1);
    }

    #[test]
    fn test_out_of_space_leaves_cursor_untouched() {
        let registry = SystemBlockRegistry::new();
        let mut cursor = BumpCursor::new(&registry, 256, MappingType::Gpu);
        cursor.bump(200, 16).unwrap();

        assert_eq!(
            cursor.bump(100, 16),
            Err(AllocError::OutOfSpace {
                requested: 100,
                alignment: 16,
                remaining: 56,
            })
        );
        assert_eq!(cursor.offset(), 200);
    }

    #[test]
    fn test_empty_request_at_block_end_is_out_of_space() {
        let registry = SystemBlockRegistry::new();
        let mut cursor = BumpCursor::new(&registry, 256, MappingType::Cpu);

        let empty = cursor.bump(0, 1).unwrap();
        assert!(registry.contains(empty.ptr.as_ptr(), MappingType::Cpu));

        cursor.bump(250, 1).unwrap();
        assert_eq!(
            cursor.bump(0, 16),
            Err(AllocError::OutOfSpace {
                requested: 0,
                alignment: 16,
                remaining: 6,
            })
        );
        cursor.bump(6, 1).unwrap();
        assert!(cursor.bump(0, 1).is_err());
        assert_eq!(cursor.offset(), 256);
    }

    #[test]
    fn test_invalid_alignment_does_not_acquire() {
        let registry = SystemBlockRegistry::new();
        let mut cursor = BumpCursor::new(&registry, 256, MappingType::Cpu);

        assert_eq!(cursor.bump(8, 0), Err(AllocError::InvalidAlignment(0)));
        assert_eq!(cursor.bump(8, 24), Err(AllocError::InvalidAlignment(24)));
        assert!(!cursor.is_active());
    }

    #[test]
    fn test_rewind_and_release() {
        let registry = SystemBlockRegistry::new();
        let mut cursor = BumpCursor::new(&registry, 512, MappingType::Cpu);
        let first = cursor.bump(32, 16).unwrap();
        cursor.bump(64, 16).unwrap();

        assert_eq!(cursor.rewind_to(32), 64);
        assert_eq!(cursor.reset(), 32);

        let inner = cursor.bump(16, 16).unwrap();
        assert_eq!(inner.ptr, first.ptr);
        let interior = cursor.bump(16, 16).unwrap();
        assert_eq!(cursor.release_block(interior.ptr), Err(AllocError::InvalidRelease));

        cursor.release_block(first.ptr).unwrap();
        assert!(!cursor.is_active());
        assert_eq!(registry.live_blocks(), 0);
    }
}
