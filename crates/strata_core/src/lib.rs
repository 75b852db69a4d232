//! # STRATA Core
//!
//! Pluggable allocation strategies for a game engine:
//! - A registry of at most 8 large, 256-byte aligned system blocks
//! - Linear, marker-rollback, ring-frame and fixed-pool strategies over them
//! - An aligned heap allocator for everything else
//!
//! ## Architecture Rules
//!
//! 1. **One platform allocator call per strategy** - Each strategy leases
//!    one block on first use and subdivides it itself
//! 2. **Bulk release** - Lifecycle events move cursors; individual
//!    allocations are only freed by the heap and the pool
//! 3. **Errors are values** - Exhaustion returns [`AllocError`], never a
//!    null pointer
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{
//!     Allocator, LifecycleEvent, LifecycleHandler, MappingType, RingFrameAllocator,
//!     SystemBlockRegistry,
//! };
//!
//! let registry = SystemBlockRegistry::new();
//! let mut frame = RingFrameAllocator::new(&registry, 160 * 1024, MappingType::Cpu);
//!
//! let transforms = frame.allocate(64 * 16, 16)?;
//! assert!(registry.contains(transforms.as_ptr(), MappingType::Cpu));
//!
//! frame.on_event(LifecycleEvent::NextFrame)?;
//! # Ok::<(), strata_core::AllocError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocator;
pub mod error;
pub mod events;
pub mod memory;

pub use allocator::{Allocator, ManagedAllocator, StrategyKind};
pub use error::{AllocError, AllocResult};
pub use events::{EventResponse, LifecycleEvent, LifecycleHandler};
pub use memory::{
    align_up, BlockLease, BumpCursor, FixedPoolAllocator, HeapAllocator, LinearAllocator,
    MappingType, MarkerRollbackAllocator, RingFrameAllocator, SystemBlock, SystemBlockRegistry,
    UsageStats, MAX_SYSTEM_BLOCKS, POOL_PAYLOAD_ALIGNMENT, POOL_SLOT_FOOTPRINT, POOL_SLOT_PAYLOAD,
    RING_FRAME_WINDOW, SYSTEM_BLOCK_ALIGNMENT,
};
