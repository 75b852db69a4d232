//! # Memory Management
//!
//! Registry-backed allocation strategies for predictable game memory.
//!
//! ## Design Philosophy
//!
//! A handful of large system blocks are mapped up front. During gameplay:
//! - Strategies subdivide their own block, never the platform heap
//! - Bulk release happens on lifecycle events, not per object
//! - Predictable, flat latency
//!
//! The general-purpose [`HeapAllocator`] is the one exception and sits
//! outside the registry.

mod cursor;
mod heap;
mod linear;
mod marker;
mod pool;
mod registry;
mod ring;
mod stats;

pub use cursor::{align_up, validate_alignment, Bump, BumpCursor};
pub use heap::HeapAllocator;
pub use linear::LinearAllocator;
pub use marker::MarkerRollbackAllocator;
pub use pool::{
    FixedPoolAllocator, POOL_PAYLOAD_ALIGNMENT, POOL_SLOT_FOOTPRINT, POOL_SLOT_HEADER,
    POOL_SLOT_PAYLOAD,
};
pub use registry::{
    BlockLease, MappingType, SystemBlock, SystemBlockRegistry, MAX_SYSTEM_BLOCKS,
    SYSTEM_BLOCK_ALIGNMENT,
};
pub use ring::{RingFrameAllocator, RING_FRAME_WINDOW};
pub use stats::UsageStats;
