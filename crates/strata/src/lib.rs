//! # STRATA
//!
//! Wires the allocator strategies of `strata_core` into the memory roles a
//! game uses:
//! - One strategy per role, built from a TOML configuration
//! - Lifecycle events routed to the roles that care about them
//! - Usage reports for logs and the CSV data log
//! - A reference soak workload that exercises every role
//!
//! ## Example
//!
//! ```rust
//! use strata::{AllocatorRole, AllocatorRoleSet, SignalRouter};
//! use strata_core::{LifecycleEvent, SystemBlockRegistry};
//!
//! let registry = SystemBlockRegistry::new();
//! let mut roles = AllocatorRoleSet::with_defaults(&registry);
//! let router = SignalRouter::reference();
//!
//! router.dispatch(LifecycleEvent::LevelBeginLoad, &mut roles)?;
//! let terrain = roles.allocate(AllocatorRole::LevelGpu, 8 * 1024 * 1024, 256)?;
//! router.dispatch(LifecycleEvent::LevelUnload, &mut roles)?;
//! # let _ = terrain;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod report;
pub mod roles;
pub mod router;
pub mod soak;

pub use config::{MappingSetting, MemoryConfig, StrategyConfig};
pub use error::{ConfigError, DispatchError, SoakError, SoakResult};
pub use report::{RoleUsage, UsageReport, CSV_HEADER};
pub use roles::{AllocatorRole, AllocatorRoleSet, ROLE_COUNT};
pub use router::{Delivery, SignalRouter};
pub use soak::{
    SoakRunner, SoakSummary, ALLOCATIONS_PER_FRAME, FRAME_ALIGNMENTS, FRAME_COUNT, SMALL_OBJECT_COUNT,
    SMALL_SIZES,
};
