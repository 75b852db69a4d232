//! # Allocator Roles
//!
//! The seven memory roles a game asks for, and the set of strategies that
//! serve them.
//!
//! ```text
//! ┌──────────────── AllocatorRoleSet<'r> ────────────────┐
//! │ general_heap     -> HeapAllocator                    │
//! │ small_object     -> FixedPoolAllocator  (8192 slots) │
//! │ scratch_space    -> LinearAllocator     (32 MiB)     │
//! │ single_frame_cpu -> RingFrameAllocator  (159 KiB)    │
//! │ single_frame_gpu -> RingFrameAllocator  (159 KiB)    │
//! │ level_cpu        -> LinearAllocator     (10 KiB)     │
//! │ level_gpu        -> MarkerRollback      (156 MiB)    │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ &'r
//!                   SystemBlockRegistry
//! ```

use std::fmt;
use std::ptr::NonNull;

use strata_core::{AllocResult, ManagedAllocator, SystemBlockRegistry};

use crate::config::MemoryConfig;
use crate::error::ConfigError;

/// Number of allocator roles.
pub const ROLE_COUNT: usize = 7;

/// A memory role with its own allocation pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AllocatorRole {
    /// Anything without a better home.
    GeneralHeap,
    /// Small, short-lived objects freed in any order.
    SmallObject,
    /// Temporary working memory for one system at a time.
    ScratchSpace,
    /// CPU data that lives for a few frames.
    SingleFrameCpu,
    /// GPU upload data that lives for a few frames.
    SingleFrameGpu,
    /// CPU data that lives as long as the level.
    LevelCpu,
    /// GPU data that lives as long as the level.
    LevelGpu,
}

impl AllocatorRole {
    /// Every role, in declaration order.
    pub const ALL: [Self; ROLE_COUNT] = [
        Self::GeneralHeap,
        Self::SmallObject,
        Self::ScratchSpace,
        Self::SingleFrameCpu,
        Self::SingleFrameGpu,
        Self::LevelCpu,
        Self::LevelGpu,
    ];

    /// Stable snake_case name, used in configuration files and reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GeneralHeap => "general_heap",
            Self::SmallObject => "small_object",
            Self::ScratchSpace => "scratch_space",
            Self::SingleFrameCpu => "single_frame_cpu",
            Self::SingleFrameGpu => "single_frame_gpu",
            Self::LevelCpu => "level_cpu",
            Self::LevelGpu => "level_gpu",
        }
    }

    /// Looks a role up by its [`name`](Self::name).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.name() == name)
    }

    /// Position in [`ALL`](Self::ALL).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AllocatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One strategy instance per role, all leasing from the same registry.
///
/// Lookup by role cannot fail: the set is complete by construction.
///
/// # Thread Safety
///
/// Not thread-safe. The set borrows a single-threaded registry.
pub struct AllocatorRoleSet<'r> {
    registry: &'r SystemBlockRegistry,
    allocators: [Box<dyn ManagedAllocator + 'r>; ROLE_COUNT],
}

impl<'r> AllocatorRoleSet<'r> {
    /// Builds the set described by `config`.
    ///
    /// No system block is acquired until a role first allocates.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`MemoryConfig::validate`].
    pub fn from_config(registry: &'r SystemBlockRegistry, config: &MemoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let allocators = AllocatorRole::ALL.map(|role| config.strategy(role).build(registry));
        tracing::debug!(roles = ROLE_COUNT, "allocator role set built");
        Ok(Self {
            registry,
            allocators,
        })
    }

    /// Builds the reference wiring.
    #[must_use]
    pub fn with_defaults(registry: &'r SystemBlockRegistry) -> Self {
        let config = MemoryConfig::default();
        Self {
            registry,
            allocators: AllocatorRole::ALL.map(|role| config.strategy(role).build(registry)),
        }
    }

    /// The strategy serving `role`.
    #[inline]
    #[must_use]
    pub fn get(&self, role: AllocatorRole) -> &(dyn ManagedAllocator + 'r) {
        self.allocators[role.index()].as_ref()
    }

    /// The strategy serving `role`, mutably.
    #[inline]
    pub fn get_mut(&mut self, role: AllocatorRole) -> &mut (dyn ManagedAllocator + 'r) {
        self.allocators[role.index()].as_mut()
    }

    /// Allocates from the strategy serving `role`.
    ///
    /// # Errors
    ///
    /// Whatever the strategy returns.
    #[inline]
    pub fn allocate(&mut self, role: AllocatorRole, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        self.get_mut(role).allocate(size, alignment)
    }

    /// Releases through the strategy serving `role`.
    ///
    /// # Errors
    ///
    /// Whatever the strategy returns.
    #[inline]
    pub fn release(&mut self, role: AllocatorRole, ptr: NonNull<u8>) -> AllocResult<()> {
        self.get_mut(role).release(ptr)
    }

    /// Every role with its strategy, in role order.
    pub fn iter(&self) -> impl Iterator<Item = (AllocatorRole, &(dyn ManagedAllocator + 'r))> + '_ {
        AllocatorRole::ALL
            .into_iter()
            .zip(self.allocators.iter().map(|allocator| allocator.as_ref()))
    }

    /// The registry every role leases from.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &'r SystemBlockRegistry {
        self.registry
    }
}

impl fmt::Debug for AllocatorRoleSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (role, allocator) in self.iter() {
            map.entry(&role.name(), &allocator.kind());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{MappingType, StrategyKind};

    #[test]
    fn test_role_names_round_trip() {
        for role in AllocatorRole::ALL {
            assert_eq!(AllocatorRole::from_name(role.name()), Some(role));
            assert_eq!(AllocatorRole::ALL[role.index()], role);
        }
        assert_eq!(AllocatorRole::from_name("level"), None);
    }

    #[test]
    fn test_default_wiring() {
        let registry = SystemBlockRegistry::new();
        let roles = AllocatorRoleSet::with_defaults(&registry);

        let wiring: Vec<_> = roles
            .iter()
            .map(|(_, allocator)| (allocator.kind(), allocator.mapping(), allocator.capacity()))
            .collect();
        assert_eq!(
            wiring,
            vec![
                (StrategyKind::Heap, MappingType::Unclassified, None),
                (StrategyKind::FixedPool, MappingType::Unclassified, Some(8192 * 80)),
                (StrategyKind::Linear, MappingType::Unclassified, Some(32 * 1024 * 1024)),
                (StrategyKind::RingFrame, MappingType::Cpu, Some(159 * 1024)),
                (StrategyKind::RingFrame, MappingType::Gpu, Some(159 * 1024)),
                (StrategyKind::Linear, MappingType::Cpu, Some(10 * 1024)),
                (StrategyKind::MarkerRollback, MappingType::Gpu, Some(156 * 1024 * 1024)),
            ]
        );
        assert_eq!(registry.live_blocks(), 0);
    }

    #[test]
    fn test_roles_lease_from_shared_registry() {
        let registry = SystemBlockRegistry::new();
        let mut roles = AllocatorRoleSet::with_defaults(&registry);

        let frame = roles.allocate(AllocatorRole::SingleFrameGpu, 256, 16).unwrap();
        let level = roles.allocate(AllocatorRole::LevelCpu, 64, 16).unwrap();
        assert!(roles.registry().contains(frame.as_ptr(), MappingType::Gpu));
        assert!(roles.registry().contains(level.as_ptr(), MappingType::Cpu));
        assert_eq!(registry.live_blocks(), 2);

        let boxed = roles.allocate(AllocatorRole::GeneralHeap, 64, 16).unwrap();
        roles.release(AllocatorRole::GeneralHeap, boxed).unwrap();
        assert_eq!(registry.live_blocks(), 2);
    }
}
