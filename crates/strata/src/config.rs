//! Memory configuration: which strategy serves each role, and which roles
//! hear which lifecycle events.
//!
//! # Example Config
//!
//! ```toml
//! [scratch_space]
//! strategy = "linear"
//! size = 33554432
//! mapping = "unclassified"
//!
//! [small_object]
//! strategy = "pool"
//! slots = 8192
//!
//! [level_gpu]
//! strategy = "marker"
//! size = 163577856
//! mapping = "gpu"
//!
//! [routing]
//! flush_scratch = ["scratch_space"]
//! next_frame = ["single_frame_cpu", "single_frame_gpu"]
//! ```
//!
//! Omitted roles keep their default strategy. A `[routing]` table, when
//! present, replaces the default routing as a whole.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::{
    FixedPoolAllocator, HeapAllocator, LifecycleEvent, LinearAllocator, ManagedAllocator,
    MappingType, MarkerRollbackAllocator, RingFrameAllocator, SystemBlockRegistry,
    POOL_SLOT_FOOTPRINT,
};

use crate::error::ConfigError;
use crate::roles::AllocatorRole;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Mapping classification as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSetting {
    /// CPU-visible memory.
    Cpu,
    /// GPU-visible memory.
    Gpu,
    /// No particular visibility.
    #[default]
    Unclassified,
}

impl From<MappingSetting> for MappingType {
    fn from(setting: MappingSetting) -> Self {
        match setting {
            MappingSetting::Cpu => Self::Cpu,
            MappingSetting::Gpu => Self::Gpu,
            MappingSetting::Unclassified => Self::Unclassified,
        }
    }
}

/// The strategy serving one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Aligned platform heap. Owns no registry block.
    Heap,
    /// Bump allocator over one block.
    Linear {
        /// Block size in bytes.
        size: usize,
        /// Block mapping.
        #[serde(default)]
        mapping: MappingSetting,
    },
    /// Bump allocator with a single rollback marker.
    Marker {
        /// Block size in bytes.
        size: usize,
        /// Block mapping.
        #[serde(default)]
        mapping: MappingSetting,
    },
    /// Bump allocator that wraps every few frames.
    Ring {
        /// Block size in bytes.
        size: usize,
        /// Block mapping.
        #[serde(default)]
        mapping: MappingSetting,
    },
    /// Fixed-size slot pool.
    Pool {
        /// Number of slots.
        slots: usize,
        /// Block mapping.
        #[serde(default)]
        mapping: MappingSetting,
    },
}

impl StrategyConfig {
    /// Instantiates the strategy against `registry`.
    ///
    /// # Panics
    ///
    /// Panics on a pool of zero slots; [`MemoryConfig::validate`] rejects those.
    #[must_use]
    pub fn build<'r>(self, registry: &'r SystemBlockRegistry) -> Box<dyn ManagedAllocator + 'r> {
        match self {
            Self::Heap => Box::new(HeapAllocator::new()),
            Self::Linear { size, mapping } => Box::new(LinearAllocator::new(registry, size, mapping.into())),
            Self::Marker { size, mapping } => {
                Box::new(MarkerRollbackAllocator::new(registry, size, mapping.into()))
            }
            Self::Ring { size, mapping } => Box::new(RingFrameAllocator::new(registry, size, mapping.into())),
            Self::Pool { slots, mapping } => Box::new(FixedPoolAllocator::new(registry, slots, mapping.into())),
        }
    }

    fn validate(self, role: AllocatorRole) -> Result<(), ConfigError> {
        match self {
            Self::Heap => Ok(()),
            Self::Linear { size, .. } | Self::Marker { size, .. } | Self::Ring { size, .. } => {
                if size == 0 {
                    Err(ConfigError::ZeroBlockSize { role })
                } else {
                    Ok(())
                }
            }
            Self::Pool { slots, .. } => {
                if slots == 0 {
                    return Err(ConfigError::ZeroPoolSlots { role });
                }
                if slots.checked_mul(POOL_SLOT_FOOTPRINT).is_none() {
                    return Err(ConfigError::PoolTooLarge { role, slots });
                }
                Ok(())
            }
        }
    }
}

/// Complete memory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Strategy for [`AllocatorRole::GeneralHeap`].
    pub general_heap: StrategyConfig,
    /// Strategy for [`AllocatorRole::SmallObject`].
    pub small_object: StrategyConfig,
    /// Strategy for [`AllocatorRole::ScratchSpace`].
    pub scratch_space: StrategyConfig,
    /// Strategy for [`AllocatorRole::SingleFrameCpu`].
    pub single_frame_cpu: StrategyConfig,
    /// Strategy for [`AllocatorRole::SingleFrameGpu`].
    pub single_frame_gpu: StrategyConfig,
    /// Strategy for [`AllocatorRole::LevelCpu`].
    pub level_cpu: StrategyConfig,
    /// Strategy for [`AllocatorRole::LevelGpu`].
    pub level_gpu: StrategyConfig,
    /// Event name to subscribed role names.
    pub routing: BTreeMap<String, Vec<String>>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            general_heap: StrategyConfig::Heap,
            small_object: StrategyConfig::Pool {
                slots: 8192,
                mapping: MappingSetting::Unclassified,
            },
            scratch_space: StrategyConfig::Linear {
                size: 32 * MIB,
                mapping: MappingSetting::Unclassified,
            },
            single_frame_cpu: StrategyConfig::Ring {
                size: 159 * KIB,
                mapping: MappingSetting::Cpu,
            },
            single_frame_gpu: StrategyConfig::Ring {
                size: 159 * KIB,
                mapping: MappingSetting::Gpu,
            },
            level_cpu: StrategyConfig::Linear {
                size: 10 * KIB,
                mapping: MappingSetting::Cpu,
            },
            level_gpu: StrategyConfig::Marker {
                size: 156 * MIB,
                mapping: MappingSetting::Gpu,
            },
            routing: default_routing(),
        }
    }
}

/// Reference routing: scratch flush, level GPU load/unload, and both
/// single-frame rings on `NextFrame`.
pub(crate) const REFERENCE_ROUTES: [(LifecycleEvent, &[AllocatorRole]); 4] = [
    (LifecycleEvent::FlushScratch, &[AllocatorRole::ScratchSpace]),
    (LifecycleEvent::LevelBeginLoad, &[AllocatorRole::LevelGpu]),
    (LifecycleEvent::LevelUnload, &[AllocatorRole::LevelGpu]),
    (
        LifecycleEvent::NextFrame,
        &[AllocatorRole::SingleFrameCpu, AllocatorRole::SingleFrameGpu],
    ),
];

fn default_routing() -> BTreeMap<String, Vec<String>> {
    REFERENCE_ROUTES
        .iter()
        .map(|(event, roles)| {
            (
                event.name().to_owned(),
                roles.iter().map(|role| role.name().to_owned()).collect(),
            )
        })
        .collect()
}

impl MemoryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, or any validation error.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "memory config loaded");
        Ok(config)
    }

    /// Checks sizes and the routing table.
    ///
    /// # Errors
    ///
    /// The first problem found, in role order, then routing order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in AllocatorRole::ALL {
            self.strategy(role).validate(role)?;
        }
        self.routes().map(|_| ())
    }

    /// The strategy configured for `role`.
    #[must_use]
    pub const fn strategy(&self, role: AllocatorRole) -> StrategyConfig {
        match role {
            AllocatorRole::GeneralHeap => self.general_heap,
            AllocatorRole::SmallObject => self.small_object,
            AllocatorRole::ScratchSpace => self.scratch_space,
            AllocatorRole::SingleFrameCpu => self.single_frame_cpu,
            AllocatorRole::SingleFrameGpu => self.single_frame_gpu,
            AllocatorRole::LevelCpu => self.level_cpu,
            AllocatorRole::LevelGpu => self.level_gpu,
        }
    }

    /// The routing table resolved to typed events and roles.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownEvent`] or [`ConfigError::UnknownRole`].
    pub fn routes(&self) -> Result<Vec<(LifecycleEvent, AllocatorRole)>, ConfigError> {
        let mut routes = Vec::new();
        for (event_name, role_names) in &self.routing {
            let event = LifecycleEvent::from_name(event_name).ok_or_else(|| ConfigError::UnknownEvent {
                name: event_name.clone(),
            })?;
            for role_name in role_names {
                let role = AllocatorRole::from_name(role_name).ok_or_else(|| ConfigError::UnknownRole {
                    event,
                    name: role_name.clone(),
                })?;
                routes.push((event, role));
            }
        }
        Ok(routes)
    }
}
