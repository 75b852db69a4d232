//! # Usage Report
//!
//! A snapshot of every role's counters, for logs and for the CSV data log.

use std::io::{self, Write};

use strata_core::{MappingType, StrategyKind, UsageStats};

use crate::roles::{AllocatorRole, AllocatorRoleSet};

/// CSV column names, in row order.
pub const CSV_HEADER: &str = "role,strategy,mapping,capacity,remaining,largest_allocation,\
peak_bytes,peak_allocations,active_bytes,active_allocations,total_bytes,total_allocations,\
last_window_peak_bytes";

/// Counters for one role at snapshot time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleUsage {
    /// Role.
    pub role: AllocatorRole,
    /// Strategy serving it.
    pub kind: StrategyKind,
    /// Mapping of the memory served.
    pub mapping: MappingType,
    /// Backing bytes, if bounded.
    pub capacity: Option<usize>,
    /// Bytes still available, if bounded.
    pub remaining: Option<usize>,
    /// Counters.
    pub stats: UsageStats,
}

impl RoleUsage {
    fn write_csv_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let optional = |value: Option<usize>| value.map_or_else(String::new, |v| v.to_string());
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.role,
            self.kind,
            self.mapping,
            optional(self.capacity),
            optional(self.remaining),
            self.stats.largest_single_allocation(),
            self.stats.peak_active_bytes(),
            self.stats.peak_allocation_count(),
            self.stats.active_bytes(),
            self.stats.active_allocations(),
            self.stats.total_bytes(),
            self.stats.total_allocations(),
            self.stats.last_window_peak_bytes(),
        )
    }
}

/// Every role's usage plus registry occupancy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageReport {
    rows: Vec<RoleUsage>,
    live_blocks: usize,
    live_block_bytes: usize,
}

impl UsageReport {
    /// Snapshots `roles` and their registry.
    #[must_use]
    pub fn capture(roles: &AllocatorRoleSet<'_>) -> Self {
        let rows = roles
            .iter()
            .map(|(role, allocator)| RoleUsage {
                role,
                kind: allocator.kind(),
                mapping: allocator.mapping(),
                capacity: allocator.capacity(),
                remaining: allocator.remaining(),
                stats: *allocator.stats(),
            })
            .collect();
        Self {
            rows,
            live_blocks: roles.registry().live_blocks(),
            live_block_bytes: roles.registry().live_bytes(),
        }
    }

    /// One row per role, in role order.
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[RoleUsage] {
        &self.rows
    }

    /// The row for `role`.
    #[must_use]
    pub fn row(&self, role: AllocatorRole) -> Option<&RoleUsage> {
        self.rows.iter().find(|row| row.role == role)
    }

    /// Registry blocks live at snapshot time.
    #[inline]
    #[must_use]
    pub const fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Bytes in live registry blocks at snapshot time.
    #[inline]
    #[must_use]
    pub const fn live_block_bytes(&self) -> usize {
        self.live_block_bytes
    }

    /// Emits one `info!` event per role.
    pub fn log(&self) {
        tracing::info!(
            live_blocks = self.live_blocks,
            live_block_bytes = self.live_block_bytes,
            "system block registry"
        );
        for row in &self.rows {
            tracing::info!(
                role = %row.role,
                strategy = %row.kind,
                mapping = %row.mapping,
                capacity = ?row.capacity,
                largest_allocation = row.stats.largest_single_allocation(),
                peak_bytes = row.stats.peak_active_bytes(),
                peak_allocations = row.stats.peak_allocation_count(),
                total_allocations = row.stats.total_allocations(),
                "allocator usage"
            );
        }
    }

    /// Writes the header and one row per role as CSV.
    ///
    /// # Errors
    ///
    /// Any error from `out`.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{CSV_HEADER}")?;
        for row in &self.rows {
            row.write_csv_row(out)?;
        }
        out.flush()
    }
}
