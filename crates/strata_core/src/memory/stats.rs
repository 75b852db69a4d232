//! # Usage Statistics
//!
//! Counters every strategy keeps for the external usage report.
//! Bytes always include alignment padding.

/// Running usage counters for one allocator.
///
/// "Active" counters describe the current window: everything handed out
/// since the last reset, flush, wraparound or rollback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageStats {
    active_bytes: usize,
    active_allocations: usize,
    window_peak_bytes: usize,
    window_peak_allocations: usize,
    peak_active_bytes: usize,
    peak_allocation_count: usize,
    largest_single_allocation: usize,
    total_bytes: u64,
    total_allocations: u64,
    last_window_peak_bytes: usize,
    last_window_peak_allocations: usize,
    windows_closed: u64,
}

impl UsageStats {
    /// Creates zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active_bytes: 0,
            active_allocations: 0,
            window_peak_bytes: 0,
            window_peak_allocations: 0,
            peak_active_bytes: 0,
            peak_allocation_count: 0,
            largest_single_allocation: 0,
            total_bytes: 0,
            total_allocations: 0,
            last_window_peak_bytes: 0,
            last_window_peak_allocations: 0,
            windows_closed: 0,
        }
    }

    /// Records one allocation of `requested` bytes that consumed `footprint` bytes.
    #[inline]
    pub fn record_allocation(&mut self, requested: usize, footprint: usize) {
        self.active_bytes += footprint;
        self.active_allocations += 1;
        self.total_bytes += footprint as u64;
        self.total_allocations += 1;

        self.window_peak_bytes = self.window_peak_bytes.max(self.active_bytes);
        self.window_peak_allocations = self.window_peak_allocations.max(self.active_allocations);
        self.peak_active_bytes = self.peak_active_bytes.max(self.active_bytes);
        self.peak_allocation_count = self.peak_allocation_count.max(self.active_allocations);
        self.largest_single_allocation = self.largest_single_allocation.max(requested);
    }

    /// Records the release of one allocation of `footprint` bytes.
    #[inline]
    pub fn record_release(&mut self, footprint: usize) {
        self.record_rewind(footprint, 1);
    }

    /// Records `bytes` and `allocations` reclaimed in bulk.
    #[inline]
    pub fn record_rewind(&mut self, bytes: usize, allocations: usize) {
        self.active_bytes = self.active_bytes.saturating_sub(bytes);
        self.active_allocations = self.active_allocations.saturating_sub(allocations);
    }

    /// Closes the current window and zeroes the active counters.
    ///
    /// The window's peaks become the `last_window_*` values.
    pub fn roll_window(&mut self) {
        self.last_window_peak_bytes = self.window_peak_bytes;
        self.last_window_peak_allocations = self.window_peak_allocations;
        self.active_bytes = 0;
        self.active_allocations = 0;
        self.window_peak_bytes = 0;
        self.window_peak_allocations = 0;
        self.windows_closed += 1;
    }

    /// Bytes in use in the current window.
    #[inline]
    #[must_use]
    pub const fn active_bytes(&self) -> usize {
        self.active_bytes
    }

    /// Allocations live in the current window.
    #[inline]
    #[must_use]
    pub const fn active_allocations(&self) -> usize {
        self.active_allocations
    }

    /// Highest `active_bytes` ever reached.
    #[inline]
    #[must_use]
    pub const fn peak_active_bytes(&self) -> usize {
        self.peak_active_bytes
    }

    /// Highest `active_allocations` ever reached.
    #[inline]
    #[must_use]
    pub const fn peak_allocation_count(&self) -> usize {
        self.peak_allocation_count
    }

    /// Largest single request in bytes, padding excluded.
    #[inline]
    #[must_use]
    pub const fn largest_single_allocation(&self) -> usize {
        self.largest_single_allocation
    }

    /// Bytes handed out over the allocator's lifetime.
    #[inline]
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Allocations served over the allocator's lifetime.
    #[inline]
    #[must_use]
    pub const fn total_allocations(&self) -> u64 {
        self.total_allocations
    }

    /// Peak bytes of the most recently closed window.
    #[inline]
    #[must_use]
    pub const fn last_window_peak_bytes(&self) -> usize {
        self.last_window_peak_bytes
    }

    /// Peak allocation count of the most recently closed window.
    #[inline]
    #[must_use]
    pub const fn last_window_peak_allocations(&self) -> usize {
        self.last_window_peak_allocations
    }

    /// Number of windows closed so far.
    #[inline]
    #[must_use]
    pub const fn windows_closed(&self) -> u64 {
        self.windows_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peaks_track_maximum() {
        let mut stats = UsageStats::new();
        stats.record_allocation(100, 112);
        stats.record_allocation(20, 32);
        stats.record_release(32);
        stats.record_allocation(8, 16);

        assert_eq!(stats.active_bytes(), 128);
        assert_eq!(stats.active_allocations(), 2);
        assert_eq!(stats.peak_active_bytes(), 144);
        assert_eq!(stats.peak_allocation_count(), 2);
        assert_eq!(stats.largest_single_allocation(), 100);
        assert_eq!(stats.total_bytes(), 160);
        assert_eq!(stats.total_allocations(), 3);
    }

    #[test]
    fn test_roll_window() {
        let mut stats = UsageStats::new();
        stats.record_allocation(64, 64);
        stats.record_allocation(64, 80);
        stats.roll_window();

        assert_eq!(stats.active_bytes(), 0);
        assert_eq!(stats.active_allocations(), 0);
        assert_eq!(stats.last_window_peak_bytes(), 144);
        assert_eq!(stats.last_window_peak_allocations(), 2);
        assert_eq!(stats.windows_closed(), 1);

        stats.record_allocation(16, 16);
        stats.roll_window();
        assert_eq!(stats.last_window_peak_bytes(), 16);
        assert_eq!(stats.peak_active_bytes(), 144);
    }
}
