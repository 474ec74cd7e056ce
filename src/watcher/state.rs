/*!
 * Performance State
 * Per-child running counters used to decide sanity
 */

use serde::{Deserialize, Serialize};

/// Running counters for one monitored child
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PerformanceState {
    /// Consecutive poll intervals the child exceeded the CPU threshold
    pub sustained_latency_ticks: u32,
    /// Per-second-normalised user CPU counter at the previous poll
    pub last_user_time: u64,
    /// Per-second-normalised system CPU counter at the previous poll
    pub last_system_time: u64,
    /// Resident-set baseline captured on the first sanity check; startup
    /// allocations are not counted against the memory limit
    pub initial_footprint_bytes: u64,
    /// UNIX seconds of the last successful launch (0 before first launch)
    pub last_respawn_time: i64,
}

impl PerformanceState {
    /// Zero the counters for a fresh launch at `respawn_time`.
    pub fn reset(&mut self, respawn_time: i64) {
        self.sustained_latency_ticks = 0;
        self.last_user_time = 0;
        self.last_system_time = 0;
        self.initial_footprint_bytes = 0;
        self.last_respawn_time = respawn_time;
    }
}
