/*!
 * Watchdog Limits
 *
 * Centralized table mapping a performance level and a limit kind to the
 * numeric threshold the supervisor enforces. Levels harden left to right:
 * 0=loose, 1=normal, 2=restrictive, 3=debug.
 */

use serde::{Deserialize, Serialize};

/// Performance limit level (0=loose, 1=normal, 2=restrictive, 3=debug).
/// Levels above 3 clamp to the debug column.
pub type Level = u8;

/// The debug column index; also the clamp ceiling for out-of-range levels.
pub const LEVEL_DEBUG: Level = 3;

/// Kinds of limits the supervisor enforces on monitored children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Maximum MiB a child may privately allocate past its initial footprint
    MemoryBytes,
    /// Percent of user or system CPU a child may utilize, per second
    CpuUtilizationPctPerSec,
    /// Seconds a child should run before its exit counts as "too quick"
    RespawnFloorSec,
    /// Base delay applied before respawning a quickly-failing worker
    RespawnDelaySec,
    /// Seconds of tolerable sustained CPU over-utilization
    SustainedLatencyCapSec,
    /// How often to poll children for limit violations
    PollIntervalSec,
}

/// Canonical thresholds, one row per `LimitKind`, one column per level.
const WATCHDOG_LIMITS: [[u64; 4]; 6] = [
    // MemoryBytes (MiB)
    [80, 50, 30, 1000],
    // CpuUtilizationPctPerSec
    [90, 80, 60, 1000],
    // RespawnFloorSec
    [20, 20, 20, 5],
    // RespawnDelaySec
    [5, 5, 5, 1],
    // SustainedLatencyCapSec
    [12, 6, 3, 1],
    // PollIntervalSec
    [3, 3, 3, 1],
];

/// Look up the threshold for a limit kind at a performance level.
///
/// Levels above `LEVEL_DEBUG` clamp to the debug column. The table is total
/// over `LimitKind`, so every lookup yields a configured value.
pub fn limit(kind: LimitKind, level: Level) -> u64 {
    WATCHDOG_LIMITS[kind as usize][level.min(LEVEL_DEBUG) as usize]
}
