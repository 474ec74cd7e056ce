/*!
 * Process Query Adapter
 *
 * The supervisor's read-side contract for the host process table. The core
 * only compares deltas of the CPU counters, so their units are whatever the
 * host reports natively.
 */

pub mod linux;

use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use linux::ProcPidQuery;

/// One row of the host's process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessRow {
    pub parent_pid: i64,
    /// Cumulative user CPU counter in host-native units
    pub user_time: u64,
    /// Cumulative system CPU counter in host-native units
    pub system_time: u64,
    pub resident_size_bytes: u64,
    /// Path of the process image; empty when the host won't disclose it
    pub image_path: String,
}

/// Process query failures
#[derive(Error, Debug)]
pub enum QueryError {
    /// No process table entry for the pid
    #[error("no process with pid {0}")]
    NotFound(Pid),

    /// The entry exists but a counter field could not be parsed. Callers
    /// reset the sustained-latency counter and skip the tick.
    #[error("malformed process row for pid {pid}: {reason}")]
    Malformed { pid: Pid, reason: String },

    #[error("process table read failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Read-side contract against the host process table
pub trait ProcessQuery: Send + Sync {
    fn query(&self, pid: Pid) -> QueryResult<ProcessRow>;
}
