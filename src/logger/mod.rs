/*!
 * Logging
 *
 * Library code logs through the `log` facade. The binary routes those
 * records into a tracing subscriber via `init_logging`. The status relay
 * buffers status lines raised while no healthy worker exists and drains
 * them once the supervisor observes a sane one.
 */

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::types::unix_time;

/// Severity of a buffered status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSeverity {
    Info,
    Warning,
    Error,
}

/// One buffered status line awaiting a healthy worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusLog {
    pub severity: StatusSeverity,
    pub message: String,
    pub created: i64,
}

/// Buffered status-log channel toward the active worker
pub struct StatusRelay {
    buffer: Mutex<Vec<StatusLog>>,
}

impl StatusRelay {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Queue a status line for the next sane worker.
    pub fn buffer_status(&self, severity: StatusSeverity, message: impl Into<String>) {
        self.buffer.lock().push(StatusLog {
            severity,
            message: message.into(),
            created: unix_time(),
        });
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Flush buffered status logs to the well-behaved worker.
    ///
    /// The wire toward the worker is a collaborator; this seam drains the
    /// buffer and hands each line to the log pipeline.
    pub fn relay_status_logs(&self) {
        let drained: Vec<StatusLog> = std::mem::take(&mut *self.buffer.lock());
        for status in &drained {
            debug!(
                "Relaying status ({:?}, {}): {}",
                status.severity, status.created, status.message
            );
        }
    }
}

impl Default for StatusRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize the binary's log pipeline: a tracing subscriber fed by both
/// native tracing events and `log` records from library modules.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_log::LogTracer::init();
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_drains_buffer() {
        let relay = StatusRelay::new();
        relay.buffer_status(StatusSeverity::Info, "worker launched");
        relay.buffer_status(StatusSeverity::Warning, "memory limits exceeded");
        assert_eq!(relay.pending(), 2);

        relay.relay_status_logs();
        assert_eq!(relay.pending(), 0);

        // Draining an empty buffer is a no-op.
        relay.relay_status_logs();
        assert_eq!(relay.pending(), 0);
    }
}
