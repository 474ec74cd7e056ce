/*!
 * Parent-Liveness Loop
 *
 * Runs inside the worker: every poll interval, probe the supervisor pid the
 * worker was launched with. When the supervisor is gone the worker must
 * follow, otherwise a killed watchdog leaves an unsupervised collector
 * behind.
 */

use log::info;
use std::sync::Arc;

use crate::core::limits::{limit, Level, LimitKind};
use crate::core::types::EXIT_SUCCESS;
use crate::platform::ProcessHandle;
use crate::shutdown::ShutdownController;

/// Worker-side loop bound to the supervisor's lifetime
pub struct LivenessRunner {
    launcher: ProcessHandle,
    shutdown: Arc<ShutdownController>,
    level: Level,
}

impl LivenessRunner {
    pub fn new(launcher: ProcessHandle, shutdown: Arc<ShutdownController>, level: Level) -> Self {
        Self {
            launcher,
            shutdown,
            level,
        }
    }

    /// Poll the supervisor until it dies or shutdown is requested.
    pub fn run(&self) {
        while !self.shutdown.interrupted() {
            if !self.launcher.alive() {
                info!(
                    "Worker ({}) detected killed watchdog ({})",
                    std::process::id(),
                    self.launcher.pid().unwrap_or_default()
                );
                self.shutdown.request_shutdown(EXIT_SUCCESS);
                break;
            }
            self.shutdown
                .pause_millis(limit(LimitKind::PollIntervalSec, self.level).saturating_mul(1000));
        }
    }
}
