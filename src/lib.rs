/*!
 * hostwatch
 * Process watchdog core of a host-instrumentation agent
 *
 * A long-lived supervisor launches and monitors one worker and zero or more
 * managed extensions, enforces memory and CPU ceilings from OS-reported
 * counters, restarts failed children with exponential back-off, and gives up
 * on extensions that misbehave repeatedly.
 */

pub mod config;
pub mod core;
pub mod logger;
pub mod platform;
pub mod query;
pub mod shutdown;
pub mod watcher;

pub use crate::core::{limit, Level, LimitKind, WatchdogError};
pub use config::{Config, WatchdogOptions};
pub use logger::{init_logging, StatusRelay};
pub use platform::ProcessHandle;
pub use query::{ProcPidQuery, ProcessQuery, ProcessRow, QueryError};
pub use shutdown::ShutdownController;
pub use watcher::{LivenessRunner, PerformanceState, Watcher, WatcherRunner};
