/*!
 * Watcher Module
 * The supervisor loop, per-child performance accounting, and the
 * parent-liveness guard that runs inside the worker
 */

pub mod liveness;
pub mod registry;
pub mod runner;
pub mod state;

pub use liveness::LivenessRunner;
pub use registry::{CounterSample, SanityObservation, Watcher};
pub use runner::{backoff_delay_ms, WatcherRunner};
pub use state::PerformanceState;
