/*!
 * Supervisor Loop
 *
 * The watchdog's core: one dedicated thread that inspects each monitored
 * child every poll interval, enforces the performance limits, restarts
 * failed children with exponential back-off, and gives up on extensions
 * that cannot be relaunched.
 */

use log::{debug, error, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use super::registry::{CounterSample, Watcher};
use crate::config::Config;
use crate::core::limits::{limit, Level, LimitKind};
use crate::core::types::{unix_time, EXIT_CATASTROPHIC, EXIT_FAILURE, EXIT_SUCCESS};
use crate::logger::StatusRelay;
use crate::platform::launch::EXTENSIONS_ENV;
use crate::platform::{
    canonical_path, check_child_status, launch_extension, launch_worker, reap_defunct_children,
    safe_permissions, LaunchError, LaunchResult, ProcessCheck, ProcessHandle,
};
use crate::query::{ProcessQuery, QueryError};
use crate::shutdown::ShutdownController;

const MIB: u64 = 1024 * 1024;

/// Delay applied before respawning a too-quickly-failing worker: the
/// configured base plus an exponential term in the restart count.
pub fn backoff_delay_ms(level: Level, restart_count: u32) -> u64 {
    let base = limit(LimitKind::RespawnDelaySec, level).saturating_mul(1000);
    base.saturating_add(2u64.saturating_pow(restart_count).saturating_mul(1000))
}

/// The supervisor loop over one worker and the managed extensions
pub struct WatcherRunner {
    watcher: Arc<Watcher>,
    query: Arc<dyn ProcessQuery>,
    shutdown: Arc<ShutdownController>,
    relay: Arc<StatusRelay>,
    config: Arc<Config>,
    level: Level,
    use_worker: bool,
    argv: Vec<String>,
}

impl WatcherRunner {
    pub fn new(
        watcher: Arc<Watcher>,
        query: Arc<dyn ProcessQuery>,
        shutdown: Arc<ShutdownController>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            watcher,
            query,
            shutdown,
            relay: Arc::new(StatusRelay::new()),
            config,
            level: 0,
            use_worker: true,
            argv: std::env::args().collect(),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Monitor extensions only; no worker slot.
    #[must_use]
    pub fn without_worker(mut self) -> Self {
        self.use_worker = false;
        self
    }

    #[must_use]
    pub fn with_status_relay(mut self, relay: Arc<StatusRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// Override the argv a spawned worker re-executes with.
    #[must_use]
    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    /// Resolve a limit at this runner's configured level.
    pub fn worker_limit(&self, kind: LimitKind) -> u64 {
        limit(kind, self.level)
    }

    /// Enter the watch loop; returns when shutdown is requested or the
    /// worker's exit demands supervisor termination.
    pub fn run(&self) {
        self.watcher.reset_worker_counters(0);

        loop {
            if self.use_worker {
                let worker = self.watcher.get_worker();
                if !self.watch(&worker) {
                    if self.watcher.fates_bound() {
                        // A signal interrupted the watcher.
                        break;
                    }
                    self.create_worker();
                }
            }

            // Check sanity of every managed extension; relaunch the failed
            // ones and give up on those that cannot be relaunched.
            let mut failing: Vec<String> = Vec::new();
            for (path, handle) in self.watcher.extensions() {
                if !self.watch(&handle) && !self.create_extension(&path) {
                    failing.push(path);
                }
            }
            for path in &failing {
                self.watcher.remove_extension(path);
            }

            self.shutdown
                .pause_millis(self.worker_limit(LimitKind::PollIntervalSec).saturating_mul(1000));

            if self.shutdown.interrupted() || !self.ok() {
                break;
            }
        }
        debug!("Supervisor loop exiting");
    }

    /// The supervisor keeps running while the worker has not exited cleanly
    /// or catastrophically, and something remains to watch (a valid worker,
    /// a managed extension, or the hint that extensions will appear).
    pub fn ok(&self) -> bool {
        if let Some(code) = self.watcher.worker_exit_status() {
            if code == EXIT_SUCCESS || code == EXIT_CATASTROPHIC {
                return false;
            }
        }
        self.watcher.get_worker().is_valid() || self.watcher.has_managed_extensions()
    }

    /// Inspect one child. Returns `true` when the child is healthy (or has
    /// exited and its code is recorded for `ok()` to judge); `false` when
    /// the caller must (re)launch it.
    pub fn watch(&self, child: &ProcessHandle) -> bool {
        let check = check_child_status(child);
        if self.watcher.fates_bound() {
            // A signal was handled while the watcher was watching.
            return false;
        }

        if !child.is_valid() || check == ProcessCheck::Error {
            return false;
        }

        match check {
            ProcessCheck::StillAlive => {
                let sane = catch_unwind(AssertUnwindSafe(|| self.is_child_sane(child)))
                    .unwrap_or(false);
                if !sane {
                    self.stop_child(child);
                    return false;
                }
                true
            }
            ProcessCheck::Exited(code) => {
                if self.watcher.is_worker(child) {
                    self.watcher.set_worker_exit_status(code);
                }
                // The next iteration sees the invalid handle; ok() judges
                // the code before any respawn.
                true
            }
            ProcessCheck::Error => false,
        }
    }

    fn stop_child(&self, child: &ProcessHandle) {
        child.kill();
        reap_defunct_children();
    }

    /// Evaluate a live child against the performance limits.
    pub fn is_child_sane(&self, child: &ProcessHandle) -> bool {
        let Some(pid) = child.pid() else {
            return false;
        };
        // Utilization limits are per second; counters divide by the interval.
        let iv = self.worker_limit(LimitKind::PollIntervalSec).max(1);

        let row = match self.query.query(pid) {
            Ok(row) => row,
            Err(QueryError::Malformed { pid, reason }) => {
                // Skip this tick's evaluation rather than judging a child on
                // counters that did not parse.
                debug!("Skipping sanity check for pid {}: {}", pid, reason);
                self.watcher.clear_sustained_latency(child);
                return true;
            }
            Err(err) => {
                debug!("No process row for pid {}: {}", pid, err);
                return false;
            }
        };

        let observation = self.watcher.observe(
            child,
            CounterSample {
                user_per_sec: row.user_time / iv,
                system_per_sec: row.system_time / iv,
                resident_bytes: row.resident_size_bytes,
            },
            self.worker_limit(LimitKind::CpuUtilizationPctPerSec),
        );

        // Only judge sanity if this is still our child. The child may have
        // died and its pid been reused by an unrelated process.
        if row.parent_pid != std::process::id() as i64 {
            self.watcher.reset(child);
            return true;
        }

        let sustained = observation.sustained_ticks as u64;
        if sustained > 0
            && sustained * iv >= self.worker_limit(LimitKind::SustainedLatencyCapSec)
        {
            warn!("Child ({}) system performance limits exceeded", pid);
            return false;
        }

        if observation.excess_bytes > 0
            && observation.excess_bytes > self.worker_limit(LimitKind::MemoryBytes) * MIB
        {
            warn!(
                "Child ({}) memory limits exceeded: {} bytes",
                pid, observation.excess_bytes
            );
            return false;
        }

        // The child is sane; flush buffered status logs to a healthy worker.
        if self.use_worker && self.watcher.is_worker(child) {
            self.relay.relay_status_logs();
        }
        true
    }

    /// Spawn a replacement worker, backing off when the previous one lived
    /// less than the respawn floor. Unrecoverable steps request full agent
    /// shutdown; the worker is never abandoned.
    pub fn create_worker(&self) {
        let floor = self.worker_limit(LimitKind::RespawnFloorSec);
        if let Some(count) = self.watcher.worker_respawn_too_quick(unix_time(), floor) {
            warn!("Worker respawning too quickly: {} times", count);
            let delay = backoff_delay_ms(self.level, count);
            // The lock is released before this sleep; only the poll sleep
            // and syscalls may block the supervisor.
            self.shutdown.pause_millis(delay);
        }

        match self.try_create_worker() {
            Ok(worker) => {
                debug!(
                    "Watchdog ({}) executing worker ({})",
                    std::process::id(),
                    worker.pid().unwrap_or_default()
                );
                self.watcher.set_worker(worker);
                self.watcher.reset_worker_counters(unix_time());
            }
            Err(err) => {
                // The supervisor cannot function without a spawnable worker.
                error!("Watchdog could not create a worker process: {}", err);
                self.shutdown.request_shutdown(EXIT_FAILURE);
            }
        }
    }

    fn try_create_worker(&self) -> LaunchResult<ProcessHandle> {
        // The worker re-executes the supervisor's own image.
        let row = self
            .query
            .query(std::process::id())
            .map_err(|_| LaunchError::Unknown)?;
        if row.image_path.is_empty() {
            return Err(LaunchError::Unknown);
        }

        let exec_path = canonical_path(Path::new(&row.image_path))
            .map_err(|_| LaunchError::Unsafe(row.image_path.clone()))?;
        if !safe_permissions(&exec_path) {
            return Err(LaunchError::Unsafe(exec_path.display().to_string()));
        }

        // Hint to plugin-dependent workers that they should wait for
        // managed extensions to broadcast before serving queries.
        if self.watcher.has_managed_extensions() {
            std::env::set_var(EXTENSIONS_ENV, "true");
        }

        launch_worker(&exec_path, &self.argv)
    }

    /// Spawn (or respawn) a managed extension. Returns `false` when the
    /// extension respawned too quickly and the supervisor should give up on
    /// it; extensions get no exponential back-off.
    pub fn create_extension(&self, path: &str) -> bool {
        let floor = self.worker_limit(LimitKind::RespawnFloorSec);
        if self
            .watcher
            .extension_respawn_too_quick(path, unix_time(), floor)
        {
            warn!("Extension respawning too quickly: {}", path);
            return false;
        }

        match self.try_create_extension(path) {
            Ok(handle) => {
                debug!(
                    "Created and monitoring extension child ({}): {}",
                    handle.pid().unwrap_or_default(),
                    path
                );
                self.watcher.set_extension(path, handle);
                self.watcher.reset_extension_counters(path, unix_time());
                true
            }
            Err(err) => {
                // The worker depends on plugin wiring being consistent with
                // the supervisor's view; an unlaunchable extension is fatal.
                error!("Cannot create extension process {}: {}", path, err);
                self.shutdown.request_shutdown(EXIT_FAILURE);
                false
            }
        }
    }

    fn try_create_extension(&self, path: &str) -> LaunchResult<ProcessHandle> {
        let exec_path = canonical_path(Path::new(path))
            .map_err(|_| LaunchError::Unsafe(path.to_string()))?;
        if !safe_permissions(&exec_path) {
            return Err(LaunchError::Unsafe(path.to_string()));
        }

        launch_extension(
            &exec_path,
            &self.config.get_string("extensions_socket"),
            &self.config.get_string("extensions_timeout"),
            &self.config.get_string("extensions_interval"),
            self.config.get_string("verbose") == "true",
        )
    }
}
