/*!
 * Watcher Registry
 *
 * Process-wide record of the monitored worker and extensions. Every
 * mutation happens under one exclusive lock; the supervisor holds it only
 * for snapshots, counter advances, and slot updates, never across a spawn
 * or a sleep.
 */

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::state::PerformanceState;
use crate::core::types::ExitCode;
use crate::platform::launch::EXTENSIONS_ENV;
use crate::platform::ProcessHandle;
use crate::shutdown::ShutdownController;

/// One poll's worth of per-second-normalised counters for a child
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSample {
    pub user_per_sec: u64,
    pub system_per_sec: u64,
    pub resident_bytes: u64,
}

/// What the registry observed when folding a sample into a child's state
#[derive(Debug, Clone, Copy, Default)]
pub struct SanityObservation {
    /// Consecutive over-threshold intervals, including this one
    pub sustained_ticks: u32,
    /// Resident bytes allocated beyond the child's initial footprint
    pub excess_bytes: u64,
}

#[derive(Default)]
struct Registry {
    worker: Option<ProcessHandle>,
    worker_state: PerformanceState,
    worker_exit_status: Option<ExitCode>,
    worker_restart_count: u32,
    extensions: AHashMap<String, ProcessHandle>,
    extension_states: AHashMap<String, PerformanceState>,
}

impl Registry {
    /// Resolve a handle to its performance state: the worker is a
    /// distinguished slot, extensions resolve through their binary path.
    fn state_for(&mut self, child: &ProcessHandle) -> Option<&mut PerformanceState> {
        if self.worker.as_ref() == Some(child) {
            return Some(&mut self.worker_state);
        }
        let path = self
            .extensions
            .iter()
            .find(|(_, handle)| *handle == child)
            .map(|(path, _)| path.clone())?;
        self.extension_states.get_mut(&path)
    }
}

/// Shared watcher context owned by the entry point and passed into the
/// supervisor thread
pub struct Watcher {
    inner: Mutex<Registry>,
    shutdown: Arc<ShutdownController>,
}

impl Watcher {
    pub fn new(shutdown: Arc<ShutdownController>) -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
            shutdown,
        }
    }

    // ---- worker slot ----

    pub fn set_worker(&self, handle: ProcessHandle) {
        self.inner.lock().worker = Some(handle);
    }

    pub fn get_worker(&self) -> ProcessHandle {
        self.inner.lock().worker.unwrap_or_else(ProcessHandle::invalid)
    }

    pub fn is_worker(&self, child: &ProcessHandle) -> bool {
        self.inner.lock().worker.as_ref() == Some(child)
    }

    pub fn worker_exit_status(&self) -> Option<ExitCode> {
        self.inner.lock().worker_exit_status
    }

    pub fn set_worker_exit_status(&self, code: ExitCode) {
        self.inner.lock().worker_exit_status = Some(code);
    }

    pub fn worker_restart_count(&self) -> u32 {
        self.inner.lock().worker_restart_count
    }

    /// Record one more worker restart; returns the new count.
    pub fn worker_restarted(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.worker_restart_count += 1;
        inner.worker_restart_count
    }

    /// Zero the worker's counters for a launch at `respawn_time`.
    pub fn reset_worker_counters(&self, respawn_time: i64) {
        self.inner.lock().worker_state.reset(respawn_time);
    }

    pub fn worker_state(&self) -> PerformanceState {
        self.inner.lock().worker_state.clone()
    }

    /// True when the worker's previous launch is within `floor_sec` of
    /// `now`: the respawn is too quick and the restart counter advances.
    pub fn worker_respawn_too_quick(&self, now: i64, floor_sec: u64) -> Option<u32> {
        let mut inner = self.inner.lock();
        if inner.worker_state.last_respawn_time > now - floor_sec as i64 {
            inner.worker_restart_count += 1;
            Some(inner.worker_restart_count)
        } else {
            None
        }
    }

    // ---- extensions ----

    /// Register an extension path with an invalid placeholder handle; the
    /// next supervisor tick launches it.
    pub fn add_extension(&self, path: &str) {
        let mut inner = self.inner.lock();
        inner.extensions.insert(path.to_string(), ProcessHandle::invalid());
        inner
            .extension_states
            .insert(path.to_string(), PerformanceState::default());
    }

    pub fn set_extension(&self, path: &str, handle: ProcessHandle) {
        let mut inner = self.inner.lock();
        inner.extensions.insert(path.to_string(), handle);
        inner
            .extension_states
            .entry(path.to_string())
            .or_default();
    }

    /// Drop an extension and its state; the supervisor gives up on it.
    pub fn remove_extension(&self, path: &str) {
        let mut inner = self.inner.lock();
        inner.extensions.remove(path);
        inner.extension_states.remove(path);
    }

    /// Snapshot of the managed extensions for one poll iteration.
    pub fn extensions(&self) -> Vec<(String, ProcessHandle)> {
        self.inner
            .lock()
            .extensions
            .iter()
            .map(|(path, handle)| (path.clone(), *handle))
            .collect()
    }

    pub fn extension_count(&self) -> usize {
        self.inner.lock().extensions.len()
    }

    pub fn get_extension_path(&self, child: &ProcessHandle) -> Option<String> {
        self.inner
            .lock()
            .extensions
            .iter()
            .find(|(_, handle)| *handle == child)
            .map(|(path, _)| path.clone())
    }

    pub fn extension_state(&self, path: &str) -> Option<PerformanceState> {
        self.inner.lock().extension_states.get(path).cloned()
    }

    /// Zero an extension's counters for a launch at `respawn_time`.
    pub fn reset_extension_counters(&self, path: &str, respawn_time: i64) {
        self.inner
            .lock()
            .extension_states
            .entry(path.to_string())
            .or_default()
            .reset(respawn_time);
    }

    /// True when the extension's previous launch is within `floor_sec` of
    /// `now`; the supervisor gives up rather than backing off.
    pub fn extension_respawn_too_quick(&self, path: &str, now: i64, floor_sec: u64) -> bool {
        self.inner
            .lock()
            .extension_states
            .get(path)
            .map(|state| state.last_respawn_time > now - floor_sec as i64)
            .unwrap_or(false)
    }

    /// True iff extensions are managed or a watchdog hinted they will be.
    pub fn has_managed_extensions(&self) -> bool {
        if !self.inner.lock().extensions.is_empty() {
            return true;
        }
        std::env::var_os(EXTENSIONS_ENV).is_some()
    }

    // ---- per-tick accounting ----

    /// Fold one counter sample into a child's state and report what the
    /// sanity check needs. The whole update runs under the registry lock.
    pub fn observe(
        &self,
        child: &ProcessHandle,
        sample: CounterSample,
        utilization_limit: u64,
    ) -> SanityObservation {
        let mut inner = self.inner.lock();
        let Some(state) = inner.state_for(child) else {
            return SanityObservation::default();
        };

        let user_delta = sample.user_per_sec.saturating_sub(state.last_user_time);
        let system_delta = sample.system_per_sec.saturating_sub(state.last_system_time);
        if user_delta > utilization_limit || system_delta > utilization_limit {
            state.sustained_latency_ticks += 1;
        } else {
            state.sustained_latency_ticks = 0;
        }
        state.last_user_time = sample.user_per_sec;
        state.last_system_time = sample.system_per_sec;

        if state.initial_footprint_bytes == 0 {
            state.initial_footprint_bytes = sample.resident_bytes;
        }
        let excess = sample
            .resident_bytes
            .saturating_sub(state.initial_footprint_bytes);

        SanityObservation {
            sustained_ticks: state.sustained_latency_ticks,
            excess_bytes: excess,
        }
    }

    /// Clear a child's sustained-latency counter; used when this tick's row
    /// could not be parsed and sanity evaluation is skipped.
    pub fn clear_sustained_latency(&self, child: &ProcessHandle) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.state_for(child) {
            state.sustained_latency_ticks = 0;
        }
    }

    /// Clear the slot a reparented child occupied so a fresh launch can
    /// occur next tick. The child itself is left running; it is no longer
    /// ours to stop.
    pub fn reset(&self, child: &ProcessHandle) {
        let mut inner = self.inner.lock();
        if inner.worker.as_ref() == Some(child) {
            inner.worker = None;
            inner.worker_state.reset(0);
            return;
        }
        let path = inner
            .extensions
            .iter()
            .find(|(_, handle)| *handle == child)
            .map(|(path, _)| path.clone());
        if let Some(path) = path {
            inner.extensions.insert(path.clone(), ProcessHandle::invalid());
            inner.extension_states.entry(path).or_default().reset(0);
        }
    }

    // ---- shutdown coupling ----

    /// Set once a fatal signal handler has run; the supervisor loop exits
    /// without respawning.
    pub fn fates_bound(&self) -> bool {
        self.shutdown.fates_bound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher() -> Watcher {
        Watcher::new(Arc::new(ShutdownController::new()))
    }

    #[test]
    fn test_worker_slot_roundtrip() {
        let watcher = watcher();
        assert!(!watcher.get_worker().is_valid());

        watcher.set_worker(ProcessHandle::from_pid(100));
        assert_eq!(watcher.get_worker(), ProcessHandle::from_pid(100));
        assert!(watcher.is_worker(&ProcessHandle::from_pid(100)));
        assert!(!watcher.is_worker(&ProcessHandle::from_pid(101)));
    }

    #[test]
    fn test_extension_maps_share_key_set() {
        let watcher = watcher();
        watcher.add_extension("/opt/ext/one");
        watcher.add_extension("/opt/ext/two");
        assert_eq!(watcher.extension_count(), 2);
        assert!(watcher.extension_state("/opt/ext/one").is_some());

        watcher.remove_extension("/opt/ext/one");
        assert_eq!(watcher.extension_count(), 1);
        assert!(watcher.extension_state("/opt/ext/one").is_none());
        assert!(watcher.extension_state("/opt/ext/two").is_some());
    }

    #[test]
    fn test_added_extension_is_invalid_placeholder() {
        let watcher = watcher();
        watcher.add_extension("/opt/ext/one");
        let (_, handle) = watcher.extensions().pop().expect("snapshot");
        assert!(!handle.is_valid());
    }

    #[test]
    fn test_extension_path_resolution() {
        let watcher = watcher();
        watcher.add_extension("/opt/ext/one");
        watcher.set_extension("/opt/ext/one", ProcessHandle::from_pid(200));
        assert_eq!(
            watcher.get_extension_path(&ProcessHandle::from_pid(200)),
            Some("/opt/ext/one".to_string())
        );
        assert_eq!(watcher.get_extension_path(&ProcessHandle::from_pid(201)), None);
    }

    #[test]
    fn test_observe_tracks_cpu_and_memory() {
        let watcher = watcher();
        watcher.set_worker(ProcessHandle::from_pid(100));
        let worker = watcher.get_worker();

        // First tick sets the baseline; delta from zero exceeds the limit.
        let first = watcher.observe(
            &worker,
            CounterSample {
                user_per_sec: 400,
                system_per_sec: 0,
                resident_bytes: 50 << 20,
            },
            90,
        );
        assert_eq!(first.sustained_ticks, 1);
        assert_eq!(first.excess_bytes, 0);

        // Same counters: delta 0, counter resets, footprint grows.
        let second = watcher.observe(
            &worker,
            CounterSample {
                user_per_sec: 400,
                system_per_sec: 0,
                resident_bytes: 130 << 20,
            },
            90,
        );
        assert_eq!(second.sustained_ticks, 0);
        assert_eq!(second.excess_bytes, 80 << 20);
    }

    #[test]
    fn test_observe_unknown_child_is_inert() {
        let watcher = watcher();
        let unknown = ProcessHandle::from_pid(999);
        let observation = watcher.observe(&unknown, CounterSample::default(), 90);
        assert_eq!(observation.sustained_ticks, 0);
        assert_eq!(observation.excess_bytes, 0);
    }

    #[test]
    fn test_reset_worker_clears_slot() {
        let watcher = watcher();
        watcher.set_worker(ProcessHandle::from_pid(100));
        let worker = watcher.get_worker();
        watcher.reset(&worker);
        assert!(!watcher.get_worker().is_valid());
        assert_eq!(watcher.worker_state(), PerformanceState::default());
    }

    #[test]
    fn test_reset_extension_keeps_registration() {
        let watcher = watcher();
        watcher.add_extension("/opt/ext/one");
        watcher.set_extension("/opt/ext/one", ProcessHandle::from_pid(200));
        watcher.reset(&ProcessHandle::from_pid(200));

        // Still registered, but back to an invalid placeholder.
        assert_eq!(watcher.extension_count(), 1);
        let (_, handle) = watcher.extensions().pop().expect("snapshot");
        assert!(!handle.is_valid());
    }

    #[test]
    fn test_worker_respawn_floor() {
        let watcher = watcher();
        watcher.reset_worker_counters(1_000);
        assert_eq!(watcher.worker_respawn_too_quick(1_010, 20), Some(1));
        assert_eq!(watcher.worker_respawn_too_quick(1_010, 20), Some(2));
        assert_eq!(watcher.worker_respawn_too_quick(1_030, 20), None);
        assert_eq!(watcher.worker_restart_count(), 2);
    }

    #[test]
    fn test_extension_respawn_floor() {
        let watcher = watcher();
        watcher.add_extension("/opt/ext/one");
        watcher.reset_extension_counters("/opt/ext/one", 1_000);
        assert!(watcher.extension_respawn_too_quick("/opt/ext/one", 1_001, 20));
        assert!(!watcher.extension_respawn_too_quick("/opt/ext/one", 1_021, 20));
        assert!(!watcher.extension_respawn_too_quick("/opt/ext/none", 1_001, 20));
    }

    #[test]
    fn test_last_respawn_time_only_advances() {
        let watcher = watcher();
        watcher.reset_worker_counters(1_000);
        watcher.reset_worker_counters(2_000);
        assert_eq!(watcher.worker_state().last_respawn_time, 2_000);
    }
}
