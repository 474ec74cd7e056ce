/*!
 * Shutdown Facility
 *
 * Process-wide cancellation: an interruptible sleep, shutdown requests with
 * an exit code, and the fates-bound flag that inhibits further respawns once
 * terminal shutdown has begun. Signal handlers touch nothing but atomics.
 */

use log::info;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::core::types::ExitCode;

/// Upper bound on one condvar wait slice. Direct shutdown requests notify
/// immediately; a flag set from a signal handler is observed within this
/// bound.
const PAUSE_SLICE_MS: u64 = 100;

/// Shared cancellation and shutdown state
pub struct ShutdownController {
    interrupted: AtomicBool,
    fates_bound: AtomicBool,
    exit_code: AtomicI32,
    sleeper_lock: Mutex<()>,
    sleeper_cv: Condvar,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            fates_bound: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            sleeper_lock: Mutex::new(()),
            sleeper_cv: Condvar::new(),
        }
    }

    /// Request shutdown with an exit code and wake all sleepers.
    pub fn request_shutdown(&self, code: ExitCode) {
        self.exit_code.store(code, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
        self.sleeper_cv.notify_all();
    }

    /// Mark the supervisor's fate as sealed: no further respawns.
    pub fn bind_fates(&self) {
        self.fates_bound.store(true, Ordering::SeqCst);
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn fates_bound(&self) -> bool {
        self.fates_bound.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> ExitCode {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Sleep for up to `millis`, returning early on a shutdown request.
    /// Returns `true` when the full interval elapsed uninterrupted.
    pub fn pause_millis(&self, millis: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(millis);
        let mut guard = self.sleeper_lock.lock();
        loop {
            if self.interrupted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(Duration::from_millis(PAUSE_SLICE_MS));
            self.sleeper_cv.wait_for(&mut guard, slice);
        }
    }

    /// Block until a shutdown request arrives.
    pub fn wait_for_shutdown(&self) {
        let mut guard = self.sleeper_lock.lock();
        while !self.interrupted() {
            self.sleeper_cv
                .wait_for(&mut guard, Duration::from_millis(PAUSE_SLICE_MS));
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller the signal handlers report into. One per process; installed by
/// the binary entry point.
static SIGNAL_TARGET: OnceLock<Arc<ShutdownController>> = OnceLock::new();

extern "C" fn handle_fatal_signal(_signo: i32) {
    // Async-signal-safe: atomic stores only. Sleepers observe the flag at
    // the next wait slice.
    if let Some(ctrl) = SIGNAL_TARGET.get() {
        ctrl.exit_code.store(0, Ordering::SeqCst);
        ctrl.interrupted.store(true, Ordering::SeqCst);
        ctrl.fates_bound.store(true, Ordering::SeqCst);
    }
}

/// Route SIGTERM and SIGINT into the controller.
pub fn install_signal_handlers(ctrl: &Arc<ShutdownController>) {
    let _ = SIGNAL_TARGET.set(Arc::clone(ctrl));

    let action = SigAction::new(
        SigHandler::Handler(handle_fatal_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGTERM, Signal::SIGINT] {
        // Safety: the handler only performs atomic stores.
        if let Err(errno) = unsafe { sigaction(signal, &action) } {
            info!("Could not install handler for {}: {}", signal, errno);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_uninterrupted_pause_elapses() {
        let ctrl = ShutdownController::new();
        let start = Instant::now();
        assert!(ctrl.pause_millis(50));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_request_shutdown_cancels_pause() {
        let ctrl = Arc::new(ShutdownController::new());
        let sleeper = Arc::clone(&ctrl);
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let completed = sleeper.pause_millis(10_000);
            (completed, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        ctrl.request_shutdown(3);

        let (completed, elapsed) = handle.join().expect("join sleeper");
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(ctrl.exit_code(), 3);
        assert!(ctrl.interrupted());
    }

    #[test]
    fn test_pause_after_interrupt_returns_immediately() {
        let ctrl = ShutdownController::new();
        ctrl.request_shutdown(0);
        let start = Instant::now();
        assert!(!ctrl.pause_millis(5_000));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_fates_start_unbound() {
        let ctrl = ShutdownController::new();
        assert!(!ctrl.fates_bound());
        ctrl.bind_fates();
        assert!(ctrl.fates_bound());
    }
}
