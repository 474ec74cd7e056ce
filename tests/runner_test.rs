/*!
 * Worker Lifecycle Tests
 * create_worker through kill: spawn from a verified image, observe sanity,
 * enforce limits against a real child
 */

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hostwatch::config::WatchdogOptions;
use hostwatch::query::{ProcessQuery, ProcessRow, QueryError, QueryResult};
use hostwatch::{Config, ProcessHandle, ShutdownController, StatusRelay, Watcher, WatcherRunner};

use clap::Parser;

const MIB: u64 = 1024 * 1024;

/// Scripted rows for spawned children; the supervisor's own row always
/// resolves to the stand-in worker image.
struct LifecycleQuery {
    own_image: String,
    child_rows: Mutex<VecDeque<QueryResult<ProcessRow>>>,
}

impl LifecycleQuery {
    fn new(own_image: &str) -> Self {
        Self {
            own_image: own_image.to_string(),
            child_rows: Mutex::new(VecDeque::new()),
        }
    }

    fn push_child_row(&self, row: ProcessRow) {
        self.child_rows.lock().push_back(Ok(row));
    }
}

impl ProcessQuery for LifecycleQuery {
    fn query(&self, pid: u32) -> QueryResult<ProcessRow> {
        if pid == std::process::id() {
            return Ok(ProcessRow {
                parent_pid: 1,
                user_time: 0,
                system_time: 0,
                resident_size_bytes: 20 * MIB,
                image_path: self.own_image.clone(),
            });
        }
        self.child_rows
            .lock()
            .pop_front()
            .unwrap_or(Err(QueryError::NotFound(pid)))
    }
}

fn child_row(resident_size_bytes: u64) -> ProcessRow {
    ProcessRow {
        parent_pid: std::process::id() as i64,
        user_time: 0,
        system_time: 0,
        resident_size_bytes,
        image_path: "/usr/bin/sleep".to_string(),
    }
}

/// Poll until the child has exited and its pid has been reaped. A plain
/// liveness probe would count an unreaped zombie as alive.
fn wait_until_gone(handle: &ProcessHandle) {
    use hostwatch::platform::{check_child_status, ProcessCheck};
    for _ in 0..300 {
        if check_child_status(handle) != ProcessCheck::StillAlive {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("child {} never drained", handle.pid().unwrap_or_default());
}

#[test]
fn test_worker_lifecycle_from_spawn_to_limit_kill() {
    let shutdown = Arc::new(ShutdownController::new());
    let watcher = Arc::new(Watcher::new(Arc::clone(&shutdown)));
    let query = Arc::new(LifecycleQuery::new("/bin/sleep"));
    let relay = Arc::new(StatusRelay::new());
    let config = Arc::new(Config::from_options(&WatchdogOptions::parse_from([
        "hostwatchd",
    ])));

    let runner = WatcherRunner::new(
        Arc::clone(&watcher),
        Arc::clone(&query) as Arc<dyn ProcessQuery>,
        Arc::clone(&shutdown),
        config,
    )
    .with_status_relay(Arc::clone(&relay))
    // The spawned "worker" becomes: sleep 30
    .with_argv(vec!["hostwatchd".to_string(), "30".to_string()]);

    // Spawn through the full verified-image path.
    runner.create_worker();
    assert!(!shutdown.interrupted(), "worker creation requested shutdown");

    let worker = watcher.get_worker();
    assert!(worker.is_valid());
    assert!(worker.alive());
    assert!(watcher.worker_state().last_respawn_time > 0);

    // A sane tick keeps the worker and flushes buffered status logs to it.
    relay.buffer_status(
        hostwatch::logger::StatusSeverity::Info,
        "supervisor started",
    );
    query.push_child_row(child_row(50 * MIB));
    assert!(runner.watch(&worker));
    assert_eq!(relay.pending(), 0);

    // A tick with a 150 MiB excess trips the memory limit; the worker is
    // stopped and the caller told to relaunch.
    query.push_child_row(child_row(200 * MIB));
    assert!(!runner.watch(&worker));
    wait_until_gone(&worker);
}

#[test]
fn test_child_with_no_process_row_is_stopped() {
    let shutdown = Arc::new(ShutdownController::new());
    let watcher = Arc::new(Watcher::new(Arc::clone(&shutdown)));
    // No scripted rows: every child lookup misses.
    let query = Arc::new(LifecycleQuery::new("/bin/sleep"));
    let config = Arc::new(Config::from_options(&WatchdogOptions::parse_from([
        "hostwatchd",
    ])));

    let runner = WatcherRunner::new(
        Arc::clone(&watcher),
        Arc::clone(&query) as Arc<dyn ProcessQuery>,
        Arc::clone(&shutdown),
        config,
    )
    .with_argv(vec!["hostwatchd".to_string(), "30".to_string()]);

    runner.create_worker();
    let worker = watcher.get_worker();
    assert!(worker.is_valid());

    assert!(!runner.watch(&worker));
    wait_until_gone(&worker);
}

#[test]
fn test_unknown_image_path_requests_shutdown() {
    let shutdown = Arc::new(ShutdownController::new());
    let watcher = Arc::new(Watcher::new(Arc::clone(&shutdown)));
    // Empty image path: the supervisor cannot function without knowing its
    // own image.
    let query = Arc::new(LifecycleQuery::new(""));
    let config = Arc::new(Config::from_options(&WatchdogOptions::parse_from([
        "hostwatchd",
    ])));

    let runner = WatcherRunner::new(
        Arc::clone(&watcher),
        Arc::clone(&query) as Arc<dyn ProcessQuery>,
        Arc::clone(&shutdown),
        config,
    );

    runner.create_worker();
    assert!(shutdown.interrupted());
    assert_eq!(shutdown.exit_code(), 1);
    assert!(!watcher.get_worker().is_valid());
}
