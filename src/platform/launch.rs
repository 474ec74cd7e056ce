/*!
 * Child Launching
 *
 * Spawns the worker (re-executing the supervisor's own image and argv) and
 * managed extensions. Callers verify safe permissions before reaching here;
 * this layer only builds the command line, the child environment, and the
 * resulting handle.
 */

use super::handle::ProcessHandle;
use log::info;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Marks a spawned child as the worker; the entrypoint checks this to pick
/// the worker code path.
pub const WORKER_ENV: &str = "HOSTWATCH_WORKER";

/// Carries the supervisor pid to the worker for the parent-liveness loop.
pub const LAUNCHER_ENV: &str = "HOSTWATCH_LAUNCHER";

/// Hints to a freshly spawned worker that managed extensions exist and their
/// plugins should be awaited before serving queries.
pub const EXTENSIONS_ENV: &str = "OSQUERY_EXTENSIONS";

/// Launch failures, all of which are unrecoverable for the supervisor
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("cannot determine the supervisor's own image path")]
    Unknown,

    #[error("unsafe binary permissions: {0}")]
    Unsafe(String),

    #[error("spawn failed for {path}: {source}")]
    Spawn {
        path: String,
        source: std::io::Error,
    },
}

pub type LaunchResult<T> = Result<T, LaunchError>;

/// Spawn a worker from the supervisor's verified image path.
///
/// The worker receives the supervisor's argv unchanged (minus argv[0], which
/// becomes the verified path) plus the worker/launcher environment contract.
/// `OSQUERY_EXTENSIONS` is process-global state and is inherited implicitly.
pub fn launch_worker(exec_path: &Path, argv: &[String]) -> LaunchResult<ProcessHandle> {
    let mut cmd = Command::new(exec_path);
    if argv.len() > 1 {
        cmd.args(&argv[1..]);
    }
    cmd.env(WORKER_ENV, "true")
        .env(LAUNCHER_ENV, std::process::id().to_string());

    let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        path: exec_path.display().to_string(),
        source,
    })?;

    let pid = child.id();
    info!("Spawned worker ({}) from {}", pid, exec_path.display());
    // The Child is dropped without waiting; the supervisor reaps through its
    // non-blocking status checks.
    drop(child);
    Ok(ProcessHandle::from_pid(pid))
}

/// Spawn a managed extension with its socket and heartbeat settings.
pub fn launch_extension(
    exec_path: &Path,
    socket: &str,
    timeout: &str,
    interval: &str,
    verbose: bool,
) -> LaunchResult<ProcessHandle> {
    let mut cmd = Command::new(exec_path);
    cmd.args(["--socket", socket, "--timeout", timeout, "--interval", interval]);
    if verbose {
        cmd.arg("--verbose");
    }

    let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        path: exec_path.display().to_string(),
        source,
    })?;

    let pid = child.id();
    info!("Spawned extension ({}): {}", pid, exec_path.display());
    drop(child);
    Ok(ProcessHandle::from_pid(pid))
}

/// Whether this process was spawned as a worker.
pub fn is_worker_environment() -> bool {
    std::env::var_os(WORKER_ENV).is_some()
}

/// Handle for the supervisor that spawned this worker, from the launch
/// environment contract.
pub fn launcher_from_env() -> Option<ProcessHandle> {
    std::env::var(LAUNCHER_ENV)
        .ok()?
        .parse()
        .ok()
        .map(ProcessHandle::from_pid)
}
