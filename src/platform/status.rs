/*!
 * Child Status Checks
 *
 * Non-blocking inspection of child process state and zombie reaping, built
 * on waitpid(WNOHANG). Only works for direct children of this process.
 */

use super::handle::ProcessHandle;
use crate::core::types::ExitCode;
use log::debug;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid as NixPid;

/// Outcome of a non-blocking child status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCheck {
    /// The child is running (or stopped/continued, which counts as running)
    StillAlive,
    /// The child terminated; carries the exit code. Children torn down by a
    /// signal report the shell convention of 128 + signal number.
    Exited(ExitCode),
    /// The pid is not a child of this process, or the check itself failed
    Error,
}

/// Check a child's OS status without blocking.
pub fn check_child_status(child: &ProcessHandle) -> ProcessCheck {
    let Some(pid) = child.pid() else {
        return ProcessCheck::Error;
    };

    match waitpid(NixPid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => ProcessCheck::StillAlive,
        Ok(WaitStatus::Exited(_, code)) => ProcessCheck::Exited(code),
        Ok(WaitStatus::Signaled(_, signal, _)) => ProcessCheck::Exited(128 + signal as ExitCode),
        // Stopped/traced children are still occupying their pid.
        Ok(_) => ProcessCheck::StillAlive,
        Err(Errno::ECHILD) => ProcessCheck::Error,
        Err(errno) => {
            debug!("waitpid({}) failed: {}", pid, errno);
            ProcessCheck::Error
        }
    }
}

/// Reap any defunct (zombie) children of this process.
///
/// Called after a child is killed so its table entry is released before the
/// next poll iteration.
pub fn reap_defunct_children() {
    loop {
        match waitpid(NixPid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                debug!("Reaped defunct child {} (exit {})", pid, code);
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                debug!("Reaped signaled child {} ({})", pid, signal);
            }
            // No more zombies, or no children at all.
            _ => break,
        }
    }
}
