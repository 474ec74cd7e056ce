/*!
 * Platform Process Handle
 *
 * Opaque reference to an OS process. Handles compare by pid, may be invalid
 * (an empty slot awaiting launch), and support the two operations the
 * supervisor needs: a kill and a liveness probe.
 */

use crate::core::types::Pid;
use log::debug;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;

/// Opaque OS-process reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProcessHandle {
    pid: Option<Pid>,
}

impl ProcessHandle {
    /// An invalid handle: the empty slot a fresh launch will fill.
    pub const fn invalid() -> Self {
        Self { pid: None }
    }

    pub const fn from_pid(pid: Pid) -> Self {
        Self { pid: Some(pid) }
    }

    /// Handle for the calling process.
    pub fn current() -> Self {
        Self::from_pid(std::process::id())
    }

    pub const fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub const fn is_valid(&self) -> bool {
        self.pid.is_some()
    }

    /// Send SIGKILL to the process. Returns whether the signal was delivered.
    pub fn kill(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        match kill(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => true,
            Err(errno) => {
                debug!("Could not kill pid {}: {}", pid, errno);
                false
            }
        }
    }

    /// Probe whether the process exists, without reaping or signalling it.
    pub fn alive(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        // Signal 0 performs the permission and existence checks only.
        kill(NixPid::from_raw(pid as i32), None).is_ok()
    }
}
