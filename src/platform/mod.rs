/*!
 * Platform Module
 * OS-process plumbing: handles, status checks, spawning, permission checks
 */

pub mod handle;
pub mod launch;
pub mod security;
pub mod status;

pub use handle::ProcessHandle;
pub use launch::{
    is_worker_environment, launch_extension, launch_worker, launcher_from_env, LaunchError,
    LaunchResult, EXTENSIONS_ENV, LAUNCHER_ENV, WORKER_ENV,
};
pub use security::{canonical_path, safe_permissions};
pub use status::{check_child_status, reap_defunct_children, ProcessCheck};
