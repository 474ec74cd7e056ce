/*!
 * Core Module
 * Shared types, errors, and the watchdog limits table
 */

pub mod errors;
pub mod limits;
pub mod types;

pub use errors::WatchdogError;
pub use limits::{limit, Level, LimitKind, LEVEL_DEBUG};
pub use types::{
    unix_time, ExitCode, Pid, WatchdogResult, EXIT_CATASTROPHIC, EXIT_FAILURE, EXIT_SUCCESS,
};
