/*!
 * Error Types
 * Centralized error handling with thiserror
 */

use thiserror::Error;

// Re-export subsystem errors for a single import surface
pub use crate::platform::launch::LaunchError;
pub use crate::query::QueryError;

/// Unified watchdog error type
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("process query error: {0}")]
    Query(#[from] QueryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}
