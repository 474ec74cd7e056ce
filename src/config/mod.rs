/*!
 * Configuration
 *
 * CLI flags for the watchdog plus the thin key/value facade collaborators
 * read extension settings through. Full configuration-file discovery and
 * parsing belongs to the config plugins, not this core.
 */

use ahash::AHashMap;
use clap::Parser;
use log::warn;
use std::path::{Path, PathBuf};

use crate::core::limits::Level;

/// Host-instrumentation agent watchdog
#[derive(Parser, Debug, Clone)]
#[command(name = "hostwatchd", version, about)]
pub struct WatchdogOptions {
    /// Performance limit level (0=loose, 1=normal, 2=restrictive, 3=debug)
    #[arg(long = "watchdog_level", default_value_t = 0)]
    pub watchdog_level: Level,

    /// Disable the userland watchdog process and run the worker in-process
    #[arg(long = "disable_watchdog")]
    pub disable_watchdog: bool,

    /// Path to the agent configuration, consumed by the config plugins
    #[arg(long = "config_path")]
    pub config_path: Option<PathBuf>,

    /// File listing extension binaries to manage, one path per line
    #[arg(long = "extensions_autoload")]
    pub extensions_autoload: Option<PathBuf>,

    /// UNIX socket extensions register their plugins over
    #[arg(long = "extensions_socket", default_value = "/var/run/hostwatch.em")]
    pub extensions_socket: String,

    /// Seconds an extension may take to connect before giving up
    #[arg(long = "extensions_timeout", default_value = "3")]
    pub extensions_timeout: String,

    /// Seconds between extension heartbeats
    #[arg(long = "extensions_interval", default_value = "3")]
    pub extensions_interval: String,

    /// Enable verbose logging in the agent and its extensions
    #[arg(long = "verbose")]
    pub verbose: bool,
}

/// Key/value facade collaborators use to resolve settings at launch time
pub struct Config {
    values: AHashMap<String, String>,
}

impl Config {
    /// Build the facade from parsed CLI options.
    pub fn from_options(options: &WatchdogOptions) -> Self {
        let mut values = AHashMap::new();
        values.insert(
            "extensions_socket".to_string(),
            options.extensions_socket.clone(),
        );
        values.insert(
            "extensions_timeout".to_string(),
            options.extensions_timeout.clone(),
        );
        values.insert(
            "extensions_interval".to_string(),
            options.extensions_interval.clone(),
        );
        values.insert("verbose".to_string(), options.verbose.to_string());
        if let Some(ref path) = options.config_path {
            values.insert("config_path".to_string(), path.display().to_string());
        }
        Self { values }
    }

    /// Resolve a named setting; unknown names resolve to the empty string.
    pub fn get_string(&self, name: &str) -> String {
        self.values.get(name).cloned().unwrap_or_default()
    }
}

/// Read the extension autoload file: one binary path per line, blank lines
/// and `#` comments skipped. A missing file means no managed extensions.
pub fn read_autoload_paths(path: &Path) -> Vec<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!("Cannot read autoload file {}: {}", path.display(), err);
            return Vec::new();
        }
    };

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
