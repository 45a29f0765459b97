//! Watcher configuration

use crate::error::ShellTabResult;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Force newly spawned windows into tabs of an existing window
    pub hook_enabled: bool,

    /// Activate an existing tab instead of opening a duplicate
    pub reuse_tabs: bool,

    /// Maximum number of closed windows remembered
    pub history_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Timeouts and thresholds
    pub timing: TimingConfig,
}

/// Timeouts and thresholds, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Windows younger than this are never returned by tab search
    pub new_window_age_ms: u64,

    /// A closed-window record older than this is not matched on reattach
    pub history_staleness_ms: u64,

    /// How long to wait for a posted new tab to appear
    pub tab_appear_timeout_ms: u64,

    /// How long to wait for the shell window behind a handle
    pub window_resolve_timeout_ms: u64,

    /// Delay between two polls
    pub poll_interval_ms: u64,

    /// How long to wait for navigation to complete
    pub navigation_timeout_ms: u64,

    /// How often the shell process is checked
    pub process_poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            hook_enabled: true,
            reuse_tabs: true,
            history_capacity: 64,
            log_level: "info".to_string(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            new_window_age_ms: 2_000,
            history_staleness_ms: 2_000,
            tab_appear_timeout_ms: 2_000,
            window_resolve_timeout_ms: 2_000,
            poll_interval_ms: 50,
            navigation_timeout_ms: 5_000,
            process_poll_interval_ms: 1_000,
        }
    }
}

impl TimingConfig {
    pub fn new_window_age(&self) -> Duration {
        Duration::from_millis(self.new_window_age_ms)
    }

    pub fn history_staleness(&self) -> Duration {
        Duration::from_millis(self.history_staleness_ms)
    }

    pub fn tab_appear_timeout(&self) -> Duration {
        Duration::from_millis(self.tab_appear_timeout_ms)
    }

    pub fn window_resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.window_resolve_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn process_poll_interval(&self) -> Duration {
        Duration::from_millis(self.process_poll_interval_ms)
    }
}

impl WatcherConfig {
    /// `<config_dir>/shelltab/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shelltab")
            .join("settings.json")
    }

    /// Load settings from `path`, falling back to defaults when the file does
    /// not exist. Missing fields take their default value.
    pub fn load(path: &Path) -> ShellTabResult<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> ShellTabResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
