//! Error types for shelltab

use std::time::Duration;
use thiserror::Error;

/// Result type alias for shelltab operations
pub type ShellTabResult<T> = Result<T, ShellTabError>;

/// Main error type for shelltab
#[derive(Error, Debug)]
pub enum ShellTabError {
    #[error("Shell error: {0}")]
    Shell(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("STA executor error: {0}")]
    Sta(String),

    #[error("Location error: {0}")]
    Location(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A shell session is already running")]
    AlreadyInitialized,

    #[error("No shell session is running")]
    NotRunning,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShellTabError {
    /// Create a new shell error
    pub fn shell(msg: impl Into<String>) -> Self {
        Self::Shell(msg.into())
    }

    /// Create a new window error
    pub fn window(msg: impl Into<String>) -> Self {
        Self::Window(msg.into())
    }

    /// Create a new STA executor error
    pub fn sta(msg: impl Into<String>) -> Self {
        Self::Sta(msg.into())
    }

    /// Create a new location error
    pub fn location(msg: impl Into<String>) -> Self {
        Self::Location(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short category name, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Shell(_) => "shell",
            Self::Window(_) => "window",
            Self::Sta(_) => "sta",
            Self::Location(_) => "location",
            Self::Config(_) => "config",
            Self::AlreadyInitialized => "already_initialized",
            Self::NotRunning => "not_running",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ShellTabError::shell("x").category(), "shell");
        assert_eq!(ShellTabError::sta("x").category(), "sta");
        assert_eq!(ShellTabError::AlreadyInitialized.category(), "already_initialized");
        assert_eq!(
            ShellTabError::Timeout(Duration::from_secs(2)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_display() {
        let err = ShellTabError::window("no tab container");
        assert_eq!(err.to_string(), "Window error: no tab container");
        let err = ShellTabError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
    }
}
