//! shelltab core library
//!
//! This crate provides shared types, errors, configuration, and location-string
//! handling for shelltab.

pub mod config;
pub mod error;
pub mod location;
pub mod types;

pub use config::{TimingConfig, WatcherConfig};
pub use error::{ShellTabError, ShellTabResult};
pub use types::{ShellWindowId, WindowHandle, WindowRecord};
