//! # shelltab common
//!
//! Utilities shared by every shelltab crate.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Bounded waits: poll-with-timeout and cancellable timeouts, used at every
//!   suspension point of the watcher

pub mod logging;
pub mod poll;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use poll::{poll_until, poll_value, with_timeout, PollConfig};
