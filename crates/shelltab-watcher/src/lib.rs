//! # shelltab watcher
//!
//! Tracks file-manager windows and their tabs, turns newly spawned windows into
//! tabs of an existing window and remembers closed windows so they can be
//! reopened.
//!
//! ## Architecture
//!
//! ```text
//! shell events ──► dispatcher ──► classify new window ──► track / reattach / merge
//!                      │                                          │
//!                      └──► closing ──► history            open_tab (one at a time)
//!                                                                 │
//!                               STA thread ◄── every shell-object call
//! ```
//!
//! The OS is reached only through the traits in [`shell`]. A session owns the
//! STA thread and the event subscription; the process monitor replaces the
//! session whenever the shell process restarts.

pub mod classify;
pub mod coordinator;
pub mod history;
pub mod process;
pub mod registry;
mod search;
mod session;
pub mod shell;
pub mod sta;
mod watcher;

pub use classify::{Classification, WindowFacts};
pub use coordinator::{choose_target, OpenOutcome, OpenRequest};
pub use history::ClosedWindowHistory;
pub use process::is_process_running;
pub use registry::{Claim, RemovedWindow, TrackedWindow, WindowRegistry};
pub use shell::{
    ClosingCallback, ClosingSnapshot, EventCallback, EventSubscription, NormalizedPathComparer,
    PathComparer, ShellBackend, ShellEvent, ShellHost, ShellWindow, ShellWindowRef, StaInit,
    WindowSystem,
};
pub use sta::StaExecutor;
pub use watcher::Watcher;
