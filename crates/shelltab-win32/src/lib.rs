//! # shelltab win32
//!
//! Windows implementation of the watcher's backend traits.
//!
//! - Shell window objects come from the `ShellWindows` collection and are held
//!   through agile references, so they can be released from any thread.
//! - Window registration, visibility and destruction are observed with an
//!   out-of-context WinEvent hook running on its own message-loop thread.
//! - Tab operations are the file manager's own `WM_COMMAND` codes, see
//!   [`commands`].
//!
//! Only [`commands`] builds on other platforms.

pub mod commands;

#[cfg(windows)]
mod browser;
#[cfg(windows)]
mod com;
#[cfg(windows)]
mod desktop;
#[cfg(windows)]
mod events;
#[cfg(windows)]
mod host;

#[cfg(windows)]
pub use host::Win32Shell;

/// Backend over the live Windows shell.
#[cfg(windows)]
pub fn backend() -> shelltab_watcher::ShellBackend {
    shelltab_watcher::ShellBackend::from_shared(std::sync::Arc::new(Win32Shell::new()))
}
