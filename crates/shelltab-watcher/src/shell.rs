//! Backend seam.
//!
//! The watcher never talks to the OS directly. A backend provides three
//! services: [`ShellHost`] for the shell's window objects and their events,
//! [`WindowSystem`] for plain window-handle operations, and [`PathComparer`]
//! for location equivalence. The Windows implementation lives in
//! `shelltab-win32`; tests use an in-memory fake.

use shelltab_core::location::locations_equivalent;
use shelltab_core::{ShellTabResult, ShellWindowId, WindowHandle};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// A shell window object (one tab of a file-manager window).
///
/// Every method except [`ShellWindow::id`] is only called on the session's STA
/// thread.
pub trait ShellWindow: Send + Sync {
    /// Stable identity of the underlying object.
    fn id(&self) -> ShellWindowId;

    /// Handle of the tab container hosting this window.
    fn tab_handle(&self) -> ShellTabResult<WindowHandle>;

    /// Current location, not yet normalized. Empty while the view is loading.
    fn location(&self) -> ShellTabResult<String>;

    fn navigate(&self, location: &str) -> ShellTabResult<()>;

    fn go_back(&self) -> ShellTabResult<()>;

    /// Names of the selected items, in view order.
    fn selected_items(&self) -> ShellTabResult<Vec<String>>;

    /// Select the named items. Unknown names are skipped; returns how many were
    /// selected.
    fn select_items(&self, names: &[String]) -> ShellTabResult<usize>;

    /// Close the window.
    fn quit(&self) -> ShellTabResult<()>;
}

pub type ShellWindowRef = Arc<dyn ShellWindow>;

/// Event raised by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// A new shell window object was registered. It is not identified; the
    /// watcher enumerates to find it.
    WindowRegistered,
    /// A top-level window became visible.
    ObjectShown(WindowHandle),
    /// A hooked window finished navigating. Raised by the watcher's own
    /// navigation callback.
    NavigationCompleted(ShellWindowId),
    /// A hooked window started closing. Raised by the watcher's own closing
    /// callback so that closes are handled in event order.
    WindowClosing {
        window: ShellWindowId,
        snapshot: ClosingSnapshot,
    },
}

/// Callback invoked from a backend thread.
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// The last location and selection the backend saw for a closing window.
/// Either part may be missing if the backend could not read it in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosingSnapshot {
    pub location: Option<String>,
    pub selected_items: Option<Vec<String>>,
}

/// Invoked once when a hooked window starts closing.
pub type ClosingCallback = Arc<dyn Fn(ClosingSnapshot) + Send + Sync>;

/// Runs once on a freshly spawned STA thread before any job. The returned guard
/// lives until the thread exits.
pub type StaInit = Box<dyn FnOnce() -> ShellTabResult<Box<dyn Any>> + Send>;

/// An active event registration. Dropping it unsubscribes.
pub struct EventSubscription {
    name: &'static str,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSubscription {
    pub fn new(name: &'static str, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn noop(name: &'static str) -> Self {
        Self {
            name,
            unsubscribe: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("name", &self.name)
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Shell automation: window objects and their events.
pub trait ShellHost: Send + Sync {
    /// Start delivering [`ShellEvent`]s to `events`. Called on the STA thread.
    fn subscribe(&self, events: UnboundedSender<ShellEvent>) -> ShellTabResult<EventSubscription>;

    /// Every shell window currently registered. Called on the STA thread.
    fn shell_windows(&self) -> ShellTabResult<Vec<ShellWindowRef>>;

    /// Invoke `callback` when `window` starts closing. Called on the STA thread.
    fn hook_closing(
        &self,
        window: &ShellWindowRef,
        callback: ClosingCallback,
    ) -> ShellTabResult<EventSubscription>;

    /// Invoke `callback` each time `window` completes a navigation. Called on
    /// the STA thread.
    fn hook_navigate_complete(
        &self,
        window: &ShellWindowRef,
        callback: EventCallback,
    ) -> ShellTabResult<EventSubscription>;

    /// Process id of the running shell, if any.
    fn shell_process_id(&self) -> Option<u32>;

    /// Thread initializer for a new STA executor.
    fn sta_init(&self) -> StaInit;
}

/// Window-handle operations. Safe to call from any thread.
pub trait WindowSystem: Send + Sync {
    /// Top-level file-manager windows, topmost first.
    fn top_level_windows(&self) -> Vec<WindowHandle>;

    /// Tab containers of `window`, in tab order.
    fn tab_handles(&self, window: WindowHandle) -> Vec<WindowHandle>;

    /// Top-level window hosting `tab`.
    fn parent_window(&self, tab: WindowHandle) -> Option<WindowHandle>;

    fn active_tab(&self, window: WindowHandle) -> Option<WindowHandle>;

    fn is_window(&self, window: WindowHandle) -> bool;

    /// Ask `window` to open a blank tab. Returns once the request is posted.
    fn post_new_tab(&self, window: WindowHandle) -> ShellTabResult<()>;

    /// Activate the tab at `index` (0-based).
    fn select_tab(&self, window: WindowHandle, index: usize) -> ShellTabResult<()>;

    fn bring_to_front(&self, window: WindowHandle) -> ShellTabResult<()>;

    fn set_visible(&self, window: WindowHandle, visible: bool) -> ShellTabResult<()>;

    /// Start a new file-manager window, optionally at `location`.
    fn launch_shell_window(&self, location: Option<&str>) -> ShellTabResult<()>;
}

/// Location equivalence.
pub trait PathComparer: Send + Sync {
    fn same_location(&self, a: &str, b: &str) -> ShellTabResult<bool>;
}

/// String comparison after normalization. Good enough where the shell's own
/// parser is not available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedPathComparer;

impl PathComparer for NormalizedPathComparer {
    fn same_location(&self, a: &str, b: &str) -> ShellTabResult<bool> {
        Ok(locations_equivalent(a, b))
    }
}

/// The three backend services the watcher runs on.
#[derive(Clone)]
pub struct ShellBackend {
    pub host: Arc<dyn ShellHost>,
    pub windows: Arc<dyn WindowSystem>,
    pub paths: Arc<dyn PathComparer>,
}

impl ShellBackend {
    pub fn new(
        host: Arc<dyn ShellHost>,
        windows: Arc<dyn WindowSystem>,
        paths: Arc<dyn PathComparer>,
    ) -> Self {
        Self {
            host,
            windows,
            paths,
        }
    }

    /// Use one object for all three services.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: ShellHost + WindowSystem + PathComparer + 'static,
    {
        Self {
            host: backend.clone(),
            windows: backend.clone(),
            paths: backend,
        }
    }
}
