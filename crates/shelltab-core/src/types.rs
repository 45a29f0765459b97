//! Common types used throughout shelltab

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque OS window handle (an HWND on Windows).
///
/// Used for both top-level file-manager windows and the tab containers inside
/// them. The zero handle means "no window".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub const NULL: WindowHandle = WindowHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for the zero handle.
    pub fn non_null(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }

    pub fn raw(self) -> isize {
        self.0
    }
}

impl From<isize> for WindowHandle {
    fn from(raw: isize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Identity of an external shell window object.
///
/// Two references to the same object yield the same id for as long as either is
/// alive. On Windows this is the object's canonical `IUnknown` pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShellWindowId(pub usize);

impl fmt::Display for ShellWindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shell#{:X}", self.0)
    }
}

/// Snapshot of a window, taken when it closes or is duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Normalized location the window was showing.
    pub location: String,
    /// Top-level window the record came from.
    pub origin_handle: WindowHandle,
    /// Selected item names, in view order.
    pub selected_items: Option<Vec<String>>,
}

impl WindowRecord {
    pub fn new(location: impl Into<String>, origin_handle: WindowHandle) -> Self {
        Self {
            location: location.into(),
            origin_handle,
            selected_items: None,
        }
    }

    /// Attach a selection. An empty selection is stored as `None`.
    pub fn with_selection(mut self, items: Option<Vec<String>>) -> Self {
        self.selected_items = items.filter(|items| !items.is_empty());
        self
    }
}
