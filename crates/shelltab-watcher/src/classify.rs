//! Decide what to do with a newly registered window.

/// What the watcher does with a window it has just claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// System location that is never tracked. Forget it.
    Reserved,
    /// A tab dragged out of a window moments ago. Restore its selection and
    /// leave it standalone.
    Reattach,
    /// Open its location as a tab of an existing window, then close it.
    MergeIntoTab,
    /// A genuine new window. Hook it and let it be.
    Track,
}

/// Observations about a new window, gathered before classifying it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowFacts {
    /// Its location is reserved.
    pub reserved: bool,
    /// Hooking is on, another tracked window exists and this one has a single
    /// tab.
    pub merge_candidate: bool,
    /// Its location matched a fresh closed-window record.
    pub reattached: bool,
}

impl WindowFacts {
    pub fn classify(self) -> Classification {
        if self.reserved {
            Classification::Reserved
        } else if self.reattached {
            Classification::Reattach
        } else if self.merge_candidate {
            Classification::MergeIntoTab
        } else {
            Classification::Track
        }
    }
}
