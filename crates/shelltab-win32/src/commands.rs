//! Window classes and command codes of the file manager.

/// Class of a top-level file-manager window.
pub const FRAME_WINDOW_CLASS: &str = "CabinetWClass";

/// Class of one tab inside a file-manager window.
pub const TAB_WINDOW_CLASS: &str = "ShellTabWindowClass";

/// `WM_COMMAND` id that opens a blank tab.
pub const NEW_TAB: u32 = 0xA21B;

/// `WM_COMMAND` id selecting the first tab. The next seven follow.
pub const SELECT_TAB_BASE: u32 = 0xA221;

/// Tabs reachable through [`SELECT_TAB_BASE`].
pub const SELECTABLE_TABS: usize = 8;

/// `WM_COMMAND` id selecting the last tab.
pub const LAST_TAB: u32 = 0xA229;

/// Command that activates tab `index` of a window with `count` tabs.
///
/// The first eight tabs and the last one have a command; any other tab cannot
/// be addressed and yields `None`.
pub fn select_tab_command(index: usize, count: usize) -> Option<u32> {
    if index >= count {
        return None;
    }
    if index < SELECTABLE_TABS {
        return Some(SELECT_TAB_BASE + index as u32);
    }
    (index == count - 1).then_some(LAST_TAB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tabs_use_base_commands() {
        assert_eq!(select_tab_command(0, 3), Some(0xA221));
        assert_eq!(select_tab_command(2, 3), Some(0xA223));
        assert_eq!(select_tab_command(7, 20), Some(0xA228));
    }

    #[test]
    fn test_last_tab_command() {
        assert_eq!(select_tab_command(11, 12), Some(LAST_TAB));
        assert_eq!(select_tab_command(9, 12), None);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(select_tab_command(0, 0), None);
        assert_eq!(select_tab_command(5, 5), None);
    }
}
