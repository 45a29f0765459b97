//! Plain window-handle operations.

use crate::commands::{select_tab_command, FRAME_WINDOW_CLASS, NEW_TAB};
use shelltab_core::{ShellTabError, ShellTabResult, WindowHandle};
use std::ffi::c_void;
use std::process::Command;
use tracing::{debug, trace};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, TRUE, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, FindWindowExW, GetAncestor, GetClassNameW, GetShellWindow,
    GetWindowThreadProcessId, IsIconic, IsWindow, IsWindowVisible, PostMessageW,
    SetForegroundWindow, ShowWindow, GA_ROOT, SW_HIDE, SW_RESTORE, SW_SHOW, WM_COMMAND,
};

pub(crate) fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

pub(crate) fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

pub(crate) fn class_name(window: HWND) -> String {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(window, &mut buf) };
    String::from_utf16_lossy(&buf[..len.max(0) as usize])
}

unsafe extern "system" fn collect_frames(window: HWND, lparam: LPARAM) -> BOOL {
    let frames = &mut *(lparam.0 as *mut Vec<WindowHandle>);
    if class_name(window) == FRAME_WINDOW_CLASS {
        frames.push(handle(window));
    }
    TRUE
}

/// File-manager frames in z-order, topmost first.
pub(crate) fn top_level_windows() -> Vec<WindowHandle> {
    let mut frames: Vec<WindowHandle> = Vec::new();
    let result = unsafe {
        EnumWindows(
            Some(collect_frames),
            LPARAM(&mut frames as *mut Vec<WindowHandle> as isize),
        )
    };
    if let Err(e) = result {
        debug!(error = ?e, "EnumWindows failed");
    }
    frames
}

pub(crate) fn tab_handles(window: WindowHandle) -> Vec<WindowHandle> {
    let parent = hwnd(window);
    let mut tabs = Vec::new();
    let mut after = HWND::default();
    while let Ok(tab) = unsafe { FindWindowExW(parent, after, w!("ShellTabWindowClass"), PCWSTR::null()) } {
        if tab.0.is_null() {
            break;
        }
        tabs.push(handle(tab));
        after = tab;
    }
    tabs
}

pub(crate) fn parent_window(tab: WindowHandle) -> Option<WindowHandle> {
    let root = unsafe { GetAncestor(hwnd(tab), GA_ROOT) };
    if root.0.is_null() || class_name(root) != FRAME_WINDOW_CLASS {
        return None;
    }
    Some(handle(root))
}

/// The visible tab of `window`.
pub(crate) fn active_tab(window: WindowHandle) -> Option<WindowHandle> {
    tab_handles(window)
        .into_iter()
        .find(|tab| unsafe { IsWindowVisible(hwnd(*tab)) }.as_bool())
}

pub(crate) fn is_window(window: WindowHandle) -> bool {
    !window.is_null() && unsafe { IsWindow(hwnd(window)) }.as_bool()
}

fn post_command(window: WindowHandle, command: u32) -> ShellTabResult<()> {
    // Tab commands are handled by the active tab, not the frame.
    let receiver = active_tab(window).unwrap_or(window);
    unsafe { PostMessageW(hwnd(receiver), WM_COMMAND, WPARAM(command as usize), LPARAM(0)) }
        .map_err(|e| ShellTabError::window(format!("PostMessageW to {receiver} failed: {e:?}")))
}

pub(crate) fn post_new_tab(window: WindowHandle) -> ShellTabResult<()> {
    if !is_window(window) {
        return Err(ShellTabError::window(format!("{window} is not a window")));
    }
    trace!(window = %window, "Posting new-tab command");
    post_command(window, NEW_TAB)
}

pub(crate) fn select_tab(window: WindowHandle, index: usize) -> ShellTabResult<()> {
    let count = tab_handles(window).len();
    let command = select_tab_command(index, count).ok_or_else(|| {
        ShellTabError::window(format!("tab {index} of {count} in {window} has no select command"))
    })?;
    post_command(window, command)
}

pub(crate) fn bring_to_front(window: WindowHandle) -> ShellTabResult<()> {
    let frame = hwnd(window);
    unsafe {
        if IsIconic(frame).as_bool() {
            let _ = ShowWindow(frame, SW_RESTORE);
        }
        if !SetForegroundWindow(frame).as_bool() {
            return Err(ShellTabError::window(format!("SetForegroundWindow({window}) refused")));
        }
    }
    Ok(())
}

pub(crate) fn set_visible(window: WindowHandle, visible: bool) -> ShellTabResult<()> {
    if !is_window(window) {
        return Err(ShellTabError::window(format!("{window} is not a window")));
    }
    unsafe {
        let _ = ShowWindow(hwnd(window), if visible { SW_SHOW } else { SW_HIDE });
    }
    Ok(())
}

pub(crate) fn launch_shell_window(location: Option<&str>) -> ShellTabResult<()> {
    let mut command = Command::new("explorer.exe");
    if let Some(location) = location {
        command.arg(location);
    }
    command.spawn()?;
    Ok(())
}

/// Process owning the desktop shell window.
pub(crate) fn shell_process_id() -> Option<u32> {
    let shell = unsafe { GetShellWindow() };
    if shell.0.is_null() {
        return None;
    }
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(shell, Some(&mut pid as *mut u32)) };
    (pid != 0).then_some(pid)
}
