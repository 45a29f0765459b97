//! One tab of a file-manager window, reached through its browser object.

use crate::com::{com_error, take_pwstr, to_wide_null};
use crate::commands::FRAME_WINDOW_CLASS;
use crate::desktop::{class_name, handle, is_window};
use shelltab_core::{ShellTabError, ShellTabResult, ShellWindowId, WindowHandle};
use shelltab_watcher::{ShellWindow, ShellWindowRef};
use std::ffi::c_void;
use std::sync::Arc;
use tracing::trace;
use windows::core::{AgileReference, Interface, BSTR, PCWSTR, VARIANT};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, IServiceProvider, CLSCTX_ALL};
use windows::Win32::UI::Shell::Common::ITEMIDLIST;
use windows::Win32::UI::Shell::{
    IFolderView2, IPersistFolder2, IShellBrowser, IShellFolder, IShellView, IShellWindows,
    IWebBrowser2, SHGetNameFromIDList, ShellWindows, SID_STopLevelBrowser,
    SIGDN_DESKTOPABSOLUTEPARSING, SIGDN_PARENTRELATIVEPARSING, SVSI_DESELECTOTHERS,
    SVSI_ENSUREVISIBLE, SVSI_FOCUSED, SVSI_SELECT, _SVSIF,
};

pub(crate) struct ExplorerWindow {
    id: ShellWindowId,
    tab: WindowHandle,
    browser: AgileReference<IWebBrowser2>,
}

impl ExplorerWindow {
    /// Wrap a browser object. Fails for browsers that are not hosted in a
    /// file-manager tab.
    fn new(browser: &IWebBrowser2) -> ShellTabResult<Self> {
        let frame = unsafe { browser.HWND() }.map_err(com_error("IWebBrowser2::HWND"))?;
        let frame = HWND(frame.0 as *mut c_void);
        if class_name(frame) != FRAME_WINDOW_CLASS {
            return Err(ShellTabError::shell("browser is not a file-manager window"));
        }

        let shell_browser = top_level_browser(browser)?;
        let tab = unsafe { shell_browser.GetWindow() }.map_err(com_error("IShellBrowser::GetWindow"))?;
        let tab = handle(tab);
        if tab.is_null() {
            return Err(ShellTabError::shell("browser has no tab window"));
        }

        Ok(Self {
            id: ShellWindowId(tab.0 as usize),
            tab,
            browser: AgileReference::new(browser).map_err(com_error("AgileReference::new"))?,
        })
    }

    fn browser(&self) -> ShellTabResult<IWebBrowser2> {
        self.browser.resolve().map_err(com_error("AgileReference::resolve"))
    }

    fn views(&self) -> ShellTabResult<(IShellView, IFolderView2)> {
        let shell_browser = top_level_browser(&self.browser()?)?;
        let view = unsafe { shell_browser.QueryActiveShellView() }
            .map_err(com_error("IShellBrowser::QueryActiveShellView"))?;
        let folder_view: IFolderView2 = view.cast().map_err(com_error("IFolderView2"))?;
        Ok((view, folder_view))
    }

    /// Parsing name of the folder in view.
    fn folder_path(&self) -> ShellTabResult<String> {
        let (_, view) = self.views()?;
        let folder: IPersistFolder2 =
            unsafe { view.GetFolder() }.map_err(com_error("IFolderView::GetFolder"))?;
        let pidl = unsafe { folder.GetCurFolder() }.map_err(com_error("IPersistFolder2::GetCurFolder"))?;
        let name = unsafe { SHGetNameFromIDList(pidl, SIGDN_DESKTOPABSOLUTEPARSING) };
        unsafe { CoTaskMemFree(Some(pidl as *const c_void)) };
        let name = name.map_err(com_error("SHGetNameFromIDList"))?;
        Ok(take_pwstr(name))
    }
}

fn top_level_browser(browser: &IWebBrowser2) -> ShellTabResult<IShellBrowser> {
    let provider: IServiceProvider = browser.cast().map_err(com_error("IServiceProvider"))?;
    unsafe { provider.QueryService(&SID_STopLevelBrowser) }.map_err(com_error("QueryService"))
}

impl ShellWindow for ExplorerWindow {
    fn id(&self) -> ShellWindowId {
        self.id
    }

    fn tab_handle(&self) -> ShellTabResult<WindowHandle> {
        if !is_window(self.tab) {
            return Err(ShellTabError::window(format!("tab {} is gone", self.tab)));
        }
        Ok(self.tab)
    }

    fn location(&self) -> ShellTabResult<String> {
        match self.folder_path() {
            Ok(path) => Ok(path),
            Err(e) => {
                trace!(tab = %self.tab, error = %e, "Folder view unavailable, using URL");
                let url = unsafe { self.browser()?.LocationURL() }
                    .map_err(com_error("IWebBrowser2::LocationURL"))?;
                Ok(url.to_string())
            }
        }
    }

    fn navigate(&self, location: &str) -> ShellTabResult<()> {
        let browser = self.browser()?;
        let url = VARIANT::from(BSTR::from(location));
        let empty = VARIANT::default();
        unsafe { browser.Navigate2(&url, &empty, &empty, &empty, &empty) }
            .map_err(com_error("IWebBrowser2::Navigate2"))
    }

    fn go_back(&self) -> ShellTabResult<()> {
        unsafe { self.browser()?.GoBack() }.map_err(com_error("IWebBrowser2::GoBack"))
    }

    fn selected_items(&self) -> ShellTabResult<Vec<String>> {
        let (_, view) = self.views()?;
        let Ok(items) = (unsafe { view.GetSelection(false) }) else {
            return Ok(Vec::new());
        };
        let count = unsafe { items.GetCount() }.map_err(com_error("IShellItemArray::GetCount"))?;

        let mut names = Vec::with_capacity(count as usize);
        for index in 0..count {
            let item = unsafe { items.GetItemAt(index) }.map_err(com_error("IShellItemArray::GetItemAt"))?;
            let name = unsafe { item.GetDisplayName(SIGDN_PARENTRELATIVEPARSING) }
                .map_err(com_error("IShellItem::GetDisplayName"))?;
            names.push(take_pwstr(name));
        }
        Ok(names)
    }

    fn select_items(&self, names: &[String]) -> ShellTabResult<usize> {
        let (shell_view, view) = self.views()?;
        let folder: IShellFolder =
            unsafe { view.GetFolder() }.map_err(com_error("IFolderView::GetFolder"))?;

        let mut selected = 0;
        for name in names {
            let wide = to_wide_null(name);
            let mut pidl: *mut ITEMIDLIST = std::ptr::null_mut();
            let parsed = unsafe {
                folder.ParseDisplayName(HWND::default(), None, PCWSTR(wide.as_ptr()), None, &mut pidl, None)
            };
            if parsed.is_err() || pidl.is_null() {
                trace!(name = %name, "Item not found in folder");
                continue;
            }

            let flags = if selected == 0 {
                _SVSIF(SVSI_SELECT.0 | SVSI_DESELECTOTHERS.0 | SVSI_ENSUREVISIBLE.0 | SVSI_FOCUSED.0)
            } else {
                SVSI_SELECT
            };
            let result = unsafe { shell_view.SelectItem(pidl, flags) };
            unsafe { CoTaskMemFree(Some(pidl as *const c_void)) };
            if result.is_ok() {
                selected += 1;
            }
        }
        Ok(selected)
    }

    fn quit(&self) -> ShellTabResult<()> {
        unsafe { self.browser()?.Quit() }.map_err(com_error("IWebBrowser2::Quit"))
    }
}

/// Every file-manager tab registered with the shell.
pub(crate) fn shell_windows() -> ShellTabResult<Vec<ShellWindowRef>> {
    let collection: IShellWindows =
        unsafe { CoCreateInstance(&ShellWindows, None, CLSCTX_ALL) }.map_err(com_error("CoCreateInstance(ShellWindows)"))?;
    let count = unsafe { collection.Count() }.map_err(com_error("IShellWindows::Count"))?;

    let mut windows: Vec<ShellWindowRef> = Vec::new();
    for index in 0..count {
        let Ok(dispatch) = (unsafe { collection.Item(&VARIANT::from(index)) }) else {
            continue;
        };
        let Ok(browser) = dispatch.cast::<IWebBrowser2>() else {
            continue;
        };
        match ExplorerWindow::new(&browser) {
            Ok(window) => windows.push(Arc::new(window)),
            Err(e) => trace!(index, error = %e, "Skipping shell window"),
        }
    }
    Ok(windows)
}
