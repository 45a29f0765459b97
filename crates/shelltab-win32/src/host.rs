use crate::events::{self, ClosingHook, ClosingHooks};
use crate::{browser, com, desktop};
use shelltab_core::{ShellTabResult, WindowHandle};
use shelltab_watcher::{
    ClosingCallback, EventCallback, EventSubscription, PathComparer, ShellEvent, ShellHost,
    ShellWindowRef, StaInit, WindowSystem,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// The Windows shell as a watcher backend.
#[derive(Default)]
pub struct Win32Shell {
    closing: Arc<ClosingHooks>,
}

impl Win32Shell {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShellHost for Win32Shell {
    fn subscribe(&self, events: UnboundedSender<ShellEvent>) -> ShellTabResult<EventSubscription> {
        events::subscribe(events, Arc::clone(&self.closing))
    }

    fn shell_windows(&self) -> ShellTabResult<Vec<ShellWindowRef>> {
        browser::shell_windows()
    }

    fn hook_closing(
        &self,
        window: &ShellWindowRef,
        callback: ClosingCallback,
    ) -> ShellTabResult<EventSubscription> {
        let tab = window.tab_handle()?;
        let token = self.closing.add(tab, ClosingHook::spawn(window, callback)?);
        let closing = Arc::clone(&self.closing);
        Ok(EventSubscription::new("closing", move || closing.remove(tab, token)))
    }

    fn hook_navigate_complete(
        &self,
        window: &ShellWindowRef,
        callback: EventCallback,
    ) -> ShellTabResult<EventSubscription> {
        events::watch_navigation(window, callback)
    }

    fn shell_process_id(&self) -> Option<u32> {
        desktop::shell_process_id()
    }

    fn sta_init(&self) -> StaInit {
        com::sta_init()
    }
}

impl WindowSystem for Win32Shell {
    fn top_level_windows(&self) -> Vec<WindowHandle> {
        desktop::top_level_windows()
    }

    fn tab_handles(&self, window: WindowHandle) -> Vec<WindowHandle> {
        desktop::tab_handles(window)
    }

    fn parent_window(&self, tab: WindowHandle) -> Option<WindowHandle> {
        desktop::parent_window(tab)
    }

    fn active_tab(&self, window: WindowHandle) -> Option<WindowHandle> {
        desktop::active_tab(window)
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        desktop::is_window(window)
    }

    fn post_new_tab(&self, window: WindowHandle) -> ShellTabResult<()> {
        desktop::post_new_tab(window)
    }

    fn select_tab(&self, window: WindowHandle, index: usize) -> ShellTabResult<()> {
        desktop::select_tab(window, index)
    }

    fn bring_to_front(&self, window: WindowHandle) -> ShellTabResult<()> {
        desktop::bring_to_front(window)
    }

    fn set_visible(&self, window: WindowHandle, visible: bool) -> ShellTabResult<()> {
        desktop::set_visible(window, visible)
    }

    fn launch_shell_window(&self, location: Option<&str>) -> ShellTabResult<()> {
        desktop::launch_shell_window(location)
    }
}

impl PathComparer for Win32Shell {
    fn same_location(&self, a: &str, b: &str) -> ShellTabResult<bool> {
        Ok(com::same_location(a, b))
    }
}
