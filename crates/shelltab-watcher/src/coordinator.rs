//! Open a location as a new tab.
//!
//! The shell only offers "add a blank tab to this window", so opening a tab is
//! a protocol: post the new-tab command, wait for a tab handle that was not
//! there before, find the shell window behind it, navigate it and wait for the
//! navigation to land. Two runs interleaved would each see the other's tab as
//! "new", so at most one run is in flight at any time.

use crate::registry::Claim;
use crate::session::SessionContext;
use crate::shell::{EventCallback, ShellWindowRef};
use crate::watcher::WatcherInner;
use shelltab_common::{poll_value, with_timeout};
use shelltab_core::location::normalize_location;
use shelltab_core::{ShellWindowId, WindowHandle};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, trace, warn};

/// What to open and where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenRequest {
    pub location: String,
    /// Window to open the tab in.
    pub target: Option<WindowHandle>,
    /// Window the request came from, used when nothing better exists.
    pub origin: Option<WindowHandle>,
    /// Window that must not receive the tab.
    pub exclude: Option<WindowHandle>,
    pub selected_items: Option<Vec<String>>,
    /// Always open a new tab, even if one already shows the location.
    pub duplicate: bool,
}

impl OpenRequest {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn target(mut self, target: Option<WindowHandle>) -> Self {
        self.target = target;
        self
    }

    pub fn origin(mut self, origin: Option<WindowHandle>) -> Self {
        self.origin = origin;
        self
    }

    pub fn exclude(mut self, window: WindowHandle) -> Self {
        self.exclude = Some(window);
        self
    }

    pub fn select(mut self, items: Option<Vec<String>>) -> Self {
        self.selected_items = items.filter(|items| !items.is_empty());
        self
    }

    pub fn duplicate(mut self) -> Self {
        self.duplicate = true;
        self
    }
}

/// How an open request took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new tab was created.
    Opened(WindowHandle),
    /// An existing tab already showed the location and was activated.
    Reused(WindowHandle),
    /// No window existed, so a new one was launched.
    Launched,
}

impl OpenOutcome {
    pub fn tab(self) -> Option<WindowHandle> {
        match self {
            Self::Opened(tab) | Self::Reused(tab) => Some(tab),
            Self::Launched => None,
        }
    }
}

/// Where a request lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Window(WindowHandle),
    Launched,
}

/// Serializes open-tab runs. Released when the guard drops.
#[derive(Default)]
pub(crate) struct TabOpener {
    lock: Mutex<()>,
}

impl TabOpener {
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Pick the window with the most tabs. Candidates are given topmost first and
/// ties go to the topmost.
pub fn choose_target(candidates: &[(WindowHandle, usize)]) -> Option<WindowHandle> {
    let mut best: Option<(WindowHandle, usize)> = None;
    for &(window, tabs) in candidates {
        if best.map_or(true, |(_, most)| tabs > most) {
            best = Some((window, tabs));
        }
    }
    best.map(|(window, _)| window)
}

impl WatcherInner {
    /// Run the open-tab protocol. `None` means the request had no effect.
    pub(crate) async fn open_tab(&self, ctx: &SessionContext, request: OpenRequest) -> Option<OpenOutcome> {
        let location = normalize_location(&request.location);
        let _opening = self.opener.acquire().await;
        trace!(location = %location, duplicate = request.duplicate, "Opening tab");

        if !request.duplicate && !location.is_empty() && self.reuse_tabs.load(Ordering::SeqCst) {
            if let Some(tab) = self.search_for_tab(ctx, &location, request.exclude).await {
                if self.activate_tab(tab) {
                    debug!(location = %location, tab = %tab, "Reusing existing tab");
                    return Some(OpenOutcome::Reused(tab));
                }
            }
        }

        let target = match self.resolve_target(&request, &location)? {
            Target::Window(window) => window,
            Target::Launched => return Some(OpenOutcome::Launched),
        };

        let tab = self.add_tab(ctx, target).await?;
        let (id, window) = self.find_window_by_handle(ctx, tab, Some(target)).await?;

        if location.is_empty() {
            self.bring_to_front(target);
        } else {
            self.navigate_and_wait(ctx, id, &window, &location, target).await;
        }

        if let Some(items) = request.selected_items {
            match ctx.sta.call(move || window.select_items(&items)).await {
                Ok(selected) => trace!(selected, "Restored selection"),
                Err(e) => debug!(error = %e, "Could not restore selection"),
            }
        }

        info!(location = %location, window = %target, tab = %tab, "Opened tab");
        Some(OpenOutcome::Opened(tab))
    }

    /// Open a blank tab, launching a window if none exists.
    pub(crate) async fn open_blank_tab(&self, window: Option<WindowHandle>, bring_to_front: bool) -> bool {
        let _opening = self.opener.acquire().await;
        match self.resolve_target(&OpenRequest::new("").target(window), "") {
            Some(Target::Window(target)) => {
                if let Err(e) = self.backend.windows.post_new_tab(target) {
                    warn!(window = %target, error = %e, "Could not request a new tab");
                    return false;
                }
                if bring_to_front {
                    self.bring_to_front(target);
                }
                true
            }
            Some(Target::Launched) => true,
            None => false,
        }
    }

    /// Explicit target, then the preferred target window, then the window with
    /// the most tabs, then the request's origin. Launches a new window when
    /// none of these exists and the request excludes no window.
    pub(crate) fn resolve_target(&self, request: &OpenRequest, location: &str) -> Option<Target> {
        let windows = &self.backend.windows;
        let usable = |window: &WindowHandle| {
            !window.is_null() && Some(*window) != request.exclude && windows.is_window(*window)
        };

        if let Some(target) = request.target.filter(usable) {
            return Some(Target::Window(target));
        }
        if let Some(target) = self.target_window().filter(usable) {
            return Some(Target::Window(target));
        }

        let candidates: Vec<_> = windows
            .top_level_windows()
            .into_iter()
            .filter(|window| usable(window) && !self.is_suppressed(*window))
            .map(|window| (window, windows.tab_handles(window).len()))
            .collect();
        if let Some(target) = choose_target(&candidates) {
            return Some(Target::Window(target));
        }

        if let Some(origin) = request.origin.filter(usable) {
            return Some(Target::Window(origin));
        }

        if request.exclude.is_some() {
            debug!("No window to open the tab in");
            return None;
        }

        let launch_at = (!location.is_empty()).then_some(location);
        match windows.launch_shell_window(launch_at) {
            Ok(()) => {
                info!(location = launch_at.unwrap_or_default(), "Launched new shell window");
                Some(Target::Launched)
            }
            Err(e) => {
                warn!(error = %e, "Could not launch shell window");
                None
            }
        }
    }

    /// Post the new-tab command and wait for exactly one new tab handle.
    async fn add_tab(&self, ctx: &SessionContext, target: WindowHandle) -> Option<WindowHandle> {
        let windows = &self.backend.windows;
        let before: HashSet<_> = windows.tab_handles(target).into_iter().collect();

        if let Err(e) = windows.post_new_tab(target) {
            warn!(window = %target, error = %e, "Could not request a new tab");
            return None;
        }

        let before = &before;
        let tab = poll_value(
            self.poll_config(self.timing.tab_appear_timeout()),
            &ctx.cancel,
            move || {
                let fresh: Vec<_> = windows
                    .tab_handles(target)
                    .into_iter()
                    .filter(|tab| !before.contains(tab))
                    .collect();
                async move {
                    match fresh.as_slice() {
                        [tab] => Some(*tab),
                        _ => None,
                    }
                }
            },
        )
        .await;

        if tab.is_none() {
            warn!(window = %target, "New tab did not appear");
        }
        tab
    }

    /// Shell window hosted by `tab`, from the registry or by asking the shell.
    pub(crate) async fn window_for_handle(&self, ctx: &SessionContext, tab: WindowHandle) -> Option<ShellWindowRef> {
        if let Some(window) = self.registry.lookup_by_handle(tab) {
            return Some(window);
        }

        let host = Arc::clone(&self.backend.host);
        ctx.sta
            .call(move || {
                for window in host.shell_windows()? {
                    if window.tab_handle().ok() == Some(tab) {
                        return Ok(Some(window));
                    }
                }
                Ok(None)
            })
            .await
            .ok()
            .flatten()
    }

    /// Wait for the shell window behind a new tab, then track and hook it.
    async fn find_window_by_handle(
        &self,
        ctx: &SessionContext,
        tab: WindowHandle,
        origin: Option<WindowHandle>,
    ) -> Option<(ShellWindowId, ShellWindowRef)> {
        let window = poll_value(
            self.poll_config(self.timing.window_resolve_timeout()),
            &ctx.cancel,
            move || self.window_for_handle(ctx, tab),
        )
        .await;
        let Some(window) = window else {
            warn!(tab = %tab, "No shell window behind new tab");
            return None;
        };

        let id = window.id();
        match self.claim_in_session(ctx, &window)? {
            Claim::Claimed { .. } => trace!(window = %id, "Claimed new tab window"),
            Claim::AlreadyPresent => {}
        }
        self.registry.resolve_handle(id, &ctx.sta).await;
        if let Some(origin) = origin {
            self.registry.set_origin(id, origin);
        }
        self.hook_window(ctx, id).await;
        Some((id, window))
    }

    async fn navigate_and_wait(
        &self,
        ctx: &SessionContext,
        id: ShellWindowId,
        window: &ShellWindowRef,
        location: &str,
        target: WindowHandle,
    ) {
        let completed = Arc::new(Notify::new());
        let notify = Arc::clone(&completed);
        let callback: EventCallback = Arc::new(move || notify.notify_one());

        let host = Arc::clone(&self.backend.host);
        let hooked = Arc::clone(window);
        let subscription = match ctx
            .sta
            .call(move || host.hook_navigate_complete(&hooked, callback))
            .await
        {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                debug!(error = %e, "Could not hook navigation");
                None
            }
        };

        let navigating = Arc::clone(window);
        let destination = location.to_string();
        let navigated = ctx
            .sta
            .call(move || navigating.navigate(&destination))
            .await;
        self.bring_to_front(target);

        match navigated {
            Ok(()) => {
                let timeout = self.timing.navigation_timeout();
                if with_timeout(timeout, &ctx.cancel, completed.notified()).await.is_none() {
                    debug!(location = %location, "Navigation not confirmed in time");
                }
                self.registry.set_location(id, location);
            }
            Err(e) => warn!(location = %location, error = %e, "Navigation failed"),
        }

        drop(subscription);
    }

    fn bring_to_front(&self, window: WindowHandle) {
        if let Err(e) = self.backend.windows.bring_to_front(window) {
            debug!(window = %window, error = %e, "Could not bring window to front");
        }
    }
}
