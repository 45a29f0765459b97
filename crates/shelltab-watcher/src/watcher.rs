//! The watcher: shared state, event handlers and the public operations.

use crate::classify::{Classification, WindowFacts};
use crate::coordinator::{OpenOutcome, OpenRequest, TabOpener};
use crate::history::ClosedWindowHistory;
use crate::registry::{Claim, WindowRegistry};
use crate::session::{MonitorHandle, Session, SessionContext};
use crate::shell::{
    ClosingCallback, ClosingSnapshot, EventCallback, ShellBackend, ShellEvent, ShellWindowRef,
};
use shelltab_common::{poll_value, PollConfig};
use shelltab_core::location::{is_reserved, normalize_location};
use shelltab_core::{
    ShellTabError, ShellTabResult, ShellWindowId, TimingConfig, WatcherConfig, WindowHandle,
    WindowRecord,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct WatcherInner {
    pub(crate) backend: ShellBackend,
    pub(crate) timing: TimingConfig,
    pub(crate) running: AtomicBool,
    pub(crate) hook_enabled: AtomicBool,
    pub(crate) reuse_tabs: AtomicBool,
    pub(crate) registry: WindowRegistry,
    pub(crate) history: ClosedWindowHistory,
    pub(crate) opener: TabOpener,
    pub(crate) target_window: Mutex<Option<WindowHandle>>,
    /// Top-level windows being converted into tabs. Kept hidden.
    pub(crate) suppressed: Mutex<HashSet<WindowHandle>>,
    pub(crate) session: Mutex<Option<Session>>,
    pub(crate) monitor: Mutex<Option<MonitorHandle>>,
}

impl WatcherInner {
    pub(crate) fn poll_config(&self, timeout: Duration) -> PollConfig {
        PollConfig::new(timeout, self.timing.poll_interval())
    }

    pub(crate) fn target_window(&self) -> Option<WindowHandle> {
        *lock(&self.target_window)
    }

    pub(crate) fn is_suppressed(&self, window: WindowHandle) -> bool {
        lock(&self.suppressed).contains(&window)
    }

    fn suppress(&self, window: WindowHandle) {
        lock(&self.suppressed).insert(window);
        if let Err(e) = self.backend.windows.set_visible(window, false) {
            debug!(window = %window, error = %e, "Could not hide window");
        }
    }

    fn reveal(&self, window: WindowHandle) {
        if lock(&self.suppressed).remove(&window) {
            if let Err(e) = self.backend.windows.set_visible(window, true) {
                warn!(window = %window, error = %e, "Could not show window");
            }
        }
    }

    pub(crate) fn clear_suppressed(&self) {
        lock(&self.suppressed).clear();
    }

    /// Subscribe to a tracked window's closing and navigation events.
    pub(crate) async fn hook_window(&self, ctx: &SessionContext, id: ShellWindowId) -> bool {
        if self.registry.is_hooked(id) {
            return true;
        }
        let Some(window) = self.registry.get(id) else {
            return false;
        };

        let events = ctx.events.clone();
        let callback: ClosingCallback = Arc::new(move |snapshot| {
            let _ = events.send(ShellEvent::WindowClosing {
                window: id,
                snapshot,
            });
        });

        let host = Arc::clone(&self.backend.host);
        let hooked = Arc::clone(&window);
        let attached = match ctx
            .sta
            .call(move || host.hook_closing(&hooked, callback))
            .await
        {
            Ok(subscription) => self.registry.attach_closing(id, subscription),
            Err(e) => {
                warn!(window = %id, error = %e, "Could not hook closing event");
                false
            }
        };
        if attached {
            self.track_navigation(ctx, id, window).await;
        }
        attached
    }

    /// Keep the cached location of a tracked window current, so a close that
    /// arrives without a snapshot is still recorded where the window was.
    async fn track_navigation(&self, ctx: &SessionContext, id: ShellWindowId, window: ShellWindowRef) {
        let events = ctx.events.clone();
        let callback: EventCallback = Arc::new(move || {
            let _ = events.send(ShellEvent::NavigationCompleted(id));
        });

        let host = Arc::clone(&self.backend.host);
        match ctx
            .sta
            .call(move || host.hook_navigate_complete(&window, callback))
            .await
        {
            Ok(subscription) => {
                self.registry.attach_navigation(id, subscription);
            }
            Err(e) => debug!(window = %id, error = %e, "Could not track navigation"),
        }
    }

    /// Claim `window` for the session behind `ctx`. A claim that lands after the
    /// session was cancelled is undone, since teardown may already have drained
    /// the registry.
    pub(crate) fn claim_in_session(&self, ctx: &SessionContext, window: &ShellWindowRef) -> Option<Claim> {
        if ctx.cancel.is_cancelled() {
            return None;
        }
        let claim = self.registry.claim(Arc::clone(window));
        if ctx.cancel.is_cancelled() {
            self.registry.remove(window.id());
            return None;
        }
        Some(claim)
    }

    /// Resolve a tracked window's tab handle and the top-level window around it.
    pub(crate) async fn locate(
        &self,
        ctx: &SessionContext,
        id: ShellWindowId,
    ) -> (Option<WindowHandle>, Option<WindowHandle>) {
        let tab = self.registry.resolve_handle(id, &ctx.sta).await;
        let top = tab.and_then(|tab| self.backend.windows.parent_window(tab));
        if let Some(top) = top {
            self.registry.set_origin(id, top);
        }
        (tab, top)
    }

    /// Read a window's normalized location once.
    pub(crate) async fn read_location(
        &self,
        ctx: &SessionContext,
        window: &ShellWindowRef,
    ) -> Option<String> {
        let window = Arc::clone(window);
        match ctx.sta.call(move || window.location()).await {
            Ok(raw) => Some(normalize_location(&raw)).filter(|l| !l.is_empty()),
            Err(e) => {
                trace!(error = %e, "Could not read location");
                None
            }
        }
    }

    /// Adopt a window that already existed when the session started.
    pub(crate) async fn adopt(&self, ctx: &SessionContext, window: ShellWindowRef) {
        let id = window.id();
        if !matches!(self.claim_in_session(ctx, &window), Some(Claim::Claimed { .. })) {
            return;
        }
        self.locate(ctx, id).await;
        if let Some(location) = self.read_location(ctx, &window).await {
            self.registry.set_location(id, location);
        }
        self.hook_window(ctx, id).await;
    }

    pub(crate) async fn handle_event(self: &Arc<Self>, ctx: &SessionContext, event: ShellEvent) {
        match event {
            ShellEvent::WindowRegistered => {
                let inner = Arc::clone(self);
                let ctx = ctx.clone();
                tokio::spawn(async move { inner.handle_registered(&ctx).await });
            }
            ShellEvent::ObjectShown(window) => self.handle_object_shown(window),
            // Awaited in place so a later close sees the new location.
            ShellEvent::NavigationCompleted(id) => self.handle_navigated(ctx, id).await,
            ShellEvent::WindowClosing { window, snapshot } => self.handle_closing(window, snapshot),
        }
    }

    async fn handle_navigated(&self, ctx: &SessionContext, id: ShellWindowId) {
        let Some(window) = self.registry.get(id) else {
            return;
        };
        if let Some(location) = self.read_location(ctx, &window).await {
            trace!(window = %id, location = %location, "Window navigated");
            self.registry.set_location(id, location);
        }
    }

    /// A window was registered somewhere. Find the ones not yet tracked.
    async fn handle_registered(self: &Arc<Self>, ctx: &SessionContext) {
        let host = Arc::clone(&self.backend.host);
        let registry = &self.registry;
        let fresh = poll_value(
            self.poll_config(self.timing.window_resolve_timeout()),
            &ctx.cancel,
            move || {
                let host = Arc::clone(&host);
                let sta = Arc::clone(&ctx.sta);
                async move {
                    let windows = sta.call(move || host.shell_windows()).await.ok()?;
                    let fresh: Vec<_> = windows
                        .into_iter()
                        .filter(|w| !registry.contains(w.id()))
                        .collect();
                    (!fresh.is_empty()).then_some(fresh)
                }
            },
        )
        .await;

        let Some(fresh) = fresh else {
            trace!("Registered window was already tracked");
            return;
        };
        for window in fresh {
            let inner = Arc::clone(self);
            let ctx = ctx.clone();
            tokio::spawn(async move { inner.handle_new_window(&ctx, window).await });
        }
    }

    pub(crate) async fn handle_new_window(self: &Arc<Self>, ctx: &SessionContext, window: ShellWindowRef) {
        let id = window.id();
        if !matches!(self.claim_in_session(ctx, &window), Some(Claim::Claimed { .. })) {
            return;
        }
        trace!(window = %id, "Classifying new window");

        let this: &WatcherInner = self;
        let pending = &window;
        let location = poll_value(
            self.poll_config(self.timing.window_resolve_timeout()),
            &ctx.cancel,
            move || this.read_location(ctx, pending),
        )
        .await;
        let Some(location) = location else {
            if ctx.cancel.is_cancelled() {
                self.registry.remove(id);
                return;
            }
            debug!("Location never became available, tracking as is");
            self.locate(ctx, id).await;
            self.hook_window(ctx, id).await;
            return;
        };
        self.registry.set_location(id, location.clone());

        if is_reserved(&location) {
            debug!(location = %location, "Discarding reserved location");
            self.registry.remove(id);
            return;
        }

        let (_, top) = self.locate(ctx, id).await;
        let merge_candidate = self.hook_enabled.load(Ordering::SeqCst)
            && top.is_some_and(|top| {
                self.backend.windows.tab_handles(top).len() == 1 && self.has_other_window(id, top)
            });
        if merge_candidate {
            if let Some(top) = top {
                self.suppress(top);
            }
        }

        let reattached = self.history.try_match_and_consume(&location);
        let facts = WindowFacts {
            reserved: false,
            merge_candidate,
            reattached: reattached.is_some(),
        };

        match facts.classify() {
            Classification::Reserved => {
                self.registry.remove(id);
            }
            Classification::Reattach => {
                info!(location = %location, "Window is a detached tab");
                if let Some(items) = reattached.and_then(|record| record.selected_items) {
                    let target = Arc::clone(&window);
                    if let Err(e) = ctx.sta.call(move || target.select_items(&items)).await {
                        debug!(error = %e, "Could not restore selection");
                    }
                }
                self.hook_window(ctx, id).await;
                if let Some(top) = top {
                    self.reveal(top);
                }
            }
            Classification::MergeIntoTab => {
                let Some(top) = top else { return };
                self.merge_into_tab(ctx, id, window, top, location).await;
            }
            Classification::Track => {
                trace!(location = %location, "Tracking new window");
                self.hook_window(ctx, id).await;
                if let Some(top) = top {
                    self.reveal(top);
                }
            }
        }
    }

    /// Another tracked window lives in a different, visible top-level window.
    fn has_other_window(&self, id: ShellWindowId, top: WindowHandle) -> bool {
        let suppressed = lock(&self.suppressed).clone();
        self.registry.snapshot().iter().any(|tracked| {
            tracked.id != id
                && tracked.origin.is_some_and(|origin| {
                    origin != top
                        && !suppressed.contains(&origin)
                        && self.backend.windows.is_window(origin)
                })
        })
    }

    async fn merge_into_tab(
        self: &Arc<Self>,
        ctx: &SessionContext,
        id: ShellWindowId,
        window: ShellWindowRef,
        top: WindowHandle,
        location: String,
    ) {
        let selection = {
            let source = Arc::clone(&window);
            ctx.sta
                .call(move || source.selected_items())
                .await
                .ok()
                .filter(|items| !items.is_empty())
        };

        let request = OpenRequest::new(location.clone())
            .exclude(top)
            .select(selection);
        match self.open_tab(ctx, request).await {
            Some(outcome) => {
                info!(location = %location, ?outcome, "Merged new window into a tab");
                self.registry.remove(id);
                if let Err(e) = ctx.sta.call(move || window.quit()).await {
                    warn!(error = %e, "Could not close merged window");
                }
                lock(&self.suppressed).remove(&top);
            }
            None => {
                debug!(location = %location, "Merge had no effect, keeping window");
                self.hook_window(ctx, id).await;
                self.reveal(top);
            }
        }
    }

    fn handle_object_shown(&self, window: WindowHandle) {
        if self.is_suppressed(window) {
            trace!(window = %window, "Re-hiding suppressed window");
            if let Err(e) = self.backend.windows.set_visible(window, false) {
                debug!(window = %window, error = %e, "Could not hide window");
            }
        }
    }

    fn handle_closing(&self, id: ShellWindowId, snapshot: ClosingSnapshot) {
        let Some(removed) = self.registry.remove(id) else {
            return;
        };

        let location = snapshot
            .location
            .map(|l| normalize_location(&l))
            .filter(|l| !l.is_empty())
            .or(removed.location);
        let Some(location) = location else {
            debug!(window = %id, "Closed window had no known location");
            return;
        };
        if is_reserved(&location) {
            return;
        }

        let origin = removed
            .origin
            .or_else(|| removed.handle.and_then(|h| self.backend.windows.parent_window(h)))
            .unwrap_or_default();
        debug!(window = %id, location = %location, "Window closed");
        self.history
            .push(WindowRecord::new(location, origin).with_selection(snapshot.selected_items));
    }

    /// Activate `tab` inside its top-level window.
    pub(crate) fn activate_tab(&self, tab: WindowHandle) -> bool {
        let windows = &self.backend.windows;
        let Some(parent) = windows.parent_window(tab) else {
            return false;
        };
        let Some(index) = windows.tab_handles(parent).iter().position(|h| *h == tab) else {
            return false;
        };
        if let Err(e) = windows.select_tab(parent, index) {
            warn!(tab = %tab, error = %e, "Could not select tab");
            return false;
        }
        if let Err(e) = windows.bring_to_front(parent) {
            debug!(window = %parent, error = %e, "Could not bring window to front");
        }
        true
    }
}

/// Tracks file-manager windows and turns new windows into tabs.
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    pub fn new(backend: ShellBackend, config: &WatcherConfig) -> Self {
        let timing = config.timing.clone();
        Self {
            inner: Arc::new(WatcherInner {
                backend,
                running: AtomicBool::new(false),
                hook_enabled: AtomicBool::new(config.hook_enabled),
                reuse_tabs: AtomicBool::new(config.reuse_tabs),
                registry: WindowRegistry::new(),
                history: ClosedWindowHistory::new(timing.history_staleness(), config.history_capacity),
                opener: TabOpener::default(),
                target_window: Mutex::new(None),
                suppressed: Mutex::new(HashSet::new()),
                session: Mutex::new(None),
                monitor: Mutex::new(None),
                timing,
            }),
        }
    }

    /// Start tracking: open a session if the shell is running and watch the
    /// shell process from then on.
    pub async fn start(&self) -> ShellTabResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(ShellTabError::AlreadyInitialized);
        }

        if self.inner.shell_pid().is_some() {
            if let Err(e) = self.inner.start_session().await {
                warn!(error = %e, category = e.category(), "Initial session failed, will retry");
            }
        } else {
            info!("Shell is not running yet, waiting for it");
        }

        self.inner.spawn_monitor();
        info!("Watcher started");
        Ok(())
    }

    /// Stop the monitor and tear the session down. Closed-window history is
    /// kept.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let monitor = lock(&self.inner.monitor).take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        self.inner.teardown_session();
        info!("Watcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn has_session(&self) -> bool {
        self.inner.has_session()
    }

    pub fn start_hook(&self) {
        if !self.inner.hook_enabled.swap(true, Ordering::SeqCst) {
            info!("Tab hook enabled");
        }
    }

    pub fn stop_hook(&self) {
        if self.inner.hook_enabled.swap(false, Ordering::SeqCst) {
            info!("Tab hook disabled");
        }
    }

    pub fn is_hook_enabled(&self) -> bool {
        self.inner.hook_enabled.load(Ordering::SeqCst)
    }

    pub fn set_reuse_tabs(&self, reuse: bool) {
        self.inner.reuse_tabs.store(reuse, Ordering::SeqCst);
    }

    pub fn is_reuse_tabs(&self) -> bool {
        self.inner.reuse_tabs.load(Ordering::SeqCst)
    }

    /// Tab currently showing `location`, ignoring windows opened moments ago.
    pub async fn search_for_tab(&self, location: &str) -> Option<WindowHandle> {
        let ctx = self.inner.context()?;
        self.inner.search_for_tab(&ctx, location, None).await
    }

    pub fn select_tab_by_handle(&self, window: WindowHandle, tab: WindowHandle) -> bool {
        let windows = &self.inner.backend.windows;
        let Some(index) = windows.tab_handles(window).iter().position(|h| *h == tab) else {
            debug!(window = %window, tab = %tab, "Tab not found in window");
            return false;
        };
        self.select_index(window, index)
    }

    pub fn select_tab_by_index(&self, window: WindowHandle, index: usize) -> bool {
        let count = self.inner.backend.windows.tab_handles(window).len();
        if index >= count {
            debug!(window = %window, index, count, "Tab index out of range");
            return false;
        }
        self.select_index(window, index)
    }

    pub fn select_last_tab(&self, window: WindowHandle) -> bool {
        match self.inner.backend.windows.tab_handles(window).len() {
            0 => false,
            count => self.select_index(window, count - 1),
        }
    }

    fn select_index(&self, window: WindowHandle, index: usize) -> bool {
        match self.inner.backend.windows.select_tab(window, index) {
            Ok(()) => true,
            Err(e) => {
                warn!(window = %window, index, error = %e, "Could not select tab");
                false
            }
        }
    }

    /// Open a blank tab. Launches a new file-manager window when none exists.
    pub async fn request_to_open_new_tab(&self, window: Option<WindowHandle>, bring_to_front: bool) -> bool {
        self.inner.open_blank_tab(window, bring_to_front).await
    }

    /// Open `location` in a new tab after an optional delay. An empty location
    /// opens a blank tab.
    pub async fn open(&self, location: &str, window: Option<WindowHandle>, delay: Option<Duration>) -> bool {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if normalize_location(location).is_empty() {
            return self.request_to_open_new_tab(window, true).await;
        }
        let Some(ctx) = self.inner.context() else {
            return false;
        };
        self.inner
            .open_tab(&ctx, OpenRequest::new(location).target(window))
            .await
            .is_some()
    }

    pub async fn open_new_tab(&self, window: Option<WindowHandle>, location: &str) -> Option<WindowHandle> {
        let ctx = self.inner.context()?;
        self.inner
            .open_tab(&ctx, OpenRequest::new(location).target(window))
            .await
            .and_then(OpenOutcome::tab)
    }

    /// Open the active tab's location and selection in a new tab of the same
    /// window.
    pub async fn duplicate_active_tab(&self, window: WindowHandle) -> Option<WindowHandle> {
        let ctx = self.inner.context()?;
        let tab = self.inner.backend.windows.active_tab(window)?;
        let source = self.inner.window_for_handle(&ctx, tab).await?;
        let (location, selection) = ctx
            .sta
            .call(move || Ok((source.location()?, source.selected_items().ok())))
            .await
            .ok()?;

        let request = OpenRequest::new(location)
            .target(Some(window))
            .origin(Some(window))
            .select(selection)
            .duplicate();
        self.inner.open_tab(&ctx, request).await.and_then(OpenOutcome::tab)
    }

    /// Reopen the most recently closed window as a tab. `None` picks the
    /// window automatically.
    pub async fn reopen_closed_tab(&self, window: Option<WindowHandle>) -> Option<WindowHandle> {
        let ctx = self.inner.context()?;
        let Some(record) = self.inner.history.pop_most_recent() else {
            debug!("No closed window to reopen");
            return None;
        };

        let request = OpenRequest::new(record.location.clone())
            .target(window)
            .origin(record.origin_handle.non_null())
            .select(record.selected_items.clone())
            .duplicate();
        match self.inner.open_tab(&ctx, request).await {
            Some(outcome) => outcome.tab(),
            None => {
                debug!(location = %record.location, "Reopen had no effect, keeping record");
                self.inner.history.restore(record);
                None
            }
        }
    }

    pub fn set_target_window(&self, window: Option<WindowHandle>) {
        *lock(&self.inner.target_window) = window.and_then(WindowHandle::non_null);
    }

    pub fn target_window(&self) -> Option<WindowHandle> {
        self.inner.target_window()
    }

    /// Go back in the active tab of `window`.
    pub async fn navigate_back(&self, window: WindowHandle) -> bool {
        let Some(ctx) = self.inner.context() else {
            return false;
        };
        let tab = self.inner.backend.windows.active_tab(window).unwrap_or(window);
        let Some(target) = self.inner.window_for_handle(&ctx, tab).await else {
            return false;
        };
        match ctx.sta.call(move || target.go_back()).await {
            Ok(()) => true,
            Err(e) => {
                debug!(window = %window, error = %e, "Could not navigate back");
                false
            }
        }
    }

    pub fn tracked_window_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn closed_window_count(&self) -> usize {
        self.inner.history.len()
    }

    /// Most recently closed window, if any.
    pub fn last_closed_window(&self) -> Option<WindowRecord> {
        self.inner.history.peek()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(monitor) = lock(&self.inner.monitor).take() {
            monitor.cancel();
        }
        self.inner.teardown_session();
    }
}
