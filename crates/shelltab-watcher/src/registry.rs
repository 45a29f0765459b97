//! Window registry.
//!
//! Maps shell-window identity to the window object, its lazily resolved tab
//! handle and per-window metadata, with a secondary index from handle to
//! identity. Both maps sit behind one lock so a lookup never sees one updated
//! without the other.
//!
//! The registry is the only long-term holder of shell window references. A
//! removed entry has its subscriptions cancelled first and its window
//! reference dropped second.

use crate::shell::{EventSubscription, ShellWindowRef};
use crate::sta::StaExecutor;
use shelltab_core::{ShellWindowId, WindowHandle};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, trace};

/// Per-window metadata.
#[derive(Debug)]
pub struct WindowInfo {
    pub created_at: Instant,
    /// Present while the window is hooked for closing.
    closing: Option<EventSubscription>,
    /// Present while navigations update `location`.
    navigation: Option<EventSubscription>,
    /// Last normalized location seen for this window.
    pub location: Option<String>,
    /// Top-level window hosting the tab.
    pub origin: Option<WindowHandle>,
}

struct WindowEntry {
    window: ShellWindowRef,
    handle: Option<WindowHandle>,
    info: WindowInfo,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ShellWindowId, WindowEntry>,
    by_handle: HashMap<WindowHandle, ShellWindowId>,
}

/// Outcome of [`WindowRegistry::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed { created_at: Instant },
    AlreadyPresent,
}

/// Read-only view of a tracked entry.
#[derive(Clone)]
pub struct TrackedWindow {
    pub id: ShellWindowId,
    pub window: ShellWindowRef,
    pub handle: Option<WindowHandle>,
    pub created_at: Instant,
    pub location: Option<String>,
    pub origin: Option<WindowHandle>,
}

/// What remains of an entry after removal. The window reference itself has
/// already been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedWindow {
    pub id: ShellWindowId,
    pub handle: Option<WindowHandle>,
    pub location: Option<String>,
    pub origin: Option<WindowHandle>,
    pub was_hooked: bool,
}

#[derive(Default)]
pub struct WindowRegistry {
    state: Mutex<RegistryState>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `window`. Claiming a window twice is a no-op.
    pub fn claim(&self, window: ShellWindowRef) -> Claim {
        let id = window.id();
        let mut state = self.lock();
        if state.entries.contains_key(&id) {
            return Claim::AlreadyPresent;
        }

        let created_at = Instant::now();
        state.entries.insert(
            id,
            WindowEntry {
                window,
                handle: None,
                info: WindowInfo {
                    created_at,
                    closing: None,
                    navigation: None,
                    location: None,
                    origin: None,
                },
            },
        );
        trace!(window = %id, "Claimed shell window");
        Claim::Claimed { created_at }
    }

    pub fn contains(&self, id: ShellWindowId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    pub fn get(&self, id: ShellWindowId) -> Option<ShellWindowRef> {
        self.lock().entries.get(&id).map(|entry| entry.window.clone())
    }

    pub fn created_at(&self, id: ShellWindowId) -> Option<Instant> {
        self.lock().entries.get(&id).map(|entry| entry.info.created_at)
    }

    pub fn cached_handle(&self, id: ShellWindowId) -> Option<WindowHandle> {
        self.lock().entries.get(&id).and_then(|entry| entry.handle)
    }

    /// Tab handle of a tracked window, asking the shell on first use.
    ///
    /// The shell call runs on the STA without holding the registry lock. If two
    /// callers race, the first handle stored wins and both see it.
    pub async fn resolve_handle(&self, id: ShellWindowId, sta: &StaExecutor) -> Option<WindowHandle> {
        let window = {
            let state = self.lock();
            let entry = state.entries.get(&id)?;
            if let Some(handle) = entry.handle {
                return Some(handle);
            }
            entry.window.clone()
        };

        let handle = match sta.call(move || window.tab_handle()).await {
            Ok(handle) => handle.non_null()?,
            Err(e) => {
                debug!(window = %id, error = %e, "Could not resolve tab handle");
                return None;
            }
        };

        let mut state = self.lock();
        let state = &mut *state;
        let entry = state.entries.get_mut(&id)?;
        if let Some(existing) = entry.handle {
            return Some(existing);
        }
        entry.handle = Some(handle);
        state.by_handle.insert(handle, id);
        trace!(window = %id, handle = %handle, "Resolved tab handle");
        Some(handle)
    }

    pub fn lookup_by_handle(&self, handle: WindowHandle) -> Option<ShellWindowRef> {
        let state = self.lock();
        let id = state.by_handle.get(&handle)?;
        state.entries.get(id).map(|entry| entry.window.clone())
    }

    pub fn id_by_handle(&self, handle: WindowHandle) -> Option<ShellWindowId> {
        self.lock().by_handle.get(&handle).copied()
    }

    /// Store the closing subscription for a tracked window.
    ///
    /// Returns `false`, and cancels `subscription`, when the window is no longer
    /// tracked or is already hooked.
    pub fn attach_closing(&self, id: ShellWindowId, subscription: EventSubscription) -> bool {
        let rejected = {
            let mut state = self.lock();
            match state.entries.get_mut(&id) {
                Some(entry) if entry.info.closing.is_none() => {
                    entry.info.closing = Some(subscription);
                    None
                }
                _ => Some(subscription),
            }
        };

        match rejected {
            None => true,
            Some(subscription) => {
                subscription.unsubscribe();
                false
            }
        }
    }

    /// Store the navigation subscription for a tracked window. Same rules as
    /// [`WindowRegistry::attach_closing`].
    pub fn attach_navigation(&self, id: ShellWindowId, subscription: EventSubscription) -> bool {
        let rejected = {
            let mut state = self.lock();
            match state.entries.get_mut(&id) {
                Some(entry) if entry.info.navigation.is_none() => {
                    entry.info.navigation = Some(subscription);
                    None
                }
                _ => Some(subscription),
            }
        };

        match rejected {
            None => true,
            Some(subscription) => {
                subscription.unsubscribe();
                false
            }
        }
    }

    pub fn is_hooked(&self, id: ShellWindowId) -> bool {
        self.lock()
            .entries
            .get(&id)
            .is_some_and(|entry| entry.info.closing.is_some())
    }

    pub fn set_location(&self, id: ShellWindowId, location: impl Into<String>) {
        if let Some(entry) = self.lock().entries.get_mut(&id) {
            entry.info.location = Some(location.into());
        }
    }

    pub fn set_origin(&self, id: ShellWindowId, origin: WindowHandle) {
        if let Some(entry) = self.lock().entries.get_mut(&id) {
            entry.info.origin = Some(origin);
        }
    }

    pub fn origin(&self, id: ShellWindowId) -> Option<WindowHandle> {
        self.lock().entries.get(&id).and_then(|entry| entry.info.origin)
    }

    pub fn location(&self, id: ShellWindowId) -> Option<String> {
        self.lock()
            .entries
            .get(&id)
            .and_then(|entry| entry.info.location.clone())
    }

    /// Stop tracking a window: unsubscribe, release, delete.
    pub fn remove(&self, id: ShellWindowId) -> Option<RemovedWindow> {
        let entry = {
            let mut state = self.lock();
            let entry = state.entries.remove(&id)?;
            if let Some(handle) = entry.handle {
                state.by_handle.remove(&handle);
            }
            entry
        };
        let removed = release(id, entry);
        trace!(window = %id, "Removed shell window");
        Some(removed)
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<RemovedWindow> {
        let entries: Vec<_> = {
            let mut state = self.lock();
            state.by_handle.clear();
            state.entries.drain().collect()
        };
        entries
            .into_iter()
            .map(|(id, entry)| release(id, entry))
            .collect()
    }

    /// Tracked windows, oldest first.
    pub fn snapshot(&self) -> Vec<TrackedWindow> {
        let mut windows: Vec<TrackedWindow> = self
            .lock()
            .entries
            .iter()
            .map(|(id, entry)| TrackedWindow {
                id: *id,
                window: entry.window.clone(),
                handle: entry.handle,
                created_at: entry.info.created_at,
                location: entry.info.location.clone(),
                origin: entry.info.origin,
            })
            .collect();
        windows.sort_by_key(|w| w.created_at);
        windows
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

fn release(id: ShellWindowId, entry: WindowEntry) -> RemovedWindow {
    let WindowEntry {
        window,
        handle,
        info,
    } = entry;
    let was_hooked = info.closing.is_some();
    for subscription in [info.closing, info.navigation].into_iter().flatten() {
        subscription.unsubscribe();
    }
    drop(window);
    RemovedWindow {
        id,
        handle,
        location: info.location,
        origin: info.origin,
        was_hooked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{ShellWindow, StaInit};
    use shelltab_core::ShellTabResult;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubWindow {
        id: usize,
        handle: isize,
        resolves: AtomicUsize,
    }

    impl StubWindow {
        fn new(id: usize, handle: isize) -> Arc<Self> {
            Arc::new(Self {
                id,
                handle,
                resolves: AtomicUsize::new(0),
            })
        }
    }

    impl ShellWindow for StubWindow {
        fn id(&self) -> ShellWindowId {
            ShellWindowId(self.id)
        }
        fn tab_handle(&self) -> ShellTabResult<WindowHandle> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            Ok(WindowHandle(self.handle))
        }
        fn location(&self) -> ShellTabResult<String> {
            Ok("C:\\".to_string())
        }
        fn navigate(&self, _location: &str) -> ShellTabResult<()> {
            Ok(())
        }
        fn go_back(&self) -> ShellTabResult<()> {
            Ok(())
        }
        fn selected_items(&self) -> ShellTabResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn select_items(&self, _names: &[String]) -> ShellTabResult<usize> {
            Ok(0)
        }
        fn quit(&self) -> ShellTabResult<()> {
            Ok(())
        }
    }

    fn sta() -> StaExecutor {
        let init: StaInit = Box::new(|| Ok(Box::new(()) as Box<dyn Any>));
        StaExecutor::spawn("registry-test", init).unwrap()
    }

    #[test]
    fn test_claim_is_unique() {
        let registry = WindowRegistry::new();
        let window = StubWindow::new(1, 100);

        assert!(matches!(registry.claim(window.clone()), Claim::Claimed { .. }));
        assert_eq!(registry.claim(window.clone()), Claim::AlreadyPresent);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_then_claim_is_fresh() {
        let registry = WindowRegistry::new();
        let window = StubWindow::new(1, 100);

        let first = match registry.claim(window.clone()) {
            Claim::Claimed { created_at } => created_at,
            Claim::AlreadyPresent => panic!("first claim must succeed"),
        };
        registry.set_location(window.id(), "C:\\A");
        registry.remove(window.id()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = match registry.claim(window.clone()) {
            Claim::Claimed { created_at } => created_at,
            Claim::AlreadyPresent => panic!("re-claim after removal must succeed"),
        };
        assert!(second > first);
        assert_eq!(registry.location(window.id()), None);
    }

    #[tokio::test]
    async fn test_handle_resolved_once_and_indexed() {
        let registry = WindowRegistry::new();
        let sta = sta();
        let window = StubWindow::new(1, 100);
        registry.claim(window.clone());

        let first = registry.resolve_handle(window.id(), &sta).await;
        let second = registry.resolve_handle(window.id(), &sta).await;

        assert_eq!(first, Some(WindowHandle(100)));
        assert_eq!(second, first);
        assert_eq!(window.resolves.load(Ordering::SeqCst), 1);
        assert_eq!(registry.id_by_handle(WindowHandle(100)), Some(window.id()));
        assert!(registry.lookup_by_handle(WindowHandle(100)).is_some());
    }

    #[tokio::test]
    async fn test_null_handle_is_not_cached() {
        let registry = WindowRegistry::new();
        let sta = sta();
        let window = StubWindow::new(1, 0);
        registry.claim(window.clone());

        assert_eq!(registry.resolve_handle(window.id(), &sta).await, None);
        assert_eq!(registry.cached_handle(window.id()), None);
        assert!(registry.lookup_by_handle(WindowHandle::NULL).is_none());
    }

    #[tokio::test]
    async fn test_remove_releases_and_unsubscribes() {
        let registry = WindowRegistry::new();
        let sta = sta();
        let window = StubWindow::new(1, 100);
        registry.claim(window.clone());
        registry.resolve_handle(window.id(), &sta).await;

        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unsubscribed);
        assert!(registry.attach_closing(
            window.id(),
            EventSubscription::new("closing", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        ));
        let counter = Arc::clone(&unsubscribed);
        assert!(registry.attach_navigation(
            window.id(),
            EventSubscription::new("navigate-complete", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        ));
        assert!(registry.is_hooked(window.id()));
        assert_eq!(Arc::strong_count(&window), 2);

        let removed = registry.remove(window.id()).unwrap();
        assert!(removed.was_hooked);
        assert_eq!(removed.handle, Some(WindowHandle(100)));
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&window), 1);
        assert!(registry.lookup_by_handle(WindowHandle(100)).is_none());
        assert!(registry.remove(window.id()).is_none());
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attach_rejects_untracked_and_duplicate() {
        let registry = WindowRegistry::new();
        let window = StubWindow::new(1, 100);
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let sub = || {
            let counter = Arc::clone(&unsubscribed);
            EventSubscription::new("closing", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(!registry.attach_closing(window.id(), sub()));
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);

        registry.claim(window.clone());
        assert!(registry.attach_closing(window.id(), sub()));
        assert!(!registry.attach_closing(window.id(), sub()));
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 2);

        assert!(registry.attach_navigation(window.id(), sub()));
        assert!(!registry.attach_navigation(window.id(), sub()));
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_snapshot_is_oldest_first_and_drain_empties() {
        let registry = WindowRegistry::new();
        let windows: Vec<_> = (1..=3).map(|i| StubWindow::new(i, i as isize * 10)).collect();
        for window in &windows {
            registry.claim(window.clone());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let ids: Vec<_> = registry.snapshot().iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![ShellWindowId(1), ShellWindowId(2), ShellWindowId(3)]);

        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
        for window in &windows {
            assert_eq!(Arc::strong_count(window), 1);
        }
    }
}
