//! Find a tracked tab showing a given location.

use crate::session::SessionContext;
use crate::watcher::WatcherInner;
use shelltab_core::location::normalize_location;
use shelltab_core::WindowHandle;
use std::sync::Arc;
use tracing::trace;

impl WatcherInner {
    /// First tracked tab (oldest first) whose location is equivalent to
    /// `location`.
    ///
    /// Windows younger than the new-window age are skipped, as are tabs hosted
    /// by `exclude`. A window that cannot be queried counts as no match.
    pub(crate) async fn search_for_tab(
        &self,
        ctx: &SessionContext,
        location: &str,
        exclude: Option<WindowHandle>,
    ) -> Option<WindowHandle> {
        let target = normalize_location(location);
        if target.is_empty() {
            return None;
        }
        let min_age = self.timing.new_window_age();

        for tracked in self.registry.snapshot() {
            let Some(handle) = tracked.handle else {
                continue;
            };
            if tracked.created_at.elapsed() < min_age {
                trace!(window = %tracked.id, "Skipping young window");
                continue;
            }
            if exclude.is_some() && self.backend.windows.parent_window(handle) == exclude {
                continue;
            }

            let window = tracked.window;
            let paths = Arc::clone(&self.backend.paths);
            let probe = target.clone();
            let matched = ctx
                .sta
                .call(move || {
                    let current = normalize_location(&window.location()?);
                    if current.is_empty() {
                        return Ok(false);
                    }
                    paths.same_location(&current, &probe)
                })
                .await;

            match matched {
                Ok(true) => {
                    trace!(window = %tracked.id, handle = %handle, "Found tab");
                    return Some(handle);
                }
                Ok(false) => {}
                Err(e) => trace!(window = %tracked.id, error = %e, "Skipping unreadable window"),
            }
        }
        None
    }
}
