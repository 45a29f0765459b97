//! Shell events: a WinEvent hook thread and navigation watchers.

use crate::com::ComGuard;
use crate::commands::{FRAME_WINDOW_CLASS, TAB_WINDOW_CLASS};
use crate::desktop::{class_name, handle};
use shelltab_core::{ShellTabError, ShellTabResult, WindowHandle};
use shelltab_watcher::{
    ClosingCallback, ClosingSnapshot, EventCallback, EventSubscription, ShellEvent, ShellWindowRef,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};
use windows::Win32::Foundation::{HMODULE, HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WM_QUIT,
};

const EVENT_OBJECT_CREATE: u32 = 0x8000;
const EVENT_OBJECT_DESTROY: u32 = 0x8001;
const EVENT_OBJECT_SHOW: u32 = 0x8002;
const WINEVENT_OUTOFCONTEXT: u32 = 0x0000;
const WINEVENT_SKIPOWNPROCESS: u32 = 0x0002;
const OBJID_WINDOW: i32 = 0;
const CHILDID_SELF: i32 = 0;

const NAVIGATION_POLL: Duration = Duration::from_millis(50);
const SNAPSHOT_POLL: Duration = Duration::from_millis(250);

/// A closing callback and the snapshot it will receive. The tab is already
/// gone when its destroy event arrives, so the snapshot is kept current while
/// the tab lives.
pub(crate) struct ClosingHook {
    callback: ClosingCallback,
    snapshot: Arc<Mutex<ClosingSnapshot>>,
    stopped: Arc<AtomicBool>,
}

impl ClosingHook {
    /// Hook `window` and start refreshing its snapshot.
    pub(crate) fn spawn(window: &ShellWindowRef, callback: ClosingCallback) -> ShellTabResult<Self> {
        let snapshot = Arc::new(Mutex::new(read_snapshot(window)));
        let stopped = Arc::new(AtomicBool::new(false));

        let window = Arc::clone(window);
        let latest = Arc::clone(&snapshot);
        let stop = Arc::clone(&stopped);
        thread::Builder::new()
            .name("shelltab-snapshot".to_string())
            .spawn(move || {
                let _com = match ComGuard::multithreaded() {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!(error = %e, "Snapshot tracker has no COM");
                        return;
                    }
                };
                while !stop.load(Ordering::SeqCst) {
                    thread::sleep(SNAPSHOT_POLL);
                    let Ok(location) = window.location() else { break };
                    let selection = window.selected_items().ok();
                    let mut snapshot = latest.lock().unwrap_or_else(PoisonError::into_inner);
                    if !location.is_empty() {
                        snapshot.location = Some(location);
                    }
                    if selection.is_some() {
                        snapshot.selected_items = selection;
                    }
                }
            })?;

        Ok(Self {
            callback,
            snapshot,
            stopped,
        })
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn read_snapshot(window: &ShellWindowRef) -> ClosingSnapshot {
    ClosingSnapshot {
        location: window.location().ok().filter(|l| !l.is_empty()),
        selected_items: window.selected_items().ok(),
    }
}

/// Closing hooks keyed by tab handle.
#[derive(Default)]
pub(crate) struct ClosingHooks {
    hooks: Mutex<HashMap<WindowHandle, Vec<(u64, ClosingHook)>>>,
    next_token: AtomicU64,
}

impl ClosingHooks {
    pub(crate) fn add(&self, tab: WindowHandle, hook: ClosingHook) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tab)
            .or_default()
            .push((token, hook));
        token
    }

    pub(crate) fn remove(&self, tab: WindowHandle, token: u64) {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = hooks.get_mut(&tab) {
            entries.retain(|(t, hook)| {
                if *t == token {
                    hook.stop();
                }
                *t != token
            });
            if entries.is_empty() {
                hooks.remove(&tab);
            }
        }
    }

    /// Run and forget the hooks of a destroyed tab, each with the last
    /// snapshot taken while the tab was alive.
    fn fire(&self, tab: WindowHandle) {
        let hooks = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
        for (_, hook) in hooks.into_iter().flatten() {
            hook.stop();
            let snapshot = hook
                .snapshot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            (hook.callback)(snapshot);
        }
    }
}

struct HookContext {
    events: UnboundedSender<ShellEvent>,
    closing: Arc<ClosingHooks>,
}

impl HookContext {
    fn handle(&self, event: u32, window: HWND) {
        match event {
            EVENT_OBJECT_CREATE if class_name(window) == TAB_WINDOW_CLASS => {
                trace!(tab = %handle(window), "Tab window created");
                let _ = self.events.send(ShellEvent::WindowRegistered);
            }
            EVENT_OBJECT_SHOW if class_name(window) == FRAME_WINDOW_CLASS => {
                let _ = self.events.send(ShellEvent::ObjectShown(handle(window)));
            }
            EVENT_OBJECT_DESTROY => self.closing.fire(handle(window)),
            _ => {}
        }
    }
}

thread_local! {
    static HOOK_CONTEXT: RefCell<Option<HookContext>> = const { RefCell::new(None) };
}

unsafe extern "system" fn on_win_event(
    _hook: HWINEVENTHOOK,
    event: u32,
    window: HWND,
    id_object: i32,
    id_child: i32,
    _thread: u32,
    _time: u32,
) {
    if id_object != OBJID_WINDOW || id_child != CHILDID_SELF || window.0.is_null() {
        return;
    }
    HOOK_CONTEXT.with(|context| {
        if let Some(context) = context.borrow().as_ref() {
            context.handle(event, window);
        }
    });
}

/// Install the WinEvent hook on a dedicated message-loop thread. Dropping the
/// subscription stops the thread.
pub(crate) fn subscribe(
    events: UnboundedSender<ShellEvent>,
    closing: Arc<ClosingHooks>,
) -> ShellTabResult<EventSubscription> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<ShellTabResult<u32>>(1);
    let thread = thread::Builder::new()
        .name("shelltab-winevent".to_string())
        .spawn(move || run_hook_loop(HookContext { events, closing }, ready_tx))?;

    let thread_id = ready_rx
        .recv()
        .map_err(|_| ShellTabError::shell("WinEvent thread exited during startup"))??;
    debug!(thread_id, "WinEvent hook installed");

    Ok(EventSubscription::new("winevent", move || {
        if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
            warn!(error = ?e, "Could not stop WinEvent thread");
            return;
        }
        if thread.join().is_err() {
            warn!("WinEvent thread panicked");
        }
    }))
}

fn run_hook_loop(context: HookContext, ready: crossbeam_channel::Sender<ShellTabResult<u32>>) {
    let mut msg = MSG::default();
    let thread_id = unsafe {
        // Create the message queue before anyone posts to it.
        let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
        GetCurrentThreadId()
    };

    let hook = unsafe {
        SetWinEventHook(
            EVENT_OBJECT_CREATE,
            EVENT_OBJECT_SHOW,
            HMODULE::default(),
            Some(on_win_event),
            0,
            0,
            WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
        )
    };
    if hook.is_invalid() {
        let _ = ready.send(Err(ShellTabError::shell("SetWinEventHook failed")));
        return;
    }

    HOOK_CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
    let _ = ready.send(Ok(thread_id));

    loop {
        let result = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        if result.0 <= 0 {
            break;
        }
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    unsafe {
        let _ = UnhookWinEvent(hook);
    }
    HOOK_CONTEXT.with(|slot| slot.borrow_mut().take());
    debug!("WinEvent hook removed");
}

/// Call `callback` whenever `window` settles on a new location.
///
/// The browser's event interface is not used; a watcher thread polls the
/// location instead. It stops when the subscription drops or the window
/// goes away.
pub(crate) fn watch_navigation(
    window: &ShellWindowRef,
    callback: EventCallback,
) -> ShellTabResult<EventSubscription> {
    let baseline = window.location().unwrap_or_default();
    let stopped = Arc::new(AtomicBool::new(false));

    let window = Arc::clone(window);
    let stop = Arc::clone(&stopped);
    thread::Builder::new()
        .name("shelltab-navigation".to_string())
        .spawn(move || {
            let _com = match ComGuard::multithreaded() {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(error = %e, "Navigation watcher has no COM");
                    return;
                }
            };
            let mut last = baseline;
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(NAVIGATION_POLL);
                match window.location() {
                    Ok(current) if !current.is_empty() && current != last => {
                        trace!(location = %current, "Navigation completed");
                        last = current;
                        callback();
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })?;

    Ok(EventSubscription::new("navigate-complete", move || {
        stopped.store(true, Ordering::SeqCst);
    }))
}
