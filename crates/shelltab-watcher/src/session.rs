//! Session lifecycle and the shell process monitor.
//!
//! A session owns everything tied to one running shell process: the STA
//! thread, the event subscription, the dispatcher task and the cancellation
//! token every wait observes. When the shell process exits the monitor tears
//! the session down and starts a new one once the shell is back.

use crate::process::is_process_running;
use crate::shell::{EventSubscription, ShellEvent};
use crate::sta::StaExecutor;
use crate::watcher::WatcherInner;
use shelltab_common::{poll_until, poll_value, PollConfig};
use shelltab_core::{ShellTabError, ShellTabResult};
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-session handles passed to every handler.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) sta: Arc<StaExecutor>,
    pub(crate) cancel: CancellationToken,
    pub(crate) events: UnboundedSender<ShellEvent>,
}

pub(crate) struct Session {
    context: SessionContext,
    subscription: Option<EventSubscription>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Cancel waits, unsubscribe, stop dispatching, then stop the STA thread.
    fn close(mut self) {
        self.context.cancel.cancel();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.dispatcher.abort();
        self.context.sta.dispose();
    }
}

/// The running process monitor.
pub(crate) struct MonitorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub(crate) async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!("Process monitor panicked");
            }
        }
    }
}

impl WatcherInner {
    pub(crate) fn has_session(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn context(&self) -> Option<SessionContext> {
        let context = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.context.clone());
        if context.is_none() {
            debug!("No shell session");
        }
        context
    }

    /// Shell process id, if the process is alive.
    pub(crate) fn shell_pid(&self) -> Option<u32> {
        self.backend
            .host
            .shell_process_id()
            .filter(|pid| is_process_running(*pid))
    }

    /// Subscribe to the shell and adopt the windows it already has.
    pub(crate) async fn start_session(self: &Arc<Self>) -> ShellTabResult<()> {
        if self.has_session() {
            return Err(ShellTabError::AlreadyInitialized);
        }

        let sta = Arc::new(StaExecutor::spawn("shelltab-sta", self.backend.host.sta_init())?);
        let (events, receiver) = unbounded_channel();

        let host = Arc::clone(&self.backend.host);
        let sender = events.clone();
        let subscription = match sta.call(move || host.subscribe(sender)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                sta.dispose();
                return Err(e);
            }
        };

        let context = SessionContext {
            sta,
            cancel: CancellationToken::new(),
            events,
        };
        let dispatcher = tokio::spawn(dispatch(Arc::downgrade(self), context.clone(), receiver));
        let session = Session {
            context: context.clone(),
            subscription: Some(subscription),
            dispatcher,
        };

        {
            let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                drop(slot);
                session.close();
                return Err(ShellTabError::AlreadyInitialized);
            }
            *slot = Some(session);
        }

        let host = Arc::clone(&self.backend.host);
        match context.sta.call(move || host.shell_windows()).await {
            Ok(windows) => {
                let count = windows.len();
                for window in windows {
                    self.adopt(&context, window).await;
                }
                info!(windows = count, "Shell session started");
            }
            Err(e) => warn!(error = %e, "Could not enumerate shell windows"),
        }
        Ok(())
    }

    /// Drop the current session and every window reference it tracked.
    pub(crate) fn teardown_session(&self) -> bool {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(session) = session else {
            return false;
        };

        session.context.cancel.cancel();
        let released = self.registry.drain();
        self.clear_suppressed();
        *self
            .target_window
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        session.close();
        info!(released = released.len(), "Shell session torn down");
        true
    }

    pub(crate) fn spawn_monitor(self: &Arc<Self>) {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).monitor(shutdown.clone()));
        let previous = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(MonitorHandle { shutdown, task });
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Wait for the shell, run a session while it lives, repeat.
    async fn monitor(self: Arc<Self>, shutdown: CancellationToken) {
        let interval = self.timing.process_poll_interval();

        loop {
            let pid = {
                let this: &WatcherInner = &self;
                poll_value(PollConfig::forever(interval), &shutdown, move || {
                    let pid = this.shell_pid();
                    async move { pid }
                })
                .await
            };
            let Some(pid) = pid else { break };

            if !self.has_session() {
                info!(pid, "Shell process found, starting session");
                if let Err(e) = self.start_session().await {
                    warn!(pid, error = %e, category = e.category(), "Could not start session");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(interval) => continue,
                    }
                }
            }

            let exited = poll_until(PollConfig::forever(interval), &shutdown, || {
                !is_process_running(pid)
            })
            .await;
            if !exited {
                break;
            }

            warn!(pid, "Shell process exited");
            self.teardown_session();
        }

        debug!("Process monitor stopped");
    }
}

async fn dispatch(
    inner: Weak<WatcherInner>,
    context: SessionContext,
    mut receiver: UnboundedReceiver<ShellEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = context.cancel.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else { break };
        inner.handle_event(&context, event).await;
    }
    debug!("Event dispatcher stopped");
}
