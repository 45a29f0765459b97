//! Single-threaded apartment executor.
//!
//! Shell window objects may only be used from the thread that initialized the
//! apartment they live in. [`StaExecutor`] owns one such thread for the lifetime
//! of a session and runs submitted closures on it in FIFO order. Callers await
//! the result without blocking the worker.

use crate::shell::StaInit;
use crossbeam_channel::{unbounded, Receiver, Sender};
use shelltab_core::{ShellTabError, ShellTabResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

type Job = Box<dyn FnOnce() + Send>;

pub struct StaExecutor {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl StaExecutor {
    /// Spawn the worker thread and run `init` on it before accepting jobs.
    pub fn spawn(name: impl Into<String>, init: StaInit) -> ShellTabResult<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Job>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<ShellTabResult<ThreadId>>();

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _guard = match init() {
                    Ok(guard) => guard,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(thread::current().id()));
                drop(ready_tx);
                worker_loop(receiver);
            })?;

        let thread_id = match ready_rx.recv() {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ShellTabError::sta(format!("{name} exited during startup")));
            }
        };

        debug!(executor = %name, "STA executor started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            thread_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Whether the caller is running on the worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn is_disposed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Run `job` on the worker and await its result.
    ///
    /// Fails if the executor was disposed or the job panicked. Calling this from
    /// the worker thread itself runs the job inline, since queueing it would
    /// deadlock.
    pub async fn run<F, R>(&self, job: F) -> ShellTabResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return catch_unwind(AssertUnwindSafe(job))
                .map_err(|_| ShellTabError::sta(format!("job panicked on {}", self.name)));
        }

        let (tx, rx) = oneshot::channel();
        let wrapped: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(job));
            let _ = tx.send(result);
        });

        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(sender) = sender.as_ref() else {
                return Err(ShellTabError::sta(format!("{} is disposed", self.name)));
            };
            sender
                .send(wrapped)
                .map_err(|_| ShellTabError::sta(format!("{} is not accepting jobs", self.name)))?;
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                warn!(executor = %self.name, "STA job panicked");
                Err(ShellTabError::sta(format!("job panicked on {}", self.name)))
            }
            Err(_) => Err(ShellTabError::sta(format!(
                "{} stopped before the job ran",
                self.name
            ))),
        }
    }

    /// Run a fallible job and flatten its result.
    pub async fn call<F, R>(&self, job: F) -> ShellTabResult<R>
    where
        F: FnOnce() -> ShellTabResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.run(job).await?
    }

    /// Stop accepting jobs, let queued ones finish, and join the thread.
    pub fn dispose(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if self.is_current() {
                // The loop ends once this job returns.
                return;
            }
            if thread.join().is_err() {
                error!(executor = %self.name, "STA thread panicked");
            }
        }
        debug!(executor = %self.name, "STA executor disposed");
    }
}

impl Drop for StaExecutor {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        job();
    }
    trace!("STA queue closed");
}
