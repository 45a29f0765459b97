//! Bounded waits.
//!
//! Every place the watcher waits on the shell (a new tab handle, a window object
//! behind a handle, navigation, a process exit) goes through these helpers so the
//! wait has a deadline and stops as soon as its session is cancelled.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How long to poll and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up after this long. `Duration::MAX` means no deadline.
    pub timeout: Duration,
    /// Delay between two checks.
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Poll until the condition holds or the wait is cancelled.
    pub fn forever(interval: Duration) -> Self {
        Self {
            timeout: Duration::MAX,
            interval,
        }
    }
}

/// Poll `probe` until it yields a value.
///
/// Returns `None` when the deadline passes or `cancel` fires first. The probe is
/// always run at least once, even with a zero timeout.
pub async fn poll_value<T, F, Fut>(
    config: PollConfig,
    cancel: &CancellationToken,
    mut probe: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now().checked_add(config.timeout);
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            trace!(attempts, "Poll cancelled");
            return None;
        }

        attempts += 1;
        if let Some(value) = probe().await {
            return Some(value);
        }

        let delay = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    trace!(attempts, timeout = ?config.timeout, "Poll timed out");
                    return None;
                }
                config.interval.min(deadline - now)
            }
            None => config.interval,
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                trace!(attempts, "Poll cancelled");
                return None;
            }
            _ = sleep(delay) => {}
        }
    }
}

/// Poll a synchronous predicate. `true` once it held, `false` on timeout or
/// cancellation.
pub async fn poll_until<F>(config: PollConfig, cancel: &CancellationToken, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    poll_value(config, cancel, || {
        let satisfied = predicate();
        async move { satisfied.then_some(()) }
    })
    .await
    .is_some()
}

/// Await `future` for at most `timeout`. `None` when the deadline passes or
/// `cancel` fires first.
pub async fn with_timeout<T>(
    timeout: Duration,
    cancel: &CancellationToken,
    future: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, future) => result.ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(timeout_ms: u64) -> PollConfig {
        PollConfig::new(Duration::from_millis(timeout_ms), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_poll_value_succeeds_after_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let cancel = CancellationToken::new();

        let value = poll_value(fast(1_000), &cancel, || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { (attempt >= 3).then_some(attempt) }
        })
        .await;

        assert_eq!(value, Some(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();

        let held = poll_until(fast(40), &cancel, || false).await;

        assert!(!held);
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_timeout_probes_once() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let held = poll_until(fast(0), &cancel, || {
            calls += 1;
            true
        })
        .await;
        assert!(held);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_poll_forever_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let held = poll_until(PollConfig::forever(Duration::from_millis(5)), &cancel, || false).await;
        assert!(!held);
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let cancel = CancellationToken::new();

        let quick = with_timeout(Duration::from_secs(1), &cancel, async { 42 }).await;
        assert_eq!(quick, Some(42));

        let slow = with_timeout(Duration::from_millis(10), &cancel, sleep(Duration::from_secs(5))).await;
        assert!(slow.is_none());

        cancel.cancel();
        let cancelled = with_timeout(Duration::from_secs(5), &cancel, sleep(Duration::from_secs(5))).await;
        assert!(cancelled.is_none());
    }
}
