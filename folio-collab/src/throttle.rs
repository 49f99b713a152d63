//! Trailing-edge throttle.
//!
//! ```text
//!  triggers:  x  x x   x                x     x
//!             ├──── interval ────┤      ├──── interval ────┤
//!  flushes:                      ▲                         ▲
//! ```
//!
//! The first trigger opens a window; everything arriving inside it coalesces
//! into one flush at the trailing edge. There is no leading-edge call, so at
//! most one flush happens per interval.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct TrailingThrottle {
    triggers: mpsc::UnboundedSender<()>,
    worker: JoinHandle<()>,
    interval: Duration,
    flushes: Arc<AtomicU64>,
}

impl TrailingThrottle {
    /// Spawn the worker on the current runtime.
    ///
    /// Dropping the throttle stops accepting triggers; a window that is
    /// already open still flushes before the worker exits.
    pub fn spawn<F, Fut>(interval: Duration, flush: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (triggers, mut rx) = mpsc::unbounded_channel::<()>();
        let flushes = Arc::new(AtomicU64::new(0));
        let counter = flushes.clone();

        let worker = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(interval).await;
                // Everything that arrived during the window is covered.
                while rx.try_recv().is_ok() {}
                flush().await;
                counter.fetch_add(1, Ordering::Relaxed);
            }
            log::trace!("Throttle worker stopped");
        });

        Self {
            triggers,
            worker,
            interval,
            flushes,
        }
    }

    /// Request a flush. Returns `false` once the worker has stopped.
    pub fn trigger(&self) -> bool {
        self.triggers.send(()).is_ok()
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop immediately, discarding an open window.
    pub fn abort(self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(interval: Duration) -> (TrailingThrottle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let throttle = TrailingThrottle::spawn(interval, move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        (throttle, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_flush() {
        let interval = Duration::from_millis(1000);
        let (throttle, calls) = counting(interval);

        for _ in 0..10 {
            assert!(throttle.trigger());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // Window opened by the first trigger has not closed yet.
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(interval).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(throttle.flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_triggers_flush_each() {
        let interval = Duration::from_millis(200);
        let (throttle, calls) = counting(interval);

        for round in 1..=3 {
            throttle.trigger();
            tokio::time::sleep(interval * 2).await;
            assert_eq!(calls.load(Ordering::SeqCst), round);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_trigger_no_flush() {
        let (_throttle, calls) = counting(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_still_flushes_open_window() {
        let interval = Duration::from_millis(100);
        let (throttle, calls) = counting(interval);
        throttle.trigger();
        drop(throttle);
        tokio::time::sleep(interval * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_discards_open_window() {
        let interval = Duration::from_millis(100);
        let (throttle, calls) = counting(interval);
        throttle.trigger();
        throttle.abort();
        tokio::time::sleep(interval * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
