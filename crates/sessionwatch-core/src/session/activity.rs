//! Fan-in for user-interaction signals.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::utils::lock;

/// Buffer for raw interaction signals. Activity is idempotent, so a
/// lagging receiver may drop bursts without changing any deadline.
const SIGNAL_BUFFER: usize = 64;

/// User-interaction signals the watcher listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    KeyPress,
    Click,
    Scroll,
}

/// Cloneable reporter handed to the host's input layer.
#[derive(Clone)]
pub struct ActivityHandle {
    signals: broadcast::Sender<ActivityKind>,
}

impl ActivityHandle {
    /// Record that the user interacted just now. Never blocks; with no
    /// active subscription the signal is dropped.
    pub fn report(&self, kind: ActivityKind) {
        let _ = self.signals.send(kind);
    }
}

/// Funnels host interaction signals into a single throttled callback.
///
/// `start` and `stop` are idempotent: starting twice replaces the previous
/// subscription instead of double-registering, and every subscription a
/// `start` adds is removed by exactly one `stop`.
pub struct ActivityWatcher {
    signals: broadcast::Sender<ActivityKind>,
    throttle: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityWatcher {
    pub fn new(throttle: Duration) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_BUFFER);
        Self {
            signals,
            throttle,
            task: Mutex::new(None),
        }
    }

    /// Reporter for the host's input layer.
    pub fn handle(&self) -> ActivityHandle {
        ActivityHandle {
            signals: self.signals.clone(),
        }
    }

    /// Subscribe to interaction signals, invoking `on_activity` at most
    /// once per throttle tick.
    pub fn start(&self, on_activity: impl Fn() + Send + Sync + 'static) {
        let mut rx = self.signals.subscribe();
        let throttle = self.throttle;
        let task = tokio::spawn(async move {
            let mut last_fired: Option<Instant> = None;
            loop {
                match rx.recv().await {
                    Ok(kind) => {
                        let now = Instant::now();
                        if last_fired.is_some_and(|at| now.duration_since(at) < throttle) {
                            trace!(?kind, "activity signal coalesced");
                            continue;
                        }
                        last_fired = Some(now);
                        on_activity();
                    }
                    // Dropped signals are harmless: deadlines derive from
                    // the next signal's "now", not from the count.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = lock(&self.task).replace(task) {
            previous.abort();
        }
        debug!("activity watcher started");
    }

    /// Unsubscribe. Safe to call repeatedly or without a prior `start`.
    pub fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            debug!("activity watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ActivityWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const THROTTLE: Duration = Duration::from_secs(1);

    async fn settle() {
        // Let the watcher task drain its channel.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn counting_watcher() -> (ActivityWatcher, Arc<AtomicUsize>) {
        let watcher = ActivityWatcher::new(THROTTLE);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        watcher.start(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (watcher, count)
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_to_one_callback_per_tick() {
        let (watcher, count) = counting_watcher();
        let handle = watcher.handle();

        for _ in 0..5 {
            handle.report(ActivityKind::PointerMove);
        }
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(THROTTLE).await;
        handle.report(ActivityKind::KeyPress);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_double_register() {
        let (watcher, count) = counting_watcher();
        let seen = Arc::clone(&count);
        watcher.start(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        watcher.handle().report(ActivityKind::Click);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_removes_the_subscription() {
        let (watcher, count) = counting_watcher();
        watcher.stop();
        assert!(!watcher.is_running());

        watcher.handle().report(ActivityKind::Scroll);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // A second stop is fine.
        watcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn every_signal_kind_is_observed() {
        let watcher = ActivityWatcher::new(Duration::ZERO);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        watcher.start(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let handle = watcher.handle();

        for kind in [
            ActivityKind::PointerMove,
            ActivityKind::KeyPress,
            ActivityKind::Click,
            ActivityKind::Scroll,
        ] {
            handle.report(kind);
            settle().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
