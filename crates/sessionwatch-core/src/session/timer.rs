//! Warning/expiry deadline scheduling for one session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::trace;

use crate::utils::lock;

/// Timer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    WarningFired,
    Expired,
}

/// Deadline transitions delivered to the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Warning,
    Expired,
}

/// Schedules the warning and expiry deadlines for one session.
///
/// The warning fires at half the configured timeout and expiry at the full
/// timeout, both measured from the most recent `start`/`touch`. Every
/// `start`, `touch`, and `stop` bumps a generation counter under one lock,
/// and a sleeping callback re-checks that counter under the same lock
/// before firing: a stale expiry surviving a reset would sign out an
/// active user.
pub struct SessionTimer {
    inner: Arc<Mutex<TimerInner>>,
    events: mpsc::UnboundedSender<TimerEvent>,
}

struct TimerInner {
    generation: u64,
    state: TimerState,
    total: Duration,
}

impl SessionTimer {
    pub fn new(events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimerInner {
                generation: 0,
                state: TimerState::Idle,
                total: Duration::ZERO,
            })),
            events,
        }
    }

    /// Begin a fresh inactivity window of `total`: warning at `total / 2`,
    /// expiry at `total`, both from now.
    pub fn start(&self, total: Duration) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state = TimerState::Running;
        inner.total = total;
        self.schedule(inner.generation, Some(total / 2), total);
    }

    /// Reset both deadlines from "now"; WarningFired returns to Running.
    /// Cancelling and rescheduling happen under one lock so no stale
    /// callback can slip between them. A no-op while Idle or Expired.
    pub fn touch(&self) {
        let mut inner = lock(&self.inner);
        match inner.state {
            TimerState::Idle | TimerState::Expired => return,
            TimerState::Running | TimerState::WarningFired => {}
        }
        inner.generation += 1;
        inner.state = TimerState::Running;
        let total = inner.total;
        self.schedule(inner.generation, Some(total / 2), total);
    }

    /// Restart deadlines part-way through an inactivity window, e.g. after
    /// the host regains visibility. `warning_in` of `None` means the
    /// warning deadline already passed.
    pub fn resume_with_remaining(&self, warning_in: Option<Duration>, expiry_in: Duration) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state = if warning_in.is_some() {
            TimerState::Running
        } else {
            TimerState::WarningFired
        };
        self.schedule(inner.generation, warning_in, expiry_in);
    }

    /// Cancel both pending deadlines. Safe from any state, including while
    /// a callback for the previous generation is mid-flight.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.state = TimerState::Idle;
    }

    pub fn state(&self) -> TimerState {
        lock(&self.inner).state
    }

    fn schedule(&self, generation: u64, warning_in: Option<Duration>, expiry_in: Duration) {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut remaining = expiry_in;
            if let Some(warning_in) = warning_in {
                sleep(warning_in).await;
                {
                    let mut guard = lock(&inner);
                    if guard.generation != generation {
                        trace!(generation, "warning deadline superseded");
                        return;
                    }
                    guard.state = TimerState::WarningFired;
                }
                let _ = events.send(TimerEvent::Warning);
                remaining = expiry_in.saturating_sub(warning_in);
            }

            sleep(remaining).await;
            {
                let mut guard = lock(&inner);
                if guard.generation != generation {
                    trace!(generation, "expiry deadline superseded");
                    return;
                }
                guard.state = TimerState::Expired;
            }
            let _ = events.send(TimerEvent::Expired);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Instant};

    const TIMEOUT: Duration = Duration::from_secs(30 * 60);

    fn timer() -> (SessionTimer, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionTimer::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_warning_at_half_and_expiry_at_full() {
        let (timer, mut rx) = timer();
        let started = Instant::now();
        timer.start(TIMEOUT);

        assert_eq!(rx.recv().await, Some(TimerEvent::Warning));
        assert_eq!(started.elapsed(), Duration::from_secs(15 * 60));
        assert_eq!(timer.state(), TimerState::WarningFired);

        assert_eq!(rx.recv().await, Some(TimerEvent::Expired));
        assert_eq!(started.elapsed(), Duration::from_secs(30 * 60));
        assert_eq!(timer.state(), TimerState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_reschedules_both_deadlines_from_now() {
        let (timer, mut rx) = timer();
        let started = Instant::now();
        timer.start(TIMEOUT);

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        timer.touch();

        // Nothing fires at the original 15-minute mark.
        assert_eq!(rx.recv().await, Some(TimerEvent::Warning));
        assert_eq!(started.elapsed(), Duration::from_secs(25 * 60));

        assert_eq!(rx.recv().await, Some(TimerEvent::Expired));
        assert_eq!(started.elapsed(), Duration::from_secs(40 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_returns_to_running_after_warning() {
        let (timer, mut rx) = timer();
        timer.start(TIMEOUT);

        assert_eq!(rx.recv().await, Some(TimerEvent::Warning));
        assert_eq!(timer.state(), TimerState::WarningFired);

        timer.touch();
        assert_eq!(timer.state(), TimerState::Running);

        // A full fresh window, warning included.
        let resumed = Instant::now();
        assert_eq!(rx.recv().await, Some(TimerEvent::Warning));
        assert_eq!(resumed.elapsed(), Duration::from_secs(15 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_deadlines() {
        let (timer, mut rx) = timer();
        timer.start(TIMEOUT);
        timer.stop();
        assert_eq!(timer.state(), TimerState::Idle);

        advance(3 * TIMEOUT).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_after_warning_rejects_the_stale_expiry() {
        let (timer, mut rx) = timer();
        timer.start(TIMEOUT);

        assert_eq!(rx.recv().await, Some(TimerEvent::Warning));
        timer.stop();

        advance(3 * TIMEOUT).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_while_idle_is_a_no_op() {
        let (timer, mut rx) = timer();
        timer.touch();
        assert_eq!(timer.state(), TimerState::Idle);

        advance(3 * TIMEOUT).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_with_remaining_skips_a_passed_warning() {
        let (timer, mut rx) = timer();
        timer.resume_with_remaining(None, Duration::from_secs(5 * 60));
        assert_eq!(timer.state(), TimerState::WarningFired);

        let resumed = Instant::now();
        assert_eq!(rx.recv().await, Some(TimerEvent::Expired));
        assert_eq!(resumed.elapsed(), Duration::from_secs(5 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_touches_only_honor_the_last_window() {
        let (timer, mut rx) = timer();
        let started = Instant::now();
        timer.start(TIMEOUT);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            timer.touch();
        }

        // Last touch at t=5min: warning lands at t=20min.
        assert_eq!(rx.recv().await, Some(TimerEvent::Warning));
        assert_eq!(started.elapsed(), Duration::from_secs(20 * 60));
    }
}
