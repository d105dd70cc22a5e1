//! The session state machine and its side effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::activity::{ActivityHandle, ActivityWatcher};
use super::refresh::{RefreshError, TokenRefresher};
use super::timer::{SessionTimer, TimerEvent};
use super::SessionState;
use crate::api::AuthApi;
use crate::auth::CredentialStore;
use crate::config::SessionConfig;
use crate::guard::RouteGuard;
use crate::utils::lock;

/// Host-facing notifications. The application implements this to render
/// toasts and drive navigation; every method defaults to a no-op.
pub trait SessionEvents: Send + Sync {
    /// The warning deadline passed with no activity. Non-blocking; the
    /// session is still authenticated.
    fn on_warning(&self) {}

    /// The session ended because the inactivity timeout elapsed or the
    /// server refused to renew it.
    fn on_expired(&self) {}

    /// The session ended, by expiry or explicit sign-out. Navigate to the
    /// anonymous view.
    fn on_logout(&self) {}
}

/// Default [`SessionEvents`] sink that ignores every notification.
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogoutKind {
    Expired,
    Explicit,
}

/// Owns the session state machine and the sole inactivity clock.
///
/// Construction is fully injected - storage, transport, event sink - so
/// tests and alternative hosts can swap any seam. Route guards subscribe
/// to the published state and never run timers of their own.
pub struct SessionController {
    inner: Arc<ControllerInner>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

struct ControllerInner {
    config: SessionConfig,
    credentials: CredentialStore,
    api: Arc<dyn AuthApi>,
    refresher: TokenRefresher,
    watcher: ActivityWatcher,
    timer: SessionTimer,
    events: Arc<dyn SessionEvents>,
    state: watch::Sender<SessionState>,
    /// Timeout resolved from the server policy at session start.
    timeout: Mutex<Duration>,
    /// Most recent user activity (or session start).
    last_activity: Mutex<Instant>,
    /// Set while logout side effects run; racing logouts observe it and
    /// back off.
    logging_out: AtomicBool,
    /// Set while the host is hidden and monitoring is paused.
    paused: AtomicBool,
}

impl SessionController {
    /// Build a controller. Must be called within a Tokio runtime; the
    /// internal event loop is spawned immediately and stays idle until
    /// [`start_session`](Self::start_session).
    pub fn new(
        config: SessionConfig,
        credentials: CredentialStore,
        api: Arc<dyn AuthApi>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let timer = SessionTimer::new(timer_tx);
        let watcher = ActivityWatcher::new(config.activity_throttle());
        let refresher = TokenRefresher::new(Arc::clone(&api), credentials.clone());
        let (state, _) = watch::channel(SessionState::Anonymous);

        let inner = Arc::new(ControllerInner {
            timeout: Mutex::new(config.default_timeout()),
            config,
            credentials,
            api,
            refresher,
            watcher,
            timer,
            events,
            state,
            last_activity: Mutex::new(Instant::now()),
            logging_out: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        });

        let event_loop = tokio::spawn(Self::run_event_loop(Arc::clone(&inner), timer_rx));
        Self {
            inner,
            event_loop: Mutex::new(Some(event_loop)),
        }
    }

    /// Subscribe to the published session state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Reporter for the host's input layer (pointer, key, click, scroll).
    pub fn activity_handle(&self) -> ActivityHandle {
        self.inner.watcher.handle()
    }

    /// A guard over this controller's published state.
    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(self.state(), self.inner.credentials.clone())
    }

    /// Begin monitoring an authenticated session.
    ///
    /// Returns `false` and stays Anonymous when no credential record is
    /// stored. The inactivity policy is fetched once here; on error the
    /// configured default applies for the whole session.
    pub async fn start_session(&self) -> bool {
        let inner = &self.inner;
        let Some(credentials) = inner.credentials.load() else {
            debug!("no stored credentials, staying anonymous");
            inner.state.send_replace(SessionState::Anonymous);
            return false;
        };

        let timeout = match inner.api.fetch_session_policy().await {
            Ok(policy) => Duration::from_secs(policy.timeout_minutes * 60),
            Err(err) => {
                warn!(error = %err, "session policy unavailable, using configured default");
                inner.config.default_timeout()
            }
        };

        *lock(&inner.timeout) = timeout;
        *lock(&inner.last_activity) = Instant::now();
        inner.logging_out.store(false, Ordering::SeqCst);
        inner.paused.store(false, Ordering::SeqCst);

        inner.api.install_access_token(&credentials.access_token);
        inner.state.send_replace(SessionState::Active);
        inner.timer.start(timeout);
        inner.watcher.start(Self::activity_callback(inner));

        info!(
            role = ?credentials.role,
            timeout_secs = timeout.as_secs(),
            "session active"
        );
        true
    }

    /// Explicit sign-out requested by the user.
    pub async fn handle_logout(&self) {
        Self::logout(&self.inner, LogoutKind::Explicit).await;
    }

    /// User-confirmed "keep me signed in": reset the inactivity clock and
    /// silently renew the credential pair.
    ///
    /// A rejected refresh token ends the session immediately. Transient
    /// network failures leave the session running and are returned so the
    /// caller may retry on the next extension.
    pub async fn extend_session(&self) -> Result<(), RefreshError> {
        let inner = &self.inner;
        *lock(&inner.last_activity) = Instant::now();
        inner.timer.touch();
        if *inner.state.borrow() == SessionState::Warning {
            inner.state.send_replace(SessionState::Active);
        }

        match inner.refresher.refresh().await {
            Ok(_) => Ok(()),
            Err(err @ RefreshError::Rejected(_)) => {
                warn!(error = %err, "refresh rejected, ending session");
                Self::logout(inner, LogoutKind::Expired).await;
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "refresh failed, keeping session");
                Err(err)
            }
        }
    }

    /// Host lost visibility: stop listeners and deadlines, but keep the
    /// last-activity instant so hidden time still counts against the
    /// timeout.
    pub fn pause(&self) {
        let inner = &self.inner;
        if !inner.state.borrow().is_authenticated() {
            return;
        }
        if inner.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.watcher.stop();
        inner.timer.stop();
        debug!("session monitoring paused");
    }

    /// Host regained visibility: expire immediately when the hidden
    /// stretch exhausted the timeout, otherwise reschedule the remaining
    /// deadlines.
    pub async fn resume(&self) {
        let inner = &self.inner;
        if !inner.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        if !inner.state.borrow().is_authenticated() {
            return;
        }

        let timeout = *lock(&inner.timeout);
        let idle = lock(&inner.last_activity).elapsed();
        if idle >= timeout {
            info!(idle_secs = idle.as_secs(), "timeout elapsed while hidden");
            Self::logout(inner, LogoutKind::Expired).await;
            return;
        }

        let expiry_in = timeout - idle;
        let warning_in = (timeout / 2).checked_sub(idle);
        if warning_in.is_none() && *inner.state.borrow() == SessionState::Active {
            // The warning deadline passed while hidden.
            inner.state.send_replace(SessionState::Warning);
            inner.events.on_warning();
        }
        inner.timer.resume_with_remaining(warning_in, expiry_in);
        inner.watcher.start(Self::activity_callback(inner));
        debug!(remaining_secs = expiry_in.as_secs(), "session monitoring resumed");
    }

    /// Tear down timers, listeners, and the event loop. The controller is
    /// inert afterwards; nothing fires past this point.
    pub fn shutdown(&self) {
        self.inner.timer.stop();
        self.inner.watcher.stop();
        if let Some(task) = lock(&self.event_loop).take() {
            task.abort();
        }
    }

    fn activity_callback(inner: &Arc<ControllerInner>) -> impl Fn() + Send + Sync + 'static {
        let inner = Arc::clone(inner);
        move || {
            *lock(&inner.last_activity) = Instant::now();
            inner.timer.touch();
            // Activity during the warning window revives the session.
            if *inner.state.borrow() == SessionState::Warning {
                inner.state.send_replace(SessionState::Active);
            }
        }
    }

    async fn run_event_loop(
        inner: Arc<ControllerInner>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    ) {
        while let Some(event) = timer_rx.recv().await {
            match event {
                TimerEvent::Warning => {
                    if *inner.state.borrow() == SessionState::Active {
                        inner.state.send_replace(SessionState::Warning);
                        info!("inactivity warning threshold reached");
                        inner.events.on_warning();
                    }
                }
                TimerEvent::Expired => {
                    Self::logout(&inner, LogoutKind::Expired).await;
                }
            }
        }
    }

    /// End the session. Reentrant-safe: of two racing calls (explicit
    /// logout vs expiry) the loser observes the flag or the Anonymous
    /// state and returns without repeating any side effect.
    async fn logout(inner: &ControllerInner, kind: LogoutKind) {
        if *inner.state.borrow() == SessionState::Anonymous {
            debug!("already anonymous, logout is a no-op");
            return;
        }
        if inner.logging_out.swap(true, Ordering::SeqCst) {
            debug!("logout already in progress");
            return;
        }

        if kind == LogoutKind::Expired {
            inner.state.send_replace(SessionState::Expired);
            info!("session expired");
        } else {
            info!("signing out");
        }

        inner.timer.stop();
        inner.watcher.stop();

        // Best-effort revocation; local teardown proceeds regardless.
        if let Err(err) = inner.api.revoke_session().await {
            warn!(error = %err, "session revocation failed");
        }
        inner.credentials.clear();

        if kind == LogoutKind::Expired {
            inner.events.on_expired();
        }
        inner.state.send_replace(SessionState::Anonymous);
        inner.events.on_logout();
        inner.logging_out.store(false, Ordering::SeqCst);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
