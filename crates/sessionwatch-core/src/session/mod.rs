//! Session lifecycle: activity tracking, deadline timers, silent token
//! refresh, and the controller that ties them together.

pub mod activity;
pub mod controller;
pub mod refresh;
pub mod timer;

pub use activity::{ActivityHandle, ActivityKind, ActivityWatcher};
pub use controller::{NoopEvents, SessionController, SessionEvents};
pub use refresh::{RefreshError, TokenRefresher};
pub use timer::{SessionTimer, TimerEvent, TimerState};

use serde::{Deserialize, Serialize};

/// Authentication state published by the session controller.
///
/// Exactly one live instance exists per controller. Route guards and other
/// readers observe it through a watch channel and never mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    /// No credentials present.
    Anonymous,
    /// Signed in, inside the inactivity window.
    Active,
    /// Signed in, past the warning deadline with no activity since.
    Warning,
    /// Inactivity reached the full timeout; logout side effects are
    /// running or have run. Leaving this state requires a fresh sign-in.
    Expired,
}

impl SessionState {
    /// Whether the user counts as signed in for routing purposes.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Warning)
    }
}
