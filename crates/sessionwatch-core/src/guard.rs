//! Route admission decisions for protected views.

use tokio::sync::watch;

use crate::auth::{CredentialStore, Role};
use crate::session::SessionState;

/// Outcome of a guard check for a protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Render the protected subtree.
    Allow,
    /// Not signed in, or signed out by expiry: send to the sign-in view.
    RedirectAnonymous,
    /// Signed in but lacking the required role. Rendered in place as a
    /// "not authorized" view, never a redirect.
    DenyRole,
}

/// Pure admission decision over the published session state.
///
/// Guards only read: the controller owns the one inactivity clock, and any
/// number of independently mounted guards observe the same state channel.
#[derive(Clone)]
pub struct RouteGuard {
    state: watch::Receiver<SessionState>,
    credentials: CredentialStore,
}

impl RouteGuard {
    pub fn new(state: watch::Receiver<SessionState>, credentials: CredentialStore) -> Self {
        Self { state, credentials }
    }

    /// Decide whether the current session may enter a route requiring
    /// `required`. `None` admits any authenticated session.
    pub fn can_enter(&self, required: Option<Role>) -> RouteDecision {
        let state = *self.state.borrow();
        if !state.is_authenticated() {
            return RouteDecision::RedirectAnonymous;
        }
        let Some(required) = required else {
            return RouteDecision::Allow;
        };
        match self.credentials.role() {
            Some(role) if role.satisfies(required) => RouteDecision::Allow,
            Some(_) => RouteDecision::DenyRole,
            // Authenticated state with no readable role means storage went
            // sideways mid-session; fail closed to the sign-in view.
            None => RouteDecision::RedirectAnonymous,
        }
    }
}
