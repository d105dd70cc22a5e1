//! Sessionwatch core - client-side session lifecycle management.
//!
//! This crate keeps an authenticated user's session alive across activity,
//! detects inactivity, warns before automatic sign-out, renews credentials
//! without interrupting the user, and gates protected views by
//! authentication and role state.
//!
//! The moving parts, wired together by [`session::SessionController`]:
//! - [`auth::CredentialStore`]: the persisted credential record over
//!   pluggable durable storage
//! - [`api::AuthClient`]: network client for the refresh, revoke, and
//!   policy operations
//! - [`session::ActivityWatcher`]: fan-in for user-interaction signals
//! - [`session::SessionTimer`]: warning/expiry deadline scheduling
//! - [`guard::RouteGuard`]: allow/deny decisions for protected routes
//!
//! Everything async runs on a Tokio runtime; construct the controller from
//! within one.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod session;
mod utils;

pub use api::{ApiError, AuthApi, AuthClient, SessionPolicy, TokenPair};
pub use auth::{CredentialStore, Credentials, FileStore, KeyringStore, MemoryStore, Role};
pub use config::SessionConfig;
pub use guard::{RouteDecision, RouteGuard};
pub use session::{
    ActivityHandle, ActivityKind, ActivityWatcher, NoopEvents, RefreshError, SessionController,
    SessionEvents, SessionState, SessionTimer, TokenRefresher,
};
