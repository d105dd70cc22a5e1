//! Network client for session lifecycle operations.
//!
//! The server speaks GraphQL over HTTP. This module wraps the three
//! operations the session layer needs - refresh, revoke, policy fetch -
//! behind the [`AuthApi`] trait so nothing else in the crate touches HTTP
//! directly and tests can swap in a scripted transport.

pub mod client;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{AuthApi, AuthClient, SessionPolicy, TokenPair};
pub use error::ApiError;
