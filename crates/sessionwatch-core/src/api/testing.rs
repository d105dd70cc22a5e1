//! Scriptable [`AuthApi`] for exercising the session layer without HTTP.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{ApiError, AuthApi, SessionPolicy, TokenPair};

pub(crate) fn renewed_pair() -> TokenPair {
    TokenPair {
        access_token: "access-renewed".to_string(),
        refresh_token: "refresh-renewed".to_string(),
    }
}

/// Mock transport with counters for every operation. Refresh responses
/// are scripted with `push_refresh`; an empty script answers with
/// [`renewed_pair`]. A gated mock parks refresh calls on a semaphore so
/// tests can hold several callers in flight at once.
pub(crate) struct MockAuthApi {
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub policy_calls: AtomicUsize,
    pub installed: Mutex<Option<String>>,
    refresh_script: Mutex<VecDeque<Result<TokenPair, ApiError>>>,
    policy: Option<SessionPolicy>,
    revoke_fails: bool,
    gate: Option<Arc<Semaphore>>,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            policy_calls: AtomicUsize::new(0),
            installed: Mutex::new(None),
            refresh_script: Mutex::new(VecDeque::new()),
            policy: None,
            revoke_fails: false,
            gate: None,
        }
    }

    /// Answer policy fetches with `timeout_minutes` instead of an error.
    pub fn with_policy(mut self, timeout_minutes: u64) -> Self {
        self.policy = Some(SessionPolicy { timeout_minutes });
        self
    }

    /// Make revocation fail with a server error.
    pub fn with_failing_revoke(mut self) -> Self {
        self.revoke_fails = true;
        self
    }

    /// Park refresh calls until the returned semaphore receives permits.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn push_refresh(&self, result: Result<TokenPair, ApiError>) {
        self.refresh_script
            .lock()
            .expect("script lock")
            .push_back(result);
    }

    pub fn installed_token(&self) -> Option<String> {
        self.installed.lock().expect("installed lock").clone()
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn refresh_session(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        self.refresh_script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(renewed_pair()))
    }

    async fn revoke_session(&self) -> Result<(), ApiError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if self.revoke_fails {
            Err(ApiError::ServerError("revocation unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn fetch_session_policy(&self) -> Result<SessionPolicy, ApiError> {
        self.policy_calls.fetch_add(1, Ordering::SeqCst);
        self.policy
            .ok_or_else(|| ApiError::ServerError("policy unavailable".to_string()))
    }

    fn install_access_token(&self, token: &str) {
        *self.installed.lock().expect("installed lock") = Some(token.to_string());
    }
}
