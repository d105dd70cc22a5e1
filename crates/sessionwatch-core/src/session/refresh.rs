//! Single-flight exchange of the stored refresh token.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ApiError, AuthApi, TokenPair};
use crate::auth::CredentialStore;
use crate::utils::lock;

/// Why a refresh did not produce a new token pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh token in storage; nothing to exchange.
    #[error("no refresh token stored")]
    NoRefreshToken,

    /// The server explicitly refused the token. The session is over;
    /// callers should force a logout.
    #[error("refresh token rejected: {0}")]
    Rejected(String),

    /// Transient transport or server failure. Credentials are untouched
    /// and a later attempt may succeed.
    #[error("refresh failed: {0}")]
    Network(String),
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        if err.is_rejection() {
            RefreshError::Rejected(err.to_string())
        } else {
            RefreshError::Network(err.to_string())
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;

/// Exchanges the stored refresh token for a new access/refresh pair.
///
/// Exactly one network call exists per logical refresh: concurrent
/// callers share the in-flight future and resolve with the same result.
/// Two independent exchanges would race, and the loser's freshly issued
/// refresh token would already be invalidated server-side - a permanently
/// broken session.
pub struct TokenRefresher {
    api: Arc<dyn AuthApi>,
    credentials: CredentialStore,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl TokenRefresher {
    pub fn new(api: Arc<dyn AuthApi>, credentials: CredentialStore) -> Self {
        Self {
            api,
            credentials,
            in_flight: Mutex::new(None),
        }
    }

    /// Exchange the stored refresh token for a fresh pair.
    ///
    /// On success the new pair is already persisted and the API client
    /// carries the new access token before this returns. On failure the
    /// stored credentials are untouched.
    pub async fn refresh(&self) -> Result<TokenPair, RefreshError> {
        let fut = {
            let mut slot = lock(&self.in_flight);
            if let Some(fut) = slot.as_ref() {
                debug!("joining in-flight refresh");
                fut.clone()
            } else {
                let Some(refresh_token) = self.credentials.refresh_token() else {
                    return Err(RefreshError::NoRefreshToken);
                };
                let fut = Self::exchange(
                    Arc::clone(&self.api),
                    self.credentials.clone(),
                    refresh_token,
                )
                .boxed()
                .shared();
                *slot = Some(fut.clone());
                fut
            }
        };

        let result = fut.clone().await;

        // First finisher retires the slot; a newer refresh may already
        // occupy it.
        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&fut)) {
            *slot = None;
        }
        drop(slot);

        result
    }

    async fn exchange(
        api: Arc<dyn AuthApi>,
        credentials: CredentialStore,
        refresh_token: String,
    ) -> Result<TokenPair, RefreshError> {
        let pair = api.refresh_session(&refresh_token).await?;
        credentials.store_tokens(&pair);
        api.install_access_token(&pair.access_token);
        info!("session credentials renewed");
        Ok(pair)
    }
}
