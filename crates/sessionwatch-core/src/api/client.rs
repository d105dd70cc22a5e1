//! GraphQL-over-HTTP client for the session operations.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// GraphQL documents for the three session operations.
const REFRESH_SESSION: &str = "mutation RefreshSession($refreshToken: String!) { \
     refreshSession(refreshToken: $refreshToken) { accessToken refreshToken } }";

const REVOKE_SESSION: &str = "mutation RevokeSession { revokeSession { success } }";

const SESSION_POLICY: &str = "query SessionPolicy { sessionPolicy { timeoutMinutes } }";

/// A freshly exchanged access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Server-configured inactivity policy, fetched once per session.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPolicy {
    pub timeout_minutes: u64,
}

/// Network operations the session layer depends on.
///
/// A trait seam so the controller and refresher can be driven by a
/// scripted transport in tests.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;

    /// Server-side revocation of the current session. Best-effort; callers
    /// log failures and move on.
    async fn revoke_session(&self) -> Result<(), ApiError>;

    /// Fetch the server-configured inactivity policy.
    async fn fetch_session_policy(&self) -> Result<SessionPolicy, ApiError>;

    /// Swap the bearer token attached to subsequent requests.
    fn install_access_token(&self, token: &str);
}

// Wire envelope types

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshSessionData {
    refresh_session: TokenPair,
}

#[derive(Deserialize)]
struct Acknowledgement {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeSessionData {
    revoke_session: Acknowledgement,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPolicyData {
    session_policy: SessionPolicy,
}

/// HTTP client for the session endpoint.
///
/// The bearer token lives behind a lock so a successful refresh can
/// re-hydrate the client in place; no rebuild or reload is needed.
pub struct AuthClient {
    client: Client,
    endpoint: String,
    token: RwLock<Option<String>>,
}

impl AuthClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: RwLock::new(None),
        })
    }

    /// Attach an initial bearer token, e.g. from a stored credential
    /// record at startup.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.install_access_token(&token.into());
        self
    }

    fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn execute<V: Serialize, T: DeserializeOwned>(
        &self,
        query: &str,
        variables: &V,
    ) -> Result<T, ApiError> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = self.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }

        let envelope: GraphQlResponse<T> = serde_json::from_str(&text)
            .map_err(|err| ApiError::InvalidResponse(format!("Malformed response: {err}")))?;

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiError::Rejected(message));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("Response missing data".to_string()))
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        debug!("exchanging refresh token");
        let variables = serde_json::json!({ "refreshToken": refresh_token });
        let data: RefreshSessionData = self.execute(REFRESH_SESSION, &variables).await?;
        Ok(data.refresh_session)
    }

    async fn revoke_session(&self) -> Result<(), ApiError> {
        debug!("revoking session server-side");
        let data: RevokeSessionData = self
            .execute(REVOKE_SESSION, &serde_json::json!({}))
            .await?;
        if !data.revoke_session.success {
            warn!("server declined session revocation");
        }
        Ok(())
    }

    async fn fetch_session_policy(&self) -> Result<SessionPolicy, ApiError> {
        let data: SessionPolicyData = self
            .execute(SESSION_POLICY, &serde_json::json!({}))
            .await?;
        debug!(timeout_minutes = data.session_policy.timeout_minutes, "session policy fetched");
        Ok(data.session_policy)
    }

    fn install_access_token(&self, token: &str) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
    }
}
