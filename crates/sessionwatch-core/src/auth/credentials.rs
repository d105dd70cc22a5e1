//! The signed-in user's credential record and its typed store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::StorageBackend;
use crate::api::TokenPair;

/// Storage keys for the credential record. The record is written and
/// cleared as a unit; these names never leave the store.
const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_USER_ID: &str = "user_id";
const KEY_ROLE: &str = "role";
const KEY_DISPLAY_NAME: &str = "display_name";
const KEY_ISSUED_AT: &str = "issued_at";

/// Role attached to the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Role {
    Administrator,
    Member,
}

impl Role {
    /// Whether this role satisfies `required`. Administrators may enter
    /// member-level routes; the reverse is denied.
    pub fn satisfies(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Administrator, _) => true,
            (Role::Member, Role::Member) => true,
            (Role::Member, Role::Administrator) => false,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Member => "member",
        }
    }

    fn parse(raw: &str) -> Option<Role> {
        match raw {
            "administrator" => Some(Role::Administrator),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

/// The signed-in user's credential record.
///
/// Exists at most once per store and only ever as a whole: partial records
/// left behind by interrupted writes or manual edits load as "not signed
/// in".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub role: Role,
    pub display_name: String,
    /// When the current token pair was issued. Informational; deadlines
    /// derive from activity, not from this.
    pub issued_at: DateTime<Utc>,
}

/// Typed wrapper owning the credential record inside a [`StorageBackend`].
///
/// All writes during normal operation flow through the token refresher and
/// the session controller; other components read (for example to attach
/// tokens to outgoing calls) but never write.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Load the full record. Missing or unparsable fields are logged and
    /// treated as "not signed in", never returned as an error.
    pub fn load(&self) -> Option<Credentials> {
        let access_token = self.backend.get(KEY_ACCESS_TOKEN)?;
        let refresh_token = self.backend.get(KEY_REFRESH_TOKEN)?;
        let user_id = self.backend.get(KEY_USER_ID)?;
        let display_name = self.backend.get(KEY_DISPLAY_NAME)?;

        let raw_role = self.backend.get(KEY_ROLE)?;
        let Some(role) = Role::parse(&raw_role) else {
            warn!(role = %raw_role, "unknown role in credential record, treating as signed out");
            return None;
        };

        let issued_at = match self
            .backend
            .get(KEY_ISSUED_AT)
            .map(|raw| raw.parse::<DateTime<Utc>>())
        {
            Some(Ok(issued_at)) => issued_at,
            _ => {
                warn!("credential record has no usable issue timestamp, treating as signed out");
                return None;
            }
        };

        Some(Credentials {
            access_token,
            refresh_token,
            user_id,
            role,
            display_name,
            issued_at,
        })
    }

    /// Replace the record as a whole.
    pub fn store(&self, credentials: &Credentials) {
        let issued_at = credentials.issued_at.to_rfc3339();
        self.backend.set_many(&[
            (KEY_ACCESS_TOKEN, credentials.access_token.as_str()),
            (KEY_REFRESH_TOKEN, credentials.refresh_token.as_str()),
            (KEY_USER_ID, credentials.user_id.as_str()),
            (KEY_ROLE, credentials.role.as_str()),
            (KEY_DISPLAY_NAME, credentials.display_name.as_str()),
            (KEY_ISSUED_AT, issued_at.as_str()),
        ]);
        debug!(user_id = %credentials.user_id, "credential record stored");
    }

    /// Install a freshly exchanged token pair. Both keys land in one
    /// backend write so the pair is never observable split.
    pub fn store_tokens(&self, pair: &TokenPair) {
        let issued_at = Utc::now().to_rfc3339();
        self.backend.set_many(&[
            (KEY_ACCESS_TOKEN, pair.access_token.as_str()),
            (KEY_REFRESH_TOKEN, pair.refresh_token.as_str()),
            (KEY_ISSUED_AT, issued_at.as_str()),
        ]);
    }

    /// Destroy the record in one logical step.
    pub fn clear(&self) {
        self.backend.clear();
        debug!("credential record cleared");
    }

    pub fn access_token(&self) -> Option<String> {
        self.backend.get(KEY_ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.backend.get(KEY_REFRESH_TOKEN)
    }

    pub fn user_id(&self) -> Option<String> {
        self.backend.get(KEY_USER_ID)
    }

    pub fn role(&self) -> Option<Role> {
        self.backend.get(KEY_ROLE).and_then(|raw| Role::parse(&raw))
    }

    pub fn display_name(&self) -> Option<String> {
        self.backend.get(KEY_DISPLAY_NAME)
    }

    pub fn is_authenticated(&self) -> bool {
        self.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::MemoryStore;

    fn member_credentials() -> Credentials {
        Credentials {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            user_id: "user-1".to_string(),
            role: Role::Member,
            display_name: "Pat Doe".to_string(),
            issued_at: Utc::now(),
        }
    }

    fn memory_store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn store_then_load_round_trips() {
        let store = memory_store();
        let credentials = member_credentials();
        store.store(&credentials);

        let loaded = store.load().expect("record present");
        assert_eq!(loaded.access_token, credentials.access_token);
        assert_eq!(loaded.refresh_token, credentials.refresh_token);
        assert_eq!(loaded.role, Role::Member);
        assert_eq!(loaded.display_name, "Pat Doe");
        assert!(store.is_authenticated());
    }

    #[test]
    fn partial_record_loads_as_signed_out() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(KEY_ACCESS_TOKEN, "access-1");
        backend.set(KEY_REFRESH_TOKEN, "refresh-1");
        let store = CredentialStore::new(backend);
        assert!(store.load().is_none());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn unknown_role_loads_as_signed_out() {
        let store = memory_store();
        store.store(&member_credentials());
        store.backend.set(KEY_ROLE, "superuser");
        assert!(store.load().is_none());
    }

    #[test]
    fn store_tokens_replaces_the_pair_only() {
        let store = memory_store();
        store.store(&member_credentials());
        store.store_tokens(&TokenPair {
            access_token: "access-2".to_string(),
            refresh_token: "refresh-2".to_string(),
        });

        let loaded = store.load().expect("record present");
        assert_eq!(loaded.access_token, "access-2");
        assert_eq!(loaded.refresh_token, "refresh-2");
        assert_eq!(loaded.user_id, "user-1");
        assert_eq!(loaded.role, Role::Member);
    }

    #[test]
    fn clear_destroys_the_whole_record() {
        let store = memory_store();
        store.store(&member_credentials());
        store.clear();
        assert!(store.load().is_none());
        assert_eq!(store.access_token(), None);
        assert_eq!(store.role(), None);
    }

    #[test]
    fn administrator_satisfies_member_routes() {
        assert!(Role::Administrator.satisfies(Role::Member));
        assert!(Role::Administrator.satisfies(Role::Administrator));
        assert!(Role::Member.satisfies(Role::Member));
        assert!(!Role::Member.satisfies(Role::Administrator));
    }
}
