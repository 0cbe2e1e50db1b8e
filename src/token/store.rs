//! Credential Store
//!
//! Holder of the current access credential, refresh credential and identity.
//! Operations are synchronous and never perform network I/O.

use parking_lot::{Mutex, RwLock};

use crate::types::{AccessToken, CredentialPair, Identity, RefreshToken, Session};

/// Credential storage interface.
pub trait CredentialStore: Send + Sync {
    /// Current access credential.
    fn access_token(&self) -> Option<AccessToken>;

    /// Current refresh credential.
    fn refresh_token(&self) -> Option<RefreshToken>;

    /// Identity of the signed-in user.
    fn identity(&self) -> Option<Identity>;

    /// Full session, when one is established.
    fn session(&self) -> Option<Session>;

    /// Replace the access credential.
    fn set_access_token(&self, token: AccessToken);

    /// Replace the refresh credential.
    fn set_refresh_token(&self, token: RefreshToken);

    /// Replace the identity record.
    fn set_identity(&self, identity: Identity);

    /// Establish a session after sign-in.
    fn set_session(&self, credentials: CredentialPair, identity: Identity);

    /// Adopt a saved session. Without a refresh credential the session lasts
    /// until the access credential is rejected.
    fn restore(&self, identity: Identity, access: AccessToken, refresh: Option<RefreshToken>);

    /// Remove every credential. Idempotent.
    fn clear(&self);

    /// Access credential and identity are both present.
    fn is_authenticated(&self) -> bool {
        self.access_token().is_some() && self.identity().is_some()
    }
}

#[derive(Clone, Debug, Default)]
struct StoredCredentials {
    access: Option<AccessToken>,
    refresh: Option<RefreshToken>,
    identity: Option<Identity>,
    established_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// In-memory credential store.
///
/// All fields live behind one lock, so a reader sees either the state
/// before a write or after it.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<StoredCredentials>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a previously saved session.
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: RwLock::new(StoredCredentials {
                access: Some(session.credentials.access),
                refresh: Some(session.credentials.refresh),
                identity: Some(session.identity),
                established_at: Some(session.established_at),
            }),
        }
    }

    /// Restore a saved identity and access credential, with or without a
    /// refresh credential.
    pub fn with_credentials(
        identity: Identity,
        access: AccessToken,
        refresh: Option<RefreshToken>,
    ) -> Self {
        let store = Self::new();
        store.restore(identity, access, refresh);
        store
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn access_token(&self) -> Option<AccessToken> {
        self.inner.read().access.clone()
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        self.inner.read().refresh.clone()
    }

    fn identity(&self) -> Option<Identity> {
        self.inner.read().identity.clone()
    }

    fn session(&self) -> Option<Session> {
        let inner = self.inner.read();
        match (&inner.access, &inner.refresh, &inner.identity) {
            (Some(access), Some(refresh), Some(identity)) => Some(Session {
                identity: identity.clone(),
                credentials: CredentialPair {
                    access: access.clone(),
                    refresh: refresh.clone(),
                },
                established_at: inner.established_at.unwrap_or_else(chrono::Utc::now),
            }),
            _ => None,
        }
    }

    fn set_access_token(&self, token: AccessToken) {
        self.inner.write().access = Some(token);
    }

    fn set_refresh_token(&self, token: RefreshToken) {
        self.inner.write().refresh = Some(token);
    }

    fn set_identity(&self, identity: Identity) {
        self.inner.write().identity = Some(identity);
    }

    fn set_session(&self, credentials: CredentialPair, identity: Identity) {
        *self.inner.write() = StoredCredentials {
            access: Some(credentials.access),
            refresh: Some(credentials.refresh),
            identity: Some(identity),
            established_at: Some(chrono::Utc::now()),
        };
    }

    fn restore(&self, identity: Identity, access: AccessToken, refresh: Option<RefreshToken>) {
        *self.inner.write() = StoredCredentials {
            access: Some(access),
            refresh,
            identity: Some(identity),
            established_at: Some(chrono::Utc::now()),
        };
    }

    fn clear(&self) {
        *self.inner.write() = StoredCredentials::default();
    }
}

/// Store operation recorded by [`MockCredentialStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOperation {
    SetAccess(String),
    SetRefresh(String),
    SetIdentity(u64),
    SetSession { access: String, refresh: String },
    Restore { access: String, refresh: Option<String> },
    Clear,
}

/// Mock credential store for testing.
///
/// Behaves like [`InMemoryCredentialStore`] and records every write.
#[derive(Default)]
pub struct MockCredentialStore {
    inner: InMemoryCredentialStore,
    history: Mutex<Vec<StoreOperation>>,
}

impl MockCredentialStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock store holding the given credentials.
    pub fn with_tokens(access: impl Into<String>, refresh: Option<&str>) -> Self {
        let store = Self::new();
        store.inner.set_access_token(AccessToken::new(access));
        if let Some(refresh) = refresh {
            store.inner.set_refresh_token(RefreshToken::new(refresh));
        }
        store
    }

    /// Get write history.
    pub fn get_history(&self) -> Vec<StoreOperation> {
        self.history.lock().clone()
    }

    /// Number of `clear` calls.
    pub fn clear_count(&self) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|op| **op == StoreOperation::Clear)
            .count()
    }

    fn record(&self, operation: StoreOperation) {
        self.history.lock().push(operation);
    }
}

impl CredentialStore for MockCredentialStore {
    fn access_token(&self) -> Option<AccessToken> {
        self.inner.access_token()
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        self.inner.refresh_token()
    }

    fn identity(&self) -> Option<Identity> {
        self.inner.identity()
    }

    fn session(&self) -> Option<Session> {
        self.inner.session()
    }

    fn set_access_token(&self, token: AccessToken) {
        self.record(StoreOperation::SetAccess(token.secret().to_string()));
        self.inner.set_access_token(token);
    }

    fn set_refresh_token(&self, token: RefreshToken) {
        self.record(StoreOperation::SetRefresh(token.secret().to_string()));
        self.inner.set_refresh_token(token);
    }

    fn set_identity(&self, identity: Identity) {
        self.record(StoreOperation::SetIdentity(identity.id));
        self.inner.set_identity(identity);
    }

    fn set_session(&self, credentials: CredentialPair, identity: Identity) {
        self.record(StoreOperation::SetSession {
            access: credentials.access.secret().to_string(),
            refresh: credentials.refresh.secret().to_string(),
        });
        self.inner.set_session(credentials, identity);
    }

    fn restore(&self, identity: Identity, access: AccessToken, refresh: Option<RefreshToken>) {
        self.record(StoreOperation::Restore {
            access: access.secret().to_string(),
            refresh: refresh.as_ref().map(|r| r.secret().to_string()),
        });
        self.inner.restore(identity, access, refresh);
    }

    fn clear(&self) {
        self.record(StoreOperation::Clear);
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            Identity::new(1, "ada"),
            CredentialPair::new("access-1", "refresh-1"),
        )
    }

    #[test]
    fn test_in_memory_set_session_and_read() {
        let store = InMemoryCredentialStore::new();
        assert!(!store.is_authenticated());

        let s = session();
        store.set_session(s.credentials, s.identity);

        assert!(store.is_authenticated());
        assert_eq!(store.access_token().unwrap().secret(), "access-1");
        assert_eq!(store.refresh_token().unwrap().secret(), "refresh-1");
        assert_eq!(store.identity().unwrap().username, "ada");
        assert!(store.session().is_some());
    }

    #[test]
    fn test_set_access_keeps_refresh_and_identity() {
        let store = InMemoryCredentialStore::with_session(session());
        store.set_access_token(AccessToken::new("access-2"));

        assert_eq!(store.access_token().unwrap().secret(), "access-2");
        assert_eq!(store.refresh_token().unwrap().secret(), "refresh-1");
        assert_eq!(store.identity().unwrap().id, 1);
    }

    #[test]
    fn test_restore_without_refresh_credential() {
        let store = InMemoryCredentialStore::with_session(session());

        store.restore(Identity::new(2, "grace"), AccessToken::new("access-9"), None);

        assert!(store.is_authenticated());
        assert_eq!(store.access_token().unwrap().secret(), "access-9");
        assert!(store.refresh_token().is_none());
        assert_eq!(store.identity().unwrap().id, 2);
        assert!(store.session().is_none());
    }

    #[test]
    fn test_with_credentials_keeps_optional_refresh() {
        let store = InMemoryCredentialStore::with_credentials(
            Identity::new(1, "ada"),
            AccessToken::new("access-1"),
            Some(RefreshToken::new("refresh-1")),
        );

        assert_eq!(store.refresh_token().unwrap().secret(), "refresh-1");
        assert!(store.session().is_some());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = InMemoryCredentialStore::with_session(session());

        store.clear();
        let once = (
            store.access_token().is_none(),
            store.refresh_token().is_none(),
            store.identity().is_none(),
        );
        store.clear();
        store.clear();
        let thrice = (
            store.access_token().is_none(),
            store.refresh_token().is_none(),
            store.identity().is_none(),
        );

        assert_eq!(once, (true, true, true));
        assert_eq!(once, thrice);
        assert!(store.session().is_none());
    }

    #[test]
    fn test_mock_store_records_writes() {
        let store = MockCredentialStore::with_tokens("a1", Some("r1"));
        store.set_access_token(AccessToken::new("a2"));
        store.clear();
        store.clear();

        assert_eq!(
            store.get_history(),
            vec![
                StoreOperation::SetAccess("a2".to_string()),
                StoreOperation::Clear,
                StoreOperation::Clear,
            ]
        );
        assert_eq!(store.clear_count(), 2);
        assert!(store.access_token().is_none());
    }
}
