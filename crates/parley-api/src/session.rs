use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use uuid::Uuid;

/// Server-side session state. The token is an opaque bearer credential; the
/// csrf secret is generated once per session and must be echoed back on
/// every state-mutating call. Neither is persisted; a restart logs
/// everyone out.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub csrf_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Bearer token of the current request, injected by the auth middleware so
/// logout can revoke its own session.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for an authenticated identity. Returns the bearer
    /// token and the per-session csrf secret.
    pub fn create(&self, user_id: Uuid, username: &str) -> (String, String) {
        let token = random_token();
        let csrf_secret = random_token();

        let session = Session {
            user_id,
            username: username.to_string(),
            csrf_secret: csrf_secret.clone(),
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .expect("session lock poisoned")
            .insert(token.clone(), session);

        (token, csrf_secret)
    }

    /// Resolve a bearer token to its session. The same resolver serves the
    /// REST middleware and the gateway handshake, so both surfaces bind to
    /// the identical identity.
    pub fn resolve(&self, token: &str) -> Option<Session> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .get(token)
            .cloned()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.inner
            .write()
            .expect("session lock poisoned")
            .remove(token)
            .is_some()
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_resolves_to_its_session() {
        let store = SessionStore::new();
        let user_id = Uuid::new_v4();

        let (token, csrf) = store.create(user_id, "alice");

        let session = store.resolve(&token).unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.username, "alice");
        assert_eq!(session.csrf_secret, csrf);
    }

    #[test]
    fn unknown_token_resolves_to_nothing() {
        let store = SessionStore::new();
        assert!(store.resolve("not-a-token").is_none());
    }

    #[test]
    fn revoked_token_stops_resolving() {
        let store = SessionStore::new();
        let (token, _) = store.create(Uuid::new_v4(), "alice");

        assert!(store.revoke(&token));
        assert!(store.resolve(&token).is_none());
        assert!(!store.revoke(&token));
    }

    #[test]
    fn each_session_gets_its_own_secrets() {
        let store = SessionStore::new();
        let user_id = Uuid::new_v4();

        let (token_a, csrf_a) = store.create(user_id, "alice");
        let (token_b, csrf_b) = store.create(user_id, "alice");

        assert_ne!(token_a, token_b);
        assert_ne!(csrf_a, csrf_b);
    }
}
