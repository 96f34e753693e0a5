//! In-memory session store.
//!
//! Sessions live only as long as the process; expired entries are dropped
//! on access and by the background cleanup task.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use super::types::{Profile, Session, SessionId};
use crate::config::AuthConfig;

/// Session store keyed by [`SessionId`].
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,

    /// Default session TTL in seconds.
    default_ttl_secs: u64,
}

impl SessionStore {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_ttl_secs,
        }
    }

    /// Store whose sessions live for `session_ttl_secs`.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.session_ttl_secs)
    }

    /// Get default TTL in seconds.
    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Store a session.
    pub fn create(&self, session: Session) -> Result<SessionId> {
        let id = session.id;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))?;
        sessions.insert(id, session);
        Ok(id)
    }

    /// Start a logged-in session for `profile` with the default TTL.
    pub fn login(&self, profile: Profile) -> Result<SessionId> {
        debug!(user_id = %profile.user_id, "Creating login session");
        self.create(Session::with_profile(profile, self.default_ttl_secs))
    }

    /// Get session by ID, updating last_accessed time.
    pub fn get(&self, id: SessionId) -> Result<Option<Session>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))?;

        match sessions.get_mut(&id) {
            Some(session) if session.is_expired() => {
                sessions.remove(&id);
                Ok(None)
            }
            Some(session) => {
                session.touch();
                Ok(Some(session.clone()))
            }
            None => Ok(None),
        }
    }

    /// Delete a session by ID (logout).
    pub fn delete(&self, id: SessionId) -> Result<bool> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))?;
        Ok(sessions.remove(&id).is_some())
    }

    /// Delete all sessions for a user.
    pub fn delete_by_user(&self, user_id: &str) -> Result<usize> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))?;
        let before = sessions.len();
        sessions.retain(|_, s| s.profile.as_ref().map(|p| p.user_id.as_str()) != Some(user_id));
        Ok(before - sessions.len())
    }

    /// Evict all expired sessions. Returns the number evicted.
    pub fn evict_expired(&self) -> Result<usize> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok(before - sessions.len())
    }

    /// Get session count (for observability).
    pub fn session_count(&self) -> Result<usize> {
        self.sessions
            .read()
            .map(|s| s.len())
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(user_id: &str) -> Profile {
        Profile {
            user_id: user_id.to_string(),
            name: "Test User".to_string(),
            picture: Some("https://cdn.example.com/u.png".to_string()),
        }
    }

    #[test]
    fn test_session_create_and_get() {
        let store = SessionStore::new(3600);
        let id = store.login(profile("auth0|1")).unwrap();

        let retrieved = store.get(id).unwrap().unwrap();
        assert_eq!(retrieved.profile.unwrap().user_id, "auth0|1");
        assert_eq!(store.session_count().unwrap(), 1);
    }

    #[test]
    fn test_ttl_from_config() {
        let config = AuthConfig {
            session_ttl_secs: 600,
            ..AuthConfig::default()
        };
        let store = SessionStore::from_config(&config);
        assert_eq!(store.default_ttl_secs(), 600);

        let id = store.login(profile("auth0|1")).unwrap();
        let session = store.get(id).unwrap().unwrap();
        assert_eq!((session.expires_at - session.created_at).num_seconds(), 600);
    }

    #[test]
    fn test_session_expiry() {
        let store = SessionStore::new(3600);
        let mut session = Session::with_profile(profile("auth0|1"), 3600);
        // Manually expire
        session.expires_at = Utc::now() - chrono::Duration::seconds(10);
        let id = store.create(session).unwrap();

        // Should return None for expired session and drop it
        assert!(store.get(id).unwrap().is_none());
        assert_eq!(store.session_count().unwrap(), 0);
    }

    #[test]
    fn test_session_delete() {
        let store = SessionStore::new(3600);
        let id = store.login(profile("auth0|1")).unwrap();

        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert!(store.get(id).unwrap().is_none());
    }

    #[test]
    fn test_delete_by_user() {
        let store = SessionStore::new(3600);
        store.login(profile("auth0|1")).unwrap();
        store.login(profile("auth0|1")).unwrap();
        store.login(profile("auth0|2")).unwrap();
        store.create(Session::new(3600)).unwrap();

        assert_eq!(store.delete_by_user("auth0|1").unwrap(), 2);
        assert_eq!(store.session_count().unwrap(), 2);
    }

    #[test]
    fn test_evict_expired() {
        let store = SessionStore::new(3600);
        let mut expired = Session::new(3600);
        expired.expires_at = Utc::now() - chrono::Duration::seconds(10);
        store.create(expired).unwrap();
        store.create(Session::new(3600)).unwrap();

        assert_eq!(store.evict_expired().unwrap(), 1);
        assert_eq!(store.session_count().unwrap(), 1);
    }
}
