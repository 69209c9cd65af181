use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keystone_core::{DomainError, DomainResult};

use super::{SessionStore, SessionToken, expiry};

#[derive(Debug, Clone)]
struct Session {
    username: String,
    expires_at: DateTime<Utc>,
}

/// In-memory session store for tests/dev. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<SessionToken, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> DomainError {
    DomainError::unavailable("session store lock poisoned")
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, username: &str, ttl: Duration) -> DomainResult<SessionToken> {
        let session = Session {
            username: username.to_string(),
            expires_at: expiry(ttl)?,
        };
        let token = SessionToken::generate();
        self.inner
            .write()
            .map_err(poisoned)?
            .insert(token.clone(), session);
        Ok(token)
    }

    async fn resolve(&self, token: &SessionToken) -> DomainResult<Option<String>> {
        let now = Utc::now();
        let sessions = self.inner.read().map_err(poisoned)?;
        Ok(sessions
            .get(token)
            .filter(|s| s.expires_at > now)
            .map(|s| s.username.clone()))
    }

    async fn destroy(&self, token: &SessionToken) -> DomainResult<()> {
        self.inner.write().map_err(poisoned)?.remove(token);
        Ok(())
    }

    async fn destroy_for_user(&self, username: &str) -> DomainResult<u64> {
        let mut sessions = self.inner.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.username != username);
        Ok((before - sessions.len()) as u64)
    }

    async fn purge_expired(&self) -> DomainResult<u64> {
        let now = Utc::now();
        let mut sessions = self.inner.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_resolve_destroy() {
        let store = InMemorySessionStore::new();
        let token = store.create("alice", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.resolve(&token).await.unwrap().as_deref(), Some("alice"));

        store.destroy(&token).await.unwrap();
        assert_eq!(store.resolve(&token).await.unwrap(), None);
        store.destroy(&token).await.unwrap();
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve_and_are_purged() {
        let store = InMemorySessionStore::new();
        let stale = store.create("alice", Duration::ZERO).await.unwrap();
        let live = store.create("bob", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.resolve(&stale).await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(&live).await.unwrap().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn destroy_for_user_ends_only_that_users_sessions() {
        let store = InMemorySessionStore::new();
        let first = store.create("alice", Duration::from_secs(60)).await.unwrap();
        let second = store.create("alice", Duration::from_secs(60)).await.unwrap();
        let other = store.create("bob", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.destroy_for_user("alice").await.unwrap(), 2);
        assert_eq!(store.resolve(&first).await.unwrap(), None);
        assert_eq!(store.resolve(&second).await.unwrap(), None);
        assert_eq!(store.resolve(&other).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(store.destroy_for_user("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_token_resolves_to_none() {
        let store = InMemorySessionStore::new();
        assert!(store.resolve(&SessionToken::generate()).await.unwrap().is_none());
    }
}
