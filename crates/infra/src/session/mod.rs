//! Cookie sessions: an opaque token mapped to a username until it expires.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use keystone_core::{DomainError, DomainResult};

/// Opaque session token: 128 random bits as 32 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accepts only well-formed tokens; anything else cannot name a session.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let well_formed = raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit());
        well_formed.then(|| Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SessionToken({}…)", &self.0[..6.min(self.0.len())])
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a session for `username` lasting `ttl`.
    async fn create(&self, username: &str, ttl: Duration) -> DomainResult<SessionToken>;

    /// Username behind a live session. Expired sessions resolve to `None`.
    async fn resolve(&self, token: &SessionToken) -> DomainResult<Option<String>>;

    async fn destroy(&self, token: &SessionToken) -> DomainResult<()>;

    /// End every session held by `username`; returns how many were removed.
    async fn destroy_for_user(&self, username: &str) -> DomainResult<u64>;

    /// Drop expired sessions; returns how many were removed.
    async fn purge_expired(&self) -> DomainResult<u64>;
}

pub(crate) fn expiry(ttl: Duration) -> DomainResult<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| DomainError::malformed(format!("session ttl out of range: {e}")))?;
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| DomainError::malformed("session ttl out of range"))
}

/// Run `purge_expired` every `every` until the returned task is aborted.
pub fn spawn_periodic_cleanup(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired sessions purged"),
                Err(err) => tracing::warn!(error = %err, "session cleanup failed"),
            }
        }
    })
}
