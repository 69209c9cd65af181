//! Store and service wiring shared by every handler.

use std::sync::Arc;
use std::time::Duration;

use keystone_auth::{CredentialHasher, HashingCost, User};
use keystone_core::DomainResult;
use keystone_infra::{
    Authorizer, CredentialChecker, InMemoryRelationshipStore, InMemorySessionStore, Persistable,
    RelationshipStore, SessionStore, SqliteRelationshipStore, SqliteSessionStore, UserKey,
};

use crate::config::Settings;

/// Request-handling knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct ServicePolicy {
    pub base_password: String,
    pub page_size: u32,
    pub session_ttl: Duration,
}

impl ServicePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_password: settings.users.base_password.clone(),
            page_size: settings.users.page_size,
            session_ttl: settings.session_ttl(),
        }
    }
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn RelationshipStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub authorizer: Arc<Authorizer>,
    pub credentials: Arc<CredentialChecker>,
    pub policy: Arc<ServicePolicy>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: CredentialHasher,
        policy: ServicePolicy,
    ) -> DomainResult<Self> {
        Ok(Self {
            authorizer: Arc::new(Authorizer::new(store.clone())),
            credentials: Arc::new(CredentialChecker::new(store.clone(), hasher)?),
            store,
            sessions,
            policy: Arc::new(policy),
        })
    }

    /// Non-durable stores; everything is lost on restart.
    pub fn in_memory(cost: HashingCost, policy: ServicePolicy) -> DomainResult<Self> {
        Self::new(
            Arc::new(InMemoryRelationshipStore::new()),
            Arc::new(InMemorySessionStore::new()),
            CredentialHasher::new(cost)?,
            policy,
        )
    }

    /// Stores selected by `database.url`, with the SQLite schema applied.
    pub async fn from_settings(settings: &Settings) -> DomainResult<Self> {
        let policy = ServicePolicy::from_settings(settings);
        if settings.uses_memory_store() {
            tracing::warn!("using the in-memory store; data is lost on restart");
            return Self::in_memory(settings.security.hashing, policy);
        }

        let store = SqliteRelationshipStore::connect(&settings.database.url, settings.store_options()).await?;
        store.migrate().await?;
        let sessions = SqliteSessionStore::new(store.pool().clone(), store.timeout());
        sessions.migrate().await?;

        Self::new(
            Arc::new(store),
            Arc::new(sessions),
            CredentialHasher::new(settings.security.hashing)?,
            policy,
        )
    }

    pub fn hasher(&self) -> &CredentialHasher {
        self.credentials.hasher()
    }

    /// Create `username` as an active superuser unless the name is taken.
    ///
    /// Returns whether an account was created.
    pub async fn ensure_superuser(&self, username: &str, password: &str) -> DomainResult<bool> {
        if self.store.find_user(UserKey::Username(username)).await?.is_some() {
            return Ok(false);
        }
        let hash = self.credentials.hash_password(password).await?;
        let mut user = User::new(username, hash).with_superuser(true);
        user.create(&*self.store).await?;
        tracing::info!(username = %user.username, id = %user.id, "bootstrap superuser created");
        Ok(true)
    }
}
