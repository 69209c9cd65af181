use std::sync::Arc;

use tracing::{debug, warn};

use keystone_auth::{CredentialHasher, User};
use keystone_core::{DomainError, DomainResult};

use crate::store::{RelationshipStore, UserKey};

/// Verifies a username/password pair against the stored hash.
///
/// Unknown accounts still cost one verification against a throwaway hash,
/// so response time does not reveal whether a username exists.
#[derive(Clone)]
pub struct CredentialChecker {
    store: Arc<dyn RelationshipStore>,
    hasher: CredentialHasher,
    dummy_hash: String,
}

impl core::fmt::Debug for CredentialChecker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialChecker").finish_non_exhaustive()
    }
}

impl CredentialChecker {
    pub fn new(store: Arc<dyn RelationshipStore>, hasher: CredentialHasher) -> DomainResult<Self> {
        let dummy_hash = hasher.hash("keystone-timing-equalizer")?;
        Ok(Self {
            store,
            hasher,
            dummy_hash,
        })
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Hash on the blocking pool; Argon2 is too slow for a runtime worker.
    pub async fn hash_password(&self, plaintext: &str) -> DomainResult<String> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| DomainError::unavailable(format!("password hashing task failed: {e}")))?
    }

    async fn verify(&self, stored: String, plaintext: &str) -> bool {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        match tokio::task::spawn_blocking(move || hasher.verify(&stored, &plaintext)).await {
            Ok(matches) => matches,
            Err(err) => {
                warn!(error = %err, "password verification task failed");
                false
            }
        }
    }

    pub async fn check_password(&self, username: &str, plaintext: &str) -> bool {
        self.authenticate(username, plaintext).await.is_some()
    }

    /// The matching account, or `None` for any failure.
    ///
    /// Inactive accounts never authenticate.
    pub async fn authenticate(&self, username: &str, plaintext: &str) -> Option<User> {
        if username.is_empty() {
            return None;
        }

        let user = match self.store.find_user(UserKey::Username(username)).await {
            Ok(user) => user,
            Err(err) => {
                warn!(username, error = %err, "credential lookup failed");
                None
            }
        };

        match user {
            Some(user) => {
                let matches = self.verify(user.password_hash.clone(), plaintext).await;
                if matches && user.active {
                    Some(user)
                } else {
                    debug!(username, active = user.active, "credential check rejected");
                    None
                }
            }
            None => {
                self.verify(self.dummy_hash.clone(), plaintext).await;
                debug!(username, "credential check for unknown account");
                None
            }
        }
    }
}
