//! Store-backed permission check.
//!
//! Every call re-reads association state; nothing is cached. Any lookup
//! failure resolves to a denial.

use std::sync::Arc;

use tracing::{debug, warn};

use keystone_auth::{Association, Decision, DenialKind, PermissionName, holds_directly, shared_group};
use keystone_core::id::typed;
use keystone_core::{DomainError, DomainResult, GroupId, PermissionId};

use crate::store::{PermissionKey, RelationshipStore, UserKey};

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn RelationshipStore>,
}

impl core::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(store: Arc<dyn RelationshipStore>) -> Self {
        Self { store }
    }

    /// Whether `username` holds `permission`, directly or through a group.
    pub async fn has_permission(&self, username: &str, permission: &PermissionName) -> bool {
        self.decide(username, permission).await.is_granted()
    }

    /// Same check, keeping the reason for logs.
    pub async fn decide(&self, username: &str, permission: &PermissionName) -> Decision {
        let username = username.trim();
        if username.is_empty() {
            debug!(permission = %permission, "permission check without a principal");
            return Decision::Denied(DenialKind::UnknownPrincipal);
        }
        if permission.is_empty() {
            debug!(username, "permission check with an empty permission name");
            return Decision::Denied(DenialKind::EmptyPermissionName);
        }

        let decision = match self.resolve(username, permission).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    username,
                    permission = %permission,
                    error = %err,
                    "permission lookup failed; denying"
                );
                Decision::Denied(DenialKind::LookupFailed)
            }
        };

        if decision.is_granted() {
            debug!(username, permission = %permission, reason = %decision, "permission granted");
        } else {
            debug!(username, permission = %permission, reason = %decision, "permission denied");
        }
        decision
    }

    async fn resolve(&self, username: &str, permission: &PermissionName) -> DomainResult<Decision> {
        let Some(user) = self.store.find_user(UserKey::Username(username)).await? else {
            return Ok(Decision::Denied(DenialKind::UnknownPrincipal));
        };
        if user.superuser {
            return Ok(Decision::Superuser);
        }

        let Some(target) = self
            .store
            .find_permission(PermissionKey::Name(permission.as_str()))
            .await?
        else {
            return Ok(Decision::Denied(DenialKind::UnknownPermission));
        };

        let direct: Vec<PermissionId> =
            self.ids(Association::UserPermissions, user.id.get()).await?;
        if holds_directly(&direct, target.id) {
            return Ok(Decision::Direct);
        }

        let user_groups: Vec<GroupId> = self.ids(Association::UserGroups, user.id.get()).await?;
        if user_groups.is_empty() {
            return Ok(Decision::Denied(DenialKind::MissingPermission));
        }
        let permission_groups: Vec<GroupId> =
            self.ids(Association::PermissionGroups, target.id.get()).await?;

        Ok(match shared_group(&user_groups, &permission_groups) {
            Some(group) => Decision::ViaGroup(group),
            None => Decision::Denied(DenialKind::MissingPermission),
        })
    }

    async fn ids<T: From<i64>>(&self, association: Association, owner: i64) -> Result<Vec<T>, DomainError> {
        Ok(typed(self.store.pluck(association, owner).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_auth::{Group, Permission, User};

    use crate::lifecycle::Persistable;
    use crate::store::InMemoryRelationshipStore;
    use crate::store::testing::FlakyStore;

    fn deploy() -> PermissionName {
        PermissionName::new("deploy")
    }

    /// alice is in "eng", which holds "deploy".
    async fn scenario(store: &dyn RelationshipStore) -> (User, Group, Permission) {
        let mut perm = Permission::new("deploy");
        perm.create(store).await.unwrap();
        let mut eng = Group::new("eng").with_permissions([perm.id]);
        eng.create(store).await.unwrap();
        let mut alice = User::new("alice", "h").with_groups([eng.id]);
        alice.create(store).await.unwrap();
        (alice, eng, perm)
    }

    #[tokio::test]
    async fn group_membership_grants_permission() {
        let store = Arc::new(InMemoryRelationshipStore::new());
        let (_, eng, _) = scenario(&*store).await;
        let authz = Authorizer::new(store);

        assert!(authz.has_permission("alice", &deploy()).await);
        assert_eq!(authz.decide("alice", &deploy()).await, Decision::ViaGroup(eng.id));
    }

    #[tokio::test]
    async fn leaving_the_group_revokes_permission() {
        let store = Arc::new(InMemoryRelationshipStore::new());
        let (mut alice, _, _) = scenario(&*store).await;
        alice.group_ids = Some(vec![]);
        alice.update(&*store).await.unwrap();

        let authz = Authorizer::new(store);
        assert!(!authz.has_permission("alice", &deploy()).await);
    }

    #[tokio::test]
    async fn unknown_permission_is_a_plain_denial() {
        let store = Arc::new(InMemoryRelationshipStore::new());
        scenario(&*store).await;
        let authz = Authorizer::new(store);

        let missing = PermissionName::new("does_not_exist");
        assert!(!authz.has_permission("alice", &missing).await);
        assert_eq!(
            authz.decide("alice", &missing).await,
            Decision::Denied(DenialKind::UnknownPermission)
        );
    }

    #[tokio::test]
    async fn direct_and_group_grants_each_suffice() {
        let store = Arc::new(InMemoryRelationshipStore::new());
        let (mut alice, mut eng, perm) = scenario(&*store).await;
        alice.permission_ids = Some(vec![perm.id]);
        alice.update(&*store).await.unwrap();

        let authz = Authorizer::new(store.clone());
        assert_eq!(authz.decide("alice", &deploy()).await, Decision::Direct);

        alice.permission_ids = Some(vec![]);
        alice.update(&*store).await.unwrap();
        assert!(authz.has_permission("alice", &deploy()).await);

        eng.permission_ids = Some(vec![]);
        eng.update(&*store).await.unwrap();
        assert!(!authz.has_permission("alice", &deploy()).await);
    }

    #[tokio::test]
    async fn superuser_bypasses_everything() {
        let store = Arc::new(InMemoryRelationshipStore::new());
        User::new("root", "h")
            .with_superuser(true)
            .create(&*store)
            .await
            .unwrap();
        let authz = Authorizer::new(store);

        assert_eq!(authz.decide("root", &deploy()).await, Decision::Superuser);
        assert!(authz.has_permission("root", &PermissionName::new("never_created")).await);
    }

    #[tokio::test]
    async fn missing_principal_or_name_is_denied_without_store_access() {
        let store = Arc::new(FlakyStore::default().failing("find_user"));
        let authz = Authorizer::new(store);

        assert_eq!(
            authz.decide("", &deploy()).await,
            Decision::Denied(DenialKind::UnknownPrincipal)
        );
        assert_eq!(
            authz.decide("alice", &PermissionName::new("  ")).await,
            Decision::Denied(DenialKind::EmptyPermissionName)
        );
        assert_eq!(
            authz.decide("nobody", &deploy()).await,
            Decision::Denied(DenialKind::LookupFailed)
        );
    }

    #[tokio::test]
    async fn unknown_principal_is_denied() {
        let authz = Authorizer::new(Arc::new(InMemoryRelationshipStore::new()));
        assert_eq!(
            authz.decide("ghost", &deploy()).await,
            Decision::Denied(DenialKind::UnknownPrincipal)
        );
    }

    #[tokio::test]
    async fn every_lookup_failure_fails_closed() {
        for operation in ["find_user", "find_permission", "pluck"] {
            let flaky = FlakyStore::default();
            scenario(&flaky).await;
            let authz = Authorizer::new(Arc::new(flaky.failing(operation)));

            assert_eq!(
                authz.decide("alice", &deploy()).await,
                Decision::Denied(DenialKind::LookupFailed),
                "failure in {operation} must deny"
            );
        }
    }
}
