//! Relationship store boundary.
//!
//! A relational engine holding the three entity tables and the three join
//! tables. The entity layer and the authorization engine talk to it only
//! through [`RelationshipStore`], handed to them explicitly; there is no
//! process-wide handle.
//!
//! ## Contract
//!
//! - `insert_*` writes the row and the join rows of every present
//!   association set atomically, and returns the assigned id.
//! - `update_*` is a column-level update. Association sets on the entity are
//!   ignored; use [`RelationshipStore::replace_association`] for those.
//! - `replace_association` is delete-then-insert inside one transaction
//!   scoped to a single relation and owner. On failure the previous set is
//!   left intact.
//! - Join pairs are never duplicated; duplicate ids in a request collapse.
//! - Every error is one of the four [`DomainError`](keystone_core::DomainError)
//!   kinds. Timeouts surface as `StoreUnavailable`.

pub mod in_memory;
pub mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use in_memory::InMemoryRelationshipStore;
pub use sqlite::SqliteRelationshipStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use keystone_auth::{
    Association, EntityKind, Group, GroupField, Permission, PermissionField, User, UserField,
    dedup_ids,
};
use keystone_core::id::raw;
use keystone_core::{DomainError, DomainResult, GroupId, Page, PermissionId, QuerySpec, UserId};

/// Lookup key for a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKey<'a> {
    Id(UserId),
    /// Exact match.
    Username(&'a str),
}

/// Lookup key for a permission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKey<'a> {
    Id(PermissionId),
    /// Exact match.
    Name(&'a str),
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> DomainResult<UserId>;
    async fn insert_group(&self, group: &Group) -> DomainResult<GroupId>;
    async fn insert_permission(&self, permission: &Permission) -> DomainResult<PermissionId>;

    /// Loaded entities carry no association snapshots (`None`).
    async fn find_user(&self, key: UserKey<'_>) -> DomainResult<Option<User>>;
    async fn find_group(&self, id: GroupId) -> DomainResult<Option<Group>>;
    async fn find_permission(&self, key: PermissionKey<'_>) -> DomainResult<Option<Permission>>;

    async fn list_users(&self, query: &QuerySpec<UserField>) -> DomainResult<Page<User>>;
    async fn list_groups(&self, query: &QuerySpec<GroupField>) -> DomainResult<Page<Group>>;
    async fn list_permissions(
        &self,
        query: &QuerySpec<PermissionField>,
    ) -> DomainResult<Page<Permission>>;

    async fn update_user(&self, user: &User) -> DomainResult<()>;
    async fn update_group(&self, group: &Group) -> DomainResult<()>;
    async fn update_permission(&self, permission: &Permission) -> DomainResult<()>;

    async fn exists(&self, kind: EntityKind, id: i64) -> DomainResult<bool>;

    /// Remove a row. Fails with `ConstraintViolation` while join rows still
    /// reference it.
    async fn delete(&self, kind: EntityKind, id: i64) -> DomainResult<()>;

    /// Target ids joined to `owner` through `association`, ascending.
    async fn pluck(&self, association: Association, owner: i64) -> DomainResult<Vec<i64>>;

    async fn replace_association(
        &self,
        association: Association,
        owner: i64,
        targets: &[i64],
    ) -> DomainResult<()>;

    async fn clear_association(&self, association: Association, owner: i64) -> DomainResult<()>;
}

#[async_trait]
impl<S> RelationshipStore for Arc<S>
where
    S: RelationshipStore + ?Sized,
{
    async fn insert_user(&self, user: &User) -> DomainResult<UserId> {
        (**self).insert_user(user).await
    }

    async fn insert_group(&self, group: &Group) -> DomainResult<GroupId> {
        (**self).insert_group(group).await
    }

    async fn insert_permission(&self, permission: &Permission) -> DomainResult<PermissionId> {
        (**self).insert_permission(permission).await
    }

    async fn find_user(&self, key: UserKey<'_>) -> DomainResult<Option<User>> {
        (**self).find_user(key).await
    }

    async fn find_group(&self, id: GroupId) -> DomainResult<Option<Group>> {
        (**self).find_group(id).await
    }

    async fn find_permission(&self, key: PermissionKey<'_>) -> DomainResult<Option<Permission>> {
        (**self).find_permission(key).await
    }

    async fn list_users(&self, query: &QuerySpec<UserField>) -> DomainResult<Page<User>> {
        (**self).list_users(query).await
    }

    async fn list_groups(&self, query: &QuerySpec<GroupField>) -> DomainResult<Page<Group>> {
        (**self).list_groups(query).await
    }

    async fn list_permissions(
        &self,
        query: &QuerySpec<PermissionField>,
    ) -> DomainResult<Page<Permission>> {
        (**self).list_permissions(query).await
    }

    async fn update_user(&self, user: &User) -> DomainResult<()> {
        (**self).update_user(user).await
    }

    async fn update_group(&self, group: &Group) -> DomainResult<()> {
        (**self).update_group(group).await
    }

    async fn update_permission(&self, permission: &Permission) -> DomainResult<()> {
        (**self).update_permission(permission).await
    }

    async fn exists(&self, kind: EntityKind, id: i64) -> DomainResult<bool> {
        (**self).exists(kind, id).await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> DomainResult<()> {
        (**self).delete(kind, id).await
    }

    async fn pluck(&self, association: Association, owner: i64) -> DomainResult<Vec<i64>> {
        (**self).pluck(association, owner).await
    }

    async fn replace_association(
        &self,
        association: Association,
        owner: i64,
        targets: &[i64],
    ) -> DomainResult<()> {
        (**self).replace_association(association, owner, targets).await
    }

    async fn clear_association(&self, association: Association, owner: i64) -> DomainResult<()> {
        (**self).clear_association(association, owner).await
    }
}

/// Join rows requested by a new user: every present association set.
pub(crate) fn user_links(user: &User) -> Vec<(Association, Vec<i64>)> {
    let mut links = Vec::new();
    if let Some(ids) = &user.group_ids {
        links.push((Association::UserGroups, dedup_ids(&raw(ids))));
    }
    if let Some(ids) = &user.permission_ids {
        links.push((Association::UserPermissions, dedup_ids(&raw(ids))));
    }
    links
}

pub(crate) fn group_links(group: &Group) -> Vec<(Association, Vec<i64>)> {
    let mut links = Vec::new();
    if let Some(ids) = &group.user_ids {
        links.push((Association::GroupUsers, dedup_ids(&raw(ids))));
    }
    if let Some(ids) = &group.permission_ids {
        links.push((Association::GroupPermissions, dedup_ids(&raw(ids))));
    }
    links
}

pub(crate) fn permission_links(permission: &Permission) -> Vec<(Association, Vec<i64>)> {
    let mut links = Vec::new();
    if let Some(ids) = &permission.group_ids {
        links.push((Association::PermissionGroups, dedup_ids(&raw(ids))));
    }
    if let Some(ids) = &permission.user_ids {
        links.push((Association::PermissionUsers, dedup_ids(&raw(ids))));
    }
    links
}

/// Store-wide operational limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Upper bound for any single store call.
    pub timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_connections: 10,
        }
    }
}

/// Run a store call under a deadline; expiry is `StoreUnavailable`.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::unavailable(format!(
            "{operation} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_elapsed_deadline_to_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, DomainError>(())
        };
        let err = bounded(Duration::from_millis(10), "pluck", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::StoreUnavailable(_)));
        assert!(err.to_string().contains("pluck"));
    }

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let ok = bounded(Duration::from_secs(1), "exists", async { Ok(true) }).await;
        assert_eq!(ok, Ok(true));

        let err = bounded::<(), _>(Duration::from_secs(1), "delete", async {
            Err(DomainError::not_found("user 9"))
        })
        .await;
        assert_eq!(err, Err(DomainError::not_found("user 9")));
    }
}
