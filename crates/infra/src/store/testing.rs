//! Store double that fails selected operations.

use async_trait::async_trait;

use keystone_auth::{Association, EntityKind, Group, GroupField, Permission, PermissionField, User, UserField};
use keystone_core::{DomainError, DomainResult, GroupId, Page, PermissionId, QuerySpec, UserId};

use super::{InMemoryRelationshipStore, PermissionKey, RelationshipStore, UserKey};

/// Wraps an in-memory store; any operation named in `fail_on` returns
/// `StoreUnavailable`, everything else is forwarded.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: InMemoryRelationshipStore,
    pub fail_on: Vec<&'static str>,
}

impl FlakyStore {
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.fail_on.push(operation);
        self
    }

    fn check(&self, operation: &'static str) -> DomainResult<()> {
        if self.fail_on.contains(&operation) {
            Err(DomainError::unavailable(format!("{operation}: connection refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelationshipStore for FlakyStore {
    async fn insert_user(&self, user: &User) -> DomainResult<UserId> {
        self.check("insert_user")?;
        self.inner.insert_user(user).await
    }

    async fn insert_group(&self, group: &Group) -> DomainResult<GroupId> {
        self.check("insert_group")?;
        self.inner.insert_group(group).await
    }

    async fn insert_permission(&self, permission: &Permission) -> DomainResult<PermissionId> {
        self.check("insert_permission")?;
        self.inner.insert_permission(permission).await
    }

    async fn find_user(&self, key: UserKey<'_>) -> DomainResult<Option<User>> {
        self.check("find_user")?;
        self.inner.find_user(key).await
    }

    async fn find_group(&self, id: GroupId) -> DomainResult<Option<Group>> {
        self.check("find_group")?;
        self.inner.find_group(id).await
    }

    async fn find_permission(&self, key: PermissionKey<'_>) -> DomainResult<Option<Permission>> {
        self.check("find_permission")?;
        self.inner.find_permission(key).await
    }

    async fn list_users(&self, query: &QuerySpec<UserField>) -> DomainResult<Page<User>> {
        self.check("list_users")?;
        self.inner.list_users(query).await
    }

    async fn list_groups(&self, query: &QuerySpec<GroupField>) -> DomainResult<Page<Group>> {
        self.check("list_groups")?;
        self.inner.list_groups(query).await
    }

    async fn list_permissions(
        &self,
        query: &QuerySpec<PermissionField>,
    ) -> DomainResult<Page<Permission>> {
        self.check("list_permissions")?;
        self.inner.list_permissions(query).await
    }

    async fn update_user(&self, user: &User) -> DomainResult<()> {
        self.check("update_user")?;
        self.inner.update_user(user).await
    }

    async fn update_group(&self, group: &Group) -> DomainResult<()> {
        self.check("update_group")?;
        self.inner.update_group(group).await
    }

    async fn update_permission(&self, permission: &Permission) -> DomainResult<()> {
        self.check("update_permission")?;
        self.inner.update_permission(permission).await
    }

    async fn exists(&self, kind: EntityKind, id: i64) -> DomainResult<bool> {
        self.check("exists")?;
        self.inner.exists(kind, id).await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> DomainResult<()> {
        self.check("delete")?;
        self.inner.delete(kind, id).await
    }

    async fn pluck(&self, association: Association, owner: i64) -> DomainResult<Vec<i64>> {
        self.check("pluck")?;
        self.inner.pluck(association, owner).await
    }

    async fn replace_association(
        &self,
        association: Association,
        owner: i64,
        targets: &[i64],
    ) -> DomainResult<()> {
        self.check("replace_association")?;
        self.inner.replace_association(association, owner, targets).await
    }

    async fn clear_association(&self, association: Association, owner: i64) -> DomainResult<()> {
        self.check("clear_association")?;
        self.inner.clear_association(association, owner).await
    }
}
