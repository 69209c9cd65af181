//! Entity lifecycle: keeps join rows consistent with the association sets an
//! entity carries.
//!
//! - `create` writes the row and every present set in one store call.
//! - `update` is a column-level update, then one atomic replace per present
//!   set. `None` leaves a relation untouched; `Some(vec![])` clears it.
//! - `delete` clears both relations, then removes the row. An entity without
//!   an assigned id is a no-op.
//! - `load_all_association_ids` refreshes both snapshots from the join tables.

use async_trait::async_trait;
use chrono::Utc;

use keystone_auth::{Association, EntityKind, Group, Permission, User};
use keystone_core::id::{raw, typed};
use keystone_core::{DomainError, DomainResult, Entity};

use crate::store::RelationshipStore;

#[async_trait]
pub trait Persistable: Entity + Send + Sync {
    const KIND: EntityKind;

    /// Raw row id; `0` when unassigned.
    fn row_id(&self) -> i64;

    async fn create(&mut self, store: &dyn RelationshipStore) -> DomainResult<()>;

    async fn update(&mut self, store: &dyn RelationshipStore) -> DomainResult<()>;

    async fn exists(&self, store: &dyn RelationshipStore) -> DomainResult<bool> {
        if !self.is_persisted() {
            return Ok(false);
        }
        store.exists(Self::KIND, self.row_id()).await
    }

    async fn delete(&self, store: &dyn RelationshipStore) -> DomainResult<()> {
        if !self.is_persisted() {
            return Ok(());
        }
        let id = self.row_id();
        for association in Self::KIND.associations() {
            store.clear_association(association, id).await?;
        }
        store.delete(Self::KIND, id).await
    }

    async fn load_all_association_ids(&mut self, store: &dyn RelationshipStore) -> DomainResult<()>;
}

/// Update when the row exists, create otherwise.
pub async fn create_or_update<E: Persistable>(
    entity: &mut E,
    store: &dyn RelationshipStore,
) -> DomainResult<()> {
    if entity.exists(store).await? {
        entity.update(store).await
    } else {
        entity.create(store).await
    }
}

fn require_persisted<E: Persistable>(entity: &E) -> DomainResult<i64> {
    if entity.is_persisted() {
        Ok(entity.row_id())
    } else {
        Err(DomainError::malformed(format!(
            "cannot update an unsaved {}",
            E::KIND
        )))
    }
}

async fn replace_present<T: Copy + Into<i64>>(
    store: &dyn RelationshipStore,
    association: Association,
    owner: i64,
    ids: Option<&Vec<T>>,
) -> DomainResult<()> {
    match ids {
        Some(ids) => store.replace_association(association, owner, &raw(ids)).await,
        None => Ok(()),
    }
}

#[async_trait]
impl Persistable for User {
    const KIND: EntityKind = EntityKind::User;

    fn row_id(&self) -> i64 {
        self.id.get()
    }

    async fn create(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        self.validate()?;
        self.id = store.insert_user(self).await?;
        Ok(())
    }

    async fn update(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        let id = require_persisted(&*self)?;
        self.validate()?;
        self.updated_at = Utc::now();
        store.update_user(self).await?;
        replace_present(store, Association::UserPermissions, id, self.permission_ids.as_ref()).await?;
        replace_present(store, Association::UserGroups, id, self.group_ids.as_ref()).await
    }

    async fn load_all_association_ids(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        let id = self.row_id();
        let permissions = store.pluck(Association::UserPermissions, id).await?;
        let groups = store.pluck(Association::UserGroups, id).await?;
        self.permission_ids = Some(typed(permissions));
        self.group_ids = Some(typed(groups));
        Ok(())
    }
}

#[async_trait]
impl Persistable for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn row_id(&self) -> i64 {
        self.id.get()
    }

    async fn create(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        self.validate()?;
        self.id = store.insert_group(self).await?;
        Ok(())
    }

    async fn update(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        let id = require_persisted(&*self)?;
        self.validate()?;
        store.update_group(self).await?;
        replace_present(store, Association::GroupUsers, id, self.user_ids.as_ref()).await?;
        replace_present(store, Association::GroupPermissions, id, self.permission_ids.as_ref()).await
    }

    async fn load_all_association_ids(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        let id = self.row_id();
        let users = store.pluck(Association::GroupUsers, id).await?;
        let permissions = store.pluck(Association::GroupPermissions, id).await?;
        self.user_ids = Some(typed(users));
        self.permission_ids = Some(typed(permissions));
        Ok(())
    }
}

#[async_trait]
impl Persistable for Permission {
    const KIND: EntityKind = EntityKind::Permission;

    fn row_id(&self) -> i64 {
        self.id.get()
    }

    async fn create(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        self.validate()?;
        self.id = store.insert_permission(self).await?;
        Ok(())
    }

    async fn update(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        let id = require_persisted(&*self)?;
        self.validate()?;
        store.update_permission(self).await?;
        replace_present(store, Association::PermissionGroups, id, self.group_ids.as_ref()).await?;
        replace_present(store, Association::PermissionUsers, id, self.user_ids.as_ref()).await
    }

    async fn load_all_association_ids(&mut self, store: &dyn RelationshipStore) -> DomainResult<()> {
        let id = self.row_id();
        let groups = store.pluck(Association::PermissionGroups, id).await?;
        let users = store.pluck(Association::PermissionUsers, id).await?;
        self.group_ids = Some(typed(groups));
        self.user_ids = Some(typed(users));
        Ok(())
    }
}
