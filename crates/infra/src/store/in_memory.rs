use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use keystone_auth::{
    Association, EntityKind, Group, GroupField, Permission, PermissionField, Relation, User,
    UserField, dedup_ids,
};
use keystone_core::{DomainError, DomainResult, GroupId, Page, PermissionId, QuerySpec, UserId};

use super::{
    PermissionKey, RelationshipStore, UserKey, group_links, permission_links, user_links,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    groups: BTreeMap<i64, Group>,
    permissions: BTreeMap<i64, Permission>,
    /// `(left, right)` pairs per join table.
    links: HashMap<Relation, BTreeSet<(i64, i64)>>,
    last_user: i64,
    last_group: i64,
    last_permission: i64,
}

impl Tables {
    fn row_exists(&self, kind: EntityKind, id: i64) -> bool {
        match kind {
            EntityKind::User => self.users.contains_key(&id),
            EntityKind::Group => self.groups.contains_key(&id),
            EntityKind::Permission => self.permissions.contains_key(&id),
        }
    }

    fn ensure_targets(&self, association: Association, targets: &[i64]) -> DomainResult<()> {
        let kind = association.target();
        match targets.iter().find(|id| !self.row_exists(kind, **id)) {
            Some(missing) => Err(DomainError::not_found(format!("{kind} {missing}"))),
            None => Ok(()),
        }
    }

    fn ensure_all_targets(&self, links: &[(Association, Vec<i64>)]) -> DomainResult<()> {
        links
            .iter()
            .try_for_each(|(association, targets)| self.ensure_targets(*association, targets))
    }

    fn pairs(&mut self, relation: Relation) -> &mut BTreeSet<(i64, i64)> {
        self.links.entry(relation).or_default()
    }

    fn clear(&mut self, association: Association, owner: i64) {
        let owner_is_left = association.owner_is_left();
        self.pairs(association.relation()).retain(|(left, right)| {
            let side = if owner_is_left { *left } else { *right };
            side != owner
        });
    }

    fn link(&mut self, association: Association, owner: i64, targets: &[i64]) {
        let relation = association.relation();
        for target in targets {
            let pair = association.pair(owner, *target);
            self.pairs(relation).insert(pair);
        }
    }

    fn pluck(&self, association: Association, owner: i64) -> Vec<i64> {
        let Some(pairs) = self.links.get(&association.relation()) else {
            return Vec::new();
        };
        let mut targets: Vec<i64> = pairs
            .iter()
            .filter_map(|(left, right)| {
                if association.owner_is_left() {
                    (*left == owner).then_some(*right)
                } else {
                    (*right == owner).then_some(*left)
                }
            })
            .collect();
        targets.sort_unstable();
        targets
    }

    fn is_referenced(&self, kind: EntityKind, id: i64) -> bool {
        kind.associations()
            .iter()
            .any(|association| !self.pluck(*association, id).is_empty())
    }

    fn username_taken(&self, username: &str, except: i64) -> bool {
        self.users
            .values()
            .any(|u| u.id.get() != except && u.username == username)
    }

    fn permission_name_taken(&self, name: &str, except: i64) -> bool {
        self.permissions
            .values()
            .any(|p| p.id.get() != except && p.name == name)
    }
}

/// In-memory relationship store for tests/dev.
///
/// One lock guards every table, so each call (including a replace) is
/// atomic with respect to every other call. Rows are validated before any
/// mutation, which keeps a failed call free of side effects.
#[derive(Debug, Default)]
pub struct InMemoryRelationshipStore {
    inner: RwLock<Tables>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total join rows in one table.
    pub fn link_count(&self, relation: Relation) -> usize {
        self.inner
            .read()
            .map(|t| t.links.get(&relation).map_or(0, BTreeSet::len))
            .unwrap_or(0)
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|_| DomainError::unavailable("relationship store lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|_| DomainError::unavailable("relationship store lock poisoned"))
    }
}

fn stored<T: Clone>(entity: &T, strip: impl FnOnce(&mut T)) -> T {
    let mut row = entity.clone();
    strip(&mut row);
    row
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn insert_user(&self, user: &User) -> DomainResult<UserId> {
        let mut tables = self.write()?;
        if tables.username_taken(&user.username, 0) {
            return Err(DomainError::constraint(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        let links = user_links(user);
        tables.ensure_all_targets(&links)?;

        tables.last_user += 1;
        let id = tables.last_user;
        let row = stored(user, |u| {
            u.id = UserId::new(id);
            u.forget_associations();
        });
        tables.users.insert(id, row);
        for (association, targets) in &links {
            tables.link(*association, id, targets);
        }
        Ok(UserId::new(id))
    }

    async fn insert_group(&self, group: &Group) -> DomainResult<GroupId> {
        let mut tables = self.write()?;
        let links = group_links(group);
        tables.ensure_all_targets(&links)?;

        tables.last_group += 1;
        let id = tables.last_group;
        let row = stored(group, |g| {
            g.id = GroupId::new(id);
            g.user_ids = None;
            g.permission_ids = None;
        });
        tables.groups.insert(id, row);
        for (association, targets) in &links {
            tables.link(*association, id, targets);
        }
        Ok(GroupId::new(id))
    }

    async fn insert_permission(&self, permission: &Permission) -> DomainResult<PermissionId> {
        let mut tables = self.write()?;
        if tables.permission_name_taken(&permission.name, 0) {
            return Err(DomainError::constraint(format!(
                "permission '{}' already exists",
                permission.name
            )));
        }
        let links = permission_links(permission);
        tables.ensure_all_targets(&links)?;

        tables.last_permission += 1;
        let id = tables.last_permission;
        let row = stored(permission, |p| {
            p.id = PermissionId::new(id);
            p.user_ids = None;
            p.group_ids = None;
        });
        tables.permissions.insert(id, row);
        for (association, targets) in &links {
            tables.link(*association, id, targets);
        }
        Ok(PermissionId::new(id))
    }

    async fn find_user(&self, key: UserKey<'_>) -> DomainResult<Option<User>> {
        let tables = self.read()?;
        Ok(match key {
            UserKey::Id(id) => tables.users.get(&id.get()).cloned(),
            UserKey::Username(name) => tables.users.values().find(|u| u.username == name).cloned(),
        })
    }

    async fn find_group(&self, id: GroupId) -> DomainResult<Option<Group>> {
        Ok(self.read()?.groups.get(&id.get()).cloned())
    }

    async fn find_permission(&self, key: PermissionKey<'_>) -> DomainResult<Option<Permission>> {
        let tables = self.read()?;
        Ok(match key {
            PermissionKey::Id(id) => tables.permissions.get(&id.get()).cloned(),
            PermissionKey::Name(name) => tables
                .permissions
                .values()
                .find(|p| p.name == name)
                .cloned(),
        })
    }

    async fn list_users(&self, query: &QuerySpec<UserField>) -> DomainResult<Page<User>> {
        query.validate()?;
        Ok(query.apply(self.read()?.users.values()))
    }

    async fn list_groups(&self, query: &QuerySpec<GroupField>) -> DomainResult<Page<Group>> {
        query.validate()?;
        Ok(query.apply(self.read()?.groups.values()))
    }

    async fn list_permissions(
        &self,
        query: &QuerySpec<PermissionField>,
    ) -> DomainResult<Page<Permission>> {
        query.validate()?;
        Ok(query.apply(self.read()?.permissions.values()))
    }

    async fn update_user(&self, user: &User) -> DomainResult<()> {
        let mut tables = self.write()?;
        let id = user.id.get();
        if tables.username_taken(&user.username, id) {
            return Err(DomainError::constraint(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        let row = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("user {id}")))?;
        row.username = user.username.clone();
        row.password_hash = user.password_hash.clone();
        row.display_name = user.display_name.clone();
        row.phone = user.phone.clone();
        row.active = user.active;
        row.superuser = user.superuser;
        row.updated_at = user.updated_at;
        Ok(())
    }

    async fn update_group(&self, group: &Group) -> DomainResult<()> {
        let mut tables = self.write()?;
        let id = group.id.get();
        let row = tables
            .groups
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("group {id}")))?;
        row.name = group.name.clone();
        row.description = group.description.clone();
        Ok(())
    }

    async fn update_permission(&self, permission: &Permission) -> DomainResult<()> {
        let mut tables = self.write()?;
        let id = permission.id.get();
        if tables.permission_name_taken(&permission.name, id) {
            return Err(DomainError::constraint(format!(
                "permission '{}' already exists",
                permission.name
            )));
        }
        let row = tables
            .permissions
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("permission {id}")))?;
        row.name = permission.name.clone();
        row.description = permission.description.clone();
        Ok(())
    }

    async fn exists(&self, kind: EntityKind, id: i64) -> DomainResult<bool> {
        Ok(self.read()?.row_exists(kind, id))
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> DomainResult<()> {
        let mut tables = self.write()?;
        if !tables.row_exists(kind, id) {
            return Err(DomainError::not_found(format!("{kind} {id}")));
        }
        if tables.is_referenced(kind, id) {
            return Err(DomainError::constraint(format!(
                "{kind} {id} is still referenced by join rows"
            )));
        }
        match kind {
            EntityKind::User => {
                tables.users.remove(&id);
            }
            EntityKind::Group => {
                tables.groups.remove(&id);
            }
            EntityKind::Permission => {
                tables.permissions.remove(&id);
            }
        }
        Ok(())
    }

    async fn pluck(&self, association: Association, owner: i64) -> DomainResult<Vec<i64>> {
        Ok(self.read()?.pluck(association, owner))
    }

    async fn replace_association(
        &self,
        association: Association,
        owner: i64,
        targets: &[i64],
    ) -> DomainResult<()> {
        let mut tables = self.write()?;
        if !tables.row_exists(association.owner(), owner) {
            return Err(DomainError::not_found(format!(
                "{} {owner}",
                association.owner()
            )));
        }
        let targets = dedup_ids(targets);
        tables.ensure_targets(association, &targets)?;

        tables.clear(association, owner);
        tables.link(association, owner, &targets);
        Ok(())
    }

    async fn clear_association(&self, association: Association, owner: i64) -> DomainResult<()> {
        self.write()?.clear(association, owner);
        Ok(())
    }
}
