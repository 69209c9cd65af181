//! Vocabulary of the three join tables and the owner-side views onto them.
//!
//! A join row is a `(left, right)` pair of foreign keys. Each entity sees two
//! of the relations from its own side; an [`Association`] names one such view
//! (owner column + target column), which is what the store's pluck, replace
//! and clear operations are keyed by.

use serde::Serialize;

/// One of the three entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
    Permission,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::User => "auth_user",
            Self::Group => "auth_group",
            Self::Permission => "auth_permission",
        }
    }

    /// Both relations this entity participates in, from its own side.
    pub fn associations(self) -> [Association; 2] {
        match self {
            Self::User => [Association::UserGroups, Association::UserPermissions],
            Self::Group => [Association::GroupUsers, Association::GroupPermissions],
            Self::Permission => [Association::PermissionGroups, Association::PermissionUsers],
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Permission => "permission",
        })
    }
}

/// A join table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    UserPermission,
    UserGroup,
    GroupPermission,
}

impl Relation {
    pub const ALL: [Relation; 3] = [
        Relation::UserPermission,
        Relation::UserGroup,
        Relation::GroupPermission,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::UserPermission => "auth_user_permission",
            Self::UserGroup => "auth_user_group",
            Self::GroupPermission => "auth_group_permission",
        }
    }

    /// `(left, right)` entity kinds; pairs are stored in this order.
    pub fn sides(self) -> (EntityKind, EntityKind) {
        match self {
            Self::UserPermission => (EntityKind::User, EntityKind::Permission),
            Self::UserGroup => (EntityKind::User, EntityKind::Group),
            Self::GroupPermission => (EntityKind::Group, EntityKind::Permission),
        }
    }

    pub fn columns(self) -> (&'static str, &'static str) {
        match self {
            Self::UserPermission => ("user_id", "permission_id"),
            Self::UserGroup => ("user_id", "group_id"),
            Self::GroupPermission => ("group_id", "permission_id"),
        }
    }
}

/// One relation seen from one of its two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Association {
    UserPermissions,
    UserGroups,
    GroupUsers,
    GroupPermissions,
    PermissionUsers,
    PermissionGroups,
}

impl Association {
    pub fn relation(self) -> Relation {
        match self {
            Self::UserPermissions | Self::PermissionUsers => Relation::UserPermission,
            Self::UserGroups | Self::GroupUsers => Relation::UserGroup,
            Self::GroupPermissions | Self::PermissionGroups => Relation::GroupPermission,
        }
    }

    /// Whether the owner sits on the left of the stored pair.
    pub fn owner_is_left(self) -> bool {
        matches!(
            self,
            Self::UserPermissions | Self::UserGroups | Self::GroupPermissions
        )
    }

    pub fn owner(self) -> EntityKind {
        let (left, right) = self.relation().sides();
        if self.owner_is_left() { left } else { right }
    }

    pub fn target(self) -> EntityKind {
        let (left, right) = self.relation().sides();
        if self.owner_is_left() { right } else { left }
    }

    pub fn owner_column(self) -> &'static str {
        let (left, right) = self.relation().columns();
        if self.owner_is_left() { left } else { right }
    }

    pub fn target_column(self) -> &'static str {
        let (left, right) = self.relation().columns();
        if self.owner_is_left() { right } else { left }
    }

    /// Orient an `(owner, target)` pair the way the join table stores it.
    pub fn pair(self, owner: i64, target: i64) -> (i64, i64) {
        if self.owner_is_left() {
            (owner, target)
        } else {
            (target, owner)
        }
    }
}

impl core::fmt::Display for Association {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.owner(), self.target())
    }
}

/// Sorted, duplicate-free copy of an id set. Join pairs are never duplicated.
pub fn dedup_ids<T: Ord + Copy>(ids: &[T]) -> Vec<T> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_entity_sees_both_of_its_relations() {
        for kind in [EntityKind::User, EntityKind::Group, EntityKind::Permission] {
            let assocs = kind.associations();
            assert!(assocs.iter().all(|a| a.owner() == kind));
            assert_ne!(assocs[0].relation(), assocs[1].relation());
        }
    }

    #[test]
    fn owner_and_target_columns_flip_with_side() {
        assert_eq!(Association::UserGroups.owner_column(), "user_id");
        assert_eq!(Association::UserGroups.target_column(), "group_id");
        assert_eq!(Association::GroupUsers.owner_column(), "group_id");
        assert_eq!(Association::GroupUsers.target_column(), "user_id");
        assert_eq!(Association::PermissionGroups.pair(9, 2), (2, 9));
        assert_eq!(Association::GroupPermissions.pair(2, 9), (2, 9));
    }

    #[test]
    fn dedup_sorts_and_collapses() {
        assert_eq!(dedup_ids(&[3, 1, 3, 2, 1]), vec![1, 2, 3]);
        assert!(dedup_ids::<i64>(&[]).is_empty());
    }
}
