//! Permission entity and permission names.
//!
//! Permissions are rows with a globally unique name (e.g. `"manage_user"`).
//! Routes refer to them by [`PermissionName`]; the check resolves the name to
//! a row at request time, so an unconfigured name denies everyone but
//! superusers.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use keystone_core::{
    DomainResult, Entity, Field, FieldKind, GroupId, PermissionId, Queryable, UserId, Value,
};

use crate::validation;

pub const PERMISSION_NAME_MAX: usize = 30;

/// Gate for every user/group/permission management route.
pub const MANAGE_USER: PermissionName = PermissionName::from_static("manage_user");

/// Permission name as referenced by callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionName(Cow<'static, str>);

impl PermissionName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Display for PermissionName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<GroupId>>,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PermissionId::UNASSIGNED,
            name: name.into().trim().to_string(),
            description: String::new(),
            user_ids: None,
            group_ids: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_users(mut self, ids: impl IntoIterator<Item = UserId>) -> Self {
        self.user_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_groups(mut self, ids: impl IntoIterator<Item = GroupId>) -> Self {
        self.group_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        validation::required("name", &self.name, PERMISSION_NAME_MAX)?;
        validation::assigned_ids("user_ids", self.user_ids.as_ref(), UserId::is_assigned)?;
        validation::assigned_ids("group_ids", self.group_ids.as_ref(), GroupId::is_assigned)?;
        Ok(())
    }

    pub fn apply(&mut self, changes: PermissionChanges) {
        if let Some(name) = changes.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if changes.user_ids.is_some() {
            self.user_ids = changes.user_ids;
        }
        if changes.group_ids.is_some() {
            self.group_ids = changes.group_ids;
        }
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> PermissionId {
        self.id
    }

    fn is_persisted(&self) -> bool {
        self.id.is_assigned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub user_ids: Option<Vec<UserId>>,
    pub group_ids: Option<Vec<GroupId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionField {
    Id,
    Name,
    Description,
}

impl Field for PermissionField {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id => FieldKind::Integer,
            Self::Name | Self::Description => FieldKind::Text,
        }
    }

    fn searchable() -> &'static [Self] {
        &[Self::Name, Self::Description]
    }

    fn primary() -> Self {
        Self::Id
    }
}

impl Queryable<PermissionField> for Permission {
    fn value_of(&self, field: PermissionField) -> Value {
        match field {
            PermissionField::Id => Value::Integer(self.id.get()),
            PermissionField::Name => Value::Text(self.name.clone()),
            PermissionField::Description => Value::Text(self.description.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manage_user_constant() {
        assert_eq!(MANAGE_USER.as_str(), "manage_user");
        assert_eq!(MANAGE_USER.to_string(), "manage_user");
        assert!(!MANAGE_USER.is_empty());
        assert!(PermissionName::new(" ").is_empty());
    }

    #[test]
    fn validate_rejects_blank_name() {
        assert!(Permission::new("  ").validate().is_err());
        Permission::new("deploy").validate().unwrap();
    }

    #[test]
    fn apply_keeps_unloaded_sets_unloaded() {
        let mut perm = Permission::new("deploy");
        perm.apply(PermissionChanges {
            description: Some("ship it".into()),
            ..Default::default()
        });
        assert_eq!(perm.description, "ship it");
        assert!(perm.user_ids.is_none());
        assert!(perm.group_ids.is_none());
    }
}
