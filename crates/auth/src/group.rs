//! Group entity: a named bundle of users that can be granted permissions.
//!
//! Group names are not unique; two groups may share a name and differ only in
//! membership.

use serde::{Deserialize, Serialize};

use keystone_core::{
    DomainResult, Entity, Field, FieldKind, GroupId, PermissionId, Queryable, UserId, Value,
};

use crate::validation;

pub const GROUP_NAME_MAX: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::UNASSIGNED,
            name: name.into().trim().to_string(),
            description: String::new(),
            user_ids: None,
            permission_ids: None,
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

    pub fn with_permissions(mut self, ids: impl IntoIterator<Item = PermissionId>) -> Self {
        self.permission_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        validation::required("name", &self.name, GROUP_NAME_MAX)?;
        validation::assigned_ids("user_ids", self.user_ids.as_ref(), UserId::is_assigned)?;
        validation::assigned_ids("permission_ids", self.permission_ids.as_ref(), PermissionId::is_assigned)?;
        Ok(())
    }

    pub fn apply(&mut self, changes: GroupChanges) {
        if let Some(name) = changes.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if changes.user_ids.is_some() {
            self.user_ids = changes.user_ids;
        }
        if changes.permission_ids.is_some() {
            self.permission_ids = changes.permission_ids;
        }
    }
}

impl Entity for Group {
    type Id = GroupId;

    fn id(&self) -> GroupId {
        self.id
    }

    fn is_persisted(&self) -> bool {
        self.id.is_assigned()
    }
}

/// Partial update payload; doubles as the HTTP request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub user_ids: Option<Vec<UserId>>,
    pub permission_ids: Option<Vec<PermissionId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Id,
    Name,
    Description,
}

impl Field for GroupField {
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

impl Queryable<GroupField> for Group {
    fn value_of(&self, field: GroupField) -> Value {
        match field {
            GroupField::Id => Value::Integer(self.id.get()),
            GroupField::Name => Value::Text(self.name.clone()),
            GroupField::Description => Value::Text(self.description.clone()),
        }
    }
}
