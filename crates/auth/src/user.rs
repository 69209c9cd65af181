//! User entity: an account that can log in and hold permissions.
//!
//! Direct permissions and group memberships live in join tables. The id sets
//! carried here are snapshots: valid right after an explicit load, never
//! refreshed behind the caller's back.

use chrono::{DateTime, Utc};
use serde::Serialize;

use keystone_core::{
    DomainResult, Entity, Field, FieldKind, GroupId, PermissionId, Queryable, UserId, Value,
};

use crate::validation;

pub const USERNAME_MAX: usize = 50;
pub const DISPLAY_NAME_MAX: usize = 25;
pub const PHONE_MAX: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// Entity
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// PHC-format hash. Write-only: never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub phone: String,
    pub active: bool,
    pub superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_ids: Option<Vec<PermissionId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<GroupId>>,
}

impl User {
    /// A new, unpersisted, active, non-superuser account.
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::UNASSIGNED,
            username: username.into().trim().to_string(),
            password_hash: password_hash.into(),
            display_name: String::new(),
            phone: String::new(),
            active: true,
            superuser: false,
            created_at: now,
            updated_at: now,
            permission_ids: None,
            group_ids: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_superuser(mut self, superuser: bool) -> Self {
        self.superuser = superuser;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_permissions(mut self, ids: impl IntoIterator<Item = PermissionId>) -> Self {
        self.permission_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_groups(mut self, ids: impl IntoIterator<Item = GroupId>) -> Self {
        self.group_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        validation::required("username", &self.username, USERNAME_MAX)?;
        validation::required("password", &self.password_hash, usize::MAX)?;
        validation::bounded("display_name", &self.display_name, DISPLAY_NAME_MAX)?;
        validation::bounded("phone", &self.phone, PHONE_MAX)?;
        validation::assigned_ids("permission_ids", self.permission_ids.as_ref(), PermissionId::is_assigned)?;
        validation::assigned_ids("group_ids", self.group_ids.as_ref(), GroupId::is_assigned)?;
        Ok(())
    }

    /// Overlay a partial payload. Present association sets replace the snapshot.
    pub fn apply(&mut self, changes: UserChanges) {
        if let Some(username) = changes.username {
            self.username = username.trim().to_string();
        }
        if let Some(hash) = changes.password_hash {
            self.password_hash = hash;
        }
        if let Some(name) = changes.display_name {
            self.display_name = name;
        }
        if let Some(phone) = changes.phone {
            self.phone = phone;
        }
        if let Some(active) = changes.active {
            self.active = active;
        }
        if let Some(superuser) = changes.superuser {
            self.superuser = superuser;
        }
        if changes.permission_ids.is_some() {
            self.permission_ids = changes.permission_ids;
        }
        if changes.group_ids.is_some() {
            self.group_ids = changes.group_ids;
        }
    }

    /// Drop loaded snapshots; the next reader must load them again.
    pub fn forget_associations(&mut self) {
        self.permission_ids = None;
        self.group_ids = None;
    }
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("active", &self.active)
            .field("superuser", &self.superuser)
            .field("permission_ids", &self.permission_ids)
            .field("group_ids", &self.group_ids)
            .finish_non_exhaustive()
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }

    fn is_persisted(&self) -> bool {
        self.id.is_assigned()
    }
}

/// Partial update payload. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub username: Option<String>,
    /// Already hashed by the caller.
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub active: Option<bool>,
    pub superuser: Option<bool>,
    pub permission_ids: Option<Vec<PermissionId>>,
    pub group_ids: Option<Vec<GroupId>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Query fields
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    Username,
    DisplayName,
    Phone,
    Active,
    Superuser,
}

impl Field for UserField {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Username => "username",
            Self::DisplayName => "display_name",
            Self::Phone => "phone",
            Self::Active => "active",
            Self::Superuser => "superuser",
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id => FieldKind::Integer,
            Self::Username | Self::DisplayName | Self::Phone => FieldKind::Text,
            Self::Active | Self::Superuser => FieldKind::Bool,
        }
    }

    fn searchable() -> &'static [Self] {
        &[Self::Username, Self::DisplayName, Self::Phone]
    }

    fn primary() -> Self {
        Self::Id
    }
}

impl Queryable<UserField> for User {
    fn value_of(&self, field: UserField) -> Value {
        match field {
            UserField::Id => Value::Integer(self.id.get()),
            UserField::Username => Value::Text(self.username.clone()),
            UserField::DisplayName => Value::Text(self.display_name.clone()),
            UserField::Phone => Value::Text(self.phone.clone()),
            UserField::Active => Value::Bool(self.active),
            UserField::Superuser => Value::Bool(self.superuser),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::DomainError;

    #[test]
    fn new_user_defaults() {
        let user = User::new("  alice ", "$argon2id$stub");
        assert_eq!(user.username, "alice");
        assert!(user.active);
        assert!(!user.superuser);
        assert!(!user.is_persisted());
        assert!(user.permission_ids.is_none());
        assert!(user.group_ids.is_none());
        user.validate().unwrap();
    }

    #[test]
    fn empty_username_is_malformed() {
        let user = User::new("   ", "$argon2id$stub");
        assert!(matches!(user.validate(), Err(DomainError::Malformed(_))));
    }

    #[test]
    fn overlong_columns_are_malformed() {
        let user = User::new("a".repeat(USERNAME_MAX + 1), "h");
        assert!(matches!(user.validate(), Err(DomainError::Malformed(_))));

        let user = User::new("bob", "h").with_phone("1".repeat(PHONE_MAX + 1));
        assert!(matches!(user.validate(), Err(DomainError::Malformed(_))));
    }

    #[test]
    fn unassigned_association_id_is_malformed() {
        let user = User::new("bob", "h").with_groups([GroupId::new(2), GroupId::UNASSIGNED]);
        assert!(matches!(user.validate(), Err(DomainError::Malformed(_))));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User::new("bob", "$argon2id$secret").with_groups([GroupId::new(1)]);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["group_ids"], serde_json::json!([1]));
        assert!(json.get("permission_ids").is_none());
        assert!(!format!("{user:?}").contains("secret"));
    }

    #[test]
    fn apply_replaces_only_present_fields() {
        let mut user = User::new("bob", "h")
            .with_display_name("Bob")
            .with_groups([GroupId::new(1)])
            .with_permissions([PermissionId::new(7)]);

        user.apply(UserChanges {
            phone: Some("555".into()),
            group_ids: Some(vec![]),
            ..Default::default()
        });

        assert_eq!(user.display_name, "Bob");
        assert_eq!(user.phone, "555");
        assert_eq!(user.group_ids, Some(vec![]));
        assert_eq!(user.permission_ids, Some(vec![PermissionId::new(7)]));
    }
}
