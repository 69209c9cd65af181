use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use keystone_core::{GroupId, PermissionId};

use crate::PermissionName;

/// Outcome of a permission check, with the reason it resolved that way.
///
/// Only [`Decision::is_granted`] matters to callers; the reason exists for
/// logs and must never be shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Decision {
    Superuser,
    Direct,
    ViaGroup(GroupId),
    Denied(DenialKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    EmptyPermissionName,
    UnknownPrincipal,
    UnknownPermission,
    MissingPermission,
    /// A store lookup failed; the check fails closed.
    LookupFailed,
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::Direct => "direct",
            Self::ViaGroup(_) => "via_group",
            Self::Denied(DenialKind::EmptyPermissionName) => "denied_empty_permission_name",
            Self::Denied(DenialKind::UnknownPrincipal) => "denied_unknown_principal",
            Self::Denied(DenialKind::UnknownPermission) => "denied_unknown_permission",
            Self::Denied(DenialKind::MissingPermission) => "denied_missing_permission",
            Self::Denied(DenialKind::LookupFailed) => "denied_lookup_failed",
        }
    }
}

impl core::fmt::Display for Decision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Same message for every denial kind, so callers cannot probe which
    /// permissions exist.
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Turn a decision into a guard result.
pub fn authorize(decision: &Decision, required: &PermissionName) -> Result<(), AuthzError> {
    if decision.is_granted() {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Step 4: the target permission is among the principal's direct grants.
pub fn holds_directly(direct: &[PermissionId], target: PermissionId) -> bool {
    direct.contains(&target)
}

/// Step 5: a group the principal belongs to is granted the permission.
///
/// Returns the smallest shared group id so the reported reason is stable.
pub fn shared_group(user_groups: &[GroupId], permission_groups: &[GroupId]) -> Option<GroupId> {
    let granted: HashSet<GroupId> = permission_groups.iter().copied().collect();
    user_groups
        .iter()
        .copied()
        .filter(|g| granted.contains(g))
        .min()
}

/// Everything the check can consult, fully loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSnapshot {
    pub superuser: bool,
    /// `None` when no permission with the requested name exists.
    pub permission: Option<PermissionId>,
    pub direct: Vec<PermissionId>,
    pub user_groups: Vec<GroupId>,
    pub permission_groups: Vec<GroupId>,
}

/// Pure evaluation over a resolved principal.
///
/// Same precedence as the store-backed check: superuser, then existence of
/// the permission, then direct grant, then group grant.
pub fn evaluate(snapshot: &AccessSnapshot) -> Decision {
    if snapshot.superuser {
        return Decision::Superuser;
    }
    let Some(target) = snapshot.permission else {
        return Decision::Denied(DenialKind::UnknownPermission);
    };
    if holds_directly(&snapshot.direct, target) {
        return Decision::Direct;
    }
    match shared_group(&snapshot.user_groups, &snapshot.permission_groups) {
        Some(group) => Decision::ViaGroup(group),
        None => Decision::Denied(DenialKind::MissingPermission),
    }
}
