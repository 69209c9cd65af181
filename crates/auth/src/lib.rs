//! `keystone-auth`: pure access-control domain.
//!
//! Users, groups and permissions, the vocabulary of their many-to-many
//! relations, the authorization decision, and password hashing. This crate
//! has no HTTP or storage dependencies.

pub mod association;
pub mod authorize;
pub mod credentials;
pub mod group;
pub mod permission;
pub mod user;
mod validation;

pub use association::{Association, EntityKind, Relation, dedup_ids};
pub use authorize::{
    AccessSnapshot, AuthzError, Decision, DenialKind, authorize, evaluate, holds_directly,
    shared_group,
};
pub use credentials::{CredentialHasher, HashingCost};
pub use group::{Group, GroupChanges, GroupField};
pub use permission::{MANAGE_USER, Permission, PermissionChanges, PermissionField, PermissionName};
pub use user::{User, UserChanges, UserField};
