//! `keystone-core`: shared building blocks for the access-control service.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): row
//! identifiers, the error taxonomy, and the typed query specification used to
//! list entities without letting caller-supplied column names reach a store.

pub mod entity;
pub mod error;
pub mod id;
pub mod query;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{GroupId, PermissionId, UserId};
pub use query::{
    Condition, Direction, Field, FieldKind, Operator, Page, Pagination, QuerySpec, Queryable,
    Search, Sort, Value,
};
