//! Strongly-typed row identifiers.
//!
//! Rows are keyed by store-assigned integers. `0` is reserved for "not yet
//! assigned", which is what a freshly built entity carries before `create`.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a user row.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// Identifier of a group row.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(i64);

/// Identifier of a permission row.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(i64);

macro_rules! impl_row_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// The id of an entity that has not been persisted.
            pub const UNASSIGNED: Self = Self(0);

            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            pub const fn is_assigned(self) -> bool {
                self.0 != 0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::malformed(format!("{}: {}", $name, e)))?;
                if raw < 0 {
                    return Err(DomainError::malformed(format!("{}: negative id", $name)));
                }
                Ok(Self(raw))
            }
        }
    };
}

impl_row_id!(UserId, "UserId");
impl_row_id!(GroupId, "GroupId");
impl_row_id!(PermissionId, "PermissionId");

/// Convert raw store ids into typed ids.
pub fn typed<T: From<i64>>(raw: impl IntoIterator<Item = i64>) -> Vec<T> {
    raw.into_iter().map(T::from).collect()
}

/// Convert typed ids into raw store ids.
pub fn raw<T: Copy + Into<i64>>(ids: &[T]) -> Vec<i64> {
    ids.iter().map(|id| (*id).into()).collect()
}
