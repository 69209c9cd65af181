//! Error taxonomy shared by every layer that touches entities.

use thiserror::Error;

/// Result type used across the entity and store layers.
pub type DomainResult<T> = Result<T, DomainError>;

/// Entity-layer error.
///
/// Callers map each kind to its own HTTP status and log level. The
/// authorization engine collapses all of them into a denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced entity, permission, or row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness rule was violated (username, permission name, join pair).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The store could not be reached or did not answer in time.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Input failed shape validation before reaching the store.
    #[error("malformed input: {0}")]
    Malformed(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Stable machine-readable code, used in API error bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Malformed(_) => "malformed",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
