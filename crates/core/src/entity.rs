//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier (possibly unassigned).
    fn id(&self) -> Self::Id;

    /// Whether the store has assigned this entity an identity yet.
    fn is_persisted(&self) -> bool;
}
