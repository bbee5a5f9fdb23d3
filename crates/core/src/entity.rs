//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products, batches and batch items are entities: two records with the same
/// identifier are the same record even when every other attribute differs.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
