//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Products, variants and orders are entities: two snapshots with the same id
/// describe the same thing at different points in time.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing revision of the stored state.
    ///
    /// Storage adapters bump it on every successful write and compare it
    /// against an [`ExpectedVersion`](crate::ExpectedVersion).
    fn version(&self) -> u64;
}
