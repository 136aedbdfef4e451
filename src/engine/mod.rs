//! The cache-consistency and optimistic-update engine.

mod collection;
mod freshness;
mod mutation;

pub use collection::{CollectionHandle, CollectionService};
pub use freshness::FreshnessReconciler;
pub use mutation::{MutationIntent, PendingMutation};
