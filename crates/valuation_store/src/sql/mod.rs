//! Relational backend: one fact table keyed by `(series, attribute,
//! valid_from)` plus insert-if-absent reference tables.

pub mod filter;
pub mod reference;
pub mod store;

pub use reference::{ReferenceEntity, ReferenceKind, ValueWithReferences};
pub use store::SqlValueStore;
