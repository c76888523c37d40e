//! Persisted cache of the menu document
//!
//! One JSON document is kept in memory and mirrored into a key/value store
//! together with a write timestamp, a schema version tag and a last-modified
//! marker shared by every context using the same store.

pub mod manager;
pub mod metadata;
pub mod query;

pub use manager::CacheManager;
pub use metadata::{CacheMetadata, CacheStats, PersistOutcome};
pub use query::ProductFilter;
