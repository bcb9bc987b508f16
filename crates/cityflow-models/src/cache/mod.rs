//! Read-through cache of loaded forecasters.
//!
//! Each model identifier is fetched and loaded at most once per process.
//! Entries are never evicted: the set of identifiers is bounded by the
//! registry.

pub mod cache;
pub mod config;
pub mod types;

pub use cache::ModelCache;
pub use config::{CacheConfig, CacheConfigError};
pub use types::{CacheStats, ModelEntry};
