//! Fingerprint-keyed caching for cubist
//!
//! Two logical caches sit behind one service: a bounded-count query cache
//! (raw or tidied cell sets) and a two-tier metadata cache (small heap tier
//! backed by a size-bounded disk tier). Lookup-or-compute is at-most-once
//! per fingerprint under concurrent access, and flush clears everything
//! atomically from the caller's perspective.

pub mod key;
pub mod service;
pub mod settings;
pub mod store;

pub use key::{metadata_fingerprint, query_fingerprint, Fingerprint};
pub use service::{CacheOutcome, CacheService};
pub use settings::CacheSettings;
pub use store::{CacheError, CacheStats, DiskTier, MetadataCache, QueryCache};
