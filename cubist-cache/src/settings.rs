//! Capacity settings for the cache tiers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Capacity limits for both caches. Defaults follow the service's
/// long-standing deployment values: 500 query entries, a 20-entry metadata
/// heap tier, and a 500 MiB metadata disk tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheSettings {
    pub query_entries: usize,
    pub metadata_heap_entries: usize,
    pub metadata_disk_bytes: u64,
    pub disk_dir: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            query_entries: 500,
            metadata_heap_entries: 20,
            metadata_disk_bytes: 500 * 1024 * 1024,
            disk_dir: std::env::temp_dir().join("cubist-object-cache"),
        }
    }
}
