//! Cache tiers: bounded heap stores plus the size-bounded disk tier.
//!
//! The query cache is a single entry-count-bounded heap tier. The metadata
//! cache is two-tiered: a small heap tier whose evictions demote to a
//! larger, byte-budgeted disk tier; disk reads promote back to the heap.
//! Disk failures never fail the request that triggered them.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use cubist_types::{QueryResult, Schema};

use crate::key::Fingerprint;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to initialize disk tier at {path}: {source}")]
    DiskTierInit {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Hit/miss counters for one cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

fn bounded(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN)
}

/// Entry-count-bounded cache for query artifacts.
pub struct QueryCache {
    entries: Mutex<LruCache<Fingerprint, Arc<QueryResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        QueryCache {
            entries: Mutex::new(LruCache::new(bounded(capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<Arc<QueryResult>> {
        let found = self.entries.lock().get(key).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn put(&self, key: Fingerprint, value: Arc<QueryResult>) {
        self.entries.lock().push(key, value);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}

/// Byte-budgeted directory of serialized artifacts, one `<hex>.json` file
/// per fingerprint. Eviction removes oldest-written files first. The
/// directory is wiped at construction, matching a fresh service start.
pub struct DiskTier {
    dir: PathBuf,
    max_bytes: u64,
}

impl DiskTier {
    pub fn new(dir: PathBuf, max_bytes: u64) -> Result<Self, CacheError> {
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|source| CacheError::DiskTierInit {
                path: dir.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::DiskTierInit {
            path: dir.clone(),
            source,
        })?;
        Ok(DiskTier { dir, max_bytes })
    }

    fn path_for(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_hex()))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), %err, "disk tier read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), %err, "disk tier entry unreadable, dropping");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Best effort: a failure to persist is logged and swallowed, the
    /// computed value was already returned to the caller.
    pub fn put<T: Serialize>(&self, key: &Fingerprint, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "disk tier serialization failed");
                return;
            }
        };
        if bytes.len() as u64 > self.max_bytes {
            warn!(
                size = bytes.len(),
                budget = self.max_bytes,
                "artifact larger than disk tier budget, not persisting"
            );
            return;
        }
        self.evict_to_fit(bytes.len() as u64);
        let path = self.path_for(key);
        if let Err(err) = std::fs::write(&path, &bytes) {
            warn!(path = %path.display(), %err, "disk tier write failed");
        }
    }

    pub fn clear(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.dir.display(), %err, "disk tier clear failed");
                return;
            }
        };
        for entry in entries.flatten() {
            if let Err(err) = std::fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), %err, "disk tier remove failed");
            }
        }
    }

    fn total_bytes(&self) -> u64 {
        std::fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    fn evict_to_fit(&self, needed: u64) {
        let mut total = self.total_bytes();
        if total + needed <= self.max_bytes {
            return;
        }
        let mut files: Vec<(PathBuf, SystemTime, u64)> = std::fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                let modified = meta.modified().ok()?;
                Some((entry.path(), modified, meta.len()))
            })
            .collect();
        files.sort_by_key(|(_, modified, _)| *modified);
        for (path, _, len) in files {
            if total + needed <= self.max_bytes {
                break;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "disk tier evicted");
                    total = total.saturating_sub(len);
                }
                Err(err) => warn!(path = %path.display(), %err, "disk tier eviction failed"),
            }
        }
    }
}

/// Two-tier metadata cache: heap LRU in front of the disk tier.
pub struct MetadataCache {
    heap: Mutex<LruCache<Fingerprint, Arc<Schema>>>,
    disk: DiskTier,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(heap_entries: usize, disk: DiskTier) -> Self {
        MetadataCache {
            heap: Mutex::new(LruCache::new(bounded(heap_entries))),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<Arc<Schema>> {
        if let Some(found) = self.heap.lock().get(key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(found);
        }
        if let Some(schema) = self.disk.get::<Schema>(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let schema = Arc::new(schema);
            self.promote(*key, schema.clone());
            return Some(schema);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, key: Fingerprint, value: Arc<Schema>) {
        self.promote(key, value.clone());
        // Write-through so the entry survives heap-tier churn.
        self.disk.put(&key, value.as_ref());
    }

    fn promote(&self, key: Fingerprint, value: Arc<Schema>) {
        let evicted = self.heap.lock().push(key, value);
        if let Some((old_key, old_value)) = evicted {
            if old_key != key {
                self.disk.put(&old_key, old_value.as_ref());
            }
        }
    }

    pub fn clear(&self) {
        self.heap.lock().clear();
        self.disk.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.heap.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubist_types::{Cube, TidyTable};

    fn schema(name: &str) -> Arc<Schema> {
        Arc::new(Schema {
            name: name.to_string(),
            connection_name: "conn".to_string(),
            cubes: Vec::<Cube>::new(),
        })
    }

    fn fp(label: &str) -> Fingerprint {
        Fingerprint::from_components([label.as_bytes()])
    }

    #[test]
    fn query_cache_counts_hits_and_misses() {
        let cache = QueryCache::new(4);
        let key = fp("k");
        assert!(cache.get(&key).is_none());
        cache.put(key, Arc::new(QueryResult::Tidy(TidyTable::default())));
        assert!(cache.get(&key).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn query_cache_respects_entry_bound() {
        let cache = QueryCache::new(2);
        for i in 0..3 {
            cache.put(
                fp(&format!("k{i}")),
                Arc::new(QueryResult::Tidy(TidyTable::default())),
            );
        }
        assert_eq!(cache.stats().entries, 2);
        // k0 was least recently used and must be gone.
        assert!(cache.get(&fp("k0")).is_none());
        assert!(cache.get(&fp("k2")).is_some());
    }

    #[test]
    fn disk_tier_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path().join("cache"), 1024 * 1024).unwrap();
        let key = fp("schema");
        tier.put(&key, schema("Sales").as_ref());
        let back: Schema = tier.get(&key).unwrap();
        assert_eq!(back.name, "Sales");
    }

    #[test]
    fn disk_tier_evicts_under_byte_budget() {
        let dir = tempfile::tempdir().unwrap();
        let sample = serde_json::to_vec(schema("S0").as_ref()).unwrap();
        // Budget fits two entries but not three.
        let tier =
            DiskTier::new(dir.path().join("cache"), (sample.len() as u64) * 2 + 1).unwrap();
        for i in 0..3 {
            tier.put(&fp(&format!("s{i}")), schema("S0").as_ref());
        }
        let files = std::fs::read_dir(dir.path().join("cache")).unwrap().count();
        assert!(files <= 2, "expected eviction to hold the byte budget");
    }

    #[test]
    fn metadata_cache_falls_back_to_disk_after_heap_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path().join("cache"), 1024 * 1024).unwrap();
        let cache = MetadataCache::new(1, tier);
        let first = fp("first");
        let second = fp("second");
        cache.put(first, schema("First"));
        cache.put(second, schema("Second"));
        // "first" was demoted out of the single-entry heap tier but must
        // still be served, now from disk.
        let found = cache.get(&first).expect("disk tier should hold entry");
        assert_eq!(found.name, "First");
    }

    #[test]
    fn metadata_cache_clear_empties_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let tier = DiskTier::new(dir.path().join("cache"), 1024 * 1024).unwrap();
        let cache = MetadataCache::new(1, tier);
        let first = fp("first");
        let second = fp("second");
        cache.put(first, schema("First"));
        cache.put(second, schema("Second"));
        cache.clear();
        assert!(cache.get(&first).is_none());
        assert!(cache.get(&second).is_none());
    }
}
