//! Lookup-or-compute cache service with per-key single-flight.
//!
//! The service is the single injected owner of all shared cache state.
//! `get_or_compute_*` guarantee at-most-one computation per fingerprint
//! under concurrent access; `flush` clears both caches with no
//! partially-flushed state visible to other callers.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::info;

use cubist_types::{QueryResult, Schema};

use crate::key::Fingerprint;
use crate::settings::CacheSettings;
use crate::store::{CacheError, CacheStats, DiskTier, MetadataCache, QueryCache};

/// Whether a lookup was served from cache or freshly computed. Drives the
/// out-of-band cached-result marker on HTTP responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Computed,
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub query: CacheStats,
    pub metadata: CacheStats,
}

pub struct CacheService {
    query: QueryCache,
    metadata: MetadataCache,
    flights: DashMap<Fingerprint, Arc<Mutex<()>>>,
    // Readers hold this shared; flush holds it exclusively, so no request
    // can observe one cache cleared and the other not.
    flush_gate: RwLock<()>,
}

impl CacheService {
    pub fn new(settings: &CacheSettings) -> Result<Self, CacheError> {
        let disk = DiskTier::new(settings.disk_dir.clone(), settings.metadata_disk_bytes)?;
        Ok(CacheService {
            query: QueryCache::new(settings.query_entries),
            metadata: MetadataCache::new(settings.metadata_heap_entries, disk),
            flights: DashMap::new(),
            flush_gate: RwLock::new(()),
        })
    }

    fn flight_lock(&self, key: Fingerprint) -> Arc<Mutex<()>> {
        self.flights
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return the cached query artifact for `key`, or run `compute` exactly
    /// once and cache its result. A compute error is propagated and nothing
    /// is cached for the key.
    pub fn get_or_compute_query<E>(
        &self,
        key: Fingerprint,
        compute: impl FnOnce() -> Result<QueryResult, E>,
    ) -> Result<(Arc<QueryResult>, CacheOutcome), E> {
        let _gate = self.flush_gate.read();
        if let Some(found) = self.query.get(&key) {
            return Ok((found, CacheOutcome::Hit));
        }
        let flight = self.flight_lock(key);
        let _guard = flight.lock();
        // A racing computation may have landed while we waited.
        if let Some(found) = self.query.get(&key) {
            return Ok((found, CacheOutcome::Hit));
        }
        let value = Arc::new(compute()?);
        self.query.put(key, value.clone());
        Ok((value, CacheOutcome::Computed))
    }

    /// Metadata counterpart of [`Self::get_or_compute_query`].
    pub fn get_or_compute_metadata<E>(
        &self,
        key: Fingerprint,
        compute: impl FnOnce() -> Result<Schema, E>,
    ) -> Result<(Arc<Schema>, CacheOutcome), E> {
        let _gate = self.flush_gate.read();
        if let Some(found) = self.metadata.get(&key) {
            return Ok((found, CacheOutcome::Hit));
        }
        let flight = self.flight_lock(key);
        let _guard = flight.lock();
        if let Some(found) = self.metadata.get(&key) {
            return Ok((found, CacheOutcome::Hit));
        }
        let value = Arc::new(compute()?);
        self.metadata.put(key, value.clone());
        Ok((value, CacheOutcome::Computed))
    }

    /// Clear both caches. Atomic from the caller's perspective: lookups
    /// block until the flush completes.
    pub fn flush(&self) {
        let _gate = self.flush_gate.write();
        self.query.clear();
        info!("query cache flushed");
        self.metadata.clear();
        info!("metadata cache flushed");
        self.flights.clear();
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            query: self.query.stats(),
            metadata: self.metadata.stats(),
        }
    }
}
