//! Asynchronous metadata pre-warm.
//!
//! At startup, one detached task per configured connection computes and
//! caches schema metadata for the no-role case plus every available role.
//! Tasks go through the cache service, so a request racing a pre-warm for
//! the same fingerprint coalesces instead of computing twice. A failure
//! kills only its own task.

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use cubist_cache::metadata_fingerprint;
use cubist_core::engine::EngineError;

use crate::server::{fetch_metadata, AppState};

/// Spawn pre-warm tasks per the `pre-cache-metadata` setting. Returns the
/// task handles for observability; callers are not expected to join them.
pub fn spawn_prewarm(state: &AppState) -> Vec<JoinHandle<()>> {
    let Some(connections) = state.config.prewarm_connections(state.catalog.names()) else {
        return Vec::new();
    };
    if connections.is_empty() {
        warn!(
            "all connections were removed from the pre-cache list, so no pre-caching of \
             metadata will be performed; set pre-cache-metadata to true to pre-cache all"
        );
        return Vec::new();
    }

    connections
        .into_iter()
        .map(|name| {
            let state = state.clone();
            tokio::task::spawn_blocking(move || {
                info!(connection = %name, "pre-caching metadata");
                if let Err(err) = prewarm_connection(&state, &name) {
                    error!(connection = %name, %err, "metadata pre-warm failed");
                }
            })
        })
        .collect()
}

fn prewarm_connection(state: &AppState, name: &str) -> Result<(), EngineError> {
    let entry = state
        .catalog
        .get(name)
        .ok_or_else(|| EngineError::new(format!("connection '{name}' vanished from catalog")))?;

    // The role list needs its own scoped connection; each fetch below opens
    // and releases another one.
    let roles = {
        let mut connection = state.engines.open(&entry.spec.driver, name)?;
        connection.available_roles()?
    };

    let mut targets: Vec<Option<String>> = vec![None];
    targets.extend(roles.into_iter().map(Some));

    for role in targets {
        let fingerprint = metadata_fingerprint(name, role.as_deref());
        state.cache.get_or_compute_metadata(fingerprint, || {
            fetch_metadata(&state.engines, entry, role.as_deref())
        })?;
    }
    info!(connection = %name, "metadata pre-warm complete");
    Ok(())
}
