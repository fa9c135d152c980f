//! Router, handlers, and the request-side engine plumbing.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cubist_cache::{metadata_fingerprint, query_fingerprint, CacheOutcome, CacheService};
use cubist_core::catalog::{ConnectionCatalog, ConnectionEntry};
use cubist_core::engine::{EngineError, EngineRegistry};
use cubist_core::schema_xml::align_schema;
use cubist_core::tidy::tidy_cell_set;
use cubist_core::ServiceConfig;
use cubist_types::{QueryResult, Schema, TidyOptions};

use crate::auth::{authorizer_from_settings, RequestAuthorizer};
use crate::prewarm;

/// Response header marking an artifact served from cache rather than
/// computed for this request.
pub const CACHED_RESULT_HEADER: &str = "x-cubist-cached-result";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ConnectionCatalog>,
    pub engines: Arc<EngineRegistry>,
    pub cache: Arc<CacheService>,
    pub authorizer: Arc<dyn RequestAuthorizer>,
    pub config: Arc<ServiceConfig>,
}

/// An MDX query bound for a named connection, with optional tidying.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub connection_name: String,
    pub query: String,
    #[serde(default)]
    pub tidy: Option<TidyOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionParams {
    connection_name: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/getConnections", get(get_connections))
        .route("/getSchema", get(get_schema))
        .route("/getMetadata", get(get_metadata))
        .route("/query", post(query))
        .route("/flushCache", get(flush_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the catalog, wire up the cache and authorizer, spawn pre-warm, and
/// serve until the listener dies.
pub async fn serve(config: ServiceConfig, engines: EngineRegistry) -> anyhow::Result<()> {
    let catalog = ConnectionCatalog::load(&config.catalog_dir, config.remove_demo_connections)?;
    let cache = CacheService::new(&config.cache)?;
    let authorizer = authorizer_from_settings(&config.auth);
    let listen_addr = config.listen_addr.clone();
    match config.query_timeout_secs {
        Some(secs) => info!("queries will time out after {secs} seconds"),
        None => info!("no query timeout specified"),
    }

    let state = AppState {
        catalog: Arc::new(catalog),
        engines: Arc::new(engines),
        cache: Arc::new(cache),
        authorizer,
        config: Arc::new(config),
    };

    // Pre-warm races with incoming requests by design; the handles are
    // kept only so the tasks are observable, startup never joins them.
    let _prewarm_tasks = prewarm::spawn_prewarm(&state);

    let app = build_router(state);
    info!(addr = %listen_addr, "cubist listening");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_connections(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.descriptors())
}

async fn get_schema(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
) -> Response {
    let name = &params.connection_name;
    match state.catalog.get(name).and_then(|e| e.schema_content.clone()) {
        Some(content) => {
            info!(connection = %name, "retrieving schema content");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/xml")],
                content,
            )
                .into_response()
        }
        None => {
            warn!(connection = %name, "attempt to retrieve schema for connection that does not exist");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn flush_cache(State(state): State<AppState>) -> StatusCode {
    state.cache.flush();
    StatusCode::OK
}

async fn get_metadata(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
    headers: HeaderMap,
) -> Response {
    let name = params.connection_name;
    let status = state.authorizer.authorize(&headers, &name);
    if !status.authorized {
        warn!(message = status.message.as_deref().unwrap_or(""), "metadata request denied");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(entry) = state.catalog.get(&name).cloned() else {
        warn!(connection = %name, "attempt to retrieve metadata for connection that does not exist");
        return StatusCode::NOT_FOUND.into_response();
    };

    let fingerprint = metadata_fingerprint(&name, status.role.as_deref());
    let cache = state.cache.clone();
    let engines = state.engines.clone();
    let role = status.role.clone();
    let computed = tokio::task::spawn_blocking(move || {
        cache.get_or_compute_metadata(fingerprint, || {
            fetch_metadata(&engines, &entry, role.as_deref())
        })
    })
    .await;

    match computed {
        Ok(Ok((schema, outcome))) => with_cache_marker(Json(&*schema).into_response(), outcome),
        Ok(Err(engine_error)) => engine_error_response(engine_error, "metadata"),
        Err(join_error) => internal_error(join_error),
    }
}

async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Response {
    let name = request.connection_name.clone();
    let status = state.authorizer.authorize(&headers, &name);
    if !status.authorized {
        warn!(message = status.message.as_deref().unwrap_or(""), "query request denied");
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(entry) = state.catalog.get(&name).cloned() else {
        let message = format!("Query submitted for connection that does not exist: {name}");
        warn!("{message}");
        return (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response();
    };

    let tidy = request.tidy.clone().unwrap_or_default();
    if tidy.simplify_names && !tidy.enabled {
        warn!(
            "request for simplification of names, but tidy is disabled; \
             no simplification is performed on raw cell sets"
        );
    }
    info!(
        connection = %name,
        role = status.role.as_deref().unwrap_or("none"),
        tidy = tidy.enabled,
        query = %request.query,
        "executing query"
    );

    let fingerprint = query_fingerprint(
        &name,
        status.role.as_deref(),
        &request.query,
        request.tidy.as_ref(),
    );
    let cache = state.cache.clone();
    let engines = state.engines.clone();
    let role = status.role.clone();
    let timeout = state.config.query_timeout_secs;
    let computed = tokio::task::spawn_blocking(move || {
        cache.get_or_compute_query(fingerprint, || {
            run_query(&engines, &entry, role.as_deref(), &request.query, &tidy, timeout)
        })
    })
    .await;

    match computed {
        Ok(Ok((result, outcome))) => {
            if outcome.is_hit() {
                info!("retrieved query result from cache");
            }
            with_cache_marker(Json(&*result).into_response(), outcome)
        }
        Ok(Err(engine_error)) => engine_error_response(engine_error, "query"),
        Err(join_error) => internal_error(join_error),
    }
}

/// Execute one query over a freshly opened, scoped connection. The
/// connection is released when this returns, success or failure.
fn run_query(
    engines: &EngineRegistry,
    entry: &ConnectionEntry,
    role: Option<&str>,
    query: &str,
    tidy: &TidyOptions,
    timeout_secs: Option<u64>,
) -> Result<QueryResult, EngineError> {
    let mut connection = engines.open(&entry.spec.driver, &entry.name)?;
    if let Some(role) = role {
        connection.set_role(role)?;
    }
    let cell_set = connection.execute_query(query, timeout_secs)?;
    if tidy.enabled {
        let table = tidy_cell_set(
            &cell_set,
            tidy.simplify_names,
            tidy.level_name_translations.as_ref(),
        );
        Ok(QueryResult::Tidy(table))
    } else {
        Ok(QueryResult::Raw(cell_set))
    }
}

/// Fetch and cross-reference schema metadata over a scoped connection.
/// Shared with the pre-warm tasks.
pub(crate) fn fetch_metadata(
    engines: &EngineRegistry,
    entry: &ConnectionEntry,
    role: Option<&str>,
) -> Result<Schema, EngineError> {
    let started = Instant::now();
    info!(
        connection = %entry.name,
        role = role.unwrap_or("none"),
        "fetching metadata"
    );
    let mut connection = engines.open(&entry.spec.driver, &entry.name)?;
    if let Some(role) = role {
        connection.set_role(role)?;
    }
    let mut schema = connection.schema()?;
    schema.connection_name = entry.name.clone();
    if let Some(index) = &entry.schema_index {
        align_schema(&mut schema, index);
    }
    info!(
        connection = %entry.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "metadata fetch finished"
    );
    Ok(schema)
}

fn with_cache_marker(mut response: Response, outcome: CacheOutcome) -> Response {
    if outcome.is_hit() {
        response
            .headers_mut()
            .insert(CACHED_RESULT_HEADER, header::HeaderValue::from_static("true"));
    }
    response
}

fn engine_error_response(error: EngineError, context: &str) -> Response {
    warn!(
        context,
        reason = %error.reason,
        root_cause = %error.root_cause_reason,
        "engine error"
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
}

fn internal_error(error: tokio::task::JoinError) -> Response {
    warn!(%error, "engine task failed to run");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "internal error" })),
    )
        .into_response()
}
