//! End-to-end tests for the HTTP surface, driven through the router with
//! the fixture engine standing in for the external OLAP engine.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use cubist_cache::{CacheService, CacheSettings};
use cubist_core::catalog::ConnectionCatalog;
use cubist_core::engine::fixture::{cell_sets, schemas, FixtureData, FixtureEngine};
use cubist_core::engine::{EngineError, EngineRegistry};
use cubist_core::ServiceConfig;
use cubist_server::{
    build_router, AllowAllAuthorizer, AppState, BearerTokenAuthorizer, RequestAuthorizer,
    CACHED_RESULT_HEADER,
};

const DEMO_XML: &str = r#"<Schema name="Demo">
  <Cube name="DemoCube">
    <MeasureGroups>
      <MeasureGroup name="Core">
        <Measures>
          <MeasureRef name="M1"/>
          <MeasureRef name="M2"/>
        </Measures>
        <DimensionLinks>
          <FactLink dimension="D1"/>
        </DimensionLinks>
      </MeasureGroup>
    </MeasureGroups>
  </Cube>
</Schema>"#;

struct TestHarness {
    router: Router,
    state: AppState,
    engine: Arc<FixtureEngine>,
    _dir: tempfile::TempDir,
}

fn harness_with(
    authorizer: Arc<dyn RequestAuthorizer>,
    pre_cache_metadata: &str,
) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("demo.xml"), DEMO_XML).unwrap();
    std::fs::write(
        dir.path().join("test-connections.json"),
        r#"{
            "demo": {"driver": "fixture", "schemaPath": "demo.xml"},
            "bad": {"driver": "fixture"}
        }"#,
    )
    .unwrap();

    let engine = Arc::new(FixtureEngine::with_demo_data());
    engine.insert(
        "bad",
        FixtureData::new(
            cell_sets::single_measure_single_cell(),
            schemas::demo_schema("bad"),
        )
        .failing_with(
            EngineError::with_cause("query failed", "table missing").with_state("42S02"),
        ),
    );
    let mut engines = EngineRegistry::new();
    engines.register("fixture", engine.clone());

    let config = ServiceConfig {
        catalog_dir: dir.path().to_path_buf(),
        pre_cache_metadata: pre_cache_metadata.to_string(),
        cache: CacheSettings {
            disk_dir: dir.path().join("object-cache"),
            ..CacheSettings::default()
        },
        ..ServiceConfig::default()
    };

    let catalog = ConnectionCatalog::load(&config.catalog_dir, false).unwrap();
    let cache = CacheService::new(&config.cache).unwrap();
    let state = AppState {
        catalog: Arc::new(catalog),
        engines: Arc::new(engines),
        cache: Arc::new(cache),
        authorizer,
        config: Arc::new(config),
    };
    TestHarness {
        router: build_router(state.clone()),
        state,
        engine,
        _dir: dir,
    }
}

fn harness() -> TestHarness {
    harness_with(Arc::new(AllowAllAuthorizer), "false")
}

fn query_body(connection: &str, tidy: Option<&str>) -> String {
    match tidy {
        Some(tidy) => format!(
            r#"{{"connectionName": "{connection}", "query": "SELECT FROM DemoCube", "tidy": {tidy}}}"#
        ),
        None => format!(r#"{{"connectionName": "{connection}", "query": "SELECT FROM DemoCube"}}"#),
    }
}

async fn post_query(router: &Router, body: String) -> (StatusCode, bool, serde_json::Value) {
    let request = Request::post("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cached = response.headers().contains_key(CACHED_RESULT_HEADER);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, cached, json)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, bool, Vec<u8>) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cached = response.headers().contains_key(CACHED_RESULT_HEADER);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, cached, bytes.to_vec())
}

#[tokio::test]
async fn raw_query_returns_cell_set_shape() {
    let h = harness();
    let (status, cached, json) = post_query(&h.router, query_body("demo", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!cached);
    assert_eq!(json["axes"].as_array().unwrap().len(), 2);
    assert_eq!(json["axes"][0]["name"], "COLUMNS");
    assert_eq!(json["cells"][0]["value"], 1.0);
    assert_eq!(json["cells"][0]["coordinates"], serde_json::json!([0, 0]));
    assert_eq!(
        json["axes"][1]["positions"][0]["positionMembers"][0]["memberValue"],
        "D1_V1"
    );
}

#[tokio::test]
async fn identical_query_is_served_from_cache() {
    let h = harness();
    let (_, first_cached, _) = post_query(&h.router, query_body("demo", None)).await;
    let (status, second_cached, _) = post_query(&h.router, query_body("demo", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!first_cached);
    assert!(second_cached, "second identical query must hit the cache");
    assert_eq!(h.engine.query_invocations(), 1);
}

#[tokio::test]
async fn tidy_configuration_is_part_of_the_fingerprint() {
    let h = harness();
    post_query(&h.router, query_body("demo", None)).await;
    let (_, cached, _) =
        post_query(&h.router, query_body("demo", Some(r#"{"enabled": true}"#))).await;
    assert!(!cached, "tidy and raw requests must not share a cache entry");
    assert_eq!(h.engine.query_invocations(), 2);
}

#[tokio::test]
async fn tidy_query_flattens_rows() {
    let h = harness();
    let (status, _, json) =
        post_query(&h.router, query_body("demo", Some(r#"{"enabled": true}"#))).await;
    assert_eq!(status, StatusCode::OK);
    let values = json["values"].as_array().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["[D1].[D1].[D1_V1]"], "D1_V1");
    assert_eq!(values[0]["M1"], 1.0);
    assert_eq!(values[1]["M1"], 2.0);
}

#[tokio::test]
async fn flush_cache_makes_next_query_a_miss() {
    let h = harness();
    post_query(&h.router, query_body("demo", None)).await;
    let (status, _, _) = get(&h.router, "/flushCache").await;
    assert_eq!(status, StatusCode::OK);
    let (_, cached, _) = post_query(&h.router, query_body("demo", None)).await;
    assert!(!cached, "flush must clear the query cache");
    assert_eq!(h.engine.query_invocations(), 2);
}

#[tokio::test]
async fn unknown_connection_is_not_found() {
    let h = harness();
    let (status, _, json) = post_query(&h.router, query_body("nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn engine_failure_surfaces_reason_and_state() {
    let h = harness();
    let (status, _, json) = post_query(&h.router, query_body("bad", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["reason"], "query failed");
    assert_eq!(json["rootCauseReason"], "table missing");
    assert_eq!(json["SQLState"], "42S02");
}

#[tokio::test]
async fn failed_query_is_not_cached() {
    let h = harness();
    post_query(&h.router, query_body("bad", None)).await;
    let (status, cached, _) = post_query(&h.router, query_body("bad", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!cached);
    assert_eq!(h.engine.query_invocations(), 2);
}

#[tokio::test]
async fn metadata_is_cached_and_cross_referenced() {
    let h = harness();
    let (status, first_cached, bytes) = get(&h.router, "/getMetadata?connectionName=demo").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!first_cached);
    let schema: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(schema["connectionName"], "demo");
    let groups = schema["cubes"][0]["measureGroups"].as_array().unwrap();
    assert_eq!(groups[0]["name"], "Core");
    assert_eq!(groups[0]["measureReferences"], serde_json::json!(["M1", "M2"]));
    assert_eq!(groups[0]["dimensionReferences"], serde_json::json!(["D1"]));

    let (_, second_cached, _) = get(&h.router, "/getMetadata?connectionName=demo").await;
    assert!(second_cached, "second metadata request must hit the cache");
    assert_eq!(h.engine.schema_invocations(), 1);
}

#[tokio::test]
async fn metadata_unknown_connection_is_not_found() {
    let h = harness();
    let (status, _, _) = get(&h.router, "/getMetadata?connectionName=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_schema_returns_raw_xml() {
    let h = harness();
    let (status, _, bytes) = get(&h.router, "/getSchema?connectionName=demo").await;
    assert_eq!(status, StatusCode::OK);
    let body = String::from_utf8(bytes).unwrap();
    assert!(body.contains("<Cube name=\"DemoCube\">"));

    let (status, _, _) = get(&h.router, "/getSchema?connectionName=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_connections_hides_schema_content() {
    let h = harness();
    let (status, _, bytes) = get(&h.router, "/getConnections").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["demo"]["driver"], "fixture");
    assert!(json["demo"].get("schemaContent").is_none());
    assert!(!String::from_utf8_lossy(&bytes).contains("MeasureGroup"));
}

#[tokio::test]
async fn bearer_token_gates_queries() {
    let mut connections = HashMap::new();
    connections.insert("demo".to_string(), "analyst".to_string());
    let mut tokens = HashMap::new();
    tokens.insert("secret123".to_string(), connections);
    let h = harness_with(Arc::new(BearerTokenAuthorizer::new(tokens)), "false");

    // No token: rejected with an empty body.
    let request = Request::post("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(query_body("demo", None)))
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());

    // Valid token: runs under the mapped role.
    let request = Request::post("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer secret123")
        .body(Body::from(query_body("demo", None)))
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn prewarm_populates_the_metadata_cache() {
    let h = harness_with(Arc::new(AllowAllAuthorizer), "true");
    let handles = cubist_server::prewarm::spawn_prewarm(&h.state);
    assert!(!handles.is_empty());
    for handle in handles {
        handle.await.unwrap();
    }
    // demo: no-role + analyst; bad: no-role (no roles configured).
    assert_eq!(h.engine.schema_invocations(), 3);

    let (status, cached, _) = get(&h.router, "/getMetadata?connectionName=demo").await;
    assert_eq!(status, StatusCode::OK);
    assert!(cached, "pre-warmed metadata must be served from cache");
    assert_eq!(h.engine.schema_invocations(), 3);
}
