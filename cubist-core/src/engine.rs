//! The OLAP engine seam.
//!
//! The engine itself (connection handling, MDX parsing, cube evaluation,
//! role security) is an external collaborator. This module pins down the
//! interface it presents: open a scoped connection, execute opaque query
//! text, snapshot the schema, list roles. Connections are released on drop,
//! success or failure.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use cubist_types::{CellSet, Schema};

pub mod fixture;

/// Failure reported by the engine: query syntax/semantics, connection
/// trouble, or a timeout. Never retried automatically. Carries the deepest
/// chained cause and the engine-specific state code alongside the headline
/// reason.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{reason}")]
pub struct EngineError {
    pub reason: String,
    pub root_cause_reason: String,
    #[serde(rename = "SQLState")]
    pub state: Option<String>,
}

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        EngineError {
            root_cause_reason: reason.clone(),
            reason,
            state: None,
        }
    }

    pub fn with_cause(reason: impl Into<String>, root_cause: impl Into<String>) -> Self {
        EngineError {
            reason: reason.into(),
            root_cause_reason: root_cause.into(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// A query that outlived its configured budget.
    pub fn timeout(seconds: u64) -> Self {
        EngineError::new(format!("query timed out after {seconds} seconds"))
            .with_state("HYT00")
    }
}

/// A live, scoped engine connection. Dropping the box releases the
/// underlying resources; callers must not hold one beyond a single request.
pub trait EngineConnection: Send {
    /// Execute opaque query text, optionally bounded by a timeout (reported
    /// as an [`EngineError`] on expiry).
    fn execute_query(
        &mut self,
        query: &str,
        timeout_secs: Option<u64>,
    ) -> Result<CellSet, EngineError>;

    /// Snapshot the schema visible to this connection (and its role).
    fn schema(&mut self) -> Result<Schema, EngineError>;

    /// Security roles the connection can assume.
    fn available_roles(&mut self) -> Result<Vec<String>, EngineError>;

    /// Restrict the connection to one role for subsequent calls.
    fn set_role(&mut self, role: &str) -> Result<(), EngineError>;
}

/// Factory for engine connections, one per catalog driver name.
pub trait OlapEngine: Send + Sync {
    fn open(&self, connection_name: &str) -> Result<Box<dyn EngineConnection>, EngineError>;
}

/// Maps catalog driver names to engine implementations. The fixture driver
/// is always installed; embedders register real engines next to it.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    drivers: HashMap<String, Arc<dyn OlapEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        EngineRegistry::default()
    }

    /// Registry with the built-in fixture driver (serving the demo cube).
    pub fn with_defaults() -> Self {
        let mut registry = EngineRegistry::new();
        registry.register("fixture", Arc::new(fixture::FixtureEngine::with_demo_data()));
        registry
    }

    pub fn register(&mut self, driver: impl Into<String>, engine: Arc<dyn OlapEngine>) {
        self.drivers.insert(driver.into(), engine);
    }

    pub fn resolve(&self, driver: &str) -> Option<Arc<dyn OlapEngine>> {
        self.drivers.get(driver).cloned()
    }

    /// Open a connection through the named driver, or fail with an engine
    /// error naming the missing driver.
    pub fn open(
        &self,
        driver: &str,
        connection_name: &str,
    ) -> Result<Box<dyn EngineConnection>, EngineError> {
        match self.resolve(driver) {
            Some(engine) => engine.open(connection_name),
            None => Err(EngineError::new(format!(
                "no engine registered for driver '{driver}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_driver_is_an_engine_error() {
        let registry = EngineRegistry::new();
        let err = registry.open("nope", "conn").unwrap_err();
        assert!(err.reason.contains("nope"));
    }

    #[test]
    fn default_registry_resolves_fixture() {
        let registry = EngineRegistry::with_defaults();
        assert!(registry.resolve("fixture").is_some());
    }

    #[test]
    fn timeout_error_carries_state_code() {
        let err = EngineError::timeout(30);
        assert_eq!(err.state.as_deref(), Some("HYT00"));
        assert!(err.reason.contains("30"));
    }

    #[test]
    fn error_body_serializes_with_sql_state_field() {
        let err = EngineError::with_cause("outer", "inner").with_state("42000");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["reason"], "outer");
        assert_eq!(json["rootCauseReason"], "inner");
        assert_eq!(json["SQLState"], "42000");
    }
}
