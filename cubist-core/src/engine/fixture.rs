//! In-process fixture engine.
//!
//! Serves canned cell sets, schemas, and role lists per connection name,
//! with invocation counters so tests can assert at-most-once computation.
//! Also the driver behind the built-in demo connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use cubist_types::{
    Axis, Cell, CellSet, Cube, Dimension, Hierarchy, Level, Measure, Member, MemberType, Position,
    Schema, SchemaMember,
};

use super::{EngineConnection, EngineError, OlapEngine};

/// Canned responses for one fixture connection.
#[derive(Clone)]
pub struct FixtureData {
    pub cell_set: CellSet,
    pub schema: Schema,
    pub roles: Vec<String>,
    /// When set, every query on this connection fails with this error.
    pub fail_queries: Option<EngineError>,
}

impl FixtureData {
    pub fn new(cell_set: CellSet, schema: Schema) -> Self {
        FixtureData {
            cell_set,
            schema,
            roles: Vec::new(),
            fail_queries: None,
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn failing_with(mut self, error: EngineError) -> Self {
        self.fail_queries = Some(error);
        self
    }
}

/// Engine serving fixture data. Connections index into a shared table, so
/// data can be registered after the engine has been handed out as a trait
/// object.
#[derive(Default)]
pub struct FixtureEngine {
    connections: RwLock<HashMap<String, Arc<FixtureData>>>,
    query_calls: Arc<AtomicUsize>,
    schema_calls: Arc<AtomicUsize>,
}

impl FixtureEngine {
    pub fn new() -> Self {
        FixtureEngine::default()
    }

    /// Engine preloaded with the demo connection.
    pub fn with_demo_data() -> Self {
        let engine = FixtureEngine::new();
        engine.insert(
            "demo",
            FixtureData::new(
                cell_sets::dual_axis_single_dimension(),
                schemas::demo_schema("demo"),
            )
            .with_roles(&["analyst"]),
        );
        engine
    }

    pub fn insert(&self, connection_name: &str, data: FixtureData) {
        self.connections
            .write()
            .insert(connection_name.to_string(), Arc::new(data));
    }

    /// Number of `execute_query` calls across all connections.
    pub fn query_invocations(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of `schema` calls across all connections.
    pub fn schema_invocations(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }
}

impl OlapEngine for FixtureEngine {
    fn open(&self, connection_name: &str) -> Result<Box<dyn EngineConnection>, EngineError> {
        let data = self
            .connections
            .read()
            .get(connection_name)
            .cloned()
            .ok_or_else(|| {
                EngineError::new(format!(
                    "fixture engine has no data for connection '{connection_name}'"
                ))
            })?;
        Ok(Box::new(FixtureConnection {
            data,
            query_calls: self.query_calls.clone(),
            schema_calls: self.schema_calls.clone(),
            role: None,
        }))
    }
}

struct FixtureConnection {
    data: Arc<FixtureData>,
    query_calls: Arc<AtomicUsize>,
    schema_calls: Arc<AtomicUsize>,
    role: Option<String>,
}

impl EngineConnection for FixtureConnection {
    fn execute_query(
        &mut self,
        _query: &str,
        timeout_secs: Option<u64>,
    ) -> Result<CellSet, EngineError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.data.fail_queries {
            return Err(error.clone());
        }
        // A zero-second budget expires immediately; lets tests drive the
        // timeout path deterministically.
        if timeout_secs == Some(0) {
            return Err(EngineError::timeout(0));
        }
        Ok(self.data.cell_set.clone())
    }

    fn schema(&mut self) -> Result<Schema, EngineError> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(role) = &self.role {
            debug!(role = %role, "serving fixture schema under role restriction");
        }
        Ok(self.data.schema.clone())
    }

    fn available_roles(&mut self) -> Result<Vec<String>, EngineError> {
        Ok(self.data.roles.clone())
    }

    fn set_role(&mut self, role: &str) -> Result<(), EngineError> {
        if self.data.roles.iter().any(|r| r == role) {
            self.role = Some(role.to_string());
            Ok(())
        } else {
            Err(EngineError::new(format!(
                "role '{role}' is not available on this connection"
            )))
        }
    }
}

/// Canned cell sets mirroring the shapes the engine produces.
pub mod cell_sets {
    use super::*;

    pub fn measure_member(name: &str) -> Member {
        Member {
            name: name.to_string(),
            caption: name.to_string(),
            dimension_name: "Measures".to_string(),
            dimension_caption: "Measures".to_string(),
            level_unique_name: "[Measures].[MeasuresLevel]".to_string(),
            level_name: "MeasuresLevel".to_string(),
            level_caption: "MeasuresLevel".to_string(),
            member_type: MemberType::Measure,
            parent: None,
        }
    }

    pub fn dimension_member(dimension: &str, value: &str) -> Member {
        Member {
            name: value.to_string(),
            caption: value.to_string(),
            dimension_name: dimension.to_string(),
            dimension_caption: dimension.to_string(),
            level_unique_name: format!("[{dimension}].[{dimension}].[{value}]"),
            level_name: value.to_string(),
            level_caption: value.to_string(),
            member_type: MemberType::Regular,
            parent: None,
        }
    }

    fn cell(ordinal: usize, coordinates: Vec<usize>, value: Option<f64>) -> Cell {
        match value {
            Some(v) => Cell::number(ordinal, coordinates, v, &format!("{v}")),
            None => Cell::empty(ordinal, coordinates),
        }
    }

    fn columns_axis(positions: Vec<Position>) -> Axis {
        Axis {
            name: "COLUMNS".to_string(),
            ordinal: 0,
            positions,
        }
    }

    fn rows_axis(positions: Vec<Position>) -> Axis {
        Axis {
            name: "ROWS".to_string(),
            ordinal: 1,
            positions,
        }
    }

    fn build(axes: Vec<Axis>, cells: Vec<Cell>) -> CellSet {
        match CellSet::new(axes, cells) {
            Ok(cell_set) => cell_set,
            Err(err) => unreachable!("fixture cell set is malformed: {err}"),
        }
    }

    /// One axis, one measure, one cell holding 1.0.
    pub fn single_measure_single_cell() -> CellSet {
        let axis = columns_axis(vec![Position::new(vec![measure_member("M1")])]);
        build(vec![axis], vec![cell(0, vec![0], Some(1.0))])
    }

    /// Measure M1 on columns; dimension D1 with two values on rows.
    pub fn dual_axis_single_dimension() -> CellSet {
        let columns = columns_axis(vec![Position::new(vec![measure_member("M1")])]);
        let rows = rows_axis(vec![
            Position::new(vec![dimension_member("D1", "D1_V1")]),
            Position::new(vec![dimension_member("D1", "D1_V2")]),
        ]);
        build(
            vec![columns, rows],
            vec![
                cell(0, vec![0, 0], Some(1.0)),
                cell(1, vec![0, 1], Some(2.0)),
            ],
        )
    }

    /// Measure M1 on columns; the 2x3 cross of D1 and D2 on rows, with the
    /// last cell empty.
    pub fn dual_axis_two_dimensions() -> CellSet {
        let columns = columns_axis(vec![Position::new(vec![measure_member("M1")])]);
        let rows = rows_axis(cross_positions());
        let values = [
            Some(1.0),
            Some(2.0),
            Some(3.0),
            Some(10.0),
            Some(11.0),
            None,
        ];
        let cells = values
            .iter()
            .enumerate()
            .map(|(i, v)| cell(i, vec![0, i], *v))
            .collect();
        build(vec![columns, rows], cells)
    }

    /// Measures M1 and M2 on columns; the same 2x3 dimension cross on rows.
    /// The (D1_V2, D2_V3) cell is empty for both measures.
    pub fn two_measures_grid() -> CellSet {
        let columns = columns_axis(vec![
            Position::new(vec![measure_member("M1")]),
            Position::new(vec![measure_member("M2")]),
        ]);
        let rows = rows_axis(cross_positions());
        let m1 = [Some(1.0), Some(2.0), Some(3.0), Some(10.0), Some(11.0), None];
        let m2 = [Some(4.0), Some(5.0), Some(6.0), Some(40.0), Some(41.0), None];
        let mut cells = Vec::new();
        for (measure_index, values) in [m1, m2].iter().enumerate() {
            for (j, v) in values.iter().enumerate() {
                cells.push(cell(measure_index * 6 + j, vec![measure_index, j], *v));
            }
        }
        build(vec![columns, rows], cells)
    }

    /// One measure, one cell carrying an engine evaluation error.
    pub fn single_cell_with_error() -> CellSet {
        let axis = columns_axis(vec![Position::new(vec![measure_member("M1")])]);
        build(
            vec![axis],
            vec![Cell::error(0, vec![0], "aggregation failed")],
        )
    }

    fn cross_positions() -> Vec<Position> {
        let mut positions = Vec::new();
        for d1 in ["D1_V1", "D1_V2"] {
            for d2 in ["D2_V1", "D2_V2", "D2_V3"] {
                positions.push(Position::new(vec![
                    dimension_member("D1", d1),
                    dimension_member("D2", d2),
                ]));
            }
        }
        positions
    }
}

/// Canned schema snapshots.
pub mod schemas {
    use super::*;

    pub fn demo_schema(connection_name: &str) -> Schema {
        let members = vec![
            SchemaMember::new("D1_V1", "D1_V1", false, vec![]),
            SchemaMember::new("D1_V2", "D1_V2", false, vec![]),
        ];
        let level = Level {
            name: "D1".to_string(),
            caption: "D1".to_string(),
            depth: 1,
            cardinality: members.len(),
            populated: true,
            members,
        };
        let hierarchy = Hierarchy {
            name: "D1".to_string(),
            caption: "D1".to_string(),
            has_all: true,
            levels: vec![level],
        };
        let dimension = Dimension {
            name: "D1".to_string(),
            caption: "D1".to_string(),
            dimension_type: "OTHER".to_string(),
            hierarchies: vec![hierarchy],
        };
        Schema {
            name: "Demo".to_string(),
            connection_name: connection_name.to_string(),
            cubes: vec![Cube {
                name: "DemoCube".to_string(),
                caption: "Demo Cube".to_string(),
                measures: vec![
                    Measure {
                        name: "M1".to_string(),
                        caption: "M1".to_string(),
                        visible: true,
                        calculated: false,
                    },
                    Measure {
                        name: "M2".to_string(),
                        caption: "M2".to_string(),
                        visible: true,
                        calculated: false,
                    },
                ],
                dimensions: vec![dimension],
                measure_groups: vec![],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_unknown_connection_fails() {
        let engine = FixtureEngine::new();
        assert!(engine.open("missing").is_err());
    }

    #[test]
    fn demo_connection_serves_cell_set_and_counts_calls() {
        let engine = FixtureEngine::with_demo_data();
        let mut conn = engine.open("demo").unwrap();
        let cell_set = conn.execute_query("SELECT ...", None).unwrap();
        assert_eq!(cell_set.axes.len(), 2);
        assert_eq!(engine.query_invocations(), 1);
    }

    #[test]
    fn scripted_failure_surfaces_as_engine_error() {
        let engine = FixtureEngine::new();
        engine.insert(
            "bad",
            FixtureData::new(
                cell_sets::single_measure_single_cell(),
                schemas::demo_schema("bad"),
            )
            .failing_with(EngineError::with_cause("syntax error", "mdx parse failure")),
        );
        let mut conn = engine.open("bad").unwrap();
        let err = conn.execute_query("bogus", None).unwrap_err();
        assert_eq!(err.root_cause_reason, "mdx parse failure");
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let engine = FixtureEngine::with_demo_data();
        let mut conn = engine.open("demo").unwrap();
        let err = conn.execute_query("SELECT ...", Some(0)).unwrap_err();
        assert_eq!(err.state.as_deref(), Some("HYT00"));
    }

    #[test]
    fn set_role_accepts_only_available_roles() {
        let engine = FixtureEngine::with_demo_data();
        let mut conn = engine.open("demo").unwrap();
        assert!(conn.set_role("analyst").is_ok());
        assert!(conn.set_role("intruder").is_err());
    }
}
