//! The tidy transform: flatten an N-axis cell set into a 2-dimensional row
//! table.
//!
//! Each combination of positions across axes contributes one candidate row;
//! rows that are identical after removing the measure selector merge, so
//! multiple measures sharing the same dimension coordinates land in a
//! single row with one column per measure. Optionally, level unique names
//! are simplified to short names or translated via a caller-supplied table.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde_json::Value;
use tracing::{debug, warn};

use cubist_types::{CellSet, TidyRow, TidyTable};

use crate::product::AxisProduct;
use crate::walker::hierarchy_walk;

/// Level unique name of the distinguished measures dimension. Its value on
/// a row selects which column receives the cell value; it is never itself a
/// row key.
pub const MEASURES_LEVEL_UNIQUE_NAME: &str = "[Measures].[MeasuresLevel]";

/// Flatten `cell_set` into tidy rows. When `simplify_names` is set, row
/// keys are rewritten through `translations` first and the cell set's own
/// level metadata second; unresolved keys stay as they are.
pub fn tidy_cell_set(
    cell_set: &CellSet,
    simplify_names: bool,
    translations: Option<&HashMap<String, String>>,
) -> TidyTable {
    let sizes: Vec<usize> = cell_set.axes.iter().map(|a| a.positions.len()).collect();

    let mut rows: Vec<TidyRow> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (ordinal, coordinates) in AxisProduct::new(&sizes).enumerate() {
        let Some(cell) = cell_set.cells.get(ordinal) else {
            // new() validates the product invariant, so this is unreachable
            // for any cell set that came through the front door.
            warn!(ordinal, "cell set is missing a cell, skipping combination");
            continue;
        };

        let mut dimensions: TidyRow = TidyRow::new();
        for (axis, &position_index) in cell_set.axes.iter().zip(&coordinates) {
            let position = &axis.positions[position_index];
            for member in &position.members {
                for ancestor in hierarchy_walk(member) {
                    dimensions.insert(
                        ancestor.level_unique_name.clone(),
                        Value::String(ancestor.name.clone()),
                    );
                }
            }
        }

        let measure = match dimensions.remove(MEASURES_LEVEL_UNIQUE_NAME) {
            Some(Value::String(name)) => Some(name),
            _ => None,
        };
        // An error cell carries no numeric value; it flattens to null just
        // like an empty cell.
        let cell_value = cell.value.map(Value::from).unwrap_or(Value::Null);

        let identity = row_identity(&dimensions);
        match slots.get(&identity) {
            Some(&slot) => {
                if let Some(measure) = measure {
                    rows[slot].insert(measure, cell_value);
                }
            }
            None => {
                if let Some(measure) = measure {
                    dimensions.insert(measure, cell_value);
                } else {
                    debug!(ordinal, "combination has no measures member");
                }
                slots.insert(identity, rows.len());
                rows.push(dimensions);
            }
        }
    }

    let table = TidyTable { values: rows };
    if simplify_names {
        simplify_table(table, cell_set, translations)
    } else {
        table
    }
}

/// Deterministic row identity over the non-measure key/value pairs: the
/// sorted pairs rendered length-prefixed, so no key/value split can collide
/// with another.
fn row_identity(dimensions: &TidyRow) -> String {
    let mut identity = String::new();
    for (key, value) in dimensions {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = write!(
            identity,
            "{}|{}|{}|{}|",
            key.len(),
            key,
            rendered.len(),
            rendered
        );
    }
    identity
}

fn simplify_table(
    table: TidyTable,
    cell_set: &CellSet,
    translations: Option<&HashMap<String, String>>,
) -> TidyTable {
    let values = table
        .values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| (simplify_key(&key, cell_set, translations), value))
                .collect()
        })
        .collect();
    TidyTable { values }
}

fn simplify_key(
    key: &str,
    cell_set: &CellSet,
    translations: Option<&HashMap<String, String>>,
) -> String {
    if let Some(translated) = translations.and_then(|t| t.get(key)) {
        return translated.clone();
    }
    if let Some(short) = short_level_name(cell_set, key) {
        return short;
    }
    debug!(key, "no level found for key during name simplification");
    key.to_string()
}

/// Resolve a level unique name to its short name by scanning the cell set's
/// members (and their ancestors) for a level match.
fn short_level_name(cell_set: &CellSet, level_unique_name: &str) -> Option<String> {
    for axis in &cell_set.axes {
        for position in &axis.positions {
            for member in &position.members {
                for ancestor in hierarchy_walk(member) {
                    if ancestor.level_unique_name == level_unique_name {
                        return Some(ancestor.level_name.clone());
                    }
                }
            }
        }
    }
    None
}
