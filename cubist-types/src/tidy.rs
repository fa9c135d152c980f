//! Flattened ("tidy") row table and the tidy request options.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cellset::CellSet;

/// One flattened row: level unique name (or simplified/translated name) to
/// value, plus one key per measure holding the cell value. A `BTreeMap`
/// keeps serialization deterministic.
pub type TidyRow = BTreeMap<String, Value>;

/// Ordered row table; serializes as `{"values": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TidyTable {
    pub values: Vec<TidyRow>,
}

/// Tidy configuration as it arrives on a query request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TidyOptions {
    pub enabled: bool,
    pub simplify_names: bool,
    #[serde(rename = "levelNameTranslationMap")]
    pub level_name_translations: Option<HashMap<String, String>>,
}

/// The one cacheable query artifact: either the raw cell set or its tidied
/// form, depending on what the request asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Raw(CellSet),
    Tidy(TidyTable),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_options_deserialize_with_defaults() {
        let opts: TidyOptions = serde_json::from_str("{\"enabled\": true}").unwrap();
        assert!(opts.enabled);
        assert!(!opts.simplify_names);
        assert!(opts.level_name_translations.is_none());
    }

    #[test]
    fn tidy_options_accept_translation_map() {
        let opts: TidyOptions = serde_json::from_str(
            "{\"enabled\": true, \"simplifyNames\": true, \
             \"levelNameTranslationMap\": {\"[D1].[D1].[D1_V1]\": \"d1\"}}",
        )
        .unwrap();
        assert!(opts.simplify_names);
        let map = opts.level_name_translations.unwrap();
        assert_eq!(map.get("[D1].[D1].[D1_V1]").map(String::as_str), Some("d1"));
    }

    #[test]
    fn tidy_table_serializes_under_values_key() {
        let mut row = TidyRow::new();
        row.insert("M1".to_string(), Value::from(1.0));
        let table = TidyTable { values: vec![row] };
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["values"][0]["M1"], 1.0);
    }
}
