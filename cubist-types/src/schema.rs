//! Read-only snapshot of catalog structure: schema, cubes, dimensions,
//! hierarchies, levels, and the member trees below them.
//!
//! This is the second cacheable artifact type (next to query results). It is
//! built once per (connection, role) metadata fetch and then served from the
//! cache tiers, so everything here round-trips through serde.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub name: String,
    pub connection_name: String,
    pub cubes: Vec<Cube>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cube {
    pub name: String,
    pub caption: String,
    pub measures: Vec<Measure>,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub measure_groups: Vec<MeasureGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub caption: String,
    pub visible: bool,
    pub calculated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub name: String,
    pub caption: String,
    #[serde(rename = "type")]
    pub dimension_type: String,
    pub hierarchies: Vec<Hierarchy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    pub name: String,
    pub caption: String,
    pub has_all: bool,
    pub levels: Vec<Level>,
}

/// A level's member list is populated only when its cardinality stays under
/// the population limit; `populated` records which case applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub caption: String,
    pub depth: usize,
    pub cardinality: usize,
    pub populated: bool,
    pub members: Vec<SchemaMember>,
}

/// Member tree node: owned children, no parent pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMember {
    pub name: String,
    pub caption: String,
    pub is_all: bool,
    pub child_member_count: usize,
    pub child_members: Vec<SchemaMember>,
}

impl SchemaMember {
    pub fn new(name: &str, caption: &str, is_all: bool, children: Vec<SchemaMember>) -> Self {
        let child_members = Self::dedup_children(children);
        SchemaMember {
            name: name.to_string(),
            caption: caption.to_string(),
            is_all,
            child_member_count: child_members.len(),
            child_members,
        }
    }

    /// Engines have been observed to hand back duplicate child members.
    /// Keep the first occurrence of each name, unless it was childless and a
    /// later duplicate is not.
    pub fn dedup_children(children: Vec<SchemaMember>) -> Vec<SchemaMember> {
        let mut kept: Vec<SchemaMember> = Vec::with_capacity(children.len());
        for child in children {
            match kept.iter_mut().find(|c| c.name == child.name) {
                Some(existing) => {
                    if existing.child_members.is_empty() && !child.child_members.is_empty() {
                        *existing = child;
                    }
                }
                None => kept.push(child),
            }
        }
        kept
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureGroup {
    pub name: String,
    pub measure_references: Vec<String>,
    pub dimension_references: Vec<String>,
}
