//! Cell-set snapshot of one multidimensional query result.
//!
//! A [`CellSet`] is an immutable, serializable capture of what the engine
//! returned for a single query: ordered axes of positions, each position a
//! tuple of members, and a flat cell vector addressed by per-axis
//! coordinates. Cell ordinals are row-major with axis 0 as the most
//! significant digit (the last axis varies fastest).

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellSetError {
    #[error("cell count {actual} does not match axis position product {expected}")]
    CellCountMismatch { expected: usize, actual: usize },

    #[error("cell {ordinal} has {actual} coordinates, expected one per axis ({expected})")]
    CoordinateArity {
        ordinal: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cell {ordinal} coordinates {coordinates:?} do not map to ordinal {ordinal}")]
    OrdinalMismatch {
        ordinal: usize,
        coordinates: Vec<usize>,
    },
}

/// Kind of a member within its hierarchy. `All` marks the synthetic root
/// member that every hierarchy with `hasAll` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberType {
    All,
    Regular,
    Measure,
    Unknown,
}

/// One value within a dimension hierarchy, with an owned snapshot of its
/// ancestry. The parent chain runs root-ward only, so the structure is
/// acyclic by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(rename = "memberValue")]
    pub name: String,
    #[serde(skip)]
    pub caption: String,
    #[serde(skip)]
    pub dimension_name: String,
    #[serde(skip)]
    pub dimension_caption: String,
    #[serde(rename = "memberLevelName")]
    pub level_unique_name: String,
    #[serde(skip)]
    pub level_name: String,
    #[serde(rename = "memberLevelCaption")]
    pub level_caption: String,
    #[serde(skip)]
    pub member_type: MemberType,
    #[serde(rename = "parentMember", skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Member>>,
}

impl Member {
    /// Walk to the root of this member's ancestry chain, including self.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            depth += 1;
            current = parent;
        }
        depth
    }
}

/// One coordinate value along an axis. Position identity is its ordinal
/// index within the axis; positions are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub member_dimension_names: Vec<String>,
    pub member_dimension_captions: Vec<String>,
    #[serde(rename = "positionMembers")]
    pub members: Vec<Member>,
}

impl Position {
    /// Build a position, deriving the parallel dimension name/caption
    /// vectors from the members.
    pub fn new(members: Vec<Member>) -> Self {
        let member_dimension_names = members.iter().map(|m| m.dimension_name.clone()).collect();
        let member_dimension_captions = members
            .iter()
            .map(|m| m.dimension_caption.clone())
            .collect();
        Position {
            member_dimension_names,
            member_dimension_captions,
            members,
        }
    }
}

/// One dimension of output shape (0 = columns, 1 = rows, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub name: String,
    pub ordinal: usize,
    pub positions: Vec<Position>,
}

/// One cell of the result. A cell whose evaluation failed carries the
/// engine's error text and no numeric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub formatted_value: String,
    pub value: Option<f64>,
    pub ordinal: usize,
    pub coordinates: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Cell {
    pub fn number(ordinal: usize, coordinates: Vec<usize>, value: f64, formatted: &str) -> Self {
        Cell {
            formatted_value: formatted.to_string(),
            value: Some(value),
            ordinal,
            coordinates,
            error: None,
        }
    }

    pub fn empty(ordinal: usize, coordinates: Vec<usize>) -> Self {
        Cell {
            formatted_value: String::new(),
            value: None,
            ordinal,
            coordinates,
            error: None,
        }
    }

    pub fn error(ordinal: usize, coordinates: Vec<usize>, error: &str) -> Self {
        Cell {
            formatted_value: String::new(),
            value: None,
            ordinal,
            coordinates,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate root: ordered axes plus the flat cell vector, where
/// `cells[ordinal]` corresponds to the coordinate vector obtained by
/// decomposing `ordinal` with axis 0 as the most significant digit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSet {
    pub axes: Vec<Axis>,
    pub cells: Vec<Cell>,
}

impl CellSet {
    /// Construct a cell set, enforcing the cell-count and coordinate
    /// invariants up front.
    pub fn new(axes: Vec<Axis>, cells: Vec<Cell>) -> Result<Self, CellSetError> {
        let cs = CellSet { axes, cells };
        cs.validate()?;
        Ok(cs)
    }

    /// Number of cells implied by the axis shapes. An axis with zero
    /// positions makes the whole result empty.
    pub fn cell_count(&self) -> usize {
        self.axes.iter().map(|a| a.positions.len()).product()
    }

    /// Linear ordinal for a coordinate vector, or `None` when the arity or
    /// any coordinate is out of range.
    pub fn ordinal_of(&self, coordinates: &[usize]) -> Option<usize> {
        if coordinates.len() != self.axes.len() {
            return None;
        }
        let mut ordinal = 0usize;
        for (axis, &coord) in self.axes.iter().zip(coordinates) {
            let size = axis.positions.len();
            if coord >= size {
                return None;
            }
            ordinal = ordinal * size + coord;
        }
        Some(ordinal)
    }

    pub fn cell_at(&self, coordinates: &[usize]) -> Option<&Cell> {
        self.ordinal_of(coordinates).and_then(|o| self.cells.get(o))
    }

    /// Check the product invariant and every cell's coordinate vector
    /// against its slot.
    pub fn validate(&self) -> Result<(), CellSetError> {
        let expected = self.cell_count();
        if self.cells.len() != expected {
            return Err(CellSetError::CellCountMismatch {
                expected,
                actual: self.cells.len(),
            });
        }
        for (ordinal, cell) in self.cells.iter().enumerate() {
            if cell.coordinates.len() != self.axes.len() {
                return Err(CellSetError::CoordinateArity {
                    ordinal,
                    expected: self.axes.len(),
                    actual: cell.coordinates.len(),
                });
            }
            if self.ordinal_of(&cell.coordinates) != Some(ordinal) {
                return Err(CellSetError::OrdinalMismatch {
                    ordinal,
                    coordinates: cell.coordinates.clone(),
                });
            }
        }
        Ok(())
    }
}
