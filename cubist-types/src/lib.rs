//! Shared types for cubist
//!
//! This crate provides the data model shared across the cubist ecosystem:
//! the cell-set snapshot of a multidimensional query result, the flattened
//! ("tidy") row table, and the schema metadata snapshot.

pub mod cellset;
pub mod schema;
pub mod tidy;

pub use cellset::{Axis, Cell, CellSet, CellSetError, Member, MemberType, Position};
pub use schema::{
    Cube, Dimension, Hierarchy, Level, Measure, MeasureGroup, Schema, SchemaMember,
};
pub use tidy::{QueryResult, TidyOptions, TidyRow, TidyTable};
