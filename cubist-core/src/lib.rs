//! # cubist-core
//!
//! Core library for the cubist OLAP result service.
//!
//! This crate provides the engine seam, the connection catalog and service
//! configuration, and the result-flattening machinery: the cartesian
//! product generator, the hierarchy walker, the tidy transform, and
//! schema-XML cross-referencing.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod product;
pub mod schema_xml;
pub mod tidy;
pub mod walker;

pub use catalog::{CatalogError, ConnectionCatalog, ConnectionEntry, ConnectionSpec};
pub use config::{AuthMode, AuthSettings, ConfigError, ServiceConfig};
pub use engine::{EngineConnection, EngineError, EngineRegistry, OlapEngine};
pub use product::AxisProduct;
pub use schema_xml::{align_schema, SchemaXmlError, SchemaXmlIndex};
pub use tidy::{tidy_cell_set, MEASURES_LEVEL_UNIQUE_NAME};
pub use walker::hierarchy_walk;
