//! Connection catalog.
//!
//! Connections are declared in `*-connections.json` files under the catalog
//! directory, each file a map of connection name to definition. Schema XML
//! is read relative to the defining file and indexed once at load time, so
//! malformed XML fails fast instead of at request time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::schema_xml::{SchemaXmlError, SchemaXmlIndex};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("schema XML for connection '{connection}' is invalid: {source}")]
    SchemaXml {
        connection: String,
        source: SchemaXmlError,
    },
}

/// One connection definition as it appears in a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    /// Engine driver name, resolved through the engine registry.
    pub driver: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Path to the schema XML, relative to the defining catalog file.
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    #[serde(default)]
    pub is_demo: bool,
}

/// A loaded connection: the spec plus the resolved schema XML content and
/// its index.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub name: String,
    pub spec: ConnectionSpec,
    pub schema_content: Option<String>,
    pub schema_index: Option<SchemaXmlIndex>,
    pub source_file: PathBuf,
}

/// What `/getConnections` exposes: everything except the schema content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_demo: bool,
    pub connection_definition_source: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionCatalog {
    entries: BTreeMap<String, ConnectionEntry>,
}

impl ConnectionCatalog {
    /// Scan `dir` for catalog files and load every connection. Later files
    /// override earlier definitions of the same name (logged). When
    /// `remove_demo_connections` is set, definitions flagged `isDemo` are
    /// dropped after loading.
    pub fn load(dir: &Path, remove_demo_connections: bool) -> Result<Self, CatalogError> {
        let mut catalog = ConnectionCatalog::default();

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("-connections.json"))
            })
            .collect();
        files.sort();

        for file in files {
            catalog.load_file(&file)?;
        }

        if remove_demo_connections {
            let removed: Vec<String> = catalog
                .entries
                .iter()
                .filter(|(_, e)| e.spec.is_demo)
                .map(|(name, _)| name.clone())
                .collect();
            for name in removed {
                info!(connection = %name, "removing demo connection");
                catalog.entries.remove(&name);
            }
        }

        info!(connections = catalog.entries.len(), "connection catalog loaded");
        Ok(catalog)
    }

    fn load_file(&mut self, file: &Path) -> Result<(), CatalogError> {
        let contents = std::fs::read_to_string(file).map_err(|source| CatalogError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let specs: BTreeMap<String, ConnectionSpec> =
            serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: file.to_path_buf(),
                source,
            })?;

        let base = file.parent().unwrap_or(Path::new("."));
        for (name, spec) in specs {
            if self.entries.contains_key(&name) {
                warn!(
                    connection = %name,
                    file = %file.display(),
                    "connection redefined, later definition wins"
                );
            }
            let schema_content = match &spec.schema_path {
                Some(schema_path) => {
                    let resolved = base.join(schema_path);
                    Some(std::fs::read_to_string(&resolved).map_err(|source| {
                        CatalogError::Io {
                            path: resolved.clone(),
                            source,
                        }
                    })?)
                }
                None => None,
            };
            let schema_index = match &schema_content {
                Some(xml) => Some(SchemaXmlIndex::parse(xml).map_err(|source| {
                    CatalogError::SchemaXml {
                        connection: name.clone(),
                        source,
                    }
                })?),
                None => None,
            };
            self.entries.insert(
                name.clone(),
                ConnectionEntry {
                    name,
                    spec,
                    schema_content,
                    schema_index,
                    source_file: file.to_path_buf(),
                },
            );
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializable view with schema content hidden.
    pub fn descriptors(&self) -> BTreeMap<String, ConnectionDescriptor> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    ConnectionDescriptor {
                        driver: entry.spec.driver.clone(),
                        description: entry.spec.description.clone(),
                        is_demo: entry.spec.is_demo,
                        connection_definition_source: entry.source_file.display().to_string(),
                    },
                )
            })
            .collect()
    }
}
