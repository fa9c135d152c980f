//! Service configuration parsing (`cubist.yml`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cubist_cache::CacheSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Main configuration struct matching the cubist.yml schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Address the HTTP listener binds.
    pub listen_addr: String,

    /// Directory scanned for `*-connections.json` files.
    pub catalog_dir: PathBuf,

    /// Drop connections flagged `isDemo` at load time.
    pub remove_demo_connections: bool,

    /// Engine-side query budget; `None` means no timeout.
    pub query_timeout_secs: Option<u64>,

    /// Metadata pre-warm: "false", "true" (all connections), or a
    /// comma-separated connection list.
    pub pre_cache_metadata: String,

    pub cache: CacheSettings,

    pub auth: AuthSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            listen_addr: "127.0.0.1:8810".to_string(),
            catalog_dir: PathBuf::from("./connections"),
            remove_demo_connections: true,
            query_timeout_secs: None,
            pre_cache_metadata: "false".to_string(),
            cache: CacheSettings::default(),
            auth: AuthSettings::default(),
        }
    }
}

/// Request authorization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct AuthSettings {
    /// "allow-all" (default) or "bearer-token".
    pub mode: AuthMode,

    /// Bearer-token mode: token value to (connection name to role). The
    /// role value "*" grants access with no role restriction.
    pub tokens: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    #[default]
    AllowAll,
    BearerToken,
}

impl ServiceConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: ServiceConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Connections to pre-warm, resolved against the loaded catalog names.
    /// `None` means pre-warming is disabled.
    pub fn prewarm_connections<'a>(
        &self,
        known: impl Iterator<Item = &'a str>,
    ) -> Option<Vec<String>> {
        let setting = self.pre_cache_metadata.trim();
        if setting == "false" {
            return None;
        }
        let known: Vec<&str> = known.collect();
        if setting == "true" {
            return Some(known.iter().map(|n| n.to_string()).collect());
        }
        let requested: Vec<&str> = setting.split(',').map(str::trim).collect();
        Some(
            known
                .iter()
                .filter(|name| requested.contains(name))
                .map(|n| n.to_string())
                .collect(),
        )
    }
}
