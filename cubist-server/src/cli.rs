//! Command-line interface for the cubist server daemon.

use std::path::PathBuf;

use clap::Parser;

/// OLAP query results over HTTP, flattened and cached.
#[derive(Debug, Clone, Parser)]
#[command(name = "cubist-server", about = "HTTP front end for OLAP cell sets")]
pub struct Cli {
    /// Path to the service configuration file
    #[arg(long, env = "CUBIST_CONFIG", default_value = "cubist.yml")]
    pub config: PathBuf,

    /// Listen address override (e.g. 0.0.0.0:8810)
    #[arg(long, env = "CUBIST_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Connection catalog directory override
    #[arg(long, env = "CUBIST_CATALOG_DIR")]
    pub catalog_dir: Option<PathBuf>,

    /// Validate configuration and catalog, then exit
    #[arg(long)]
    pub check: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}
