//! cubist-server entry point: config + catalog wiring around the HTTP
//! service.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cubist_core::catalog::ConnectionCatalog;
use cubist_core::engine::EngineRegistry;
use cubist_core::ServiceConfig;
use cubist_server::cli::Cli;

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = if cli.config.exists() {
        ServiceConfig::from_file(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "no config file found, using defaults");
        ServiceConfig::default()
    };
    if let Some(listen_addr) = cli.listen_addr {
        config.listen_addr = listen_addr;
    }
    if let Some(catalog_dir) = cli.catalog_dir {
        config.catalog_dir = catalog_dir;
    }

    if cli.check {
        let catalog =
            ConnectionCatalog::load(&config.catalog_dir, config.remove_demo_connections)?;
        for name in catalog.names() {
            info!(connection = %name, "connection ok");
        }
        info!(connections = catalog.len(), "configuration and catalog are valid");
        return Ok(());
    }

    cubist_server::serve(config, EngineRegistry::with_defaults()).await
}
