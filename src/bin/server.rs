use anyhow::Result;
use blockrelay::catalog::FileCatalog;
use blockrelay::config::ServerConfig;
use blockrelay::server::Server;
use clap::Parser;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::parse();
    info!(?config, "server starting");

    let catalog = FileCatalog::new(&config.files_dir, config.block_size)?;
    let server = Server::bind(
        config.port,
        catalog,
        config.pool_size,
        config.disconnect_probability,
        Duration::from_secs(config.disconnect_period_secs),
    )
    .await?;

    server.run().await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
