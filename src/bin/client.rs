use anyhow::Result;
use blockrelay::catalog::FileCatalog;
use blockrelay::client::Downloader;
use blockrelay::config::ClientConfig;
use blockrelay::trusted::{ServedFiles, TrustedPeerServer};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ClientConfig::parse();
    info!(?config, "client starting");

    let catalog = FileCatalog::new(config.resolved_files_dir(), config.block_size)?;
    let downloader = Downloader::new(
        &config.server_host,
        config.server_port,
        config.port,
        config.workers,
        catalog,
    );

    let file_id = downloader.resolve_file_id(&config.file).await?;
    let verified = downloader.download(&file_id).await?;
    info!(
        file_id = %verified.file_id,
        path = %verified.path.display(),
        attempts = verified.attempts,
        "download complete and verified"
    );

    // The verified copy makes this client a trusted peer; serve it until
    // the process is stopped.
    let served = Arc::new(ServedFiles::new());
    served.register(&verified.file_id, verified.path);
    let peer = Arc::new(
        TrustedPeerServer::bind(
            config.port,
            served,
            config.deny_probability,
            config.block_size,
        )
        .await?,
    );
    peer.run().await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
