use super::error::ClientError;
use super::worker;
use crate::catalog::FileCatalog;
use crate::proto::{self, Transport, CORRECT, END_OF_LIST};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use rand::seq::IndexedRandom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// The literal file-id value that asks for a random catalog entry.
pub const RANDOM_FILE_ID: &str = "random";

/// One entry of the server's catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub id: String,
}

/// A completed, MD5-verified download.
#[derive(Debug)]
pub struct VerifiedDownload {
    pub file_id: String,
    pub path: PathBuf,
    pub md5: String,
    pub attempts: u32,
}

/// The parallel download engine.
///
/// Fetches the catalog listing, then downloads one file with `workers`
/// striped block workers, reassembles the blocks in index order, and submits
/// the MD5 for verification, retrying the whole attempt until the server
/// answers `CORRECT`. The verified file lands in the engine's catalog
/// directory under a deterministic name so the trusted-peer server can
/// re-serve it.
pub struct Downloader {
    server_host: String,
    server_port: u16,
    listen_port: u16,
    workers: usize,
    catalog: FileCatalog,
}

impl Downloader {
    pub fn new(
        server_host: impl Into<String>,
        server_port: u16,
        listen_port: u16,
        workers: usize,
        catalog: FileCatalog,
    ) -> Self {
        Self {
            server_host: server_host.into(),
            server_port,
            listen_port,
            workers: workers.max(1),
            catalog,
        }
    }

    /// The deterministic local name a verified download is saved under.
    pub fn output_name(file_id: &str) -> String {
        format!("output_{file_id}.bin")
    }

    async fn connect(&self) -> Result<Transport<TcpStream>, ClientError> {
        Ok(Transport::connect((self.server_host.as_str(), self.server_port)).await?)
    }

    /// Fetches the server's catalog listing over a transient connection.
    pub async fn fetch_file_list(&self) -> Result<Vec<RemoteFile>, ClientError> {
        let mut transport = self.connect().await?;
        transport.send_line("LIST_FILES").await?;

        let mut files = Vec::new();
        while let Some(line) = transport.read_line().await? {
            if line == END_OF_LIST {
                break;
            }
            if let Some((name, id)) = proto::parse_catalog_line(&line) {
                files.push(RemoteFile { name, id });
            }
        }
        Ok(files)
    }

    /// Resolves the configured file id against the server's catalog,
    /// picking a random entry for the literal `random`.
    pub async fn resolve_file_id(&self, requested: &str) -> Result<String, ClientError> {
        let files = self.fetch_file_list().await?;
        if requested != RANDOM_FILE_ID {
            return Ok(requested.to_string());
        }
        let file = files.choose(&mut rand::rng()).ok_or(ClientError::NoFiles)?;
        debug!(file_id = %file.id, name = %file.name, "random file selected");
        Ok(file.id.clone())
    }

    /// Downloads `file_id` until an attempt verifies.
    ///
    /// Each attempt spawns the striped workers over a fresh shared block
    /// map; a mismatching MD5 (corrupted block, foreign bytes from a peer,
    /// or holes left by a dead worker) discards the attempt wholesale and
    /// starts over.
    pub async fn download(&self, file_id: &str) -> Result<VerifiedDownload, ClientError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let blocks: Arc<DashMap<u64, Bytes>> = Arc::new(DashMap::new());

            let tasks: Vec<_> = (0..self.workers)
                .map(|index| {
                    tokio::spawn(worker::run(
                        self.server_host.clone(),
                        self.server_port,
                        file_id.to_string(),
                        index as u64,
                        self.workers as u64,
                        blocks.clone(),
                    ))
                })
                .collect();

            for joined in join_all(tasks).await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "worker ended with error"),
                    Err(e) => debug!(error = %e, "worker task failed"),
                }
            }

            let data = assemble(&blocks);
            let name = Self::output_name(file_id);
            let path = self.catalog.save(&data, &name).await?;
            let md5 = self.catalog.md5_of(&name).await?;

            match self.submit_md5(file_id, &md5).await {
                Ok(true) => {
                    info!(file_id, bytes = data.len(), attempts, "download verified");
                    return Ok(VerifiedDownload {
                        file_id: file_id.to_string(),
                        path,
                        md5,
                        attempts,
                    });
                }
                Ok(false) => {
                    warn!(file_id, attempt = attempts, "md5 rejected, retrying");
                }
                // A connection lost mid-verification is retried like any
                // other failed attempt.
                Err(e) => {
                    warn!(file_id, attempt = attempts, error = %e, "verification attempt failed, retrying");
                }
            }
        }
    }

    async fn submit_md5(&self, file_id: &str, md5: &str) -> Result<bool, ClientError> {
        let mut transport = self.connect().await?;
        transport
            .send_line(&format!("MD5 {file_id} {md5} {}", self.listen_port))
            .await?;
        Ok(matches!(transport.read_line().await?, Some(reply) if reply == CORRECT))
    }
}

/// Concatenates the block map's payloads in ascending index order.
fn assemble(blocks: &DashMap<u64, Bytes>) -> Vec<u8> {
    let mut indices: Vec<u64> = blocks.iter().map(|entry| *entry.key()).collect();
    indices.sort_unstable();

    let total: usize = blocks.iter().map(|entry| entry.value().len()).sum();
    let mut data = Vec::with_capacity(total);
    for index in indices {
        if let Some(block) = blocks.get(&index) {
            data.extend_from_slice(block.value());
        }
    }
    data
}
