use super::error::ServerError;
use super::registry::{TrustedPeer, TrustedPeerRegistry};
use crate::catalog::{CatalogFile, FileCatalog};
use crate::proto::{self, Command, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

/// Per-connection command loop of the central server.
///
/// Owns its socket for the life of the connection. Protocol and resource
/// errors are answered in-band and the loop continues; only EOF,
/// `CLOSE_CONNECTION`, or a transport error end it.
pub(crate) struct RequestHandler {
    transport: Transport<TcpStream>,
    catalog: Arc<FileCatalog>,
    files: Arc<Vec<CatalogFile>>,
    peers: Arc<TrustedPeerRegistry>,
    remote: SocketAddr,
}

impl RequestHandler {
    pub(crate) fn new(
        transport: Transport<TcpStream>,
        catalog: Arc<FileCatalog>,
        files: Arc<Vec<CatalogFile>>,
        peers: Arc<TrustedPeerRegistry>,
        remote: SocketAddr,
    ) -> Self {
        Self {
            transport,
            catalog,
            files,
            peers,
            remote,
        }
    }

    /// Runs the command loop. `first_command` is a line the overflow path
    /// already consumed from this socket before handing it over.
    pub(crate) async fn run(mut self, first_command: Option<String>) -> Result<(), ServerError> {
        if let Some(line) = first_command {
            if !self.handle_command(&line).await? {
                return Ok(());
            }
        }
        while let Some(line) = self.transport.read_line().await? {
            if !self.handle_command(&line).await? {
                break;
            }
        }
        Ok(())
    }

    /// Handles one command line; returns `false` when the session should end.
    async fn handle_command(&mut self, line: &str) -> Result<bool, ServerError> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                self.transport
                    .send_line(&proto::error_line(&e.to_string()))
                    .await?;
                return Ok(true);
            }
        };

        match command {
            Command::ListFiles => {
                for file in self.files.iter() {
                    self.transport
                        .send_line(&proto::catalog_line(&file.name, &file.id))
                        .await?;
                }
                self.transport.send_line(proto::END_OF_LIST).await?;
            }
            Command::Download { file_id, block } => {
                self.handle_download(&file_id, block).await?;
            }
            Command::Md5 {
                file_id,
                md5,
                port,
            } => {
                self.handle_md5(&file_id, &md5, port).await?;
            }
            Command::CloseConnection => {
                self.transport.send_line(proto::CLOSING).await?;
                return Ok(false);
            }
            Command::TokenRequest { .. } | Command::DownloadToken { .. } | Command::Unknown(_) => {
                self.transport.send_line(proto::UNKNOWN_COMMAND).await?;
            }
        }
        Ok(true)
    }

    async fn handle_download(&mut self, file_id: &str, block: u64) -> Result<(), ServerError> {
        let Some(file) = self.files.iter().find(|f| f.id == file_id) else {
            self.transport
                .send_line(&proto::error_line(&format!("unknown file id {file_id}")))
                .await?;
            return Ok(());
        };

        match self.catalog.block(&file.name, block).await {
            Ok(data) => {
                self.transport.send_line(proto::SENDING).await?;
                self.transport.send_frame(&data).await?;
            }
            Err(e) => {
                self.transport
                    .send_line(&proto::error_line(&e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_md5(&mut self, file_id: &str, md5: &str, port: u16) -> Result<(), ServerError> {
        let verified = self
            .files
            .iter()
            .find(|f| f.id == file_id)
            .is_some_and(|f| f.md5 == md5);

        if verified {
            self.transport.send_line(proto::CORRECT).await?;
            self.peers.register(
                file_id,
                TrustedPeer {
                    host: self.remote.ip().to_string(),
                    port,
                },
            );
        } else {
            let remote = self.remote;
            debug!(file_id, %remote, "md5 mismatch");
            self.transport.send_line(proto::WRONG).await?;
        }
        Ok(())
    }
}
