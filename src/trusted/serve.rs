use super::tokens::TokenTable;
use crate::catalog::read_block;
use crate::proto::{self, Command, TokenGrant, Transport};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Errors that can occur while running a trusted-peer server.
#[derive(Debug, Error)]
pub enum TrustedError {
    /// Network I/O error (bind or accept failure).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The verified local copies a trusted peer is willing to re-serve,
/// keyed by file id.
pub struct ServedFiles {
    files: DashMap<String, PathBuf>,
}

impl ServedFiles {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    /// Registers the verified local copy of `file_id`.
    pub fn register(&self, file_id: &str, path: PathBuf) {
        self.files.insert(file_id.to_string(), path);
    }

    pub fn path_for(&self, file_id: &str) -> Option<PathBuf> {
        self.files.get(file_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for ServedFiles {
    fn default() -> Self {
        Self::new()
    }
}

/// The block server a client runs after a verified download.
///
/// Answers `TOKEN_REQUEST` with either a probabilistic denial or a freshly
/// minted token, and serves `DOWNLOAD_TOKEN` block reads from the verified
/// local copy for as long as the token lives. There is no connection cap;
/// connections are cheap and short-lived.
pub struct TrustedPeerServer {
    listener: TcpListener,
    files: Arc<ServedFiles>,
    tokens: Arc<TokenTable>,
    deny_probability: f64,
    block_size: usize,
    listen_port: u16,
    helped: AtomicU64,
    denied: AtomicU64,
}

impl TrustedPeerServer {
    pub async fn bind(
        port: u16,
        files: Arc<ServedFiles>,
        deny_probability: f64,
        block_size: usize,
    ) -> Result<Self, TrustedError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let listen_port = listener.local_addr()?.port();
        info!(port = listen_port, "trusted-peer server listening");
        Ok(Self {
            listener,
            files,
            tokens: TokenTable::new(),
            deny_probability,
            block_size,
            listen_port,
            helped: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn tokens(&self) -> &Arc<TokenTable> {
        &self.tokens
    }

    /// Token requests this peer has granted.
    pub fn helped_count(&self) -> u64 {
        self.helped.load(Ordering::Relaxed)
    }

    /// Token requests this peer has denied.
    pub fn denied_count(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    /// Runs the accept loop until the listener fails.
    pub async fn run(self: Arc<Self>) -> Result<(), TrustedError> {
        let sweeper = self.tokens.spawn_sweeper();
        let result = self.accept_loop().await;
        sweeper.abort();
        result
    }

    async fn accept_loop(self: &Arc<Self>) -> Result<(), TrustedError> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!(%addr, "peer connection accepted");
            let server = self.clone();
            tokio::spawn(async move {
                server.handle_connection(stream).await;
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let local_ip = match stream.local_addr() {
            Ok(addr) => addr.ip(),
            Err(_) => return,
        };
        let mut transport = Transport::new(stream);

        while let Ok(Some(line)) = transport.read_line().await {
            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    if transport
                        .send_line(&proto::error_line(&e.to_string()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }
            };

            let keep_going = match command {
                Command::TokenRequest { file_id } => {
                    self.handle_token_request(&mut transport, &file_id, local_ip)
                        .await
                }
                Command::DownloadToken {
                    token,
                    file_id,
                    block,
                } => {
                    self.handle_download_token(&mut transport, &token, &file_id, block)
                        .await
                }
                Command::CloseConnection => {
                    let _ = transport.send_line(proto::CLOSING).await;
                    false
                }
                _ => transport.send_line(proto::UNKNOWN_COMMAND).await.is_ok(),
            };

            if !keep_going {
                return;
            }
        }
    }

    /// Returns `false` when the connection should close.
    async fn handle_token_request(
        &self,
        transport: &mut Transport<TcpStream>,
        file_id: &str,
        local_ip: std::net::IpAddr,
    ) -> bool {
        if rand::random::<f64>() < self.deny_probability {
            self.denied.fetch_add(1, Ordering::Relaxed);
            debug!(file_id, "token request denied");
            let _ = transport.send_line(proto::TOKEN_DENIED).await;
            return false;
        }

        if self.files.path_for(file_id).is_none() {
            return transport
                .send_line(&proto::error_line(&format!("unknown file id {file_id}")))
                .await
                .is_ok();
        }

        let token = self.tokens.mint(file_id);
        self.helped.fetch_add(1, Ordering::Relaxed);
        debug!(file_id, token = %token, "token granted");

        let grant = TokenGrant::new(token, local_ip.to_string(), self.listen_port);
        transport.send_line(&grant.to_line()).await.is_ok()
    }

    async fn handle_download_token(
        &self,
        transport: &mut Transport<TcpStream>,
        token: &str,
        file_id: &str,
        block: u64,
    ) -> bool {
        if !self.tokens.authorize(token, file_id) {
            return transport.send_line(proto::INVALID_TOKEN).await.is_ok();
        }

        let Some(path) = self.files.path_for(file_id) else {
            return transport.send_line(proto::INVALID_TOKEN).await.is_ok();
        };

        match read_block(&path, self.block_size, block).await {
            Ok(data) => {
                if transport.send_line(proto::SENDING).await.is_err() {
                    return false;
                }
                transport.send_frame(&data).await.is_ok()
            }
            Err(e) => transport
                .send_line(&proto::error_line(&e.to_string()))
                .await
                .is_ok(),
        }
    }
}
