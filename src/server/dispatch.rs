use super::chaos;
use super::connections::ConnectionSet;
use super::error::ServerError;
use super::handler::RequestHandler;
use super::registry::{TrustedPeer, TrustedPeerRegistry};
use crate::catalog::{CatalogFile, FileCatalog};
use crate::proto::{Command, Transport, TOKEN_PREFIX};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the accept loop, handler tasks, overflow tasks, and
/// the chaos task.
struct Shared {
    catalog: Arc<FileCatalog>,
    files: Arc<Vec<CatalogFile>>,
    peers: Arc<TrustedPeerRegistry>,
    connections: Arc<ConnectionSet>,
    pool: Arc<Semaphore>,
}

/// The central block-distribution server.
///
/// Accepts connections indefinitely. At most `pool_size` handlers run
/// concurrently (one per connection); a connection arriving at a full pool
/// takes the overflow path, which tries to redirect its first `DOWNLOAD` to
/// a trusted peer before queueing for a handler slot. A chaos task closes a
/// random live connection with probability `disconnect_probability` once per
/// `disconnect_period`, to exercise client retry behavior.
pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    disconnect_probability: f64,
    disconnect_period: Duration,
}

impl Server {
    /// Binds the listen socket and scans the catalog directory.
    pub async fn bind(
        port: u16,
        catalog: FileCatalog,
        pool_size: usize,
        disconnect_probability: f64,
        disconnect_period: Duration,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let files = Arc::new(catalog.scan().await?);
        info!(
            port = listener.local_addr()?.port(),
            files = files.len(),
            pool = pool_size,
            "server listening"
        );
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                catalog: Arc::new(catalog),
                files,
                peers: Arc::new(TrustedPeerRegistry::new()),
                connections: Arc::new(ConnectionSet::new()),
                pool: Arc::new(Semaphore::new(pool_size)),
            }),
            disconnect_probability,
            disconnect_period,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The files served by this server, in catalog order.
    pub fn files(&self) -> &Arc<Vec<CatalogFile>> {
        &self.shared.files
    }

    pub fn peers(&self) -> &Arc<TrustedPeerRegistry> {
        &self.shared.peers
    }

    pub fn connections(&self) -> &Arc<ConnectionSet> {
        &self.shared.connections
    }

    /// Runs the accept loop until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let chaos = chaos::spawn(
            self.shared.connections.clone(),
            self.disconnect_probability,
            self.disconnect_period,
        );

        let result = self.accept_loop().await;
        chaos.abort();
        result
    }

    async fn accept_loop(&self) -> Result<(), ServerError> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!(%addr, "client connected");

            match self.shared.pool.clone().try_acquire_owned() {
                Ok(permit) => {
                    self.shared
                        .spawn_handler(Transport::new(stream), addr, None, permit);
                }
                Err(_) => {
                    let shared = self.shared.clone();
                    tokio::spawn(async move {
                        shared.run_overflow(stream, addr).await;
                    });
                }
            }
        }
    }
}

impl Shared {
    fn spawn_handler(
        self: &Arc<Self>,
        transport: Transport<TcpStream>,
        addr: SocketAddr,
        first_command: Option<String>,
        permit: OwnedSemaphorePermit,
    ) {
        let (id, mut kill) = self.connections.register(addr);
        let shared = self.clone();
        let handler = RequestHandler::new(
            transport,
            self.catalog.clone(),
            self.files.clone(),
            self.peers.clone(),
            addr,
        );

        tokio::spawn(async move {
            let _permit = permit;
            tokio::select! {
                result = handler.run(first_command) => {
                    if let Err(e) = result {
                        debug!(%addr, error = %e, "handler terminated");
                    }
                }
                _ = kill.fired() => {}
            }
            shared.connections.deregister(id);
        });
    }

    /// Dispatch for a connection that arrived at a full pool.
    ///
    /// Consumes exactly one line. A `DOWNLOAD` is first offered to the
    /// trusted peers of the requested file, in random order; the first
    /// `TOKEN` reply is forwarded verbatim and the control socket closed.
    /// When no peer grants a token (or the line is something else), the
    /// connection queues for a handler slot with that line as its first
    /// command.
    async fn run_overflow(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let mut transport = Transport::new(stream);
        let line = match transport.read_line().await {
            Ok(Some(line)) => line,
            _ => return,
        };

        if let Ok(Command::Download { file_id, .. }) = Command::parse(&line) {
            for peer in self.peers.shuffled(&file_id) {
                if let Some(grant_line) = probe_peer(&peer, &file_id).await {
                    debug!(%addr, peer_host = %peer.host, peer_port = peer.port,
                        "redirected saturated client to trusted peer");
                    let _ = transport.send_line(&grant_line).await;
                    return;
                }
            }
        }

        // No peer could help; wait in line for a normal handler slot.
        let Ok(permit) = self.pool.clone().acquire_owned().await else {
            return;
        };
        self.spawn_handler(transport, addr, Some(line), permit);
    }
}

/// Asks one trusted peer for a token; `None` on deny, error, or timeout.
async fn probe_peer(peer: &TrustedPeer, file_id: &str) -> Option<String> {
    let probe = async {
        let mut transport = Transport::connect((peer.host.as_str(), peer.port)).await.ok()?;
        transport
            .send_line(&format!("TOKEN_REQUEST {file_id}"))
            .await
            .ok()?;
        transport.read_line().await.ok().flatten()
    };

    match timeout(PROBE_TIMEOUT, probe).await {
        Ok(Some(reply)) if reply.starts_with(TOKEN_PREFIX) => Some(reply),
        _ => None,
    }
}
