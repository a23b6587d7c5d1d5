use parking_lot::Mutex;
use rand::Rng as _;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

struct ConnEntry {
    addr: SocketAddr,
    kill: mpsc::Sender<()>,
}

/// Receiver half of a connection's kill channel.
///
/// The handler task holds this and races it against its command loop; when
/// the chaos task fires the sender, the loop future is dropped and the
/// socket closes.
pub(crate) struct KillSignal {
    rx: mpsc::Receiver<()>,
}

impl KillSignal {
    pub(crate) async fn fired(&mut self) {
        // A dropped sender also counts: either way the connection is dead.
        let _ = self.rx.recv().await;
    }
}

/// The set of live server-side sockets, shared between the accept path and
/// the chaos task.
///
/// Handlers register on admission and deregister on exit; the chaos task
/// samples the set uniformly and kills one entry at a time. Entries whose
/// handler already finished lose the race and are simply discarded.
pub struct ConnectionSet {
    inner: Mutex<HashMap<u64, ConnEntry>>,
    next_id: AtomicU64,
    closed: AtomicU64,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    pub(crate) fn register(&self, addr: SocketAddr) -> (u64, KillSignal) {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().insert(id, ConnEntry { addr, kill: tx });
        (id, KillSignal { rx })
    }

    pub(crate) fn deregister(&self, id: u64) {
        self.inner.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Number of connections the chaos task has closed so far.
    pub fn closed_count(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Closes one live connection chosen uniformly at random.
    ///
    /// Entries whose handler has already exited are discarded and another
    /// victim is drawn, until something closes or the set runs dry. Returns
    /// whether a connection was actually closed.
    pub fn close_random(&self) -> bool {
        loop {
            let entry = {
                let mut inner = self.inner.lock();
                if inner.is_empty() {
                    return false;
                }
                let idx = rand::rng().random_range(0..inner.len());
                let id = *inner.keys().nth(idx).expect("index in range");
                inner.remove(&id).expect("key just sampled")
            };

            if entry.kill.is_closed() {
                continue;
            }

            let _ = entry.kill.try_send(());
            self.closed.fetch_add(1, Ordering::Relaxed);
            warn!(addr = %entry.addr, "closing connection (simulated failure)");
            return true;
        }
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new()
    }
}
