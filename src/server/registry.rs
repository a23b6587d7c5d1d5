use dashmap::DashMap;
use rand::seq::SliceRandom;
use tracing::info;

/// A client that completed an MD5-verified download of a file and serves its
/// blocks to others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedPeer {
    pub host: String,
    pub port: u16,
}

/// Trusted peers indexed by the file id they verified.
///
/// Registration happens on a successful `MD5` submission and entries live
/// until process exit. The same peer may appear more than once; duplicates
/// are harmless. Lookups hand out snapshots so a slow probe of one candidate
/// never blocks new registrations.
pub struct TrustedPeerRegistry {
    peers: DashMap<String, Vec<TrustedPeer>>,
}

impl TrustedPeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    pub fn register(&self, file_id: &str, peer: TrustedPeer) {
        info!(file_id, host = %peer.host, port = peer.port, "trusted peer registered");
        self.peers.entry(file_id.to_string()).or_default().push(peer);
    }

    /// Snapshot of the peers registered for `file_id`.
    pub fn snapshot(&self, file_id: &str) -> Vec<TrustedPeer> {
        self.peers
            .get(file_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot in randomized order, for the overflow path's probe loop.
    pub fn shuffled(&self, file_id: &str) -> Vec<TrustedPeer> {
        let mut peers = self.snapshot(file_id);
        peers.shuffle(&mut rand::rng());
        peers
    }

    pub fn count(&self, file_id: &str) -> usize {
        self.peers.get(file_id).map(|entry| entry.len()).unwrap_or(0)
    }
}

impl Default for TrustedPeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_snapshot() {
        let registry = TrustedPeerRegistry::new();
        assert!(registry.snapshot("f1").is_empty());

        let peer = TrustedPeer {
            host: "127.0.0.1".into(),
            port: 9001,
        };
        registry.register("f1", peer.clone());
        assert_eq!(registry.snapshot("f1"), vec![peer]);
        assert_eq!(registry.count("f1"), 1);
        assert_eq!(registry.count("f2"), 0);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let registry = TrustedPeerRegistry::new();
        let peer = TrustedPeer {
            host: "10.0.0.1".into(),
            port: 7000,
        };
        registry.register("f1", peer.clone());
        registry.register("f1", peer);
        assert_eq!(registry.count("f1"), 2);
    }

    #[test]
    fn test_shuffled_preserves_membership() {
        let registry = TrustedPeerRegistry::new();
        for port in 0..20 {
            registry.register(
                "f1",
                TrustedPeer {
                    host: "h".into(),
                    port,
                },
            );
        }
        let mut shuffled = registry.shuffled("f1");
        shuffled.sort_by_key(|p| p.port);
        assert_eq!(shuffled.len(), 20);
        assert!(shuffled.iter().enumerate().all(|(i, p)| p.port == i as u16));
    }
}
