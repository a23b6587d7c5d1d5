use crate::catalog::hex_encode;
use dashmap::DashMap;
use rand::Rng as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// How long a minted token stays valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(240);
/// How often the sweeper evicts expired tokens.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

struct TokenEntry {
    file_id: String,
    expires_at: Instant,
}

/// Capability tokens minted by a trusted peer.
///
/// A token authorizes any number of block reads of one file id until it
/// expires; it is never persisted. Expiry is checked at lookup, so an entry
/// the sweeper has not reached yet still refuses service once past its
/// deadline.
pub struct TokenTable {
    tokens: DashMap<String, TokenEntry>,
}

impl TokenTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tokens: DashMap::new(),
        })
    }

    /// Mints a fresh token for `file_id` with the standard TTL.
    pub fn mint(&self, file_id: &str) -> String {
        self.mint_with_ttl(file_id, TOKEN_TTL)
    }

    /// Mints a token with an explicit TTL.
    pub fn mint_with_ttl(&self, file_id: &str, ttl: Duration) -> String {
        let mut id_bytes = [0u8; 16];
        rand::rng().fill(&mut id_bytes);
        let id = hex_encode(&id_bytes);
        self.tokens.insert(
            id.clone(),
            TokenEntry {
                file_id: file_id.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        id
    }

    /// Whether `token` currently authorizes reads of `file_id`.
    ///
    /// Unknown, expired, and mismatched tokens all read as unauthorized.
    pub fn authorize(&self, token: &str, file_id: &str) -> bool {
        self.tokens
            .get(token)
            .map(|entry| entry.file_id == file_id && Instant::now() < entry.expires_at)
            .unwrap_or(false)
    }

    /// Evicts expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, entry| entry.expires_at > now);
        before - self.tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Spawns the periodic sweeper for this table.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = table.sweep();
                if evicted > 0 {
                    debug!(evicted, "expired tokens swept");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_authorize() {
        let table = TokenTable::new();
        let token = table.mint("file-a");

        assert_eq!(token.len(), 32);
        assert!(table.authorize(&token, "file-a"));
        // Multi-use: a second check still passes.
        assert!(table.authorize(&token, "file-a"));
        assert!(!table.authorize(&token, "file-b"));
        assert!(!table.authorize("unknown", "file-a"));
    }

    #[test]
    fn test_token_ids_are_unique() {
        let table = TokenTable::new();
        let a = table.mint("f");
        let b = table.mint("f");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let table = TokenTable::new();
        let token = table.mint_with_ttl("f", Duration::from_millis(10));

        assert!(table.authorize(&token, "f"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!table.authorize(&token, "f"));
    }

    #[test]
    fn test_sweep_evicts_only_expired() {
        let table = TokenTable::new();
        let short = table.mint_with_ttl("f", Duration::from_millis(10));
        let long = table.mint_with_ttl("f", Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(table.sweep(), 1);
        assert_eq!(table.len(), 1);
        assert!(!table.authorize(&short, "f"));
        assert!(table.authorize(&long, "f"));
    }
}
