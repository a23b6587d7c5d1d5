//! Trusted-peer server and capability tokens.
//!
//! A client that completed a verified download becomes a trusted peer: it
//! runs a small block server of its own that mints short-lived tokens
//! (denying requests with a configurable probability) and answers
//! `DOWNLOAD_TOKEN` block reads from its verified local copy. Tokens are
//! multi-use until they expire and a periodic sweeper clears them out.

mod serve;
mod tokens;

pub use serve::{ServedFiles, TrustedError, TrustedPeerServer};
pub use tokens::{TokenTable, SWEEP_INTERVAL, TOKEN_TTL};

#[cfg(test)]
mod tests;
