//! Central server: bounded dispatch, chaos task, and peer redirection.
//!
//! The server admits at most `Cs` concurrent connection handlers. When the
//! pool is full, a new connection's first `DOWNLOAD` is redirected to a
//! trusted peer that grants a capability token; only when every candidate
//! declines does the connection queue for a handler slot. A periodic chaos
//! task closes random live connections to simulate failures.

mod chaos;
mod connections;
mod dispatch;
mod error;
mod handler;
mod registry;

pub use connections::ConnectionSet;
pub use dispatch::Server;
pub use error::ServerError;
pub use registry::{TrustedPeer, TrustedPeerRegistry};
