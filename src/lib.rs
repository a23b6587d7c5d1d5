//! blockrelay - peer-assisted block file distribution
//!
//! A central server hosts a fixed catalog of files and serves them in
//! fixed-size blocks over a mixed text/binary TCP protocol. Clients download
//! with parallel striped workers and verify the reassembled file end to end;
//! a verified client registers as a trusted peer and re-serves its copy
//! under short-lived capability tokens, which the server hands out when its
//! own handler pool is saturated.
//!
//! # Modules
//!
//! - [`proto`] - Wire protocol: command grammar and the line/frame transport
//! - [`catalog`] - File catalog, block access, and integrity hashes
//! - [`server`] - Bounded dispatch, chaos task, and peer redirection
//! - [`client`] - Parallel download engine with token failover
//! - [`trusted`] - Trusted-peer block server and token table
//! - [`config`] - Command-line options of the two binaries

pub mod catalog;
pub mod client;
pub mod config;
pub mod proto;
pub mod server;
pub mod trusted;

pub use catalog::{CatalogError, CatalogFile, FileCatalog};
pub use client::{ClientError, Downloader, RemoteFile, VerifiedDownload};
pub use config::{ClientConfig, ServerConfig};
pub use proto::{Command, ProtoError, TokenGrant, Transport};
pub use server::{ConnectionSet, Server, ServerError, TrustedPeer, TrustedPeerRegistry};
pub use trusted::{ServedFiles, TokenTable, TrustedError, TrustedPeerServer};
