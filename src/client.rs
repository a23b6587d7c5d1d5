//! Client download engine.
//!
//! A download runs `Dc` parallel workers striped over the block indices,
//! each on its own server connection. A worker redirected with a `TOKEN`
//! reply continues against the granting trusted peer. When every worker has
//! stopped, the blocks are reassembled in index order, saved, and the MD5
//! submitted to the server; anything short of `CORRECT` restarts the
//! attempt from scratch.

mod download;
mod error;
mod worker;

pub use download::{Downloader, RemoteFile, VerifiedDownload, RANDOM_FILE_ID};
pub use error::ClientError;
