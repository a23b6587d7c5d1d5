use thiserror::Error;

/// Errors that can occur in the download engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error on a connection owned by the client.
    #[error("protocol error: {0}")]
    Proto(#[from] crate::proto::ProtoError),

    /// The downloaded file could not be saved or hashed.
    #[error("catalog error: {0}")]
    Catalog(#[from] crate::catalog::CatalogError),

    /// Asked for a random file but the server's catalog is empty.
    #[error("server has no files")]
    NoFiles,
}
