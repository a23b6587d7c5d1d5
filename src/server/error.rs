use thiserror::Error;

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Network I/O error (bind or accept failure).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The files directory could not be scanned.
    #[error("catalog error: {0}")]
    Catalog(#[from] crate::catalog::CatalogError),

    /// Protocol error on a connection owned by the server.
    #[error("protocol error: {0}")]
    Proto(#[from] crate::proto::ProtoError),
}
