use thiserror::Error;

/// Errors that can occur while speaking the wire protocol.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side closed the stream mid-message.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("timeout")]
    Timeout,

    /// A command line exceeded the line length cap without a newline.
    #[error("line too long")]
    LineTooLong,

    /// A command line was not valid UTF-8.
    #[error("line is not valid utf-8")]
    InvalidLine,

    /// A binary frame announced a length above the sanity cap.
    #[error("frame too large: {0}")]
    FrameTooLarge(usize),

    /// A command had the wrong arity or an unparseable numeric field.
    #[error("{0}")]
    BadCommand(String),
}
