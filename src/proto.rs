//! Wire protocol and framing.
//!
//! The protocol mixes ASCII command lines with binary block payloads on a
//! single TCP stream. Commands are newline-terminated; block payloads are
//! length-prefixed with a 4-byte big-endian unsigned integer and follow
//! immediately after a `SENDING` line.
//!
//! [`Transport`] is the byte-level framer every connection reads through,
//! and [`Command`] is the shared request grammar of the server and the
//! trusted-peer server.

mod command;
mod error;
mod transport;

pub use command::{
    catalog_line, error_line, parse_catalog_line, Command, TokenGrant, CLOSING, CORRECT,
    END_OF_LIST, ERROR_PREFIX, INVALID_TOKEN, SENDING, TOKEN_DENIED, TOKEN_PREFIX,
    UNKNOWN_COMMAND, WRONG,
};
pub use error::ProtoError;
pub use transport::Transport;
