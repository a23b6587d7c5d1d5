use super::error::ProtoError;

/// Reply sent before a length-prefixed block frame.
pub const SENDING: &str = "SENDING";
/// Terminator of a `LIST_FILES` response.
pub const END_OF_LIST: &str = "END_OF_LIST";
/// Reply to a matching `MD5` submission.
pub const CORRECT: &str = "CORRECT";
/// Reply to a mismatching `MD5` submission.
pub const WRONG: &str = "WRONG";
/// Reply to a `DOWNLOAD_TOKEN` with an unknown, expired or mismatched token.
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
/// Reply to a command the receiver does not recognize.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
/// Reply of a trusted peer that refuses to mint a token.
pub const TOKEN_DENIED: &str = "CLIENT DENIED THE TOKEN REQUEST";
/// Farewell line sent in response to `CLOSE_CONNECTION`.
pub const CLOSING: &str = "Connection closing...";

/// Prefix of a token grant line: `TOKEN <id> <host> <port>`.
pub const TOKEN_PREFIX: &str = "TOKEN ";
/// Prefix of an in-band error reply.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// A request command, as sent by a downloading client to the server or to a
/// trusted peer.
///
/// Command lines are split on runs of ASCII whitespace and the first field is
/// matched case-insensitively. Wrong arity or an unparseable number is a
/// [`ProtoError::BadCommand`], which handlers answer with an `ERROR:` line
/// while keeping the connection open; an unrecognized verb parses as
/// [`Command::Unknown`] and is answered with `UNKNOWN_COMMAND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `LIST_FILES` - request the catalog listing.
    ListFiles,
    /// `DOWNLOAD <fileId> <blockIndex>` - request one block of a file.
    Download { file_id: String, block: u64 },
    /// `MD5 <fileId> <md5Hex> <listenPort>` - submit a downloaded file's
    /// checksum together with the submitter's own listen port.
    Md5 {
        file_id: String,
        md5: String,
        port: u16,
    },
    /// `TOKEN_REQUEST <fileId>` - ask a trusted peer for a capability token.
    TokenRequest { file_id: String },
    /// `DOWNLOAD_TOKEN <tokenId> <fileId> <blockIndex>` - request one block
    /// from a trusted peer under a previously granted token.
    DownloadToken {
        token: String,
        file_id: String,
        block: u64,
    },
    /// `CLOSE_CONNECTION` - ask the handler to end the session.
    CloseConnection,
    /// Any other verb, carried verbatim.
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ProtoError> {
        let mut parts = line.split_ascii_whitespace();
        let verb = parts.next().unwrap_or_default().to_ascii_uppercase();

        match verb.as_str() {
            "LIST_FILES" => Ok(Command::ListFiles),
            "DOWNLOAD" => {
                let file_id = next_field(&mut parts, "DOWNLOAD", "file id")?;
                let block = parse_number(&mut parts, "DOWNLOAD", "block index")?;
                Ok(Command::Download { file_id, block })
            }
            "MD5" => {
                let file_id = next_field(&mut parts, "MD5", "file id")?;
                let md5 = next_field(&mut parts, "MD5", "md5 hash")?;
                let port = parse_number(&mut parts, "MD5", "listen port")?;
                Ok(Command::Md5 { file_id, md5, port })
            }
            "TOKEN_REQUEST" => {
                let file_id = next_field(&mut parts, "TOKEN_REQUEST", "file id")?;
                Ok(Command::TokenRequest { file_id })
            }
            "DOWNLOAD_TOKEN" => {
                let token = next_field(&mut parts, "DOWNLOAD_TOKEN", "token id")?;
                let file_id = next_field(&mut parts, "DOWNLOAD_TOKEN", "file id")?;
                let block = parse_number(&mut parts, "DOWNLOAD_TOKEN", "block index")?;
                Ok(Command::DownloadToken {
                    token,
                    file_id,
                    block,
                })
            }
            "CLOSE_CONNECTION" => Ok(Command::CloseConnection),
            _ => Ok(Command::Unknown(verb)),
        }
    }
}

fn next_field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    verb: &str,
    what: &str,
) -> Result<String, ProtoError> {
    parts
        .next()
        .map(str::to_owned)
        .ok_or_else(|| ProtoError::BadCommand(format!("missing {what} for {verb}")))
}

fn parse_number<'a, N: std::str::FromStr>(
    parts: &mut impl Iterator<Item = &'a str>,
    verb: &str,
    what: &str,
) -> Result<N, ProtoError> {
    let field = next_field(parts, verb, what)?;
    field
        .parse()
        .map_err(|_| ProtoError::BadCommand(format!("invalid {what} for {verb}: {field}")))
}

/// Formats an in-band `ERROR:` reply line.
pub fn error_line(message: &str) -> String {
    format!("{ERROR_PREFIX}{message}")
}

/// Formats one catalog listing line: `Name: <name>, ID: <sha256>`.
pub fn catalog_line(name: &str, id: &str) -> String {
    format!("Name: {name}, ID: {id}")
}

/// Extracts the file id from a catalog listing line.
///
/// The listing format is parsed on the literal `"ID: "` marker; anything
/// without it (including the `END_OF_LIST` terminator) yields `None`.
pub fn parse_catalog_line(line: &str) -> Option<(String, String)> {
    let (head, id) = line.split_once("ID: ")?;
    let name = head
        .strip_prefix("Name: ")?
        .trim_end()
        .trim_end_matches(',')
        .to_owned();
    Some((name, id.trim().to_owned()))
}

/// A parsed `TOKEN <id> <host> <port>` grant line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub host: String,
    pub port: u16,
}

impl TokenGrant {
    pub fn new(token: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            token: token.into(),
            host: host.into(),
            port,
        }
    }

    /// Parses a grant line; `None` if the line is not a well-formed grant.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(TOKEN_PREFIX)?;
        let mut parts = rest.split_ascii_whitespace();
        let token = parts.next()?.to_owned();
        let host = parts.next()?.to_owned();
        let port = parts.next()?.parse().ok()?;
        Some(Self { token, host, port })
    }

    pub fn to_line(&self) -> String {
        format!("TOKEN {} {} {}", self.token, self.host, self.port)
    }
}
