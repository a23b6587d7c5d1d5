//! Command-line configuration for the server and client binaries.
//!
//! Every option is a `--key=value` token; the key names (including the
//! single-letter tuning knobs) are part of the deployment interface and are
//! kept verbatim as the long option names.

use clap::Parser;
use std::path::PathBuf;

/// Options of the central block-distribution server.
#[derive(Debug, Clone, Parser)]
#[command(name = "blockrelay-server", about = "Peer-assisted block file server")]
pub struct ServerConfig {
    /// TCP port to listen on.
    #[arg(long)]
    pub port: u16,

    /// Maximum number of concurrently served connections.
    #[arg(long = "Cs", default_value_t = 5)]
    pub pool_size: usize,

    /// Probability of closing one random connection per chaos tick.
    #[arg(long = "P", default_value_t = 0.2)]
    pub disconnect_probability: f64,

    /// Chaos tick interval, in seconds.
    #[arg(long = "T", default_value_t = 10)]
    pub disconnect_period_secs: u64,

    /// Block size in bytes.
    #[arg(long = "B", default_value_t = 100)]
    pub block_size: usize,

    /// Directory containing the served files.
    #[arg(long = "filesDir", default_value = "files")]
    pub files_dir: PathBuf,
}

/// Options of the downloading client (and its trusted-peer server).
#[derive(Debug, Clone, Parser)]
#[command(name = "blockrelay-client", about = "Peer-assisted block file client")]
pub struct ClientConfig {
    /// Port the trusted-peer server listens on after a verified download.
    #[arg(long)]
    pub port: u16,

    /// Host of the central server.
    #[arg(long = "serverHost", default_value = "localhost")]
    pub server_host: String,

    /// Port of the central server.
    #[arg(long = "serverPort", default_value_t = 12345)]
    pub server_port: u16,

    /// File id (SHA-256 hex) to download, or "random".
    #[arg(long, default_value = "random")]
    pub file: String,

    /// Number of parallel download workers.
    #[arg(long = "Dc", default_value_t = 1)]
    pub workers: usize,

    /// Probability of denying an incoming token request.
    #[arg(long = "Pc", default_value_t = 0.2)]
    pub deny_probability: f64,

    /// Block size in bytes.
    #[arg(long = "B", default_value_t = 100)]
    pub block_size: usize,

    /// Directory downloads are saved to. Defaults to a per-port directory
    /// so several clients can run side by side.
    #[arg(long = "filesDir")]
    pub files_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn resolved_files_dir(&self) -> PathBuf {
        self.files_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("downloads/client_{}", self.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::try_parse_from(["blockrelay-server", "--port=12345"]).unwrap();
        assert_eq!(config.port, 12345);
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.disconnect_probability, 0.2);
        assert_eq!(config.disconnect_period_secs, 10);
        assert_eq!(config.block_size, 100);
        assert_eq!(config.files_dir, PathBuf::from("files"));
    }

    #[test]
    fn test_server_overrides() {
        let config = ServerConfig::try_parse_from([
            "blockrelay-server",
            "--port=9000",
            "--Cs=2",
            "--P=0.5",
            "--T=1",
            "--B=64",
            "--filesDir=/tmp/served",
        ])
        .unwrap();
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.disconnect_probability, 0.5);
        assert_eq!(config.disconnect_period_secs, 1);
        assert_eq!(config.block_size, 64);
        assert_eq!(config.files_dir, PathBuf::from("/tmp/served"));
    }

    #[test]
    fn test_server_requires_port() {
        assert!(ServerConfig::try_parse_from(["blockrelay-server"]).is_err());
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::try_parse_from(["blockrelay-client", "--port=9001"]).unwrap();
        assert_eq!(config.server_host, "localhost");
        assert_eq!(config.server_port, 12345);
        assert_eq!(config.file, "random");
        assert_eq!(config.workers, 1);
        assert_eq!(config.deny_probability, 0.2);
        assert_eq!(
            config.resolved_files_dir(),
            PathBuf::from("downloads/client_9001")
        );
    }

    #[test]
    fn test_client_overrides() {
        let config = ClientConfig::try_parse_from([
            "blockrelay-client",
            "--port=9001",
            "--serverHost=filehub.local",
            "--serverPort=4000",
            "--file=deadbeef",
            "--Dc=8",
            "--Pc=1.0",
            "--filesDir=/tmp/downloads",
        ])
        .unwrap();
        assert_eq!(config.server_host, "filehub.local");
        assert_eq!(config.server_port, 4000);
        assert_eq!(config.file, "deadbeef");
        assert_eq!(config.workers, 8);
        assert_eq!(config.deny_probability, 1.0);
        assert_eq!(config.resolved_files_dir(), PathBuf::from("/tmp/downloads"));
    }
}
