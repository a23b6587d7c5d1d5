use super::*;
use crate::proto::{self, TokenGrant, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::time::sleep;

async fn start_peer(
    file_id: &str,
    path: PathBuf,
    deny_probability: f64,
) -> (Arc<TrustedPeerServer>, u16) {
    let served = Arc::new(ServedFiles::new());
    served.register(file_id, path);
    let peer = Arc::new(
        TrustedPeerServer::bind(0, served, deny_probability, 100)
            .await
            .unwrap(),
    );
    let port = peer.local_addr().unwrap().port();
    tokio::spawn(peer.clone().run());
    (peer, port)
}

async fn connect(port: u16) -> Transport<TcpStream> {
    Transport::connect(("127.0.0.1", port)).await.unwrap()
}

fn test_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_token_grant_serves_many_blocks() {
    let temp = TempDir::new().unwrap();
    let data = test_bytes(250);
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, &data).unwrap();

    let (peer, port) = start_peer("fid", path, 0.0).await;
    let mut conn = connect(port).await;

    conn.send_line("TOKEN_REQUEST fid").await.unwrap();
    let reply = conn.read_line().await.unwrap().unwrap();
    let grant = TokenGrant::parse(&reply).expect("expected a token grant");
    assert_eq!(grant.port, port);
    assert_eq!(peer.helped_count(), 1);

    // The token is multi-use: pull every block, then read past the end.
    let expected = [&data[0..100], &data[100..200], &data[200..250]];
    for (index, want) in expected.iter().enumerate() {
        conn.send_line(&format!("DOWNLOAD_TOKEN {} fid {index}", grant.token))
            .await
            .unwrap();
        assert_eq!(conn.read_line().await.unwrap().unwrap(), proto::SENDING);
        assert_eq!(conn.read_frame().await.unwrap().as_ref(), *want);
    }

    conn.send_line(&format!("DOWNLOAD_TOKEN {} fid 3", grant.token))
        .await
        .unwrap();
    assert_eq!(conn.read_line().await.unwrap().unwrap(), proto::SENDING);
    assert!(conn.read_frame().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_request_denied_closes_connection() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, b"data").unwrap();

    let (peer, port) = start_peer("fid", path, 1.0).await;
    let mut conn = connect(port).await;

    conn.send_line("TOKEN_REQUEST fid").await.unwrap();
    assert_eq!(
        conn.read_line().await.unwrap().unwrap(),
        proto::TOKEN_DENIED
    );
    assert!(conn.read_line().await.unwrap().is_none());
    assert_eq!(peer.denied_count(), 1);
    assert_eq!(peer.helped_count(), 0);
}

#[tokio::test]
async fn test_token_request_for_unknown_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, b"data").unwrap();

    let (_peer, port) = start_peer("fid", path, 0.0).await;
    let mut conn = connect(port).await;

    conn.send_line("TOKEN_REQUEST otherfile").await.unwrap();
    let reply = conn.read_line().await.unwrap().unwrap();
    assert!(reply.starts_with(proto::ERROR_PREFIX));

    // The connection survives the error.
    conn.send_line("TOKEN_REQUEST fid").await.unwrap();
    let reply = conn.read_line().await.unwrap().unwrap();
    assert!(TokenGrant::parse(&reply).is_some());
}

#[tokio::test]
async fn test_unknown_token_is_invalid() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, b"data").unwrap();

    let (_peer, port) = start_peer("fid", path, 0.0).await;
    let mut conn = connect(port).await;

    conn.send_line("DOWNLOAD_TOKEN feedfacefeedface fid 0")
        .await
        .unwrap();
    assert_eq!(
        conn.read_line().await.unwrap().unwrap(),
        proto::INVALID_TOKEN
    );
}

#[tokio::test]
async fn test_token_file_id_mismatch_is_invalid() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, b"data").unwrap();

    let (peer, port) = start_peer("fid", path, 0.0).await;
    let token = peer.tokens().mint("fid");

    let mut conn = connect(port).await;
    conn.send_line(&format!("DOWNLOAD_TOKEN {token} otherfile 0"))
        .await
        .unwrap();
    assert_eq!(
        conn.read_line().await.unwrap().unwrap(),
        proto::INVALID_TOKEN
    );
}

#[tokio::test]
async fn test_expired_token_is_invalid() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, b"data").unwrap();

    let (peer, port) = start_peer("fid", path, 0.0).await;
    let token = peer.tokens().mint_with_ttl("fid", Duration::from_millis(20));

    sleep(Duration::from_millis(60)).await;

    let mut conn = connect(port).await;
    conn.send_line(&format!("DOWNLOAD_TOKEN {token} fid 0"))
        .await
        .unwrap();
    assert_eq!(
        conn.read_line().await.unwrap().unwrap(),
        proto::INVALID_TOKEN
    );
}

#[tokio::test]
async fn test_unknown_and_malformed_commands() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("copy.bin");
    std::fs::write(&path, b"data").unwrap();

    let (_peer, port) = start_peer("fid", path, 0.0).await;
    let mut conn = connect(port).await;

    conn.send_line("FROBNICATE").await.unwrap();
    assert_eq!(
        conn.read_line().await.unwrap().unwrap(),
        proto::UNKNOWN_COMMAND
    );

    conn.send_line("DOWNLOAD_TOKEN missing args").await.unwrap();
    let reply = conn.read_line().await.unwrap().unwrap();
    assert!(reply.starts_with(proto::ERROR_PREFIX));
}
