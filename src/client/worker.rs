use super::error::ClientError;
use crate::proto::{TokenGrant, Transport, SENDING};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// One block worker of a download attempt.
///
/// Worker `w` of `stride` workers requests blocks `w, w+stride, w+2*stride, ...`
/// over its own server connection, so every index is attempted by exactly
/// one worker. An empty `SENDING` frame means the file has no block at this
/// index and the worker is done. A `TOKEN` reply redirects the worker to a
/// trusted peer, where it keeps pulling its remaining indices until the peer
/// ends the stream. Any other reply, or any transport error, ends the worker;
/// the engine's retry loop covers whatever it left behind.
pub(crate) async fn run(
    server_host: String,
    server_port: u16,
    file_id: String,
    first_block: u64,
    stride: u64,
    blocks: Arc<DashMap<u64, Bytes>>,
) -> Result<(), ClientError> {
    let mut transport = Transport::connect((server_host.as_str(), server_port)).await?;
    let mut index = first_block;

    loop {
        transport
            .send_line(&format!("DOWNLOAD {file_id} {index}"))
            .await?;

        let Some(reply) = transport.read_line().await? else {
            return Ok(());
        };

        if reply == SENDING {
            let payload = transport.read_frame().await?;
            if payload.is_empty() {
                return Ok(());
            }
            blocks.insert(index, payload);
            index += stride;
        } else if let Some(grant) = TokenGrant::parse(&reply) {
            debug!(block = index, peer = %grant.host, port = grant.port,
                "worker redirected to trusted peer");
            return pull_from_peer(grant, &file_id, index, stride, blocks).await;
        } else {
            debug!(block = index, %reply, "worker stopping on server reply");
            return Ok(());
        }
    }
}

async fn pull_from_peer(
    grant: TokenGrant,
    file_id: &str,
    mut index: u64,
    stride: u64,
    blocks: Arc<DashMap<u64, Bytes>>,
) -> Result<(), ClientError> {
    let mut transport = Transport::connect((grant.host.as_str(), grant.port)).await?;

    loop {
        transport
            .send_line(&format!("DOWNLOAD_TOKEN {} {file_id} {index}", grant.token))
            .await?;

        let Some(reply) = transport.read_line().await? else {
            return Ok(());
        };

        if reply != SENDING {
            debug!(block = index, %reply, "peer ended token stream");
            return Ok(());
        }

        let payload = transport.read_frame().await?;
        if payload.is_empty() {
            return Ok(());
        }
        blocks.insert(index, payload);
        index += stride;
    }
}
