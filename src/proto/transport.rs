use super::error::ProtoError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;

const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
const MAX_LINE_LEN: usize = 4 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Byte-level framer for the mixed text/binary protocol.
///
/// One stream interleaves newline-terminated command lines with binary block
/// frames (a 4-byte big-endian length followed by exactly that many bytes).
/// All reads go through a single internal buffer: [`read_line`] consumes up
/// to and including the newline, and whatever arrived after it stays buffered
/// for the next [`read_line`] or [`read_frame`] call. A line-buffered reader
/// layered on the raw stream would swallow frame bytes; this type is the only
/// reader a connection gets.
///
/// [`read_line`]: Transport::read_line
/// [`read_frame`]: Transport::read_frame
pub struct Transport<S> {
    stream: S,
    read_buf: BytesMut,
}

impl Transport<TcpStream> {
    /// Connects to a remote endpoint and wraps the stream.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ProtoError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.local_addr()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Transport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Reads one command line, without the terminator.
    ///
    /// Accepts `\n` and tolerates `\r\n`. Returns `Ok(None)` on a clean end
    /// of stream between messages; EOF in the middle of a line is an error.
    pub async fn read_line(&mut self) -> Result<Option<String>, ProtoError> {
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
                let mut line = self.read_buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                let text =
                    String::from_utf8(line.to_vec()).map_err(|_| ProtoError::InvalidLine)?;
                return Ok(Some(text));
            }

            if self.read_buf.len() > MAX_LINE_LEN {
                return Err(ProtoError::LineTooLong);
            }

            let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ProtoError::Timeout)??;

            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtoError::ConnectionClosed);
            }
        }
    }

    /// Writes one command line followed by `\n`.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ProtoError> {
        let mut out = BytesMut::with_capacity(line.len() + 1);
        out.put_slice(line.as_bytes());
        out.put_u8(b'\n');
        timeout(WRITE_TIMEOUT, self.stream.write_all(&out))
            .await
            .map_err(|_| ProtoError::Timeout)??;
        Ok(())
    }

    /// Reads one length-prefixed binary frame.
    ///
    /// The length is a 4-byte big-endian unsigned integer read from the same
    /// stream position the preceding line ended at. A zero length yields an
    /// empty payload.
    pub async fn read_frame(&mut self) -> Result<Bytes, ProtoError> {
        while self.read_buf.len() < 4 {
            self.fill().await?;
        }

        let length = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(ProtoError::FrameTooLarge(length));
        }

        let total = 4 + length;
        while self.read_buf.len() < total {
            self.fill().await?;
        }

        let mut data = self.read_buf.split_to(total);
        data.advance(4);
        Ok(data.freeze())
    }

    /// Writes one length-prefixed binary frame.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<(), ProtoError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtoError::FrameTooLarge(payload.len()));
        }
        let mut out = BytesMut::with_capacity(4 + payload.len());
        out.put_u32(payload.len() as u32);
        out.put_slice(payload);
        timeout(WRITE_TIMEOUT, self.stream.write_all(&out))
            .await
            .map_err(|_| ProtoError::Timeout)??;
        Ok(())
    }

    async fn fill(&mut self) -> Result<(), ProtoError> {
        let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
            .await
            .map_err(|_| ProtoError::Timeout)??;
        if n == 0 {
            return Err(ProtoError::ConnectionClosed);
        }
        Ok(())
    }
}
