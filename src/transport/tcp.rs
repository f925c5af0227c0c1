use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use super::{Connector, MAX_REPLY_BYTES, ReplyTooLong, Transport};

/// Opens plain TCP connections. Deadlines are enforced by the session, not here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpTransport> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport {
            stream: BufStream::new(stream),
        })
    }
}

#[derive(Debug)]
pub struct TcpTransport {
    stream: BufStream<TcpStream>,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = line.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.stream.write_all(&data).await?;
        self.stream.flush().await
    }

    /// Reads lines until the last line of a (possibly multi-line) reply, i.e.
    /// a line whose fourth byte is not `-`. The raw text, CRLFs included, is
    /// returned untouched apart from lossy decoding of non-UTF-8 bytes.
    /// More than [`MAX_REPLY_BYTES`] fails with [`ReplyTooLong`].
    async fn read_payload(&mut self) -> io::Result<String> {
        let mut payload = Vec::new();
        loop {
            let remaining = MAX_REPLY_BYTES.saturating_sub(payload.len());
            if remaining == 0 {
                return Err(ReplyTooLong::io_error());
            }
            let mut line = Vec::new();
            let read = (&mut self.stream)
                .take(remaining as u64)
                .read_until(b'\n', &mut line)
                .await?;
            if read == 0 {
                if payload.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed while reading reply",
                    ));
                }
                return Ok(decode(&payload));
            }
            if read == remaining && line.last() != Some(&b'\n') {
                return Err(ReplyTooLong::io_error());
            }
            let continuation = line.get(3) == Some(&b'-');
            payload.extend_from_slice(&line);
            if !continuation {
                return Ok(decode(&payload));
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
