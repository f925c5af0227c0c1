//! Byte-stream collaborator used by probe sessions.
//!
//! Sessions only need four things from a transport: connect, write one
//! command line, wait for the next response payload, and close. [`TcpConnector`]
//! provides them over plain TCP; tests substitute scripted transports.

mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::io;

use async_trait::async_trait;

pub use tcp::{TcpConnector, TcpTransport};

/// Upper bound on one reply, continuation lines included.
pub const MAX_REPLY_BYTES: usize = 8 * 1024;

/// Carried inside an `io::Error` of kind `InvalidData` when a server sends
/// more than [`MAX_REPLY_BYTES`] without finishing its reply.
#[derive(Debug, thiserror::Error)]
#[error("reply exceeds {limit} bytes")]
pub struct ReplyTooLong {
    pub limit: usize,
}

impl ReplyTooLong {
    pub(crate) fn io_error() -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            Self {
                limit: MAX_REPLY_BYTES,
            },
        )
    }

    /// True when `err` was produced by [`ReplyTooLong::io_error`].
    pub fn is_cause_of(err: &io::Error) -> bool {
        err.get_ref().is_some_and(|inner| inner.is::<Self>())
    }
}

#[async_trait]
pub trait Transport: Send {
    /// Writes `line` followed by CRLF.
    async fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Waits for the next complete response payload from the server.
    async fn read_payload(&mut self) -> io::Result<String>;

    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Transport>;
}
