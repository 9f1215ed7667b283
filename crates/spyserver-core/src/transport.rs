//! Byte-stream transport halves consumed by the protocol client.
//!
//! The client needs to read frames on a background task while commands are
//! written from the caller's task, so a transport is handed over already
//! split into a read half and a write half. [`TransportHalves`] accepts any
//! `AsyncRead`/`AsyncWrite` pair: the TCP transport in
//! `spyserver-transport`, or an in-memory `tokio::io::duplex()` pair in
//! tests.

use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed read half of a transport.
pub type TransportReader = Box<dyn AsyncRead + Unpin + Send + 'static>;

/// Boxed write half of a transport.
pub type TransportWriter = Box<dyn AsyncWrite + Unpin + Send + 'static>;

/// A connected byte stream, split for concurrent reading and writing.
pub struct TransportHalves {
    /// Read half; owned by the client's receive task.
    pub read: TransportReader,
    /// Write half; shared by command senders.
    pub write: TransportWriter,
    /// Label used in log output (typically the peer address).
    pub peer: String,
}

impl TransportHalves {
    /// Wrap an existing read/write pair.
    pub fn new<R, W>(read: R, write: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            read: Box::new(read),
            write: Box::new(write),
            peer: peer.into(),
        }
    }

    /// Split a single bidirectional stream into halves.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::new(read, write, peer)
    }
}

impl std::fmt::Debug for TransportHalves {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHalves")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
