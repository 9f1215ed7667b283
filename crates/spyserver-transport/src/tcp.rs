//! TCP transport for SpyServer connections.
//!
//! This module provides [`TcpTransport`], a connected TCP stream to a
//! SpyServer instance (default port 5555). The SpyServer protocol client
//! reads frames on a background task while commands are written from the
//! caller, so the transport is consumed with
//! [`into_halves`](TcpTransport::into_halves) once connected.
//!
//! # Example
//!
//! ```no_run
//! use spyserver_transport::TcpTransport;
//!
//! # async fn example() -> spyserver_core::Result<()> {
//! let transport = TcpTransport::connect("192.168.1.50:5555").await?;
//! let halves = transport.into_halves();
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use spyserver_core::error::{Error, Result};
use spyserver_core::transport::TransportHalves;
use tokio::net::TcpStream;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected TCP stream to a SpyServer.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    /// The address string for logging/debugging.
    addr: String,
}

impl TcpTransport {
    /// Connect to a TCP endpoint using the default timeout.
    ///
    /// The `addr` parameter should be a `host:port` string, e.g.,
    /// `"192.168.1.50:5555"` or `"localhost:5555"`.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a TCP endpoint with a specified timeout.
    ///
    /// Returns [`Error::Timeout`] if the connection is not established in
    /// time and [`Error::Transport`] if it is refused.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "TCP connection failed");
                map_connect_error(e, addr)
            })?;

        // Commands are a handful of bytes; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "TCP connection established");

        Ok(Self {
            stream,
            addr: addr.to_string(),
        })
    }

    /// Wrap an existing `TcpStream` as a `TcpTransport`.
    ///
    /// Useful when the connection was accepted from a listener, e.g. in
    /// tests.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        tracing::debug!(addr = %addr, "Wrapping existing TCP stream");
        Self { stream, addr }
    }

    /// Get the address string this transport was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Split into owned read/write halves for the protocol client.
    pub fn into_halves(self) -> TransportHalves {
        let (read, write) = self.stream.into_split();
        TransportHalves::new(read, write, self.addr)
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
///
/// Resets, broken pipes, and aborted connections all mean the server is
/// gone; anything else is passed through as [`Error::Io`].
pub fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Helper: bind a TcpListener on a random available port and return it
    /// along with its address string.
    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn connect_and_echo_through_halves() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
            stream.flush().await.unwrap();
        });

        let transport = TcpTransport::connect(&addr).await.unwrap();
        assert_eq!(transport.addr(), addr);

        let mut halves = transport.into_halves();
        assert_eq!(halves.peer, addr);
        halves.write.write_all(b"hello").await.unwrap();
        halves.write.flush().await.unwrap();

        let mut buf = [0u8; 5];
        halves.read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpTransport::connect(&addr).await.unwrap_err();
        match &err {
            Error::Transport(msg) => assert!(
                msg.contains("connection refused"),
                "expected 'connection refused' in message, got: {}",
                msg
            ),
            other => panic!("expected Transport error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_timeout_to_nonexistent_host() {
        // RFC 5737 TEST-NET-1 is black-holed rather than refused.
        let result =
            TcpTransport::connect_with_timeout("192.0.2.1:5555", Duration::from_millis(100)).await;
        let err = result.unwrap_err();
        assert!(
            matches!(err, Error::Timeout | Error::Io(_)),
            "expected Timeout or Io, got: {:?}",
            err
        );
    }

    #[tokio::test]
    async fn from_stream_keeps_label() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
        });

        let raw = TcpStream::connect(&addr).await.unwrap();
        let transport = TcpTransport::from_stream(raw, "mock".to_string());
        assert_eq!(transport.addr(), "mock");
        server.await.unwrap();
    }

    #[test]
    fn io_error_mapping() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(map_io_error(reset), Error::ConnectionLost));

        let other = std::io::Error::other("boom");
        assert!(matches!(map_io_error(other), Error::Io(_)));
    }
}
