//! In-memory transport for driving a client without a socket.
//!
//! [`duplex_transport`] returns the client's [`TransportHalves`] together
//! with a [`MockPeer`] holding the server end of a `tokio::io::duplex`
//! pipe. The test writes server frames through the peer (in whatever chunks
//! it likes) and reads back the commands the client sent.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};

use spyserver_core::transport::TransportHalves;

use crate::frames::{self, RecordedCommand};

/// Bytes buffered in each direction of the pipe.
const DUPLEX_BUFFER_SIZE: usize = 256 * 1024;

/// How long [`MockPeer::read_command`] waits before giving up.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Peer label reported by the client side.
pub const DUPLEX_PEER: &str = "duplex";

/// Create a connected client/server pipe.
pub fn duplex_transport() -> (TransportHalves, MockPeer) {
    let (client, server) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);
    (
        TransportHalves::from_stream(client, DUPLEX_PEER),
        MockPeer { stream: server },
    )
}

/// Server end of a [`duplex_transport`] pipe.
#[derive(Debug)]
pub struct MockPeer {
    stream: DuplexStream,
}

impl MockPeer {
    /// Write raw bytes to the client.
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Read the next complete command the client wrote.
    ///
    /// Fails with `TimedOut` if nothing arrives within two seconds.
    pub async fn read_command(&mut self) -> io::Result<RecordedCommand> {
        match tokio::time::timeout(READ_TIMEOUT, self.read_command_inner()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no command from client",
            )),
        }
    }

    /// Read a command if one arrives within `timeout`.
    pub async fn try_read_command(&mut self, timeout: Duration) -> Option<RecordedCommand> {
        tokio::time::timeout(timeout, self.read_command_inner())
            .await
            .ok()
            .and_then(|result| result.ok())
    }

    /// Close the server-to-client direction; the client sees end of stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    async fn read_command_inner(&mut self) -> io::Result<RecordedCommand> {
        frames::read_command(&mut self.stream).await
    }
}
