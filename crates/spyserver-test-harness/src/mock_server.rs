//! Mock SpyServer for protocol-level testing over real TCP.
//!
//! [`MockSpyServer`] listens on a random localhost port and, once started,
//! accepts a single connection and plays a script: wait for the client's
//! HELLO, send frames, pause, or hang up. Everything the client writes is
//! recorded and can be inspected as [`RecordedCommand`]s.
//!
//! # Example
//!
//! ```
//! use spyserver_test_harness::MockSpyServer;
//! use spyserver_test_harness::frames::{airspy_one_info, device_info_frame};
//!
//! # async fn example() -> spyserver_core::Result<()> {
//! let mut server = MockSpyServer::new().await?;
//! server.wait_for_hello();
//! server.push(device_info_frame(&airspy_one_info()));
//! server.start();
//! // ... connect a client to server.host() / server.port() ...
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use spyserver_core::error::{Error, Result};

use crate::frames::{RecordedCommand, parse_commands};

/// Poll interval while waiting for client commands.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One scripted server action.
#[derive(Debug, Clone)]
enum Step {
    /// Write these bytes to the client.
    Send(Vec<u8>),
    /// Sleep before the next step.
    Pause(Duration),
    /// Block until the client has written at least this many commands.
    WaitForCommands(usize),
    /// Hang up.
    Close,
}

/// A scripted single-connection SpyServer.
pub struct MockSpyServer {
    listener: Option<TcpListener>,
    host: String,
    port: u16,
    addr: String,
    steps: Vec<Step>,
    received: Arc<Mutex<Vec<u8>>>,
    cancel: CancellationToken,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockSpyServer {
    /// Bind a listener on a random localhost port.
    ///
    /// No connection is accepted until [`start`](Self::start) is called, so
    /// the script can be loaded first.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock SpyServer: {}", e)))?;
        let local = listener.local_addr().map_err(Error::Io)?;

        Ok(Self {
            listener: Some(listener),
            host: local.ip().to_string(),
            port: local.port(),
            addr: local.to_string(),
            steps: Vec::new(),
            received: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
            server_handle: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` the server listens on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Queue bytes to send to the client.
    pub fn push(&mut self, frame: Vec<u8>) -> &mut Self {
        self.steps.push(Step::Send(frame));
        self
    }

    /// Queue a delay.
    pub fn pause(&mut self, duration: Duration) -> &mut Self {
        self.steps.push(Step::Pause(duration));
        self
    }

    /// Queue a wait for the client's handshake.
    pub fn wait_for_hello(&mut self) -> &mut Self {
        self.wait_for_commands(1)
    }

    /// Queue a wait until the client has sent `count` commands in total.
    pub fn wait_for_commands(&mut self, count: usize) -> &mut Self {
        self.steps.push(Step::WaitForCommands(count));
        self
    }

    /// Queue a hang-up. Later steps are not run.
    pub fn close_connection(&mut self) -> &mut Self {
        self.steps.push(Step::Close);
        self
    }

    /// Start serving in a background task.
    ///
    /// After the script finishes the connection is held open until
    /// [`shutdown`](Self::shutdown) (unless the script closed it).
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!(addr = %self.addr, "Mock SpyServer already started");
            return;
        };
        let steps = std::mem::take(&mut self.steps);
        let received = Arc::clone(&self.received);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = serve(listener, steps, received, cancel.clone()) => result,
            }
        });
        self.server_handle = Some(handle);
    }

    /// Commands received so far.
    pub async fn received_commands(&self) -> Vec<RecordedCommand> {
        parse_commands(&self.received.lock().await)
    }

    /// Wait until a received command satisfies `predicate`.
    pub async fn wait_for_command<F>(&self, timeout: Duration, predicate: F) -> Option<RecordedCommand>
    where
        F: Fn(&RecordedCommand) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.received_commands().await.into_iter().find(|c| predicate(c)) {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop the server and report any script error.
    pub async fn shutdown(mut self) -> std::result::Result<(), String> {
        self.cancel.cancel();
        match self.server_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}

impl Drop for MockSpyServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(
    listener: TcpListener,
    steps: Vec<Step>,
    received: Arc<Mutex<Vec<u8>>>,
    cancel: CancellationToken,
) -> std::result::Result<(), String> {
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| format!("failed to accept connection: {}", e))?;
    tracing::debug!(peer = %peer, "Mock SpyServer accepted connection");

    let (mut read, mut write) = stream.into_split();

    let recorder = {
        let received = Arc::clone(&received);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let n = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = read.read(&mut buf) => match result {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    },
                };
                received.lock().await.extend_from_slice(&buf[..n]);
            }
        })
    };

    for (i, step) in steps.into_iter().enumerate() {
        match step {
            Step::Send(bytes) => {
                write
                    .write_all(&bytes)
                    .await
                    .map_err(|e| format!("step {}: write error: {}", i, e))?;
                write
                    .flush()
                    .await
                    .map_err(|e| format!("step {}: flush error: {}", i, e))?;
            }
            Step::Pause(duration) => tokio::time::sleep(duration).await,
            Step::WaitForCommands(count) => {
                while parse_commands(&received.lock().await).len() < count {
                    if recorder.is_finished() {
                        return Err(format!(
                            "step {}: client disconnected before sending {} commands",
                            i, count
                        ));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
            Step::Close => {
                recorder.abort();
                tracing::debug!(peer = %peer, "Mock SpyServer closing connection");
                return Ok(());
            }
        }
    }

    cancel.cancelled().await;
    recorder.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{airspy_one_info, device_info_frame};
    use spyserver_core::protocol::{
        CommandType, DeviceInfo, MessageHeader, PROTOCOL_VERSION, encode_command, handshake_body,
    };
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn scripted_frames_follow_hello() {
        let mut server = MockSpyServer::new().await.unwrap();
        server.wait_for_hello();
        server.push(device_info_frame(&airspy_one_info()));
        server.start();

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        stream
            .write_all(&encode_command(
                CommandType::Hello,
                &handshake_body(PROTOCOL_VERSION, "probe"),
            ))
            .await
            .unwrap();

        let mut frame = vec![0u8; MessageHeader::SIZE + DeviceInfo::SIZE];
        stream.read_exact(&mut frame).await.unwrap();
        let info = DeviceInfo::decode(&frame[MessageHeader::SIZE..]).unwrap();
        assert_eq!(info, airspy_one_info());

        let hello = server
            .wait_for_command(Duration::from_secs(2), |c| c.is_hello())
            .await
            .unwrap();
        assert_eq!(hello.app_name().as_deref(), Some("probe"));

        drop(stream);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn pause_delays_later_frames() {
        let mut server = MockSpyServer::new().await.unwrap();
        server
            .pause(Duration::from_millis(50))
            .push(device_info_frame(&airspy_one_info()));
        server.start();

        let started = tokio::time::Instant::now();
        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        let mut frame = vec![0u8; MessageHeader::SIZE + DeviceInfo::SIZE];
        stream.read_exact(&mut frame).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));

        drop(stream);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn close_step_hangs_up() {
        let mut server = MockSpyServer::new().await.unwrap();
        server.close_connection();
        server.start();

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        let mut buf = [0u8; 1];
        let n = stream.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn address_parts() {
        let server = MockSpyServer::new().await.unwrap();
        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.addr(), format!("127.0.0.1:{}", server.port()));
    }
}
