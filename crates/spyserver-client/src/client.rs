//! SpyServer protocol client.
//!
//! [`SpyServerClient`] owns one connection to a SpyServer. On construction
//! it sends the HELLO handshake and spawns a background receive task that
//! reads one message header, then exactly `BodySize` body bytes, dispatches
//! the frame, and repeats until the transport fails or reaches end of
//! stream.
//!
//! Dispatch updates two metadata snapshots (DEVICE_INFO and CLIENT_SYNC),
//! each published through its own `watch` channel so any number of callers
//! can wait for it, and decodes IQ messages into [`SampleBatch`]es that are
//! moved into the caller's [`SampleQueue`]. Frame-local problems (short
//! metadata, INT24 samples, unknown kinds) are logged and absorbed; a
//! transport error or EOF ends the receive task and marks the client
//! closed. There is no automatic reconnect.
//!
//! This is a pure protocol client -- the device-level view (sample-rate
//! tables, permission checks, stream lifecycle) lives in
//! [`SpyServerDevice`](crate::device::SpyServerDevice).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use spyserver_core::error::{Error, Result};
use spyserver_core::protocol::{
    self, ClientSync, CommandType, DeviceInfo, MAX_COMMAND_BODY_SIZE, MAX_MESSAGE_BODY_SIZE,
    MessageHeader, MessageKind, PROTOCOL_VERSION, Setting, StreamFormat, StreamType,
};
use spyserver_core::sample::SampleQueue;
use spyserver_core::transport::{TransportHalves, TransportReader, TransportWriter};
use spyserver_transport::{TcpTransport, map_io_error};

use crate::codec;

/// Application name sent in the HELLO handshake by default.
pub const DEFAULT_APP_NAME: &str = "spyserver-rs";

/// Default TCP connect timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for configuring a [`SpyServerClient`] connection.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Application name announced in the handshake.
    pub app_name: String,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Counters maintained by the receive task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Complete frames read from the transport.
    pub frames_received: u64,
    /// Sample batches moved into the output queue.
    pub batches_enqueued: u64,
    /// Complex samples contained in those batches.
    pub samples_enqueued: u64,
    /// Frames of a kind this client does not consume (FFT, AF, PONG, ...).
    pub frames_ignored: u64,
    /// Frames dropped because they could not be decoded (INT24 samples,
    /// truncated metadata).
    pub frames_rejected: u64,
}

#[derive(Debug, Default)]
struct FrameCounters {
    frames_received: AtomicU64,
    batches_enqueued: AtomicU64,
    samples_enqueued: AtomicU64,
    frames_ignored: AtomicU64,
    frames_rejected: AtomicU64,
}

impl FrameCounters {
    fn snapshot(&self) -> ClientStats {
        ClientStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            samples_enqueued: self.samples_enqueued.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Write half plus the scratch buffer commands are encoded into.
struct CommandWriter {
    sink: TransportWriter,
    buf: BytesMut,
}

/// SpyServer protocol client.
///
/// All methods take `&self`; the client can be shared across tasks behind
/// an `Arc`. Dropping the client stops the receive task.
pub struct SpyServerClient {
    /// Write half of the transport, `None` once closed.
    writer: Mutex<Option<CommandWriter>>,

    /// Latest DEVICE_INFO, `None` until the first one arrives.
    device_info: watch::Receiver<Option<DeviceInfo>>,

    /// Latest CLIENT_SYNC, `None` until the first one arrives.
    client_sync: watch::Receiver<Option<ClientSync>>,

    /// Destination for decoded sample batches.
    queue: Arc<SampleQueue>,

    counters: Arc<FrameCounters>,

    /// Connection state flag (atomic for lock-free reads).
    connected: Arc<AtomicBool>,

    /// Background receive task handle.
    read_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,

    /// Peer label for logging.
    peer: String,
}

impl SpyServerClient {
    /// Connect to a SpyServer at the given host and port.
    ///
    /// Decoded samples are pushed into `queue`. Connection failures are
    /// returned as errors; no client is created.
    pub async fn connect(host: &str, port: u16, queue: Arc<SampleQueue>) -> Result<Self> {
        Self::connect_with_options(host, port, queue, ClientOptions::default()).await
    }

    /// Connect with custom options.
    pub async fn connect_with_options(
        host: &str,
        port: u16,
        queue: Arc<SampleQueue>,
        options: ClientOptions,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let transport = TcpTransport::connect_with_timeout(&addr, options.connect_timeout).await?;
        Self::from_transport(transport.into_halves(), queue, options).await
    }

    /// Start a client over an already-connected transport.
    ///
    /// Sends the handshake, then starts the receive task.
    pub async fn from_transport(
        halves: TransportHalves,
        queue: Arc<SampleQueue>,
        options: ClientOptions,
    ) -> Result<Self> {
        let TransportHalves { read, write, peer } = halves;

        let (device_info_tx, device_info_rx) = watch::channel(None);
        let (client_sync_tx, client_sync_rx) = watch::channel(None);
        let counters = Arc::new(FrameCounters::default());
        let connected = Arc::new(AtomicBool::new(true));

        let client = SpyServerClient {
            writer: Mutex::new(Some(CommandWriter {
                sink: write,
                buf: BytesMut::with_capacity(MAX_COMMAND_BODY_SIZE + 8),
            })),
            device_info: device_info_rx,
            client_sync: client_sync_rx,
            queue: Arc::clone(&queue),
            counters: Arc::clone(&counters),
            connected: Arc::clone(&connected),
            read_handle: parking_lot::Mutex::new(None),
            peer: peer.clone(),
        };

        client.send_handshake(&options.app_name).await?;

        let sinks = FrameSinks {
            device_info: device_info_tx,
            client_sync: client_sync_tx,
            queue,
            counters,
        };
        let handle = tokio::spawn(async move {
            read_loop(read, sinks, connected, peer).await;
        });
        *client.read_handle.lock() = Some(handle);

        tracing::debug!(peer = %client.peer, app = %options.app_name, "SpyServer client started");
        Ok(client)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Ask the server to start streaming.
    pub async fn start_stream(&self) -> Result<()> {
        self.set_setting(Setting::StreamingEnabled, 1).await
    }

    /// Ask the server to stop streaming.
    pub async fn stop_stream(&self) -> Result<()> {
        self.set_setting(Setting::StreamingEnabled, 0).await
    }

    /// Send a SET_SETTING command. No acknowledgement is awaited; the
    /// effect shows up in the next CLIENT_SYNC, if at all.
    pub async fn set_setting(&self, setting: Setting, value: u32) -> Result<()> {
        tracing::trace!(setting = ?setting, value = value, "Setting");
        self.send_command(CommandType::SetSetting, &protocol::setting_body(setting, value))
            .await
    }

    /// Set the device gain index.
    pub async fn set_gain(&self, gain: u32) -> Result<()> {
        self.set_setting(Setting::Gain, gain).await
    }

    /// Set the IQ centre frequency in hertz.
    pub async fn set_frequency(&self, freq_hz: u32) -> Result<()> {
        self.set_setting(Setting::IqFrequency, freq_hz).await
    }

    /// Select an IQ decimation stage (the sample rate is
    /// `maximum_sample_rate / 2^stage`).
    pub async fn set_decimation(&self, stage: u32) -> Result<()> {
        self.set_setting(Setting::IqDecimation, stage).await
    }

    /// Request an IQ sample format.
    pub async fn set_iq_format(&self, format: StreamFormat) -> Result<()> {
        self.set_setting(Setting::IqFormat, format.into()).await
    }

    /// Select which streams the server sends.
    pub async fn set_streaming_mode(&self, mode: StreamType) -> Result<()> {
        self.set_setting(Setting::StreamingMode, mode as u32).await
    }

    /// Set the server-side digital gain index.
    pub async fn set_digital_gain(&self, gain: u32) -> Result<()> {
        self.set_setting(Setting::IqDigitalGain, gain).await
    }

    async fn send_handshake(&self, app_name: &str) -> Result<()> {
        let body = protocol::handshake_body(PROTOCOL_VERSION, app_name);
        tracing::debug!(
            peer = %self.peer,
            version = %format!("0x{:08X}", PROTOCOL_VERSION),
            app = %app_name,
            "Sending handshake"
        );
        self.send_command(CommandType::Hello, &body).await
    }

    async fn send_command(&self, command: CommandType, body: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        if body.len() > MAX_COMMAND_BODY_SIZE {
            return Err(Error::InvalidParameter(format!(
                "command body of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_COMMAND_BODY_SIZE
            )));
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;

        writer.buf.clear();
        protocol::encode_command_into(&mut writer.buf, command, body);

        writer.sink.write_all(&writer.buf).await.map_err(|e| {
            tracing::error!(peer = %self.peer, error = %e, "Failed to send command");
            map_io_error(e)
        })?;
        writer.sink.flush().await.map_err(|e| {
            tracing::error!(peer = %self.peer, error = %e, "Failed to flush command");
            map_io_error(e)
        })?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Wait up to `timeout` for the first DEVICE_INFO message.
    ///
    /// Returns immediately once one has been received. Returns `false` on
    /// timeout, or early if the connection ends first.
    pub async fn wait_for_device_info(&self, timeout: Duration) -> bool {
        wait_available(self.device_info.clone(), timeout).await
    }

    /// Wait up to `timeout` for the first CLIENT_SYNC message.
    pub async fn wait_for_client_sync(&self, timeout: Duration) -> bool {
        wait_available(self.client_sync.clone(), timeout).await
    }

    /// Snapshot of the latest DEVICE_INFO, if one has arrived.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        *self.device_info.borrow()
    }

    /// Snapshot of the latest CLIENT_SYNC, if one has arrived.
    pub fn client_sync(&self) -> Option<ClientSync> {
        *self.client_sync.borrow()
    }

    /// Digital gain index for the connected device; see
    /// [`protocol::compute_digital_gain`].
    ///
    /// Returns `None` before DEVICE_INFO has arrived or for unknown device
    /// types.
    pub fn compute_digital_gain(&self, device_gain: u32, decimation_id: u32) -> Option<i32> {
        self.device_info()
            .and_then(|info| protocol::compute_digital_gain(&info, device_gain, decimation_id))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Whether the connection is still up.
    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the connection and stop the receive task.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        let was_open = self.connected.swap(false, Ordering::SeqCst);

        {
            let mut writer = self.writer.lock().await;
            if let Some(mut w) = writer.take() {
                if let Err(e) = w.sink.shutdown().await {
                    tracing::debug!(peer = %self.peer, error = %e, "Shutdown failed (continuing anyway)");
                }
            }
        }

        if let Some(handle) = self.read_handle.lock().take() {
            handle.abort();
        }

        if was_open {
            tracing::info!(peer = %self.peer, "SpyServer connection closed");
        }
        Ok(())
    }

    /// Counters from the receive task.
    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }

    /// The queue decoded batches are delivered to.
    pub fn queue(&self) -> &Arc<SampleQueue> {
        &self.queue
    }

    /// Peer label (usually `host:port`).
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Drop for SpyServerClient {
    fn drop(&mut self) {
        if let Some(handle) = self.read_handle.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SpyServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyServerClient")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

async fn wait_available<T>(mut rx: watch::Receiver<Option<T>>, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, rx.wait_for(|value| value.is_some())).await,
        Ok(Ok(_))
    )
}

// ---------------------------------------------------------------------------
// Receive task
// ---------------------------------------------------------------------------

/// Everything a dispatched frame can write to.
struct FrameSinks {
    device_info: watch::Sender<Option<DeviceInfo>>,
    client_sync: watch::Sender<Option<ClientSync>>,
    queue: Arc<SampleQueue>,
    counters: Arc<FrameCounters>,
}

/// What dispatch did with one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Metadata,
    Batch(usize),
    Ignored,
    Rejected,
}

/// Background task: header, body, dispatch, repeat.
async fn read_loop(
    mut reader: TransportReader,
    sinks: FrameSinks,
    connected: Arc<AtomicBool>,
    peer: String,
) {
    let mut header_buf = [0u8; MessageHeader::SIZE];
    let mut body_buf = vec![0u8; MAX_MESSAGE_BODY_SIZE];

    loop {
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            tracing::info!(peer = %peer, error = %e, "SpyServer device disconnected");
            break;
        }

        let header = match MessageHeader::decode(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                tracing::error!(peer = %peer, error = %e, "Failed to decode message header");
                break;
            }
        };

        let size = header.body_size as usize;
        if size > body_buf.len() {
            // The stream cannot be resynchronised past a body we won't read.
            tracing::error!(
                peer = %peer,
                body_size = size,
                max = MAX_MESSAGE_BODY_SIZE,
                "Message body exceeds maximum size, dropping connection"
            );
            break;
        }

        let body = &mut body_buf[..size];
        if let Err(e) = reader.read_exact(body).await {
            tracing::info!(peer = %peer, error = %e, "SpyServer device disconnected");
            break;
        }

        if !connected.load(Ordering::SeqCst) {
            break;
        }

        dispatch(&header, body, &sinks);
    }

    connected.store(false, Ordering::SeqCst);
}

/// Handle one complete frame.
fn dispatch(header: &MessageHeader, body: &[u8], sinks: &FrameSinks) -> FrameOutcome {
    let counters = &sinks.counters;
    counters.frames_received.fetch_add(1, Ordering::Relaxed);

    let kind = header.kind();
    let flags = header.flags();
    tracing::trace!(
        kind = ?kind,
        flags = flags,
        seq = header.sequence_number,
        bytes = body.len(),
        "Frame received"
    );

    let outcome = match kind {
        MessageKind::DeviceInfo => match DeviceInfo::decode(body) {
            Ok(info) => {
                tracing::debug!(
                    device = info.device().display_name(),
                    serial = %format!("{:08X}", info.device_serial),
                    max_sample_rate = info.maximum_sample_rate,
                    "Device info received"
                );
                sinks.device_info.send_replace(Some(info));
                FrameOutcome::Metadata
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed device info");
                FrameOutcome::Rejected
            }
        },
        MessageKind::ClientSync => match ClientSync::decode(body) {
            Ok(sync) => {
                tracing::debug!(
                    can_control = sync.can_control(),
                    gain = sync.gain,
                    freq_hz = sync.iq_center_frequency,
                    "Client sync received"
                );
                sinks.client_sync.send_replace(Some(sync));
                FrameOutcome::Metadata
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed client sync");
                FrameOutcome::Rejected
            }
        },
        MessageKind::Uint8Iq
        | MessageKind::Int16Iq
        | MessageKind::FloatIq
        | MessageKind::Int24Iq => match codec::decode_iq(kind, flags, body) {
            Ok(batch) if batch.is_empty() => FrameOutcome::Ignored,
            Ok(batch) => {
                let count = batch.len();
                sinks.queue.enqueue(batch);
                FrameOutcome::Batch(count)
            }
            Err(e) => {
                tracing::error!(
                    kind = ?kind,
                    error = %e,
                    "SpyServer returned an unsupported stream format; the negotiated format should have been rejected"
                );
                FrameOutcome::Rejected
            }
        },
        other => {
            tracing::trace!(kind = ?other, "Ignoring message");
            FrameOutcome::Ignored
        }
    };

    match outcome {
        FrameOutcome::Batch(count) => {
            counters.batches_enqueued.fetch_add(1, Ordering::Relaxed);
            counters.samples_enqueued.fetch_add(count as u64, Ordering::Relaxed);
        }
        FrameOutcome::Ignored => {
            counters.frames_ignored.fetch_add(1, Ordering::Relaxed);
        }
        FrameOutcome::Rejected => {
            counters.frames_rejected.fetch_add(1, Ordering::Relaxed);
        }
        FrameOutcome::Metadata => {}
    }

    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
