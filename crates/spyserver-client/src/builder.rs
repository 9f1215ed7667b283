//! SpyServerBuilder -- fluent builder for [`SpyServerDevice`] and
//! [`SpyServerClient`] instances.
//!
//! Separates configuration from construction so callers can set the
//! address, queue depth, handshake name, and timeouts before connecting.
//!
//! # Example
//!
//! ```no_run
//! use spyserver_client::builder::SpyServerBuilder;
//!
//! # async fn example() -> spyserver_core::Result<()> {
//! let device = SpyServerBuilder::new()
//!     .host("192.168.1.50")
//!     .port(5555)
//!     .build()
//!     .await?;
//! println!("{}", device.device_name()?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use spyserver_core::error::{Error, Result};
use spyserver_core::protocol::DEFAULT_PORT;
use spyserver_core::sample::{DEFAULT_QUEUE_CAPACITY, sample_queue};
use spyserver_core::transport::TransportHalves;

use crate::client::{ClientOptions, DEFAULT_APP_NAME, SpyServerClient};
use crate::device::{SpyServerDevice, spyserver_url};

/// Fluent builder for [`SpyServerDevice`].
///
/// All configuration except the host has a default:
///
/// ```ignore
/// let device = SpyServerBuilder::new().host("sdr.local").build().await?;
/// ```
#[derive(Debug, Clone)]
pub struct SpyServerBuilder {
    host: Option<String>,
    port: u16,
    queue_capacity: usize,
    app_name: String,
    connect_timeout: Duration,
    sync_timeout: Duration,
}

impl SpyServerBuilder {
    /// Default wait for DEVICE_INFO and CLIENT_SYNC after connecting.
    pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(1000);

    /// Create a new builder with default settings.
    pub fn new() -> Self {
        SpyServerBuilder {
            host: None,
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            app_name: DEFAULT_APP_NAME.to_string(),
            connect_timeout: ClientOptions::default().connect_timeout,
            sync_timeout: Self::DEFAULT_SYNC_TIMEOUT,
        }
    }

    /// Set the server's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the server's TCP port (default: 5555).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set how many sample batches are buffered before the oldest is
    /// dropped (default: 64).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the application name sent in the handshake.
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = name.to_string();
        self
    }

    /// Set the TCP connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how long to wait for the server's metadata (default: 1000ms).
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Connect and open a [`SpyServerDevice`].
    ///
    /// Requires that [`host()`](Self::host) has been called.
    pub async fn build(self) -> Result<SpyServerDevice> {
        let url = spyserver_url(self.require_host()?, self.port);
        tracing::info!(url = %url, "Connecting");
        let sync_timeout = self.sync_timeout;
        let client = self.build_client().await?;
        SpyServerDevice::open(client, url, sync_timeout).await
    }

    /// Open a [`SpyServerDevice`] over pre-connected streams.
    ///
    /// The host and port, if set, only determine the device URL.
    pub async fn build_with_transport(self, halves: TransportHalves) -> Result<SpyServerDevice> {
        let url = match &self.host {
            Some(host) => spyserver_url(host, self.port),
            None => format!("sdr://{}", halves.peer),
        };
        let sync_timeout = self.sync_timeout;
        let client = self.build_client_with_transport(halves).await?;
        SpyServerDevice::open(client, url, sync_timeout).await
    }

    /// Connect and return the bare protocol client, without waiting for
    /// metadata.
    pub async fn build_client(self) -> Result<SpyServerClient> {
        let host = self.require_host()?.to_string();
        let queue = sample_queue(self.queue_capacity)?;
        SpyServerClient::connect_with_options(&host, self.port, queue, self.client_options()).await
    }

    /// Return the bare protocol client over pre-connected streams.
    pub async fn build_client_with_transport(
        self,
        halves: TransportHalves,
    ) -> Result<SpyServerClient> {
        let queue = sample_queue(self.queue_capacity)?;
        SpyServerClient::from_transport(halves, queue, self.client_options()).await
    }

    fn require_host(&self) -> Result<&str> {
        self.host.as_deref().ok_or_else(|| {
            Error::InvalidParameter("host is required: call .host() before .build()".into())
        })
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            app_name: self.app_name.clone(),
            connect_timeout: self.connect_timeout,
        }
    }
}

impl Default for SpyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use spyserver_core::protocol::CommandType;
    use spyserver_test_harness::duplex_transport;
    use spyserver_test_harness::frames::{self, airspy_one_info, controllable_sync};

    #[test]
    fn defaults() {
        let builder = SpyServerBuilder::new();
        assert_eq!(builder.port, 5555);
        assert_eq!(builder.queue_capacity, 64);
        assert_eq!(builder.app_name, DEFAULT_APP_NAME);
        assert_eq!(builder.connect_timeout, Duration::from_secs(5));
        assert_eq!(builder.sync_timeout, Duration::from_millis(1000));
        assert!(builder.host.is_none());
    }

    #[test]
    fn chained_settings() {
        let builder = SpyServerBuilder::new()
            .host("10.1.2.3")
            .port(5556)
            .queue_capacity(8)
            .app_name("scanner")
            .sync_timeout(Duration::from_millis(250));
        assert_eq!(builder.host.as_deref(), Some("10.1.2.3"));
        assert_eq!(builder.port, 5556);
        assert_eq!(builder.queue_capacity, 8);
        assert_eq!(builder.client_options().app_name, "scanner");
        assert_eq!(builder.sync_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn build_without_host_fails() {
        let result = SpyServerBuilder::new().build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn zero_queue_capacity_fails() {
        let (halves, _peer) = duplex_transport();
        let result = SpyServerBuilder::new()
            .queue_capacity(0)
            .build_client_with_transport(halves)
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn client_uses_configured_name_and_capacity() {
        let (halves, mut peer) = duplex_transport();
        let client = SpyServerBuilder::new()
            .app_name("scanner")
            .queue_capacity(3)
            .build_client_with_transport(halves)
            .await
            .unwrap();

        let hello = peer.read_command().await.unwrap();
        assert_eq!(hello.command_type, CommandType::Hello as u32);
        assert_eq!(&hello.body[4..], b"scanner");
        assert_eq!(client.queue().capacity(), 3);
    }

    #[tokio::test]
    async fn url_falls_back_to_peer_label() {
        let (halves, mut peer) = duplex_transport();
        peer.send(&frames::device_info_frame(&airspy_one_info()))
            .await
            .unwrap();
        peer.send(&frames::client_sync_frame(&controllable_sync()))
            .await
            .unwrap();

        let device = SpyServerBuilder::new()
            .build_with_transport(halves)
            .await
            .unwrap();
        assert_eq!(device.url(), "sdr://duplex");
    }
}
