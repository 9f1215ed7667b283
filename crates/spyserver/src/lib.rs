//! # spyserver -- Async client for SpyServer streaming SDR servers
//!
//! `spyserver` connects to an [Airspy SpyServer](https://airspy.com/) over
//! TCP, negotiates an IQ stream, and delivers complex `f32` samples through
//! a bounded, drop-oldest queue. The server's hardware (AirSpy One,
//! AirSpy HF+, RTL-SDR) appears as a single-channel receive device with
//! gain, frequency, and a discrete sample-rate table.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use spyserver::{Complex32, SpyServerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = SpyServerBuilder::new()
//!         .host("192.168.1.50")
//!         .port(5555)
//!         .build()
//!         .await?;
//!
//!     println!("{} at {}", device.device_name()?, device.url());
//!     for rate in device.sample_rates() {
//!         println!("  {} S/s", rate);
//!     }
//!
//!     device.set_frequency(145_500_000).await?;
//!     let mut stream = device.setup_stream()?;
//!     device.activate_stream(&stream).await?;
//!
//!     let stream = tokio::task::spawn_blocking(move || {
//!         let mut buf = vec![Complex32::default(); 16_384];
//!         match stream.read(&mut buf, Duration::from_secs(1)) {
//!             Ok(n) => println!("read {} samples", n),
//!             Err(e) => println!("read failed: {}", e),
//!         }
//!         stream
//!     })
//!     .await?;
//!
//!     device.close_stream(stream).await?;
//!     device.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                    | Purpose                                          |
//! |--------------------------|--------------------------------------------------|
//! | `spyserver-core`         | Wire protocol, bounded queue, sample types, errors |
//! | `spyserver-transport`    | TCP transport                                    |
//! | `spyserver-client`       | Protocol client, IQ codec, stream, device, builder |
//! | `spyserver-test-harness` | Mock server and in-memory transports for tests   |
//! | **`spyserver`**          | This facade crate -- re-exports everything       |
//!
//! ## Lower-level access
//!
//! [`SpyServerClient`] speaks the protocol directly: handshake, raw
//! SET_SETTING commands, and the DEVICE_INFO / CLIENT_SYNC snapshots. Pair
//! it with an [`IqStream`] over its queue to read samples without the
//! device layer.

pub use spyserver_core::*;

pub use spyserver_client::{
    ClientOptions, ClientStats, DeviceSummary, HardwareInfo, IqStream, Range, SpyServerBuilder,
    SpyServerClient, SpyServerDevice,
};

/// IQ payload decoders.
pub mod codec {
    pub use spyserver_client::codec::*;
}

/// Device-layer constants and helpers.
pub mod device {
    pub use spyserver_client::device::{ANTENNA_NAME, DRIVER_KEY, GAIN_NAME, spyserver_url};
}

/// TCP transport.
pub mod tcp {
    pub use spyserver_transport::*;
}

/// Look for a SpyServer at `host:port`.
///
/// Returns one summary if a server answered with its metadata, otherwise an
/// empty list.
pub async fn find(host: &str, port: u16) -> Vec<DeviceSummary> {
    SpyServerDevice::find(host, port).await
}
