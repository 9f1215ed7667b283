//! SpyServer protocol client.
//!
//! This crate connects to a SpyServer over TCP and turns its binary message
//! stream into complex `f32` samples. It provides:
//!
//! - **Protocol client** ([`client`]) -- handshake, SET_SETTING commands,
//!   a background receive task that frames messages and tracks the
//!   DEVICE_INFO / CLIENT_SYNC metadata snapshots.
//! - **Sample codec** ([`codec`]) -- UINT8, INT16, and FLOAT IQ payload
//!   decoding with the server-applied gain removed.
//! - **IQ stream** ([`stream`]) -- caller-sized reads over the bounded
//!   sample queue.
//! - **Device** ([`device`]) -- the receive-only SDR view: gain, frequency,
//!   sample-rate table, and stream lifecycle.
//! - **SpyServerBuilder** ([`builder`]) -- fluent configuration for all of
//!   the above.
//!
//! # Architecture
//!
//! ```text
//!  TCP ──► receive task ──► codec ──► SampleQueue ──► IqStream::read
//!              │                      (bounded,        (consumer thread)
//!              └─► watch<DeviceInfo>   drop-oldest)
//!              └─► watch<ClientSync>
//! ```
//!
//! The receive task never blocks on the consumer: when the queue is full
//! the oldest batch is dropped and the overflow flag is raised.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use spyserver_client::SpyServerBuilder;
//! use spyserver_core::Complex32;
//!
//! # async fn example() -> spyserver_core::Result<()> {
//! let device = SpyServerBuilder::new().host("192.168.1.50").build().await?;
//! device.set_frequency(100_000_000).await?;
//!
//! let mut stream = device.setup_stream()?;
//! device.activate_stream(&stream).await?;
//!
//! let stream = tokio::task::spawn_blocking(move || {
//!     let mut buf = vec![Complex32::default(); 4096];
//!     let n = stream.read(&mut buf, Duration::from_millis(500));
//!     println!("{:?}", n);
//!     stream
//! })
//! .await
//! .expect("reader panicked");
//!
//! device.close_stream(stream).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod device;
pub mod stream;

pub use builder::SpyServerBuilder;
pub use client::{ClientOptions, ClientStats, SpyServerClient};
pub use device::{DeviceSummary, HardwareInfo, Range, SpyServerDevice};
pub use stream::IqStream;
