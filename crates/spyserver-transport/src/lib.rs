//! Transport implementations for the SpyServer client.
//!
//! SpyServer runs over a single TCP connection. [`TcpTransport`] establishes
//! it (with a connect timeout and `TCP_NODELAY`) and hands it to the
//! protocol client as [`TransportHalves`](spyserver_core::TransportHalves).
//!
//! # Example
//!
//! ```no_run
//! use spyserver_transport::TcpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> spyserver_core::Result<()> {
//! let transport =
//!     TcpTransport::connect_with_timeout("192.168.1.50:5555", Duration::from_secs(2)).await?;
//! let halves = transport.into_halves();
//! # Ok(())
//! # }
//! ```

pub mod tcp;

pub use tcp::{TcpTransport, map_io_error};
