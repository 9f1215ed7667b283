//! spyserver-core: Core types, wire protocol, and error definitions for the
//! SpyServer client.
//!
//! This crate holds everything the protocol client and its consumers share
//! without pulling in any networking: the binary message layouts, the
//! bounded queue that carries decoded samples between threads, and the
//! common error type.
//!
//! # Key types
//!
//! - [`CappedQueue`] -- bounded FIFO that evicts its oldest entry when full
//! - [`protocol`] -- headers, metadata payloads, and enumerations
//! - [`SampleBatch`] / [`SampleQueue`] -- decoded complex samples in flight
//! - [`TransportHalves`] -- a byte stream split for concurrent read/write
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod protocol;
pub mod queue;
pub mod sample;
pub mod transport;

pub use error::{Error, Result};
pub use protocol::{
    ClientSync, CommandType, DeviceInfo, DeviceType, MessageHeader, MessageKind, Setting,
    StreamFormat, StreamType,
};
pub use queue::CappedQueue;
pub use sample::{
    COMPLEX_SAMPLE_SIZE, Complex32, DEFAULT_QUEUE_CAPACITY, SampleBatch, SampleQueue, sample_queue,
};
pub use transport::{TransportHalves, TransportReader, TransportWriter};
