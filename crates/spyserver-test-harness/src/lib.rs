//! spyserver-test-harness: mock servers, in-memory transports, and frame
//! builders for testing SpyServer clients.
//!
//! - [`MockSpyServer`] -- a scripted single-connection server on a real
//!   localhost TCP port.
//! - [`duplex_transport`] / [`MockPeer`] -- an in-memory pipe for byte-exact
//!   control over what the client reads and when.
//! - [`frames`] -- message builders, fixture metadata, and a command parser.

pub mod frames;
pub mod mock_server;
pub mod mock_stream;

pub use frames::RecordedCommand;
pub use mock_server::MockSpyServer;
pub use mock_stream::{MockPeer, duplex_transport};
