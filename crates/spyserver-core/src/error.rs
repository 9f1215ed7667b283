//! Error types for the SpyServer client.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! stream-layer errors are all captured here.

/// The error type for all SpyServer client operations.
///
/// Expected conditions on the sample path (a read that times out, a read
/// against an inactive stream) are variants like any other, so consumers can
/// match on them instead of unwinding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect, socket write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (short metadata body, oversized frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the server or for samples.
    #[error("timeout waiting for response")]
    Timeout,

    /// The server requested something this client cannot do, such as the
    /// packed 24-bit IQ format.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a client or device call.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the server has been established, or it was closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the server was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// A read was attempted on a stream that has not been activated.
    #[error("stream is not active")]
    StreamInactive,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("connection refused".into());
        assert_eq!(e.to_string(), "transport error: connection refused");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("short device info body".into());
        assert_eq!(e.to_string(), "protocol error: short device info body");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("INT24 IQ".into());
        assert_eq!(e.to_string(), "unsupported operation: INT24 IQ");
    }

    #[test]
    fn error_display_stream_inactive() {
        assert_eq!(Error::StreamInactive.to_string(), "stream is not active");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
