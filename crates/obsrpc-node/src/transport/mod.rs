//! Transport layer (TCP and Unix stream sockets).
//!
//! One [`Channel`] carries whole packets in both directions: a 32-byte header
//! block followed by exactly `length` trailing bytes. Framing relies on
//! `length` alone, so a channel that fails mid-frame cannot be reused.

pub mod channel;
pub mod endpoint;

use std::io;

use obsrpc_core::ErrorCode;
use thiserror::Error;

pub use channel::{Channel, ChannelOptions, Listener};
pub use endpoint::Endpoint;

/// Local or network failure, never reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("host unreachable")]
    HostUnreachable,
    #[error("network unreachable")]
    NetworkUnreachable,
    #[error("network down")]
    NetworkDown,
    #[error("timed out")]
    TimedOut,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("connection reset")]
    ConnectionReset,
    #[error("connection closed by peer")]
    Closed,
    #[error("payload of {0} bytes exceeds the envelope limit")]
    TooLarge(usize),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Rejected locally before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("i/o: {0}")]
    Io(String),
}

impl TransportError {
    /// Failures that a fresh connection may cure. Only these are retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::BrokenPipe
                | TransportError::ConnectionReset
                | TransportError::TimedOut
                | TransportError::NetworkDown
                | TransportError::NetworkUnreachable
        )
    }

    /// Closest wire code, used when a server forwards a downstream failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TransportError::ConnectionRefused => ErrorCode::ConnectionRefused,
            TransportError::HostUnreachable => ErrorCode::HostUnreachable,
            TransportError::NetworkUnreachable => ErrorCode::NetworkUnreachable,
            TransportError::NetworkDown => ErrorCode::NetworkDown,
            TransportError::TimedOut => ErrorCode::TimedOut,
            TransportError::BrokenPipe => ErrorCode::BrokenPipe,
            TransportError::ConnectionReset => ErrorCode::ConnectionReset,
            TransportError::Closed => ErrorCode::Closed,
            TransportError::TooLarge(_) => ErrorCode::OutOfMemory,
            TransportError::InvalidAddress(_) | TransportError::InvalidArgument(_) => {
                ErrorCode::InvalidArgument
            }
            TransportError::Io(_) => ErrorCode::Io,
        }
    }

    /// Short label for metrics.
    pub fn kind_str(&self) -> &'static str {
        match self {
            TransportError::ConnectionRefused => "refused",
            TransportError::HostUnreachable => "host_unreachable",
            TransportError::NetworkUnreachable => "network_unreachable",
            TransportError::NetworkDown => "network_down",
            TransportError::TimedOut => "timed_out",
            TransportError::BrokenPipe => "broken_pipe",
            TransportError::ConnectionReset => "reset",
            TransportError::Closed => "closed",
            TransportError::TooLarge(_) => "too_large",
            TransportError::InvalidAddress(_) => "invalid_address",
            TransportError::InvalidArgument(_) => "invalid_argument",
            TransportError::Io(_) => "io",
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused,
            io::ErrorKind::HostUnreachable => TransportError::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => TransportError::NetworkUnreachable,
            io::ErrorKind::NetworkDown => TransportError::NetworkDown,
            io::ErrorKind::TimedOut => TransportError::TimedOut,
            io::ErrorKind::BrokenPipe => TransportError::BrokenPipe,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                TransportError::ConnectionReset
            }
            io::ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Io(e.to_string()),
        }
    }
}
