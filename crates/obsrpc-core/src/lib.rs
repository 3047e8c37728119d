//! obsrpc core: packet codec, protocol identifiers, and error codes.
//!
//! This crate defines the wire contract shared by clients and servers of the
//! observatory control network. It carries no runtime or socket dependencies so
//! that device drivers, tools, and tests can build packets without a reactor.
//!
//! # Guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed frames surface as [`ObsError`] instead.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

pub use error::{ErrorCode, ObsError, Result, Status};
pub use protocol::{FieldId, Packet, Value};
