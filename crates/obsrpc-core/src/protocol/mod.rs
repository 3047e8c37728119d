//! Binary packet protocol shared by every service family.
//!
//! - [`packet`]: the fixed 32-byte header, carrier union, and trailing buffer.
//! - [`ids`]: protocol families, system commands, and option bits.
//!
//! Decoding never panics on short or inconsistent frames; such input surfaces
//! as [`crate::ObsError::Decode`].

pub mod ids;
pub mod packet;

pub use packet::{FieldId, Packet, Value, ValueKind, CARRIER_SIZE, DEFAULT_CAPACITY, HEADER_SIZE};
