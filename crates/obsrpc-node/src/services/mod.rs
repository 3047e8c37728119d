//! Built-in service families.

pub mod pdu;
