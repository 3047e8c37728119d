//! Top-level facade crate for obsrpc.
//!
//! Re-exports the envelope codec and the node library so users can depend on a single crate.

pub mod core {
    pub use obsrpc_core::*;
}

pub mod node {
    pub use obsrpc_node::*;
}
