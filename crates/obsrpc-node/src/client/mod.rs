//! Client side: one-request-in-flight RPC calls and the reconnect-and-retry
//! wrapper shared by drivers that forward to another server.

pub mod call;
pub mod retry;

pub use call::{CallError, Reply, RpcClient};
pub use retry::{Reconnect, SharedTransport};
