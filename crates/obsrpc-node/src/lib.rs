//! Observatory RPC node.
//!
//! Serves registry objects over the fixed-header envelope protocol: the
//! transport layer moves packets, the dispatcher routes them to per-object
//! handlers, and the client side talks to other nodes with reconnect and
//! retry. Used by the `obsrpc-pdud` binary and by integration tests.

pub mod app_state;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod obs;
pub mod ops;
pub mod registry;
pub mod router;
pub mod server;
pub mod services;
pub mod transport;
