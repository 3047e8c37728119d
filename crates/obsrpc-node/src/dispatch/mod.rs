//! Server-side command dispatch.
//!
//! A service is data: a protocol ID, a registry of objects, and a command
//! table. [`Dispatch`] is the object-safe face the server loop holds.

pub mod dispatcher;
pub mod table;

pub use dispatcher::{Dispatch, ObjectView, Service};
pub use table::{Command, CommandTable, Handler};
