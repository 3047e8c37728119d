use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use obsrpc_core::protocol::ids::{SYSTEM_COMMAND_INSPECT, SYSTEM_COMMAND_REGISTER};
use obsrpc_core::protocol::Packet;
use obsrpc_core::Status;

use crate::health::Monitored;

/// One command acting on a resolved object. Results go back into `packet`.
#[async_trait]
pub trait Handler<T>: Send + Sync {
    async fn call(&self, object: &T, packet: &mut Packet) -> Status;
}

#[async_trait]
impl<T, F> Handler<T> for F
where
    T: Sync,
    F: for<'a> Fn(&'a T, &'a mut Packet) -> BoxFuture<'a, Status> + Send + Sync,
{
    async fn call(&self, object: &T, packet: &mut Packet) -> Status {
        self(object, packet).await
    }
}

pub enum Command<T> {
    /// Resolve the object, then run the handler.
    Object(Box<dyn Handler<T>>),
    /// Resolve the name in the packet and answer with the index only.
    Lookup,
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Object(_) => f.write_str("Object"),
            Command::Lookup => f.write_str("Lookup"),
        }
    }
}

/// Command number to behavior. INSPECT and REGISTER are always present.
pub struct CommandTable<T> {
    commands: BTreeMap<u16, Command<T>>,
}

impl<T: Monitored + 'static> Default for CommandTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Monitored + 'static> CommandTable<T> {
    pub fn new() -> Self {
        let mut commands: BTreeMap<u16, Command<T>> = BTreeMap::new();
        commands.insert(SYSTEM_COMMAND_INSPECT, Command::Object(Box::new(inspect::<T>)));
        commands.insert(SYSTEM_COMMAND_REGISTER, Command::Object(Box::new(register::<T>)));
        Self { commands }
    }

    /// Add or replace an object command.
    pub fn on<H: Handler<T> + 'static>(mut self, command: u16, handler: H) -> Self {
        self.commands.insert(command, Command::Object(Box::new(handler)));
        self
    }

    /// Add a name-to-index lookup command.
    pub fn lookup(mut self, command: u16) -> Self {
        self.commands.insert(command, Command::Lookup);
        self
    }

    pub fn get(&self, command: u16) -> Option<&Command<T>> {
        self.commands.get(&command)
    }

    pub fn commands(&self) -> impl Iterator<Item = u16> + '_ {
        self.commands.keys().copied()
    }
}

fn inspect<'a, T: Monitored>(object: &'a T, _packet: &'a mut Packet) -> BoxFuture<'a, Status> {
    object.inspect()
}

/// Healthy now, or wait up to DF0 seconds for another inspection to succeed.
fn register<'a, T: Monitored>(object: &'a T, packet: &'a mut Packet) -> BoxFuture<'a, Status> {
    let timeout = packet.df0();
    Box::pin(async move {
        match object.inspect().await {
            Ok(()) => Ok(()),
            Err(code) => {
                tracing::debug!(%code, timeout, "inspection failed, waiting for health");
                object.health_monitor().wait_secs(timeout).await
            }
        }
    })
}
