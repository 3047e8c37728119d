//! Power-distribution units (protocol `PDU`).
//!
//! Each configured PDU is one registry object wrapping a [`PduDriver`]. The
//! channel travels in the `channel` header field; readings come back in DF0
//! (voltage or current) and DF1 (current, for the combined reading).

pub mod cli;
pub mod client;
pub mod relay;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use obsrpc_core::protocol::ids::PROTO_PDU;
use obsrpc_core::protocol::Packet;
use obsrpc_core::{ErrorCode, Status};

use crate::dispatch::{CommandTable, Service};
use crate::health::{HealthMonitor, Monitored};
use crate::registry::ServiceRegistry;

pub use client::PduClient;
pub use relay::RelayPdu;
pub use simulated::SimulatedPdu;

pub const PDU_COMMAND_TURN_ON: u16 = 1;
pub const PDU_COMMAND_TURN_OFF: u16 = 2;
pub const PDU_COMMAND_GET_VOLTAGE: u16 = 3;
pub const PDU_COMMAND_GET_CURRENT: u16 = 4;
pub const PDU_COMMAND_GET_VOLTAGE_CURRENT: u16 = 5;
pub const PDU_COMMAND_STATUS: u16 = 6;
pub const PDU_COMMAND_GET_INDEX_BY_NAME: u16 = 23;
pub const PDU_COMMAND_GET_CHANNEL_BY_NAME: u16 = 24;

/// Device seam. Channels are 1-based.
#[async_trait]
pub trait PduDriver: Send + Sync {
    async fn turn_on(&self, channel: u16) -> Status;
    async fn turn_off(&self, channel: u16) -> Status;
    async fn voltage(&self, channel: u16) -> Result<f64, ErrorCode>;
    async fn current(&self, channel: u16) -> Result<f64, ErrorCode>;

    async fn voltage_current(&self, channel: u16) -> Result<(f64, f64), ErrorCode> {
        Ok((self.voltage(channel).await?, self.current(channel).await?))
    }

    /// One byte per outlet, 1 = powered.
    async fn status(&self) -> Result<Vec<u8>, ErrorCode>;
    async fn channel_by_name(&self, name: &str) -> Result<u16, ErrorCode>;

    /// Health check used by INSPECT and REGISTER.
    async fn probe(&self) -> Status;

    /// Downstream reconnects so far, for drivers that forward.
    fn reconnects(&self) -> u64 {
        0
    }
}

pub struct Pdu {
    name: String,
    driver: Box<dyn PduDriver>,
    health: HealthMonitor,
}

impl Pdu {
    pub fn new(name: impl Into<String>, driver: impl PduDriver + 'static) -> Self {
        Self {
            name: name.into(),
            driver: Box::new(driver),
            health: HealthMonitor::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &dyn PduDriver {
        self.driver.as_ref()
    }
}

#[async_trait]
impl Monitored for Pdu {
    fn health_monitor(&self) -> &HealthMonitor {
        &self.health
    }

    async fn inspect(&self) -> Status {
        self.health.inspect([self.driver.probe()]).await
    }
}

pub fn command_table() -> CommandTable<Pdu> {
    CommandTable::new()
        .on(PDU_COMMAND_TURN_ON, turn_on)
        .on(PDU_COMMAND_TURN_OFF, turn_off)
        .on(PDU_COMMAND_GET_VOLTAGE, get_voltage)
        .on(PDU_COMMAND_GET_CURRENT, get_current)
        .on(PDU_COMMAND_GET_VOLTAGE_CURRENT, get_voltage_current)
        .on(PDU_COMMAND_STATUS, status)
        .on(PDU_COMMAND_GET_CHANNEL_BY_NAME, get_channel_by_name)
        .lookup(PDU_COMMAND_GET_INDEX_BY_NAME)
}

pub fn service(registry: Arc<ServiceRegistry<Pdu>>) -> Service<Pdu> {
    Service::new("pdu", PROTO_PDU, registry, command_table())
}

fn turn_on<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move { pdu.driver.turn_on(p.channel()).await })
}

fn turn_off<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move { pdu.driver.turn_off(p.channel()).await })
}

fn get_voltage<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move {
        let v = pdu.driver.voltage(p.channel()).await?;
        p.set_df0(v);
        Ok(())
    })
}

fn get_current<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move {
        let a = pdu.driver.current(p.channel()).await?;
        p.set_df0(a);
        Ok(())
    })
}

fn get_voltage_current<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move {
        let (v, a) = pdu.driver.voltage_current(p.channel()).await?;
        p.set_df0(v);
        p.set_df1(a);
        Ok(())
    })
}

/// U32F0, when non-zero, caps how many outlet bytes come back.
fn status<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move {
        let mut bytes = pdu.driver.status().await?;
        let want = p.u32f0() as usize;
        if want != 0 {
            bytes.truncate(want);
        }
        p.set_buffer(&bytes).map_err(|e| e.error_code())
    })
}

/// Channel name in STR/BUF; the answer goes into `channel`. The PDU itself
/// must be addressed by index since the name slot is taken.
fn get_channel_by_name<'a>(pdu: &'a Pdu, p: &'a mut Packet) -> BoxFuture<'a, Status> {
    Box::pin(async move {
        let name = p.name().map_err(|e| e.error_code())?.to_string();
        let channel = pdu.driver.channel_by_name(&name).await?;
        p.set_channel(channel);
        p.clear_payload();
        Ok(())
    })
}
