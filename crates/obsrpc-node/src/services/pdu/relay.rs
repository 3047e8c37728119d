//! PDU driver that forwards every operation to another PDU server.

use async_trait::async_trait;
use obsrpc_core::{ErrorCode, Status};

use super::{PduClient, PduDriver};
use crate::client::SharedTransport;

pub struct RelayPdu {
    upstream: SharedTransport<PduClient>,
}

impl RelayPdu {
    pub fn new(client: PduClient) -> Self {
        Self {
            upstream: SharedTransport::new(client),
        }
    }
}

#[async_trait]
impl PduDriver for RelayPdu {
    async fn turn_on(&self, channel: u16) -> Status {
        self.upstream
            .run(move |c| Box::pin(c.turn_on(channel)))
            .await
            .map_err(|e| e.code())
    }

    async fn turn_off(&self, channel: u16) -> Status {
        self.upstream
            .run(move |c| Box::pin(c.turn_off(channel)))
            .await
            .map_err(|e| e.code())
    }

    async fn voltage(&self, channel: u16) -> Result<f64, ErrorCode> {
        self.upstream
            .run(move |c| Box::pin(c.voltage(channel)))
            .await
            .map_err(|e| e.code())
    }

    async fn current(&self, channel: u16) -> Result<f64, ErrorCode> {
        self.upstream
            .run(move |c| Box::pin(c.current(channel)))
            .await
            .map_err(|e| e.code())
    }

    async fn voltage_current(&self, channel: u16) -> Result<(f64, f64), ErrorCode> {
        self.upstream
            .run(move |c| Box::pin(c.voltage_current(channel)))
            .await
            .map_err(|e| e.code())
    }

    async fn status(&self) -> Result<Vec<u8>, ErrorCode> {
        self.upstream
            .run(|c| Box::pin(c.status(0)))
            .await
            .map_err(|e| e.code())
    }

    async fn channel_by_name(&self, name: &str) -> Result<u16, ErrorCode> {
        let name = name.to_string();
        self.upstream
            .run(move |c| {
                let name = name.clone();
                Box::pin(async move { c.channel_by_name(&name).await })
            })
            .await
            .map_err(|e| e.code())
    }

    async fn probe(&self) -> Status {
        self.upstream
            .run(|c| Box::pin(c.inspect()))
            .await
            .map_err(|e| e.code())
    }

    fn reconnects(&self) -> u64 {
        self.upstream.reconnects()
    }
}
