//! Typed client for a remote PDU server.

use async_trait::async_trait;
use obsrpc_core::protocol::ids::{
    PROTO_PDU, PROTO_SYSTEM, SYSTEM_COMMAND_INSPECT, SYSTEM_COMMAND_REGISTER,
};
use obsrpc_core::protocol::Packet;

use super::{
    PDU_COMMAND_GET_CHANNEL_BY_NAME, PDU_COMMAND_GET_CURRENT, PDU_COMMAND_GET_INDEX_BY_NAME,
    PDU_COMMAND_GET_VOLTAGE, PDU_COMMAND_GET_VOLTAGE_CURRENT, PDU_COMMAND_STATUS,
    PDU_COMMAND_TURN_OFF, PDU_COMMAND_TURN_ON,
};
use crate::client::{CallError, Reconnect, RpcClient};
use crate::transport::{ChannelOptions, Endpoint, TransportError};

/// Talks to one named PDU on one server.
///
/// Connects lazily and resolves the remote index by name on first use. A
/// transport failure drops the connection and the cached index, so the next
/// call starts from scratch.
pub struct PduClient {
    endpoint: Endpoint,
    opts: ChannelOptions,
    name: String,
    rpc: Option<RpcClient>,
    index: u16,
}

impl PduClient {
    pub fn new(endpoint: Endpoint, name: impl Into<String>, opts: ChannelOptions) -> Self {
        Self {
            endpoint,
            opts,
            name: name.into(),
            rpc: None,
            index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote index once resolved, `0` before.
    pub fn index(&self) -> u16 {
        self.index
    }

    async fn rpc(&mut self) -> Result<&mut RpcClient, CallError> {
        if self.rpc.is_none() {
            self.rpc = Some(RpcClient::connect(self.endpoint.clone(), self.opts).await?);
        }
        self.rpc
            .as_mut()
            .ok_or(CallError::Transport(TransportError::Closed))
    }

    async fn resolve(&mut self) -> Result<u16, CallError> {
        if self.index == 0 {
            let name = self.name.clone();
            let index = self
                .rpc()
                .await?
                .index_by_name(PROTO_PDU, PDU_COMMAND_GET_INDEX_BY_NAME, &name)
                .await?;
            tracing::debug!(pdu = %name, index, "remote index resolved");
            self.index = index;
        }
        Ok(self.index)
    }

    /// Resolve, fill the request with `fill`, and call.
    async fn request<F>(
        &mut self,
        protocol: u16,
        command: u16,
        channel: u16,
        fill: F,
    ) -> Result<&Packet, CallError>
    where
        F: FnOnce(&mut Packet) -> Result<(), CallError> + Send,
    {
        let res = self.exchange(protocol, command, channel, fill).await;
        self.forget_on_transport_error(&res);
        res?;
        self.rpc
            .as_ref()
            .map(|r| r.packet())
            .ok_or(CallError::Transport(TransportError::Closed))
    }

    async fn exchange<F>(&mut self, protocol: u16, command: u16, channel: u16, fill: F) -> Result<(), CallError>
    where
        F: FnOnce(&mut Packet) -> Result<(), CallError> + Send,
    {
        let index = self.resolve().await?;
        let rpc = self.rpc().await?;
        let p = rpc.prepare(protocol, command, index);
        p.set_channel(channel);
        fill(p)?;
        rpc.call().await?;
        Ok(())
    }

    fn forget_on_transport_error<T>(&mut self, res: &Result<T, CallError>) {
        if let Err(CallError::Transport(e)) = res {
            tracing::warn!(peer = %self.endpoint, error = %e, "dropping upstream connection");
            self.rpc = None;
            self.index = 0;
        }
    }

    pub async fn turn_on(&mut self, channel: u16) -> Result<(), CallError> {
        self.request(PROTO_PDU, PDU_COMMAND_TURN_ON, channel, |_| Ok(())).await.map(|_| ())
    }

    pub async fn turn_off(&mut self, channel: u16) -> Result<(), CallError> {
        self.request(PROTO_PDU, PDU_COMMAND_TURN_OFF, channel, |_| Ok(())).await.map(|_| ())
    }

    pub async fn voltage(&mut self, channel: u16) -> Result<f64, CallError> {
        let p = self.request(PROTO_PDU, PDU_COMMAND_GET_VOLTAGE, channel, |_| Ok(())).await?;
        Ok(p.df0())
    }

    pub async fn current(&mut self, channel: u16) -> Result<f64, CallError> {
        let p = self.request(PROTO_PDU, PDU_COMMAND_GET_CURRENT, channel, |_| Ok(())).await?;
        Ok(p.df0())
    }

    pub async fn voltage_current(&mut self, channel: u16) -> Result<(f64, f64), CallError> {
        let p = self
            .request(PROTO_PDU, PDU_COMMAND_GET_VOLTAGE_CURRENT, channel, |_| Ok(()))
            .await?;
        Ok((p.df0(), p.df1()))
    }

    /// Outlet states; `limit` (0 = all) caps the number of bytes returned.
    pub async fn status(&mut self, limit: u32) -> Result<Vec<u8>, CallError> {
        let p = self
            .request(PROTO_PDU, PDU_COMMAND_STATUS, 0, move |p| {
                p.set_u32f0(limit);
                Ok(())
            })
            .await?;
        Ok(p.buffer().to_vec())
    }

    pub async fn channel_by_name(&mut self, outlet: &str) -> Result<u16, CallError> {
        let outlet = outlet.to_string();
        let p = self
            .request(PROTO_PDU, PDU_COMMAND_GET_CHANNEL_BY_NAME, 0, move |p| {
                p.set_name(&outlet)
                    .map_err(|e| TransportError::InvalidArgument(e.to_string()).into())
            })
            .await?;
        Ok(p.channel())
    }

    /// Ask the upstream server to probe this PDU.
    pub async fn inspect(&mut self) -> Result<(), CallError> {
        self.request(PROTO_SYSTEM, SYSTEM_COMMAND_INSPECT, 0, |_| Ok(()))
            .await
            .map(|_| ())
    }

    pub async fn register(&mut self, timeout_secs: f64) -> Result<(), CallError> {
        self.request(PROTO_SYSTEM, SYSTEM_COMMAND_REGISTER, 0, move |p| {
            p.set_df0(timeout_secs);
            Ok(())
        })
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl Reconnect for PduClient {
    async fn reconnect(&mut self) -> Result<(), CallError> {
        self.rpc = None;
        self.index = 0;
        self.rpc().await?;
        tracing::info!(peer = %self.endpoint, pdu = %self.name, "upstream reconnected");
        Ok(())
    }
}
