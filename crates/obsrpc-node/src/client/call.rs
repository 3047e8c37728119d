use obsrpc_core::protocol::ids::{
    OPTION_MORE_PACKET, PROTO_SYSTEM, SYSTEM_COMMAND_INSPECT, SYSTEM_COMMAND_REGISTER,
};
use obsrpc_core::protocol::Packet;
use obsrpc_core::ErrorCode;
use thiserror::Error;

use crate::transport::{Channel, ChannelOptions, Endpoint, TransportError};

/// Outcome of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Final (or only) packet of the reply.
    Done,
    /// The server flagged `MORE_PACKET`; call again to read the next one.
    More,
}

/// Failure of one call. The two domains never mix: a `Remote` error means a
/// response arrived, a `Transport` error means none did.
///
/// Requests rejected locally, before anything is written (for example a name
/// the envelope cannot carry), are `Transport(TransportError::InvalidArgument)`:
/// negative like network failures, but never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("remote: {0}")]
    Remote(ErrorCode),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

impl CallError {
    /// Signed status: positive for a code reported by the server, negative for
    /// a local or network failure. Never zero.
    pub fn as_code(&self) -> i32 {
        match self {
            CallError::Remote(code) => i32::from(code.as_u16()),
            CallError::Transport(e) => -i32::from(e.error_code().as_u16()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CallError::Remote(code) => *code,
            CallError::Transport(e) => e.error_code(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transport(e) if e.is_transient())
    }

    /// One-line message for operators.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            CallError::Remote(ErrorCode::NotFound) => "object not found",
            CallError::Remote(ErrorCode::TimedOut) => "device timed out",
            CallError::Remote(ErrorCode::ProtocolWrong) => "wrong protocol for this server",
            CallError::Remote(ErrorCode::BadCommand) => "command not supported by this server",
            CallError::Remote(ErrorCode::InvalidArgument) => "invalid argument",
            CallError::Remote(ErrorCode::PowerOff) => "device is powered off",
            CallError::Remote(_) => "request failed on the server",
            CallError::Transport(TransportError::ConnectionRefused) => "server refused the connection",
            CallError::Transport(TransportError::HostUnreachable) => "host unreachable",
            CallError::Transport(TransportError::NetworkUnreachable) => "network unreachable",
            CallError::Transport(TransportError::NetworkDown) => "network is down",
            CallError::Transport(TransportError::TimedOut) => "timed out waiting for the server",
            CallError::Transport(TransportError::Closed) => "server closed the connection",
            CallError::Transport(TransportError::InvalidArgument(_)) => "request rejected before sending",
            CallError::Transport(_) => "communication failure",
        }
    }
}

/// `0` for success, otherwise [`CallError::as_code`].
pub fn status_code<T>(res: &Result<T, CallError>) -> i32 {
    match res {
        Ok(_) => 0,
        Err(e) => e.as_code(),
    }
}

/// Connection to one server plus the envelope reused by every call on it.
pub struct RpcClient {
    endpoint: Endpoint,
    opts: ChannelOptions,
    channel: Channel,
    packet: Packet,
}

impl RpcClient {
    pub async fn connect(endpoint: Endpoint, opts: ChannelOptions) -> Result<Self, CallError> {
        let channel = Channel::connect(&endpoint, opts).await?;
        Ok(Self {
            endpoint,
            opts,
            channel,
            packet: Packet::new(),
        })
    }

    /// Replace the channel with a fresh connection to the same endpoint. The
    /// envelope survives; a pending multi-packet reply does not.
    pub async fn reconnect(&mut self) -> Result<(), CallError> {
        self.channel = Channel::connect(&self.endpoint, self.opts).await?;
        self.clear_more();
        tracing::info!(peer = %self.endpoint, "reconnected");
        Ok(())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn packet_mut(&mut self) -> &mut Packet {
        &mut self.packet
    }

    /// Reset the envelope for a new request.
    pub fn prepare(&mut self, protocol: u16, command: u16, index: u16) -> &mut Packet {
        let p = &mut self.packet;
        p.set_protocol(protocol);
        p.set_command(command);
        p.set_index(index);
        p.set_option(0);
        p.set_channel(0);
        p.set_errorcode(0);
        p.clear_payload();
        p
    }

    pub async fn write(&mut self) -> Result<(), CallError> {
        self.channel.write_packet(&self.packet).await?;
        Ok(())
    }

    pub async fn read(&mut self) -> Result<Reply, CallError> {
        self.channel.read_packet(&mut self.packet).await?;
        if let Some(code) = ErrorCode::from_u16(self.packet.errorcode()) {
            return Err(CallError::Remote(code));
        }
        if self.packet.option() & OPTION_MORE_PACKET != 0 {
            Ok(Reply::More)
        } else {
            Ok(Reply::Done)
        }
    }

    /// Send the envelope and read the reply into it.
    ///
    /// While the previous reply carried `MORE_PACKET` the write is skipped and
    /// only the next packet is read. Any failure clears the flag so the next
    /// call starts a new request.
    pub async fn call(&mut self) -> Result<Reply, CallError> {
        let res = self.call_inner().await;
        if res.is_err() {
            self.clear_more();
        }
        res
    }

    async fn call_inner(&mut self) -> Result<Reply, CallError> {
        if self.packet.option() & OPTION_MORE_PACKET == 0 {
            self.write().await?;
        }
        self.read().await
    }

    fn clear_more(&mut self) {
        let opt = self.packet.option();
        self.packet.set_option(opt & !OPTION_MORE_PACKET);
    }

    /// Ask the server to probe object `index` and report its health.
    pub async fn inspect(&mut self, index: u16) -> Result<(), CallError> {
        self.prepare(PROTO_SYSTEM, SYSTEM_COMMAND_INSPECT, index);
        self.call().await.map(|_| ())
    }

    /// Wait on the server until object `index` is healthy, for at most
    /// `timeout_secs` (non-positive waits indefinitely).
    pub async fn register(&mut self, index: u16, timeout_secs: f64) -> Result<(), CallError> {
        self.prepare(PROTO_SYSTEM, SYSTEM_COMMAND_REGISTER, index).set_df0(timeout_secs);
        self.call().await.map(|_| ())
    }

    /// Resolve `name` with the service's lookup command. Nothing is cached.
    pub async fn index_by_name(&mut self, protocol: u16, command: u16, name: &str) -> Result<u16, CallError> {
        self.prepare(protocol, command, 0)
            .set_name(name)
            .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;
        self.call().await?;
        Ok(self.packet.index())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use obsrpc_core::protocol::ids::PROTO_PDU;

    use super::*;
    use crate::transport::Listener;

    #[test]
    fn sign_convention() {
        assert_eq!(CallError::Remote(ErrorCode::BadCommand).as_code(), 27);
        assert_eq!(CallError::Transport(TransportError::TimedOut).as_code(), -25);
        assert_eq!(CallError::Transport(TransportError::ConnectionRefused).as_code(), -6);
        assert_eq!(status_code::<()>(&Ok(())), 0);
    }

    #[test]
    fn only_transient_transport_errors_retry() {
        assert!(CallError::Transport(TransportError::ConnectionReset).is_transient());
        assert!(!CallError::Transport(TransportError::ConnectionRefused).is_transient());
        assert!(!CallError::Remote(ErrorCode::TimedOut).is_transient());
    }

    #[test]
    fn diagnostics_distinguish_classes() {
        assert_eq!(CallError::Remote(ErrorCode::NotFound).diagnostic(), "object not found");
        assert_eq!(
            CallError::Transport(TransportError::NetworkDown).diagnostic(),
            "network is down"
        );
        assert_ne!(
            CallError::Remote(ErrorCode::Failed).diagnostic(),
            CallError::Transport(TransportError::Io("x".into())).diagnostic()
        );
    }

    #[tokio::test]
    async fn unencodable_name_fails_locally_without_sending() {
        let ep = Endpoint::parse("127.0.0.1:0", 0).unwrap();
        let listener = Listener::bind(&ep, ChannelOptions::default()).await.unwrap();
        let target = listener.local_endpoint().unwrap();
        let (client, server) = tokio::join!(
            RpcClient::connect(target, ChannelOptions::default()),
            listener.accept()
        );
        let (mut client, mut server) = (client.unwrap(), server.unwrap());

        let err = client.index_by_name(PROTO_PDU, 23, "pdu\0east").await.unwrap_err();
        assert!(matches!(err, CallError::Transport(TransportError::InvalidArgument(_))));
        assert_eq!(err.as_code(), -12);
        assert!(!err.is_transient());
        assert_eq!(err.diagnostic(), "request rejected before sending");

        drop(client);
        let mut p = Packet::new();
        assert_eq!(server.read_packet(&mut p).await.unwrap_err(), TransportError::Closed);
    }
}
