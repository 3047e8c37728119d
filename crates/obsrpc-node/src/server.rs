//! Accept loop: one task per connection, one envelope per task.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use obsrpc_core::error::{ObsError, Result};
use obsrpc_core::protocol::ids::protocol_name;
use obsrpc_core::protocol::Packet;
use obsrpc_core::ErrorCode;
use tracing::Instrument;

use crate::dispatch::Dispatch;
use crate::obs::NodeMetrics;
use crate::transport::{Channel, ChannelOptions, Endpoint, Listener, TransportError};

pub struct Server {
    listener: Listener,
    service: Arc<dyn Dispatch>,
    metrics: Arc<NodeMetrics>,
}

impl Server {
    pub async fn bind(
        endpoint: &Endpoint,
        opts: ChannelOptions,
        service: Arc<dyn Dispatch>,
        metrics: Arc<NodeMetrics>,
    ) -> Result<Self> {
        let listener = Listener::bind(endpoint, opts)
            .await
            .map_err(|e| ObsError::Internal(format!("bind {endpoint} failed: {e}")))?;
        Ok(Self {
            listener,
            service,
            metrics,
        })
    }

    pub fn local_endpoint(&self) -> Result<Endpoint> {
        self.listener
            .local_endpoint()
            .map_err(|e| ObsError::Internal(e.to_string()))
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` resolves. Connections already accepted keep
    /// running until their peers hang up.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(ep) = self.local_endpoint() {
            tracing::info!(listen = %ep, service = self.service.name(), "rpc server listening");
        }
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(service = self.service.name(), "rpc server stopping");
                    self.metrics.set_draining();
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(channel) => {
                        let service = Arc::clone(&self.service);
                        let metrics = Arc::clone(&self.metrics);
                        tokio::spawn(serve_connection(channel, service, metrics));
                    }
                    Err(e) => {
                        metrics_transport_error(&self.metrics, self.service.name(), &e);
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

fn metrics_transport_error(metrics: &NodeMetrics, service: &str, e: &TransportError) {
    metrics
        .transport_errors
        .inc(&[("service", service), ("kind", e.kind_str())]);
}

/// Read, dispatch, reply, until the peer goes away.
pub async fn serve_connection(mut channel: Channel, service: Arc<dyn Dispatch>, metrics: Arc<NodeMetrics>) {
    let span = tracing::info_span!("conn", peer = %channel.peer(), service = service.name());
    async move {
        let labels = [("service", service.name())];
        metrics.active_connections.inc(&labels);
        tracing::debug!("connection opened");

        let mut packet = Packet::new();
        loop {
            match channel.read_request(&mut packet).await {
                Ok(()) => {}
                Err(TransportError::Closed) => {
                    tracing::debug!("peer closed");
                    break;
                }
                Err(TransportError::TooLarge(len)) => {
                    // The payload is still in the stream, so the framing is
                    // lost: answer once and hang up.
                    tracing::warn!(len, "request payload over limit");
                    metrics_transport_error(&metrics, service.name(), &TransportError::TooLarge(len));
                    packet.set_errorcode(ErrorCode::OutOfMemory.as_u16());
                    packet.clear_payload();
                    let _ = channel.write_packet(&packet).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "read failed");
                    metrics_transport_error(&metrics, service.name(), &e);
                    break;
                }
            }

            let (protocol, command, index) = (packet.protocol(), packet.command(), packet.index());
            let started = Instant::now();
            service.dispatch(&mut packet).await;
            let errorcode = packet.errorcode();
            metrics.record_dispatch(service.name(), command, errorcode, started.elapsed());
            tracing::trace!(
                protocol = protocol_name(protocol),
                command,
                index,
                errorcode,
                "dispatched"
            );

            if let Err(e) = channel.write_packet(&packet).await {
                tracing::warn!(error = %e, "write failed");
                metrics_transport_error(&metrics, service.name(), &e);
                break;
            }
        }

        metrics.active_connections.dec(&labels);
    }
    .instrument(span)
    .await
}
