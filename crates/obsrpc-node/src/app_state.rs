//! Shared application state: configuration, the PDU registry, the service
//! built on it, and metrics.

use std::sync::Arc;

use obsrpc_core::error::Result;

use crate::config::{NodeConfig, PduConfig};
use crate::dispatch::{Dispatch, ObjectView};
use crate::health::{Health, Monitored};
use crate::obs::NodeMetrics;
use crate::registry::ServiceRegistry;
use crate::services::pdu::{self, Pdu, PduClient, RelayPdu, SimulatedPdu};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: NodeConfig,
    registry: Arc<ServiceRegistry<Pdu>>,
    service: Arc<dyn Dispatch>,
    metrics: Arc<NodeMetrics>,
}

fn build_pdu(cfg: &PduConfig) -> Result<Pdu> {
    let pdu = match &cfg.upstream {
        Some(up) => {
            let client = PduClient::new(up.endpoint()?, up.name.clone(), up.channel_options());
            tracing::info!(pdu = %cfg.name, upstream = %up.address, remote = %up.name, "relay pdu");
            Pdu::new(cfg.name.clone(), RelayPdu::new(client))
        }
        None => Pdu::new(cfg.name.clone(), SimulatedPdu::new(cfg.outlets.clone())),
    };
    Ok(pdu)
}

impl AppState {
    /// Build state from a validated config. Upstream PDUs are not contacted
    /// here; they connect on first use.
    pub fn new(cfg: NodeConfig) -> Result<Self> {
        let pdus = cfg
            .pdus
            .iter()
            .map(|p| Ok((p.name.clone(), build_pdu(p)?)))
            .collect::<Result<Vec<_>>>()?;
        let registry = Arc::new(ServiceRegistry::build(pdus)?);
        let service: Arc<dyn Dispatch> = Arc::new(pdu::service(Arc::clone(&registry)));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                service,
                metrics: Arc::new(NodeMetrics::default()),
            }),
        })
    }

    pub fn cfg(&self) -> &NodeConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<ServiceRegistry<Pdu>> {
        Arc::clone(&self.inner.registry)
    }

    pub fn service(&self) -> Arc<dyn Dispatch> {
        Arc::clone(&self.inner.service)
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn objects(&self) -> Vec<ObjectView> {
        self.inner.service.objects()
    }

    /// Ready when not draining and every object last inspected healthy.
    pub fn is_ready(&self) -> bool {
        !self.inner.metrics.is_draining() && self.objects().iter().all(|o| o.health == Health::Ok)
    }

    /// Gauges computed at scrape time.
    pub fn metrics_extra(&self) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        let mut reconnects = 0;
        let mut healthy = 0;
        for e in self.inner.registry.entries() {
            reconnects += e.object.driver().reconnects();
            if e.object.health() == Health::Ok {
                healthy += 1;
            }
        }
        out.push(("obsrpc_upstream_reconnects_total".to_string(), reconnects));
        out.push(("obsrpc_objects_healthy".to_string(), healthy));
        out.push(("obsrpc_objects_total".to_string(), self.inner.registry.len() as u64));
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config;

    #[tokio::test]
    async fn state_from_config_inspects_to_ready() {
        let cfg = config::load_from_str(
            r#"
version: 1
pdus:
  - name: "pdu-east"
    outlets: ["mount", "camera"]
  - name: "pdu-west"
    outlets: ["dome"]
"#,
        )
        .unwrap();
        let state = AppState::new(cfg).unwrap();
        assert!(!state.is_ready());
        state.service().inspect_all().await;
        assert!(state.is_ready());
        assert_eq!(state.registry().index_by_name("pdu-west").unwrap(), 2);

        let extra = state.metrics_extra();
        assert!(extra.contains(&("obsrpc_objects_healthy".to_string(), 2)));
    }
}
