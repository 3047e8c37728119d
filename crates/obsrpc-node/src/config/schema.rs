use std::collections::HashSet;
use std::time::Duration;

use obsrpc_core::error::{ObsError, Result};
use obsrpc_core::protocol::ids::PDU_RPC_PORT;
use serde::Deserialize;

use crate::transport::{ChannelOptions, Endpoint};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub ops: Option<OpsSection>,

    #[serde(default)]
    pub pdus: Vec<PduConfig>,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ObsError::UnsupportedVersion);
        }
        if self.pdus.is_empty() {
            return Err(ObsError::Config("pdus must not be empty".into()));
        }

        self.server.validate()?;
        if let Some(ops) = &self.ops {
            ops.validate()?;
        }

        let mut names = HashSet::new();
        for pdu in &self.pdus {
            if !names.insert(pdu.name.as_str()) {
                return Err(ObsError::Config(format!("duplicate pdu name: {}", pdu.name)));
            }
            pdu.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// 0 disables the per-transfer timeout. Idle time between requests is
    /// never bounded.
    #[serde(default)]
    pub io_timeout_ms: u64,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            io_timeout_ms: 0,
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1024..=1 << 30).contains(&self.max_payload_bytes) {
            return Err(ObsError::Config(
                "server.max_payload_bytes must be between 1024 and 1073741824".into(),
            ));
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.listen, PDU_RPC_PORT)
            .map_err(|e| ObsError::Config(format!("server.listen: {e}")))
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            connect_timeout: None,
            io_timeout: (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms)),
            max_payload: self.max_payload_bytes,
        }
    }
}

fn default_listen() -> String {
    format!("0.0.0.0:{PDU_RPC_PORT}")
}
fn default_max_payload_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    pub listen: String,
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<std::net::SocketAddr>()
            .map(|_| ())
            .map_err(|e| ObsError::Config(format!("ops.listen must be a SocketAddr: {e}")))
    }
}

/// A power-distribution unit: either local outlets or a relay to another
/// PDU server.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PduConfig {
    pub name: String,

    #[serde(default)]
    pub outlets: Vec<String>,

    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
}

impl PduConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ObsError::Config("pdu name must not be empty".into()));
        }
        match (&self.upstream, self.outlets.is_empty()) {
            (Some(_), false) => Err(ObsError::Config(format!(
                "pdu {}: outlets and upstream are mutually exclusive",
                self.name
            ))),
            (None, true) => Err(ObsError::Config(format!(
                "pdu {}: needs outlets or an upstream",
                self.name
            ))),
            (Some(up), true) => up.validate(&self.name),
            (None, false) => {
                let mut seen = HashSet::new();
                for o in &self.outlets {
                    if o.is_empty() || !seen.insert(o.as_str()) {
                        return Err(ObsError::Config(format!(
                            "pdu {}: outlet names must be non-empty and unique",
                            self.name
                        )));
                    }
                }
                if self.outlets.len() > usize::from(u16::MAX) {
                    return Err(ObsError::Config(format!("pdu {}: too many outlets", self.name)));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    pub address: String,
    /// Name of the PDU on the upstream server.
    pub name: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub io_timeout_ms: u64,
}

impl UpstreamConfig {
    fn validate(&self, pdu: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(ObsError::Config(format!("pdu {pdu}: upstream.name must not be empty")));
        }
        self.endpoint()
            .map(|_| ())
            .map_err(|e| ObsError::Config(format!("pdu {pdu}: upstream.address: {e}")))
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.address, PDU_RPC_PORT).map_err(|e| ObsError::Config(e.to_string()))
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            connect_timeout: (self.connect_timeout_ms > 0)
                .then(|| Duration::from_millis(self.connect_timeout_ms)),
            io_timeout: (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms)),
            ..ChannelOptions::default()
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    3000
}
