//! Address strings as operators write them.
//!
//! - anything containing `/`  : Unix socket path
//! - `:port`                  : `localhost:port`
//! - `host:port`, `[v6]:port` : TCP
//! - `host`                   : TCP on the caller's default port

use std::fmt;
use std::path::PathBuf;

use super::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    pub fn parse(addr: &str, default_port: u16) -> Result<Self, TransportError> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(TransportError::InvalidAddress("empty address".into()));
        }
        if addr.contains('/') {
            return Ok(Endpoint::Unix(PathBuf::from(addr)));
        }

        // bracketed IPv6, optionally with a port
        if let Some(rest) = addr.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(addr, p)?,
                None if tail.is_empty() => default_port,
                None => return Err(TransportError::InvalidAddress(addr.to_string())),
            };
            return Ok(Endpoint::Tcp { host: host.to_string(), port });
        }

        match addr.split_once(':') {
            None => Ok(Endpoint::Tcp { host: addr.to_string(), port: default_port }),
            Some((_, p)) if p.contains(':') => {
                Err(TransportError::InvalidAddress(format!("{addr}: bracket IPv6 hosts")))
            }
            Some(("", p)) => Ok(Endpoint::Tcp { host: "localhost".into(), port: parse_port(addr, p)? }),
            Some((host, p)) => Ok(Endpoint::Tcp { host: host.to_string(), port: parse_port(addr, p)? }),
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Endpoint::Unix(_))
    }
}

fn parse_port(addr: &str, p: &str) -> Result<u16, TransportError> {
    p.parse::<u16>()
        .map_err(|_| TransportError::InvalidAddress(format!("{addr}: bad port {p:?}")))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}
