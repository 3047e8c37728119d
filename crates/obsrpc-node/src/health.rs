//! Object health and the wait-until-healthy rendezvous behind REGISTER.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use obsrpc_core::{ErrorCode, Status};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Ok,
    Error,
}

/// Health of one object. Starts as `Error` until an inspection succeeds.
pub struct HealthMonitor {
    tx: watch::Sender<Health>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Health::Error);
        Self { tx }
    }

    pub fn health(&self) -> Health {
        *self.tx.borrow()
    }

    /// Record `health`; every waiter sees the change.
    pub fn set(&self, health: Health) {
        let prev = self.tx.send_replace(health);
        if prev != health {
            tracing::debug!(?prev, ?health, "health changed");
        }
    }

    /// Block until healthy. `None` waits indefinitely.
    pub async fn wait(&self, timeout: Option<Duration>) -> Status {
        let mut rx = self.tx.subscribe();
        let healthy = async move {
            rx.wait_for(|h| *h == Health::Ok)
                .await
                .map(|_| ())
                .map_err(|_| ErrorCode::Error)
        };
        match timeout {
            None => healthy.await,
            Some(d) => tokio::time::timeout(d, healthy)
                .await
                .unwrap_or(Err(ErrorCode::TimedOut)),
        }
    }

    /// Seconds as carried in DF0; zero, negative, or NaN waits indefinitely.
    pub async fn wait_secs(&self, secs: f64) -> Status {
        let timeout = (secs > 0.0)
            .then(|| Duration::try_from_secs_f64(secs).ok())
            .flatten();
        self.wait(timeout).await
    }

    /// Probe each unit in order. The first failure marks the object `Error`
    /// and is returned; full success marks it `Ok` and releases waiters.
    pub async fn inspect<'a, I>(&self, probes: I) -> Status
    where
        I: IntoIterator<Item = BoxFuture<'a, Status>>,
    {
        for probe in probes {
            if let Err(code) = probe.await {
                self.set(Health::Error);
                return Err(code);
            }
        }
        self.set(Health::Ok);
        Ok(())
    }
}

/// Objects that support INSPECT and REGISTER.
#[async_trait]
pub trait Monitored: Send + Sync {
    fn health_monitor(&self) -> &HealthMonitor;

    /// Probe every downstream unit and update health.
    async fn inspect(&self) -> Status;

    fn health(&self) -> Health {
        self.health_monitor().health()
    }
}
