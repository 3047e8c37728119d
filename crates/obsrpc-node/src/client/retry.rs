//! Reconnect-and-retry around a shared downstream transport.
//!
//! Every physical connection to a downstream server sits behind one async
//! mutex. A whole exchange (resolve index, send, receive) runs under that lock,
//! and so does the single reconnect attempted after a transient failure, so
//! two callers never interleave packets or race to reconnect.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, MutexGuard};

use super::call::{CallError, RpcClient};

/// A transport that can replace its broken connection in place.
#[async_trait]
pub trait Reconnect: Send {
    async fn reconnect(&mut self) -> Result<(), CallError>;
}

#[async_trait]
impl Reconnect for RpcClient {
    async fn reconnect(&mut self) -> Result<(), CallError> {
        RpcClient::reconnect(self).await
    }
}

pub struct SharedTransport<T> {
    inner: Mutex<T>,
    reconnects: AtomicU64,
}

impl<T: Reconnect> SharedTransport<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Mutex::new(transport),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Run `op` under the transport lock.
    ///
    /// A transient transport failure triggers exactly one reconnect and one
    /// re-run. A failed reconnect, a non-transient failure, or a second
    /// failure is returned unchanged.
    pub async fn run<R, F>(&self, mut op: F) -> Result<R, CallError>
    where
        R: Send,
        F: for<'a> FnMut(&'a mut T) -> BoxFuture<'a, Result<R, CallError>> + Send,
    {
        let mut guard = self.inner.lock().await;
        let first = op(&mut *guard).await;
        match first {
            Err(e) if e.is_transient() => {
                tracing::info!(error = %e, "transient transport failure, reconnecting");
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                guard.reconnect().await.map_err(|re| {
                    tracing::warn!(error = %re, "reconnect failed");
                    re
                })?;
                op(&mut *guard).await
            }
            other => other,
        }
    }

    /// Exclusive access without retry, for multi-step exchanges the caller
    /// drives by hand.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }

    /// Reconnects attempted since creation.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}
