//! PDU node daemon.
//!
//! Usage: `obsrpc-pdud [CONFIG]` (default `obsrpc.yaml`).
//! - RPC listener on `server.listen` (TCP `host:port` or a Unix socket path)
//! - optional HTTP ops listener on `ops.listen`
//! - SIGINT/SIGTERM stop accepting and mark the node as draining

use std::process::ExitCode;

use obsrpc_core::error::{ObsError, Result};
use tracing_subscriber::{fmt, EnvFilter};

use obsrpc_node::{app_state::AppState, config, router, server::Server};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "obsrpc.yaml".to_string());
    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, config = %path, "obsrpc-pdud failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &str) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let endpoint = cfg.server.endpoint()?;
    let opts = cfg.server.channel_options();
    let ops_listen = cfg.ops.as_ref().map(|o| o.listen.clone());

    let state = AppState::new(cfg)?;
    state.service().inspect_all().await;

    let server = Server::bind(&endpoint, opts, state.service(), state.metrics()).await?;

    if let Some(listen) = ops_listen {
        let listener = tokio::net::TcpListener::bind(listen.as_str())
            .await
            .map_err(|e| ObsError::Internal(format!("ops bind {listen} failed: {e}")))?;
        tracing::info!(%listen, "ops endpoint listening");
        let app = router::build_router(state.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "ops server failed");
            }
        });
    }

    tracing::info!(pdus = state.registry().len(), "obsrpc-pdud starting");
    server.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, draining");
}
