#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use obsrpc_node::app_state::AppState;
use obsrpc_node::{config, router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn serve(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router::build_router(state);
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// Minimal HTTP/1.1 GET; returns (status, body).
async fn get(addr: std::net::SocketAddr, path: &str) -> (u16, String) {
    let mut s = tokio::net::TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: ops\r\nConnection: close\r\n\r\n");
    s.write_all(req.as_bytes()).await.unwrap();
    let mut raw = String::new();
    s.read_to_string(&mut raw).await.unwrap();
    let status = raw[9..12].parse().unwrap();
    let body = raw.split_once("\r\n\r\n").map(|(_, b)| b.to_string()).unwrap_or_default();
    (status, body)
}

fn state() -> AppState {
    let cfg = config::load_from_str(
        r#"
version: 1
pdus:
  - name: "pdu-east"
    outlets: ["mount"]
  - name: "pdu-west"
    outlets: ["dome"]
"#,
    )
    .unwrap();
    AppState::new(cfg).unwrap()
}

#[tokio::test]
async fn readiness_follows_inspection_and_draining() {
    let state = state();
    let addr = serve(state.clone()).await;

    assert_eq!(get(addr, "/healthz").await.0, 200);
    assert_eq!(get(addr, "/readyz").await.0, 503);

    state.service().inspect_all().await;
    assert_eq!(get(addr, "/readyz").await.0, 200);

    state.metrics().set_draining();
    let (status, body) = get(addr, "/readyz").await;
    assert_eq!(status, 503);
    assert!(body.contains("draining"));
}

#[tokio::test]
async fn objects_and_metrics_are_exposed() {
    let state = state();
    state.service().inspect_all().await;
    let addr = serve(state).await;

    let (status, body) = get(addr, "/objects").await;
    assert_eq!(status, 200);
    let objects: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(objects[1]["name"], "pdu-west");
    assert_eq!(objects[1]["index"], 2);
    assert_eq!(objects[1]["health"], "ok");

    let (status, body) = get(addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("obsrpc_objects_healthy 2"));
}
