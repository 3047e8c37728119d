#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use obsrpc_core::protocol::ids::{OPTION_MORE_PACKET, PROTO_AWS, PROTO_PDU};
use obsrpc_core::protocol::Packet;
use obsrpc_core::ErrorCode;
use obsrpc_node::app_state::AppState;
use obsrpc_node::client::{CallError, Reply, RpcClient};
use obsrpc_node::config;
use obsrpc_node::server::Server;
use obsrpc_node::services::pdu::{
    PduClient, PDU_COMMAND_GET_CHANNEL_BY_NAME, PDU_COMMAND_GET_CURRENT,
    PDU_COMMAND_GET_INDEX_BY_NAME, PDU_COMMAND_GET_VOLTAGE_CURRENT, PDU_COMMAND_STATUS,
    PDU_COMMAND_TURN_ON,
};
use obsrpc_node::transport::{ChannelOptions, Endpoint, Listener, TransportError};

const LOCAL_PDUS: &str = r#"
version: 1
pdus:
  - name: "pdu-east"
    outlets: ["mount", "camera", "dome"]
  - name: "pdu-west"
    outlets: ["heater"]
"#;

async fn start_on(endpoint: &Endpoint, yaml: &str, opts: ChannelOptions) -> (Endpoint, AppState) {
    let state = AppState::new(config::load_from_str(yaml).unwrap()).unwrap();
    let server = Server::bind(endpoint, opts, state.service(), state.metrics())
        .await
        .unwrap();
    let ep = server.local_endpoint().unwrap();
    tokio::spawn(server.run());
    (ep, state)
}

async fn start(yaml: &str) -> (Endpoint, AppState) {
    let any = Endpoint::parse("127.0.0.1:0", 0).unwrap();
    start_on(&any, yaml, ChannelOptions::default()).await
}

async fn client(ep: &Endpoint) -> RpcClient {
    RpcClient::connect(ep.clone(), ChannelOptions::default()).await.unwrap()
}

#[tokio::test]
async fn pdu_commands_over_tcp() {
    let (ep, _state) = start(LOCAL_PDUS).await;
    let mut c = client(&ep).await;

    let west = c.index_by_name(PROTO_PDU, PDU_COMMAND_GET_INDEX_BY_NAME, "pdu-west").await.unwrap();
    assert_eq!(west, 2);

    c.prepare(PROTO_PDU, PDU_COMMAND_GET_CHANNEL_BY_NAME, 1).set_name("camera").unwrap();
    c.call().await.unwrap();
    assert_eq!(c.packet().channel(), 2);
    assert_eq!(c.packet().length(), 0);

    c.prepare(PROTO_PDU, PDU_COMMAND_TURN_ON, 1).set_channel(2);
    assert_eq!(c.call().await.unwrap(), Reply::Done);

    c.prepare(PROTO_PDU, PDU_COMMAND_GET_VOLTAGE_CURRENT, 1).set_channel(2);
    c.call().await.unwrap();
    assert_eq!((c.packet().df0(), c.packet().df1()), (220.0, 0.5));

    c.prepare(PROTO_PDU, PDU_COMMAND_STATUS, 1);
    c.call().await.unwrap();
    assert_eq!(c.packet().buffer(), &[0, 1, 0]);

    c.prepare(PROTO_PDU, PDU_COMMAND_STATUS, 1).set_u32f0(2);
    c.call().await.unwrap();
    assert_eq!(c.packet().buffer(), &[0, 1]);
}

#[tokio::test]
async fn foreign_protocol_is_eprotowrong() {
    let (ep, _state) = start(LOCAL_PDUS).await;
    let mut c = client(&ep).await;

    c.prepare(PROTO_AWS, 1, 1).set_buffer(b"stale payload").unwrap();
    let err = c.call().await.unwrap_err();
    assert_eq!(err, CallError::Remote(ErrorCode::ProtocolWrong));
    assert_eq!(err.as_code(), 23);
    assert_eq!(c.packet().length(), 0);
}

#[tokio::test]
async fn unknown_command_keeps_connection_usable() {
    let (ep, _state) = start(LOCAL_PDUS).await;
    let mut c = client(&ep).await;

    c.prepare(PROTO_PDU, 999, 1);
    assert_eq!(c.call().await.unwrap_err(), CallError::Remote(ErrorCode::BadCommand));

    c.prepare(PROTO_PDU, PDU_COMMAND_GET_CURRENT, 1).set_channel(1);
    c.call().await.unwrap();
    assert_eq!(c.packet().df0(), 0.0);
}

#[tokio::test]
async fn unregistered_names_are_not_found() {
    let (ep, _state) = start(LOCAL_PDUS).await;
    let mut c = client(&ep).await;

    let err = c
        .index_by_name(PROTO_PDU, PDU_COMMAND_GET_INDEX_BY_NAME, "pdu-north")
        .await
        .unwrap_err();
    assert_eq!(err.as_code(), 35);

    c.prepare(PROTO_PDU, PDU_COMMAND_GET_CURRENT, 7).set_channel(1);
    assert_eq!(c.call().await.unwrap_err(), CallError::Remote(ErrorCode::NotFound));
}

#[tokio::test]
async fn device_errors_pass_through() {
    let (ep, _state) = start(LOCAL_PDUS).await;
    let mut c = client(&ep).await;

    c.prepare(PROTO_PDU, PDU_COMMAND_TURN_ON, 2).set_channel(2);
    let err = c.call().await.unwrap_err();
    assert_eq!(err, CallError::Remote(ErrorCode::InvalidArgument));
    assert!(err.as_code() > 0);
}

#[tokio::test]
async fn nothing_listening_is_a_negative_status() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let ep = Endpoint::Tcp { host: "127.0.0.1".into(), port };
    let err = RpcClient::connect(ep, ChannelOptions::default()).await.err().unwrap();
    assert_eq!(err, CallError::Transport(TransportError::ConnectionRefused));
    assert!(err.as_code() < 0);
}

#[tokio::test]
async fn oversize_request_gets_enomem_then_close() {
    let any = Endpoint::parse("127.0.0.1:0", 0).unwrap();
    let opts = ChannelOptions {
        max_payload: 64,
        ..ChannelOptions::default()
    };
    let (ep, state) = start_on(&any, LOCAL_PDUS, opts).await;
    let mut c = client(&ep).await;

    c.prepare(PROTO_PDU, PDU_COMMAND_STATUS, 1).set_buffer(&[7u8; 128]).unwrap();
    assert_eq!(c.call().await.unwrap_err(), CallError::Remote(ErrorCode::OutOfMemory));
    assert_eq!(c.packet().length(), 0);

    c.prepare(PROTO_PDU, PDU_COMMAND_STATUS, 1);
    let err = c.call().await.unwrap_err();
    assert!(err.as_code() < 0, "{err:?}");

    let text = state.metrics().render(&[]);
    assert!(text.contains("obsrpc_transport_errors_total{"), "{text}");
}

#[tokio::test]
async fn idle_client_outlives_io_timeout() {
    let any = Endpoint::parse("127.0.0.1:0", 0).unwrap();
    let opts = ChannelOptions {
        io_timeout: Some(Duration::from_millis(100)),
        ..ChannelOptions::default()
    };
    let (ep, _state) = start_on(&any, LOCAL_PDUS, opts).await;
    let mut c = client(&ep).await;

    c.prepare(PROTO_PDU, PDU_COMMAND_GET_VOLTAGE_CURRENT, 1).set_channel(1);
    c.call().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    c.prepare(PROTO_PDU, PDU_COMMAND_GET_VOLTAGE_CURRENT, 1).set_channel(1);
    assert_eq!(c.call().await.unwrap(), Reply::Done);
    assert_eq!(c.packet().df0(), 220.0);
}

#[tokio::test]
async fn relay_forwards_to_upstream() {
    let (upstream, _up_state) = start(LOCAL_PDUS).await;
    let relay_cfg = format!(
        r#"
version: 1
pdus:
  - name: "dome-power"
    upstream:
      address: "{upstream}"
      name: "pdu-east"
      io_timeout_ms: 2000
"#
    );
    let (relay, relay_state) = start(&relay_cfg).await;

    let mut c = client(&relay).await;
    c.inspect(1).await.unwrap();
    c.prepare(PROTO_PDU, PDU_COMMAND_TURN_ON, 1).set_channel(3);
    c.call().await.unwrap();

    // the switch landed on the upstream unit
    let mut direct = PduClient::new(upstream.clone(), "pdu-east", ChannelOptions::default());
    assert_eq!(direct.current(3).await.unwrap(), 0.5);
    assert_eq!(direct.index(), 1);

    c.prepare(PROTO_PDU, PDU_COMMAND_GET_CHANNEL_BY_NAME, 1).set_name("dome").unwrap();
    c.call().await.unwrap();
    assert_eq!(c.packet().channel(), 3);

    assert!(relay_state.is_ready());
}

#[cfg(unix)]
#[tokio::test]
async fn pdu_commands_over_unix_socket() {
    let path = std::env::temp_dir().join(format!("obsrpc-test-{}.sock", std::process::id()));
    let (ep, _state) = start_on(&Endpoint::Unix(path.clone()), LOCAL_PDUS, ChannelOptions::default()).await;
    assert_eq!(ep, Endpoint::Unix(path));

    let mut c = client(&ep).await;
    c.prepare(PROTO_PDU, PDU_COMMAND_TURN_ON, 2).set_channel(1);
    c.call().await.unwrap();
    c.prepare(PROTO_PDU, PDU_COMMAND_GET_CURRENT, 2).set_channel(1);
    c.call().await.unwrap();
    assert_eq!(c.packet().df0(), 0.5);
}

#[tokio::test]
async fn multi_packet_replies_are_read_in_turn() {
    let listener = Listener::bind(&Endpoint::parse("127.0.0.1:0", 0).unwrap(), ChannelOptions::default())
        .await
        .unwrap();
    let ep = listener.local_endpoint().unwrap();
    let server = tokio::spawn(async move {
        let mut ch = listener.accept().await.unwrap();
        let mut p = Packet::new();
        ch.read_packet(&mut p).await.unwrap();
        for (i, chunk) in [b"abc".as_slice(), b"def".as_slice()].into_iter().enumerate() {
            p.set_option(if i == 0 { OPTION_MORE_PACKET } else { 0 });
            p.set_buffer(chunk).unwrap();
            ch.write_packet(&p).await.unwrap();
        }
        // a second request arrives only after the last chunk
        ch.read_packet(&mut p).await.unwrap();
        p.command()
    });

    let mut c = client(&ep).await;
    c.prepare(PROTO_PDU, PDU_COMMAND_STATUS, 1);
    assert_eq!(c.call().await.unwrap(), Reply::More);
    assert_eq!(c.packet().buffer(), b"abc");
    assert_eq!(c.call().await.unwrap(), Reply::Done);
    assert_eq!(c.packet().buffer(), b"def");

    c.prepare(PROTO_PDU, PDU_COMMAND_TURN_ON, 1);
    c.write().await.unwrap();
    assert_eq!(server.await.unwrap(), PDU_COMMAND_TURN_ON);
}

#[tokio::test]
async fn command_line_client_reports_results_and_exit_status() {
    use obsrpc_node::services::pdu::cli;

    let (ep, _state) = start(LOCAL_PDUS).await;
    let args = |s: &str| -> Vec<String> {
        std::iter::once(ep.to_string()).chain(s.split_whitespace().map(String::from)).collect()
    };

    let on = cli::parse(&args("pdu-east on 1")).unwrap();
    assert_eq!(cli::run(on, ChannelOptions::default()).await.unwrap(), "ok");
    let status = cli::parse(&args("pdu-east status")).unwrap();
    assert_eq!(
        cli::run(status, ChannelOptions::default()).await.unwrap(),
        "1 on\n2 off\n3 off"
    );

    let missing = cli::parse(&args("pdu-north current 1")).unwrap();
    let err = cli::run(missing, ChannelOptions::default()).await.unwrap_err();
    assert_eq!(err.diagnostic(), "object not found");
    assert_eq!(cli::exit_status(&err), 2);
}
