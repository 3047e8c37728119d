//! One-shot PDU client. Prints the result, or a diagnostic and a non-zero
//! exit status.

use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use obsrpc_node::services::pdu::cli;
use obsrpc_node::transport::ChannelOptions;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let inv = match cli::parse(&args) {
        Ok(inv) => inv,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(64);
        }
    };

    let opts = ChannelOptions {
        connect_timeout: Some(Duration::from_secs(3)),
        ..ChannelOptions::default()
    };
    match cli::run(inv, opts).await {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("obsrpc-pdu: {} ({e})", e.diagnostic());
            ExitCode::from(cli::exit_status(&e))
        }
    }
}
