//! Command-line front end for one remote PDU.
//!
//! `obsrpc-pdu ADDRESS PDU COMMAND [ARG]` where COMMAND is one of `on CH`,
//! `off CH`, `voltage CH`, `current CH`, `vc CH`, `status [LIMIT]`,
//! `channel NAME`, `inspect`, `register [SECS]`.

use obsrpc_core::protocol::ids::PDU_RPC_PORT;
use obsrpc_core::ErrorCode;

use super::PduClient;
use crate::client::CallError;
use crate::transport::{ChannelOptions, Endpoint};

pub const USAGE: &str = "usage: obsrpc-pdu ADDRESS PDU on|off|voltage|current|vc CH | status [LIMIT] | channel NAME | inspect | register [SECS]";

#[derive(Debug, Clone, PartialEq)]
pub enum PduCommand {
    TurnOn(u16),
    TurnOff(u16),
    Voltage(u16),
    Current(u16),
    VoltageCurrent(u16),
    Status(u32),
    Channel(String),
    Inspect,
    Register(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub endpoint: Endpoint,
    pub pdu: String,
    pub command: PduCommand,
}

fn number<T: std::str::FromStr>(what: &str, arg: Option<&String>) -> Result<T, String> {
    let arg = arg.ok_or_else(|| format!("{what} missing"))?;
    arg.parse().map_err(|_| format!("bad {what}: {arg:?}"))
}

/// Parse the arguments after the program name.
pub fn parse(args: &[String]) -> Result<Invocation, String> {
    let [address, pdu, command, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let endpoint = Endpoint::parse(address, PDU_RPC_PORT).map_err(|e| e.to_string())?;
    let arg = rest.first();
    let command = match command.as_str() {
        "on" => PduCommand::TurnOn(number("channel", arg)?),
        "off" => PduCommand::TurnOff(number("channel", arg)?),
        "voltage" => PduCommand::Voltage(number("channel", arg)?),
        "current" => PduCommand::Current(number("channel", arg)?),
        "vc" => PduCommand::VoltageCurrent(number("channel", arg)?),
        "status" => PduCommand::Status(arg.map_or(Ok(0), |_| number("limit", arg))?),
        "channel" => PduCommand::Channel(arg.ok_or("outlet name missing")?.clone()),
        "inspect" => PduCommand::Inspect,
        "register" => PduCommand::Register(arg.map_or(Ok(0.0), |_| number("timeout", arg))?),
        other => return Err(format!("unknown command {other:?}\n{USAGE}")),
    };
    Ok(Invocation {
        endpoint,
        pdu: pdu.clone(),
        command,
    })
}

/// Run one command; the success text is what the front end prints.
pub async fn run(inv: Invocation, opts: ChannelOptions) -> Result<String, CallError> {
    let mut pdu = PduClient::new(inv.endpoint, inv.pdu, opts);
    let out = match inv.command {
        PduCommand::TurnOn(ch) => pdu.turn_on(ch).await.map(|()| "ok".to_string())?,
        PduCommand::TurnOff(ch) => pdu.turn_off(ch).await.map(|()| "ok".to_string())?,
        PduCommand::Voltage(ch) => format!("{:.3} V", pdu.voltage(ch).await?),
        PduCommand::Current(ch) => format!("{:.3} A", pdu.current(ch).await?),
        PduCommand::VoltageCurrent(ch) => {
            let (v, a) = pdu.voltage_current(ch).await?;
            format!("{v:.3} V {a:.3} A")
        }
        PduCommand::Status(limit) => pdu
            .status(limit)
            .await?
            .iter()
            .enumerate()
            .map(|(i, on)| format!("{} {}", i + 1, if *on != 0 { "on" } else { "off" }))
            .collect::<Vec<_>>()
            .join("\n"),
        PduCommand::Channel(name) => pdu.channel_by_name(&name).await?.to_string(),
        PduCommand::Inspect => pdu.inspect().await.map(|()| "ok".to_string())?,
        PduCommand::Register(secs) => pdu.register(secs).await.map(|()| "ok".to_string())?,
    };
    Ok(out)
}

/// Process exit status: 2 for not found, 3 for timeouts, 1 otherwise.
pub fn exit_status(err: &CallError) -> u8 {
    match err.code() {
        ErrorCode::NotFound => 2,
        ErrorCode::TimedOut => 3,
        _ => 1,
    }
}
