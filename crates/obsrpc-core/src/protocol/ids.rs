//! Protocol, command, and option identifiers shared by every service family.

/// Serial-port multiplexers.
pub const PROTO_SERIAL: u16 = 2;
/// Telescope mounts.
pub const PROTO_TELESCOPE: u16 = 3;
/// Log collectors.
pub const PROTO_LOG: u16 = 4;
/// Automatic weather stations.
pub const PROTO_AWS: u16 = 5;
/// Power-distribution units.
pub const PROTO_PDU: u16 = 6;
pub const PROTO_SMS: u16 = 7;
/// Camera / detector controllers.
pub const PROTO_DETECTOR: u16 = 8;
/// Accepted by every service for INSPECT / REGISTER.
pub const PROTO_SYSTEM: u16 = 0xFFFF;

/// Probe every downstream unit of an object and report its health.
pub const SYSTEM_COMMAND_INSPECT: u16 = 0xFFFE;
/// Block until the object is healthy or a timeout (DF0, seconds) elapses.
pub const SYSTEM_COMMAND_REGISTER: u16 = 0xFFFF;

/// Option bit: the reply is one of several packets; read again.
pub const OPTION_MORE_PACKET: u16 = 0x8000;

pub const SERIAL_RPC_PORT: u16 = 12000;
pub const DETECTOR_RPC_PORT: u16 = 12001;
pub const TELESCOPE_RPC_PORT: u16 = 13000;
pub const AWS_RPC_PORT: u16 = 13001;
pub const PDU_RPC_PORT: u16 = 13002;
pub const SMS_RPC_PORT: u16 = 13003;

/// Human-readable family name for logs and metric labels.
pub fn protocol_name(protocol: u16) -> &'static str {
    match protocol {
        PROTO_SERIAL => "serial",
        PROTO_TELESCOPE => "telescope",
        PROTO_LOG => "log",
        PROTO_AWS => "aws",
        PROTO_PDU => "pdu",
        PROTO_SMS => "sms",
        PROTO_DETECTOR => "detector",
        PROTO_SYSTEM => "system",
        _ => "unknown",
    }
}
