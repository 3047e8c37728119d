//! Shared error types across obsrpc crates.

use thiserror::Error;

/// Wire-level status codes (stable API).
///
/// The numeric values travel in the packet's `errorcode` field and must stay
/// identical between clients and servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Access,
    Again,
    BadDescriptor,
    BadMessage,
    Busy,
    ConnectionRefused,
    ConnectionReset,
    Closed,
    AlreadyExists,
    HostUnreachable,
    Io,
    InvalidArgument,
    Interrupted,
    NetworkDown,
    NetworkUnreachable,
    NoEntry,
    OutOfMemory,
    NoSpace,
    NotDirectory,
    NotSupported,
    Permission,
    BrokenPipe,
    ProtocolWrong,
    NoSuchProcess,
    TimedOut,
    Already,
    BadCommand,
    CommandNotSupported,
    CommandTooLong,
    Canceled,
    DeviceNotLoaded,
    DeviceMalfunction,
    Empty,
    Failed,
    NotFound,
    MorePackets,
    NoOption,
    PowerOff,
    Uninitialized,
    Error,
    /// A code this build does not know about.
    Unknown(u16),
}

impl ErrorCode {
    /// Numeric value carried on the wire. `0` is reserved for success.
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::Access => 1,
            ErrorCode::Again => 2,
            ErrorCode::BadDescriptor => 3,
            ErrorCode::BadMessage => 4,
            ErrorCode::Busy => 5,
            ErrorCode::ConnectionRefused => 6,
            ErrorCode::ConnectionReset => 7,
            ErrorCode::Closed => 8,
            ErrorCode::AlreadyExists => 9,
            ErrorCode::HostUnreachable => 10,
            ErrorCode::Io => 11,
            ErrorCode::InvalidArgument => 12,
            ErrorCode::Interrupted => 13,
            ErrorCode::NetworkDown => 14,
            ErrorCode::NetworkUnreachable => 15,
            ErrorCode::NoEntry => 16,
            ErrorCode::OutOfMemory => 17,
            ErrorCode::NoSpace => 18,
            ErrorCode::NotDirectory => 19,
            ErrorCode::NotSupported => 20,
            ErrorCode::Permission => 21,
            ErrorCode::BrokenPipe => 22,
            ErrorCode::ProtocolWrong => 23,
            ErrorCode::NoSuchProcess => 24,
            ErrorCode::TimedOut => 25,
            ErrorCode::Already => 26,
            ErrorCode::BadCommand => 27,
            ErrorCode::CommandNotSupported => 28,
            ErrorCode::CommandTooLong => 29,
            ErrorCode::Canceled => 30,
            ErrorCode::DeviceNotLoaded => 31,
            ErrorCode::DeviceMalfunction => 32,
            ErrorCode::Empty => 33,
            ErrorCode::Failed => 34,
            ErrorCode::NotFound => 35,
            ErrorCode::MorePackets => 36,
            ErrorCode::NoOption => 37,
            ErrorCode::PowerOff => 38,
            ErrorCode::Uninitialized => 39,
            ErrorCode::Error => 40,
            ErrorCode::Unknown(v) => v,
        }
    }

    /// Decode a wire value. Returns `None` for `0` (success).
    pub fn from_u16(v: u16) -> Option<Self> {
        let code = match v {
            0 => return None,
            1 => ErrorCode::Access,
            2 => ErrorCode::Again,
            3 => ErrorCode::BadDescriptor,
            4 => ErrorCode::BadMessage,
            5 => ErrorCode::Busy,
            6 => ErrorCode::ConnectionRefused,
            7 => ErrorCode::ConnectionReset,
            8 => ErrorCode::Closed,
            9 => ErrorCode::AlreadyExists,
            10 => ErrorCode::HostUnreachable,
            11 => ErrorCode::Io,
            12 => ErrorCode::InvalidArgument,
            13 => ErrorCode::Interrupted,
            14 => ErrorCode::NetworkDown,
            15 => ErrorCode::NetworkUnreachable,
            16 => ErrorCode::NoEntry,
            17 => ErrorCode::OutOfMemory,
            18 => ErrorCode::NoSpace,
            19 => ErrorCode::NotDirectory,
            20 => ErrorCode::NotSupported,
            21 => ErrorCode::Permission,
            22 => ErrorCode::BrokenPipe,
            23 => ErrorCode::ProtocolWrong,
            24 => ErrorCode::NoSuchProcess,
            25 => ErrorCode::TimedOut,
            26 => ErrorCode::Already,
            27 => ErrorCode::BadCommand,
            28 => ErrorCode::CommandNotSupported,
            29 => ErrorCode::CommandTooLong,
            30 => ErrorCode::Canceled,
            31 => ErrorCode::DeviceNotLoaded,
            32 => ErrorCode::DeviceMalfunction,
            33 => ErrorCode::Empty,
            34 => ErrorCode::Failed,
            35 => ErrorCode::NotFound,
            36 => ErrorCode::MorePackets,
            37 => ErrorCode::NoOption,
            38 => ErrorCode::PowerOff,
            39 => ErrorCode::Uninitialized,
            40 => ErrorCode::Error,
            other => ErrorCode::Unknown(other),
        };
        Some(code)
    }

    /// Short symbolic name, used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Access => "EACCES",
            ErrorCode::Again => "EAGAIN",
            ErrorCode::BadDescriptor => "EBADF",
            ErrorCode::BadMessage => "EBADMSG",
            ErrorCode::Busy => "EBUSY",
            ErrorCode::ConnectionRefused => "ECONNREFUSED",
            ErrorCode::ConnectionReset => "ECONNRESET",
            ErrorCode::Closed => "ECLOSED",
            ErrorCode::AlreadyExists => "EEXIST",
            ErrorCode::HostUnreachable => "EHOSTUNREACH",
            ErrorCode::Io => "EIO",
            ErrorCode::InvalidArgument => "EINVAL",
            ErrorCode::Interrupted => "EINTR",
            ErrorCode::NetworkDown => "ENETDOWN",
            ErrorCode::NetworkUnreachable => "ENETUNREACH",
            ErrorCode::NoEntry => "ENOENT",
            ErrorCode::OutOfMemory => "ENOMEM",
            ErrorCode::NoSpace => "ENOSPC",
            ErrorCode::NotDirectory => "ENOTDIR",
            ErrorCode::NotSupported => "ENOTSUP",
            ErrorCode::Permission => "EPERM",
            ErrorCode::BrokenPipe => "EPIPE",
            ErrorCode::ProtocolWrong => "EPROTOWRONG",
            ErrorCode::NoSuchProcess => "ESRCH",
            ErrorCode::TimedOut => "ETIMEDOUT",
            ErrorCode::Already => "EALREADY",
            ErrorCode::BadCommand => "EBADCMD",
            ErrorCode::CommandNotSupported => "ECMDNOSUPPORT",
            ErrorCode::CommandTooLong => "ECMDTOOLONG",
            ErrorCode::Canceled => "ECANCELED",
            ErrorCode::DeviceNotLoaded => "EDEVNOTLOADED",
            ErrorCode::DeviceMalfunction => "EDEVMAL",
            ErrorCode::Empty => "EEMPTY",
            ErrorCode::Failed => "EFAILED",
            ErrorCode::NotFound => "ENOTFOUND",
            ErrorCode::MorePackets => "EMOREPACK",
            ErrorCode::NoOption => "ENOPTION",
            ErrorCode::PowerOff => "EPWROFF",
            ErrorCode::Uninitialized => "EUNINIT",
            ErrorCode::Error => "ERROR",
            ErrorCode::Unknown(_) => "EUNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Unknown(v) => write!(f, "EUNKNOWN({v})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Status returned by server-side handlers: `Err` is written into `errorcode`.
pub type Status = std::result::Result<(), ErrorCode>;

/// Shared result type.
pub type Result<T> = std::result::Result<T, ObsError>;

/// Unified error type used by core and node.
#[derive(Debug, Error)]
pub enum ObsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("out of memory: cannot grow envelope to {0} bytes")]
    OutOfMemory(usize),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ObsError {
    /// Map to the wire status a server writes back for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ObsError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ObsError::Decode(_) => ErrorCode::BadMessage,
            ObsError::OutOfMemory(_) => ErrorCode::OutOfMemory,
            ObsError::NotFound(_) => ErrorCode::NotFound,
            ObsError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            ObsError::UnsupportedVersion => ErrorCode::NotSupported,
            ObsError::Config(_) => ErrorCode::InvalidArgument,
            ObsError::Internal(_) => ErrorCode::Error,
        }
    }
}
