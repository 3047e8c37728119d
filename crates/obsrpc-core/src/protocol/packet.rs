//! Packet envelope: fixed header, 16-byte carrier, trailing buffer.
//!
//! Wire layout (little-endian):
//! ```text
//! 0   protocol  u16     8   channel    u16
//! 2   index     u16     10  errorcode  u16
//! 4   command   u16     12  length     u32
//! 6   option    u16     16  carrier    [u8; 16]
//! 32  trailing buffer, `length` bytes
//! ```
//!
//! The carrier is a union: eight u16, four u32, two u64, four f32, two f64, or
//! a NUL-terminated string of at most 15 bytes. Every view aliases the same 16
//! bytes, so writing `U32F0` changes `U16F0` and `U16F1`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ObsError, Result};

/// Fixed header plus carrier.
pub const HEADER_SIZE: usize = 32;
/// Size of the carrier union.
pub const CARRIER_SIZE: usize = 16;
/// Envelope capacity used when none is requested.
pub const DEFAULT_CAPACITY: usize = 992;

/// Field identifiers (stable wire numbering).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Protocol = 1,
    Index = 2,
    Command = 3,
    Option = 4,
    Channel = 5,
    ErrorCode = 6,
    Length = 7,
    U16F0 = 8,
    U16F1 = 9,
    U16F2 = 10,
    U16F3 = 11,
    U16F4 = 12,
    U16F5 = 13,
    U16F6 = 14,
    U16F7 = 15,
    U32F0 = 16,
    U32F1 = 17,
    U32F2 = 18,
    U32F3 = 19,
    FF0 = 20,
    FF1 = 21,
    FF2 = 22,
    FF3 = 23,
    DF0 = 24,
    DF1 = 25,
    Str = 26,
    Buf = 27,
    Size = 28,
    U64F0 = 29,
    U64F1 = 30,
}

impl FieldId {
    pub const ALL: [FieldId; 30] = [
        FieldId::Protocol,
        FieldId::Index,
        FieldId::Command,
        FieldId::Option,
        FieldId::Channel,
        FieldId::ErrorCode,
        FieldId::Length,
        FieldId::U16F0,
        FieldId::U16F1,
        FieldId::U16F2,
        FieldId::U16F3,
        FieldId::U16F4,
        FieldId::U16F5,
        FieldId::U16F6,
        FieldId::U16F7,
        FieldId::U32F0,
        FieldId::U32F1,
        FieldId::U32F2,
        FieldId::U32F3,
        FieldId::FF0,
        FieldId::FF1,
        FieldId::FF2,
        FieldId::FF3,
        FieldId::DF0,
        FieldId::DF1,
        FieldId::Str,
        FieldId::Buf,
        FieldId::Size,
        FieldId::U64F0,
        FieldId::U64F1,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        FieldId::ALL.iter().copied().find(|f| *f as u8 == v)
    }

    /// The value kind this field accepts and yields.
    pub fn kind(self) -> ValueKind {
        match self {
            FieldId::Protocol
            | FieldId::Index
            | FieldId::Command
            | FieldId::Option
            | FieldId::Channel
            | FieldId::ErrorCode
            | FieldId::U16F0
            | FieldId::U16F1
            | FieldId::U16F2
            | FieldId::U16F3
            | FieldId::U16F4
            | FieldId::U16F5
            | FieldId::U16F6
            | FieldId::U16F7 => ValueKind::U16,
            FieldId::Length
            | FieldId::U32F0
            | FieldId::U32F1
            | FieldId::U32F2
            | FieldId::U32F3 => ValueKind::U32,
            FieldId::U64F0 | FieldId::U64F1 => ValueKind::U64,
            FieldId::FF0 | FieldId::FF1 | FieldId::FF2 | FieldId::FF3 => ValueKind::F32,
            FieldId::DF0 | FieldId::DF1 => ValueKind::F64,
            FieldId::Str => ValueKind::Str,
            FieldId::Buf => ValueKind::Bytes,
            FieldId::Size => ValueKind::Size,
        }
    }

    /// Byte offset inside the carrier for carrier sub-fields.
    fn carrier_offset(self) -> Option<usize> {
        let off = match self {
            FieldId::U16F0 => 0,
            FieldId::U16F1 => 2,
            FieldId::U16F2 => 4,
            FieldId::U16F3 => 6,
            FieldId::U16F4 => 8,
            FieldId::U16F5 => 10,
            FieldId::U16F6 => 12,
            FieldId::U16F7 => 14,
            FieldId::U32F0 | FieldId::FF0 => 0,
            FieldId::U32F1 | FieldId::FF1 => 4,
            FieldId::U32F2 | FieldId::FF2 => 8,
            FieldId::U32F3 | FieldId::FF3 => 12,
            FieldId::U64F0 | FieldId::DF0 => 0,
            FieldId::U64F1 | FieldId::DF1 => 8,
            _ => return None,
        };
        Some(off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bytes,
    Size,
}

/// A typed field value. Borrowed variants point into the caller's data on
/// `set` and into the packet on `get`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
    Size(usize),
}

impl Value<'_> {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Size(_) => ValueKind::Size,
        }
    }
}

fn mismatch(field: FieldId, expected: ValueKind, got: ValueKind) -> ObsError {
    ObsError::Decode(format!(
        "field {field:?} holds {expected:?}, not {got:?}"
    ))
}

/// One wire message, reused across every call on a connection.
///
/// `buf.len()` is the envelope's capacity; `length` is how much of it is in
/// use. Growing the buffer invalidates earlier slices, which the borrow
/// checker already forbids.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    protocol: u16,
    index: u16,
    command: u16,
    option: u16,
    channel: u16,
    errorcode: u16,
    length: u32,
    carrier: [u8; CARRIER_SIZE],
    buf: Vec<u8>,
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet {
    /// Envelope with [`DEFAULT_CAPACITY`] trailing bytes.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Envelope with `capacity` trailing bytes; `0` selects the default.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            protocol: 0,
            index: 0,
            command: 0,
            option: 0,
            channel: 0,
            errorcode: 0,
            length: 0,
            carrier: [0; CARRIER_SIZE],
            buf: vec![0; capacity],
        }
    }

    // ---- header scalars

    pub fn protocol(&self) -> u16 {
        self.protocol
    }
    pub fn set_protocol(&mut self, v: u16) {
        self.protocol = v;
    }
    pub fn index(&self) -> u16 {
        self.index
    }
    pub fn set_index(&mut self, v: u16) {
        self.index = v;
    }
    pub fn command(&self) -> u16 {
        self.command
    }
    pub fn set_command(&mut self, v: u16) {
        self.command = v;
    }
    pub fn option(&self) -> u16 {
        self.option
    }
    pub fn set_option(&mut self, v: u16) {
        self.option = v;
    }
    pub fn channel(&self) -> u16 {
        self.channel
    }
    pub fn set_channel(&mut self, v: u16) {
        self.channel = v;
    }
    pub fn errorcode(&self) -> u16 {
        self.errorcode
    }
    pub fn set_errorcode(&mut self, v: u16) {
        self.errorcode = v;
    }
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Record how many trailing bytes are in use, growing the envelope when
    /// `len` exceeds the current capacity.
    pub fn set_length(&mut self, len: u32) -> Result<()> {
        self.reallocate(len as usize)?;
        self.length = len;
        Ok(())
    }

    /// Drop the trailing payload (`length = 0`). Never fails.
    pub fn clear_payload(&mut self) {
        self.length = 0;
    }

    /// Tracked envelope capacity (the `SIZE` field).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Grow the envelope to at least `size` trailing bytes.
    ///
    /// On allocation failure nothing changes and `OutOfMemory` is returned.
    /// Capacity never shrinks here.
    pub fn reallocate(&mut self, size: usize) -> Result<()> {
        let current = self.buf.len();
        if size <= current {
            return Ok(());
        }
        self.buf
            .try_reserve_exact(size - current)
            .map_err(|_| ObsError::OutOfMemory(size))?;
        self.buf.resize(size, 0);
        tracing::trace!(from = current, to = size, "packet envelope grown");
        Ok(())
    }

    // ---- generic field access

    /// Write one field. Only `Length`, `Buf`, and `Str` can fail; a value of
    /// the wrong kind is a decode error.
    pub fn set(&mut self, field: FieldId, value: Value<'_>) -> Result<()> {
        let expected = field.kind();
        if value.kind() != expected {
            return Err(mismatch(field, expected, value.kind()));
        }
        match (field, value) {
            (FieldId::Protocol, Value::U16(v)) => self.protocol = v,
            (FieldId::Index, Value::U16(v)) => self.index = v,
            (FieldId::Command, Value::U16(v)) => self.command = v,
            (FieldId::Option, Value::U16(v)) => self.option = v,
            (FieldId::Channel, Value::U16(v)) => self.channel = v,
            (FieldId::ErrorCode, Value::U16(v)) => self.errorcode = v,
            (FieldId::Length, Value::U32(v)) => self.set_length(v)?,
            (FieldId::Str, Value::Str(s)) => self.set_string(s)?,
            (FieldId::Buf, Value::Bytes(b)) => self.set_buffer(b)?,
            (FieldId::Size, _) => {
                return Err(ObsError::InvalidArgument(
                    "SIZE is read-only; use reallocate".into(),
                ))
            }
            (f, Value::U16(v)) => self.put_carrier(f, &v.to_le_bytes()),
            (f, Value::U32(v)) => self.put_carrier(f, &v.to_le_bytes()),
            (f, Value::U64(v)) => self.put_carrier(f, &v.to_le_bytes()),
            (f, Value::F32(v)) => self.put_carrier(f, &v.to_le_bytes()),
            (f, Value::F64(v)) => self.put_carrier(f, &v.to_le_bytes()),
            (f, v) => return Err(mismatch(f, expected, v.kind())),
        }
        Ok(())
    }

    /// Read one field.
    pub fn get(&self, field: FieldId) -> Result<Value<'_>> {
        let v = match field {
            FieldId::Protocol => Value::U16(self.protocol),
            FieldId::Index => Value::U16(self.index),
            FieldId::Command => Value::U16(self.command),
            FieldId::Option => Value::U16(self.option),
            FieldId::Channel => Value::U16(self.channel),
            FieldId::ErrorCode => Value::U16(self.errorcode),
            FieldId::Length => Value::U32(self.length),
            FieldId::Str => Value::Str(self.string()?),
            FieldId::Buf => Value::Bytes(self.buffer()),
            FieldId::Size => Value::Size(self.capacity()),
            f => match f.kind() {
                ValueKind::U16 => Value::U16(u16::from_le_bytes(self.carrier_bytes(f))),
                ValueKind::U32 => Value::U32(u32::from_le_bytes(self.carrier_bytes(f))),
                ValueKind::U64 => Value::U64(u64::from_le_bytes(self.carrier_bytes(f))),
                ValueKind::F32 => Value::F32(f32::from_le_bytes(self.carrier_bytes(f))),
                ValueKind::F64 => Value::F64(f64::from_le_bytes(self.carrier_bytes(f))),
                other => return Err(mismatch(f, other, other)),
            },
        };
        Ok(v)
    }

    pub fn get_u16(&self, field: FieldId) -> Result<u16> {
        match self.get(field)? {
            Value::U16(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::U16, other.kind())),
        }
    }

    pub fn get_u32(&self, field: FieldId) -> Result<u32> {
        match self.get(field)? {
            Value::U32(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::U32, other.kind())),
        }
    }

    pub fn get_u64(&self, field: FieldId) -> Result<u64> {
        match self.get(field)? {
            Value::U64(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::U64, other.kind())),
        }
    }

    pub fn get_f32(&self, field: FieldId) -> Result<f32> {
        match self.get(field)? {
            Value::F32(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::F32, other.kind())),
        }
    }

    pub fn get_f64(&self, field: FieldId) -> Result<f64> {
        match self.get(field)? {
            Value::F64(v) => Ok(v),
            other => Err(mismatch(field, ValueKind::F64, other.kind())),
        }
    }

    // ---- carrier shortcuts used by handlers

    pub fn df0(&self) -> f64 {
        f64::from_le_bytes(self.carrier_bytes(FieldId::DF0))
    }
    pub fn set_df0(&mut self, v: f64) {
        self.put_carrier(FieldId::DF0, &v.to_le_bytes());
    }
    pub fn df1(&self) -> f64 {
        f64::from_le_bytes(self.carrier_bytes(FieldId::DF1))
    }
    pub fn set_df1(&mut self, v: f64) {
        self.put_carrier(FieldId::DF1, &v.to_le_bytes());
    }
    pub fn u32f0(&self) -> u32 {
        u32::from_le_bytes(self.carrier_bytes(FieldId::U32F0))
    }
    pub fn set_u32f0(&mut self, v: u32) {
        self.put_carrier(FieldId::U32F0, &v.to_le_bytes());
    }

    fn carrier_bytes<const N: usize>(&self, field: FieldId) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(off) = field.carrier_offset() {
            if let Some(src) = self.carrier.get(off..off + N) {
                out.copy_from_slice(src);
            }
        }
        out
    }

    fn put_carrier(&mut self, field: FieldId, bytes: &[u8]) {
        if let Some(off) = field.carrier_offset() {
            if let Some(dst) = self.carrier.get_mut(off..off + bytes.len()) {
                dst.copy_from_slice(bytes);
            }
        }
    }

    // ---- inline string

    /// Inline string up to the first NUL. Borrowed, so it cannot outlive the
    /// next mutation of the packet.
    pub fn string(&self) -> Result<&str> {
        let end = self
            .carrier
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(CARRIER_SIZE);
        std::str::from_utf8(&self.carrier[..end])
            .map_err(|e| ObsError::Decode(format!("inline string is not utf-8: {e}")))
    }

    /// Store a string of at most 15 bytes in the carrier.
    pub fn set_string(&mut self, s: &str) -> Result<()> {
        if s.len() > CARRIER_SIZE - 1 {
            return Err(ObsError::InvalidArgument(format!(
                "inline string is {} bytes, max {}",
                s.len(),
                CARRIER_SIZE - 1
            )));
        }
        if s.as_bytes().contains(&0) {
            return Err(ObsError::InvalidArgument("inline string contains NUL".into()));
        }
        self.carrier = [0; CARRIER_SIZE];
        self.carrier[..s.len()].copy_from_slice(s.as_bytes());
        Ok(())
    }

    // ---- trailing buffer

    /// The in-use part of the trailing buffer (`length` bytes).
    pub fn buffer(&self) -> &[u8] {
        let end = (self.length as usize).min(self.buf.len());
        &self.buf[..end]
    }

    /// The whole trailing buffer, for handlers that fill it in place before
    /// calling [`Packet::set_length`].
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Copy `data` into the trailing buffer, growing as needed, and record its
    /// size into `length`.
    pub fn set_buffer(&mut self, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| {
            ObsError::InvalidArgument(format!("payload of {} bytes exceeds u32", data.len()))
        })?;
        self.reallocate(data.len())?;
        self.buf[..data.len()].copy_from_slice(data);
        self.length = len;
        Ok(())
    }

    // ---- object names (inline when short, buffer otherwise)

    /// Carry `name` the way every service expects it: names shorter than 16
    /// bytes go into the inline slot with `length = 0`, longer ones into the
    /// buffer with a trailing NUL.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() < CARRIER_SIZE {
            self.set_string(name)?;
            self.length = 0;
            return Ok(());
        }
        let mut raw = Vec::with_capacity(name.len() + 1);
        raw.extend_from_slice(name.as_bytes());
        raw.push(0);
        self.set_buffer(&raw)
    }

    /// Read a name written by [`Packet::set_name`].
    pub fn name(&self) -> Result<&str> {
        if self.length == 0 {
            return self.string();
        }
        let raw = self.buffer();
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..end])
            .map_err(|e| ObsError::Decode(format!("name is not utf-8: {e}")))
    }

    // ---- wire encoding

    /// Serialize header + carrier.
    pub fn encode_header(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        {
            let mut w = &mut out[..];
            w.put_u16_le(self.protocol);
            w.put_u16_le(self.index);
            w.put_u16_le(self.command);
            w.put_u16_le(self.option);
            w.put_u16_le(self.channel);
            w.put_u16_le(self.errorcode);
            w.put_u32_le(self.length);
            w.put_slice(&self.carrier);
        }
        out
    }

    /// Overwrite header + carrier from raw bytes. The trailing buffer is left
    /// alone; callers grow it to `length` before reading the payload.
    pub fn decode_header(&mut self, raw: &[u8]) -> Result<()> {
        if raw.len() < HEADER_SIZE {
            return Err(ObsError::Decode(format!(
                "header needs {HEADER_SIZE} bytes, got {}",
                raw.len()
            )));
        }
        let mut r = raw;
        self.protocol = r.get_u16_le();
        self.index = r.get_u16_le();
        self.command = r.get_u16_le();
        self.option = r.get_u16_le();
        self.channel = r.get_u16_le();
        self.errorcode = r.get_u16_le();
        self.length = r.get_u32_le();
        r.copy_to_slice(&mut self.carrier);
        Ok(())
    }

    /// Whole frame: header followed by `length` payload bytes.
    pub fn to_bytes(&self) -> Bytes {
        let payload = self.buffer();
        let mut out = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        out.put_slice(&self.encode_header());
        out.put_slice(payload);
        out.freeze()
    }

    /// Parse a whole frame. Trailing bytes beyond `length` are rejected.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let mut packet = Packet::new();
        packet.decode_header(raw)?;
        let mut rest = &raw[HEADER_SIZE..];
        let len = packet.length as usize;
        if rest.remaining() != len {
            return Err(ObsError::Decode(format!(
                "frame declares {len} payload bytes, carries {}",
                rest.remaining()
            )));
        }
        packet.reallocate(len)?;
        rest.copy_to_slice(&mut packet.buf[..len]);
        Ok(packet)
    }
}
