use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use crate::param::Param;

#[derive(Debug)]
pub enum Error {
    Transport(TransportError),
    Decode(DecodeError),
    Auth { expected: String, got: String },
    OutOfRange { param: Param, value: i64, min: i64, max: i64 },
    InvalidValue { param: Param, expected: &'static str },
    IdCollision(String),
    DevicesNotFound(Ipv4Addr),
    BadConfig(String),
}

#[derive(Debug)]
pub enum TransportError {
    Io(io::Error),
    Timeout(SocketAddr),
    EmptyResponse(SocketAddr),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    BadPreamble,
    BadChecksum { expected: u16, got: u16 },
    UnexpectedFunction(u8),
    BadDeviceId,
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Transport(TransportError::Io(err))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::Auth { expected, got } => {
                write!(f, "device id mismatch: expected {expected}, got {got}")
            }
            Self::OutOfRange {
                param,
                value,
                min,
                max,
            } => {
                write!(f, "{param:?} value {value} outside range {min}..={max}")
            }
            Self::InvalidValue { param, expected } => {
                write!(f, "{param:?} expects {expected}")
            }
            Self::IdCollision(id) => {
                write!(f, "device id {id} is already claimed by another session")
            }
            Self::DevicesNotFound(ip) => {
                if ip.is_broadcast() {
                    write!(f, "fans not found")
                } else {
                    write!(f, "fan {ip} not found")
                }
            }
            Self::BadConfig(reason) => write!(f, "bad config: {reason}"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Timeout(addr) => write!(f, "no response from {addr}"),
            Self::EmptyResponse(addr) => write!(f, "empty response from {addr}"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated frame"),
            Self::BadPreamble => write!(f, "invalid preamble"),
            Self::BadChecksum { expected, got } => {
                write!(f, "invalid checksum: expected {expected:04x}, got {got:04x}")
            }
            Self::UnexpectedFunction(func) => write!(f, "unexpected function byte {func:02x}"),
            Self::BadDeviceId => write!(f, "device id is not ASCII"),
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for TransportError {}
impl std::error::Error for DecodeError {}
