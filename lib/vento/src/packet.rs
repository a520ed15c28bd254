//! Frame codec for the Blauberg Vento Expert v.2 UDP protocol.
//!
//! A frame is `0xFD 0xFD`, protocol type `0x02`, a 16-byte ASCII device id,
//! a length-prefixed password, a function byte, the parameter stream and a
//! little-endian wrapping sum of every byte after the preamble.

use std::collections::BTreeMap;

use crate::error::DecodeError;

pub const DEVICE_ID_LEN: usize = 16;

const PREAMBLE: [u8; 2] = [0xFD, 0xFD];
const PROTOCOL_TYPE: u8 = 0x02;

/// `0xFE <size>` prefixes a value longer (or shorter) than one byte.
const MARKER_SIZE: u8 = 0xFE;
/// `0xFC <page>` switches the high byte of subsequent field codes.
const MARKER_PAGE: u8 = 0xFC;
/// `0xFF <code>` marks a parameter the firmware does not support.
const MARKER_NOT_SUPPORTED: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Read,
    Write,
    WriteRead,
    Inc,
    Dec,
    Response,
}

impl Func {
    fn from_byte(byte: u8) -> Option<Func> {
        match byte {
            0x01 => Some(Func::Read),
            0x02 => Some(Func::Write),
            0x03 => Some(Func::WriteRead),
            0x04 => Some(Func::Inc),
            0x05 => Some(Func::Dec),
            0x06 => Some(Func::Response),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Func::Read => 0x01,
            Func::Write => 0x02,
            Func::WriteRead => 0x03,
            Func::Inc => 0x04,
            Func::Dec => 0x05,
            Func::Response => 0x06,
        }
    }
}

#[derive(Debug)]
pub struct Packet {
    pub device_id: String,
    pub password: String,
    pub func: Func,
    /// Raw value per field code. Read requests carry empty values.
    pub params: BTreeMap<u16, Vec<u8>>,
}

impl Packet {
    pub fn read_request(
        device_id: &str,
        password: &str,
        codes: impl IntoIterator<Item = u16>,
    ) -> Packet {
        Packet {
            device_id: device_id.to_string(),
            password: password.to_string(),
            func: Func::Read,
            params: codes.into_iter().map(|code| (code, vec![])).collect(),
        }
    }

    pub fn write_request(device_id: &str, password: &str, code: u16, value: Vec<u8>) -> Packet {
        Packet {
            device_id: device_id.to_string(),
            password: password.to_string(),
            func: Func::WriteRead,
            params: BTreeMap::from([(code, value)]),
        }
    }

    /// Fire-and-forget write, no readback expected beyond the ack frame.
    pub fn action_request(device_id: &str, password: &str, code: u16) -> Packet {
        Packet {
            device_id: device_id.to_string(),
            password: password.to_string(),
            func: Func::Write,
            params: BTreeMap::from([(code, vec![])]),
        }
    }

    pub fn read_from(bytes: &[u8]) -> Result<Packet, DecodeError> {
        if bytes.len() < 2 + 2 + DEVICE_ID_LEN + 1 + 1 + 2 {
            return Err(DecodeError::Truncated);
        }

        if bytes[..2] != PREAMBLE || bytes[2] != PROTOCOL_TYPE {
            return Err(DecodeError::BadPreamble);
        }

        if bytes[3] as usize != DEVICE_ID_LEN {
            return Err(DecodeError::BadPreamble);
        }

        let expected = checksum(&bytes[2..bytes.len() - 2]);
        let got = u16::from_le_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
        if expected != got {
            return Err(DecodeError::BadChecksum { expected, got });
        }

        let device_id = std::str::from_utf8(&bytes[4..4 + DEVICE_ID_LEN])
            .map_err(|_| DecodeError::BadDeviceId)?
            .to_string();

        let mut offset = 4 + DEVICE_ID_LEN;
        let password_len = bytes[offset] as usize;
        offset += 1;
        if offset + password_len + 1 > bytes.len() - 2 {
            return Err(DecodeError::Truncated);
        }

        let password = std::str::from_utf8(&bytes[offset..offset + password_len])
            .map_err(|_| DecodeError::BadDeviceId)?
            .to_string();
        offset += password_len;

        let func = Func::from_byte(bytes[offset]).ok_or(DecodeError::UnexpectedFunction(bytes[offset]))?;
        offset += 1;

        let params = parse_params(&bytes[offset..bytes.len() - 2], func)?;

        Ok(Packet {
            device_id,
            password,
            func,
            params,
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&PREAMBLE);
        out.push(PROTOCOL_TYPE);
        out.push(DEVICE_ID_LEN as u8);

        let mut id = self.device_id.as_bytes().to_vec();
        id.resize(DEVICE_ID_LEN, b' ');
        out.extend_from_slice(&id);

        out.push(self.password.len() as u8);
        out.extend_from_slice(self.password.as_bytes());

        out.push(self.func.to_byte());

        let mut page = 0u8;
        for (code, value) in &self.params {
            let hi = (code >> 8) as u8;
            if hi != page {
                out.push(MARKER_PAGE);
                out.push(hi);
                page = hi;
            }

            let lo = (code & 0xFF) as u8;
            match self.func {
                Func::Read => out.push(lo),
                _ if value.len() == 1 => {
                    out.push(lo);
                    out.push(value[0]);
                }
                _ => {
                    out.push(MARKER_SIZE);
                    out.push(value.len() as u8);
                    out.push(lo);
                    out.extend_from_slice(value);
                }
            }
        }

        let sum = checksum(&out[2..]);
        out.extend_from_slice(&sum.to_le_bytes());

        out
    }
}

fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(*byte as u16))
}

fn parse_params(body: &[u8], func: Func) -> Result<BTreeMap<u16, Vec<u8>>, DecodeError> {
    let mut params = BTreeMap::new();
    let mut page = 0u16;
    let mut offset = 0;

    while offset < body.len() {
        match body[offset] {
            MARKER_PAGE => {
                page = (take(body, offset + 1, 1)?[0] as u16) << 8;
                offset += 2;
            }
            MARKER_NOT_SUPPORTED => {
                // absent on this firmware, skip without recording a value
                take(body, offset + 1, 1)?;
                offset += 2;
            }
            MARKER_SIZE => {
                let size = take(body, offset + 1, 1)?[0] as usize;
                let code = page | take(body, offset + 2, 1)?[0] as u16;
                let value = take(body, offset + 3, size)?.to_vec();
                params.insert(code, value);
                offset += 3 + size;
            }
            lo => {
                let code = page | lo as u16;
                let size = if func == Func::Read { 0 } else { 1 };
                let value = take(body, offset + 1, size)?.to_vec();
                params.insert(code, value);
                offset += 1 + size;
            }
        }
    }

    Ok(params)
}

fn take(body: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    body.get(offset..offset + len).ok_or(DecodeError::Truncated)
}
