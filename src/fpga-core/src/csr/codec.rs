// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! CSR wire format.
//!
//! ```text
//! Request  (9 bytes): [opcode:1][address:4 BE][data:4 BE]
//! Response (>=5 bytes, only bytes 0..4 are interpreted): [status:1][value:4 BE]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WIRE_FRAME_LEN: usize = 9;
pub const RESPONSE_FRAME_LEN: usize = 5;
pub const STATUS_OK: u8 = 0x00;

const OPCODE_WRITE: u8 = 0x00;
const OPCODE_READ: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("value out of range: {0}")]
    InvalidRange(String),

    #[error("malformed hex: {0}")]
    MalformedHex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CsrOp {
    Write,
    Read,
}

impl CsrOp {
    pub fn opcode(self) -> u8 {
        match self {
            CsrOp::Write => OPCODE_WRITE,
            CsrOp::Read => OPCODE_READ,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            OPCODE_WRITE => Some(CsrOp::Write),
            OPCODE_READ => Some(CsrOp::Read),
            _ => None,
        }
    }
}

impl fmt::Display for CsrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsrOp::Write => write!(f, "WRITE"),
            CsrOp::Read => write!(f, "READ"),
        }
    }
}

/// One outbound CSR request. The data field of a read is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    op: CsrOp,
    address: u32,
    data: u32,
}

impl Command {
    pub fn read(address: u32) -> Self {
        Self {
            op: CsrOp::Read,
            address,
            data: 0,
        }
    }

    pub fn write(address: u32, data: u32) -> Self {
        Self {
            op: CsrOp::Write,
            address,
            data,
        }
    }

    pub fn op(&self) -> CsrOp {
        self.op
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn data(&self) -> u32 {
        self.data
    }

    pub fn to_frame(&self) -> WireFrame {
        let mut bytes = [0u8; WIRE_FRAME_LEN];
        bytes[0] = self.op.opcode();
        bytes[1..5].copy_from_slice(&self.address.to_be_bytes());
        bytes[5..9].copy_from_slice(&self.data.to_be_bytes());
        WireFrame(bytes)
    }
}

/// Serialized request, always exactly [`WIRE_FRAME_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFrame([u8; WIRE_FRAME_LEN]);

impl WireFrame {
    pub fn as_bytes(&self) -> &[u8; WIRE_FRAME_LEN] {
        &self.0
    }

    pub fn to_hex_text(&self) -> String {
        to_hex_text(&self.0)
    }
}

impl AsRef<[u8]> for WireFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Decoded reply. `value` is only meaningful for a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub status: u8,
    pub value: u32,
}

impl ResponseFrame {
    pub fn ok(value: u32) -> Self {
        Self {
            status: STATUS_OK,
            value,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn to_bytes(&self) -> [u8; RESPONSE_FRAME_LEN] {
        let mut bytes = [0u8; RESPONSE_FRAME_LEN];
        bytes[0] = self.status;
        bytes[1..5].copy_from_slice(&self.value.to_be_bytes());
        bytes
    }
}

/// Encode a request from raw user values, rejecting anything outside u32.
pub fn encode(op: CsrOp, address: i64, data: i64) -> Result<WireFrame, CodecError> {
    let address = u32::try_from(address)
        .map_err(|_| CodecError::InvalidRange(format!("address {} is not a u32", address)))?;
    let cmd = match op {
        CsrOp::Read => Command::read(address),
        CsrOp::Write => {
            let data = u32::try_from(data)
                .map_err(|_| CodecError::InvalidRange(format!("data {} is not a u32", data)))?;
            Command::write(address, data)
        }
    };
    Ok(cmd.to_frame())
}

/// Decode the first response frame in `bytes`; `None` while fewer than five
/// bytes have arrived. Trailing bytes are ignored.
pub fn decode_response(bytes: &[u8]) -> Option<ResponseFrame> {
    if bytes.len() < RESPONSE_FRAME_LEN {
        return None;
    }
    Some(ResponseFrame {
        status: bytes[0],
        value: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
    })
}

/// Decode a request frame (board side). `Ok(None)` while incomplete.
pub fn decode_command(bytes: &[u8]) -> Result<Option<Command>, CodecError> {
    if bytes.len() < WIRE_FRAME_LEN {
        return Ok(None);
    }
    let op = CsrOp::from_opcode(bytes[0])
        .ok_or_else(|| CodecError::InvalidRange(format!("unknown opcode 0x{:02X}", bytes[0])))?;
    let address = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let data = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    Ok(Some(match op {
        CsrOp::Read => Command::read(address),
        CsrOp::Write => Command::write(address, data),
    }))
}

/// Parse an address or data string such as `"0x10000"` or `"2A"`.
pub fn parse_u32_hex(text: &str) -> Result<u32, CodecError> {
    let trimmed = text.trim();
    if trimmed.starts_with('-') {
        return Err(CodecError::InvalidRange(format!("'{}' is negative", trimmed)));
    }
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(CodecError::InvalidRange(format!("'{}' is empty", trimmed)));
    }
    let value = u64::from_str_radix(digits, 16)
        .map_err(|e| CodecError::InvalidRange(format!("'{}': {}", trimmed, e)))?;
    u32::try_from(value)
        .map_err(|_| CodecError::InvalidRange(format!("'{}' exceeds 0xFFFFFFFF", trimmed)))
}

/// Render bytes as `"00 0A FF"`.
pub fn to_hex_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse `"00 0a 0xFF \x10"` style text; every token must be a byte.
pub fn parse_hex_text(text: &str) -> Result<Vec<u8>, CodecError> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .or_else(|| token.strip_prefix("\\x"))
                .unwrap_or(token);
            u8::from_str_radix(digits, 16)
                .map_err(|_| CodecError::MalformedHex(format!("invalid byte '{}'", token)))
        })
        .collect()
}
