//! TFTP wire packets: opcodes, error codes, and the marshal/unmarshal codec
//! (RFC 1350 §5, octet mode only).

use std::fmt;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Largest legal packet on the wire: 2-byte opcode + 2-byte block + 512 bytes of data.
pub const MAX_PACKET_SIZE: usize = 516;

/// Largest legal DATA payload; a shorter payload marks the final block of a transfer.
pub const BLOCK_SIZE: usize = 512;

#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive)]
#[repr(u16)]
pub enum OpCode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

/// Error codes from RFC 1350 §5. `UnknownTid` is never emitted by this server
/// (foreign-TID datagrams are dropped silently, see `crate::connection`); it is kept
/// here for completeness and symmetry with `ErrorCode::from_u16`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive)]
#[repr(u16)]
pub enum ErrorCode {
    Undefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTid = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
}

/// A parsed TFTP packet.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Packet {
    Rrq { filename: String, mode: String },
    Wrq { filename: String, mode: String },
    Data { block: u16, data: Vec<u8> },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
}

impl Packet {
    /// Builds an ERROR packet, which is always a terminal reply (see `crate::session`).
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Packet {
        Packet::Error { code, message: message.into() }
    }

    fn opcode(&self) -> OpCode {
        match self {
            Packet::Rrq { .. } => OpCode::Rrq,
            Packet::Wrq { .. } => OpCode::Wrq,
            Packet::Data { .. } => OpCode::Data,
            Packet::Ack { .. } => OpCode::Ack,
            Packet::Error { .. } => OpCode::Error,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Rrq { filename, mode } => write!(f, "RRQ({filename}, {mode})"),
            Packet::Wrq { filename, mode } => write!(f, "WRQ({filename}, {mode})"),
            Packet::Data { block, data } => write!(f, "DATA({block}, {} bytes)", data.len()),
            Packet::Ack { block } => write!(f, "ACK({block})"),
            Packet::Error { code, message } => write!(f, "ERROR({code:?}, {message:?})"),
        }
    }
}

/// Reasons `unmarshal` can reject a datagram (§4.1).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseError {
    TooShort,
    UnknownOpcode(u16),
    UnknownErrorCode(u16),
    MissingNullTerminator,
    InvalidAckLength,
    NotUtf8,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooShort => write!(f, "packet shorter than the opcode field"),
            ParseError::UnknownOpcode(code) => write!(f, "unknown opcode {code}"),
            ParseError::UnknownErrorCode(code) => write!(f, "unknown error code {code}"),
            ParseError::MissingNullTerminator => write!(f, "missing null terminator in text field"),
            ParseError::InvalidAckLength => write!(f, "ACK payload must be exactly 2 bytes"),
            ParseError::NotUtf8 => write!(f, "text field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a packet from its byte representation (§4.1).
pub fn unmarshal(bytes: &[u8]) -> Result<Packet, ParseError> {
    let mut cursor = bytes;
    let raw_opcode = cursor.read_u16::<BigEndian>().map_err(|_| ParseError::TooShort)?;
    let opcode = OpCode::from_u16(raw_opcode).ok_or(ParseError::UnknownOpcode(raw_opcode))?;
    match opcode {
        OpCode::Rrq => read_request(cursor).map(|(filename, mode)| Packet::Rrq { filename, mode }),
        OpCode::Wrq => read_request(cursor).map(|(filename, mode)| Packet::Wrq { filename, mode }),
        OpCode::Data => read_data(cursor),
        OpCode::Ack => read_ack(cursor),
        OpCode::Error => read_error(cursor),
    }
}

/// Serializes a packet to its byte representation (§4.1). Always succeeds: every
/// `Packet` value constructible in safe code is, by construction, legal on the wire.
pub fn marshal(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_PACKET_SIZE);
    buf.write_u16::<BigEndian>(packet.opcode() as u16).expect("writing to a Vec cannot fail");
    match packet {
        Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
            write_cstr(&mut buf, filename);
            write_cstr(&mut buf, mode);
        }
        Packet::Data { block, data } => {
            buf.write_u16::<BigEndian>(*block).expect("writing to a Vec cannot fail");
            buf.extend_from_slice(data);
        }
        Packet::Ack { block } => {
            buf.write_u16::<BigEndian>(*block).expect("writing to a Vec cannot fail");
        }
        Packet::Error { code, message } => {
            buf.write_u16::<BigEndian>(*code as u16).expect("writing to a Vec cannot fail");
            write_cstr(&mut buf, message);
        }
    }
    buf
}

fn write_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Splits `bytes` on the first `0x00`, returning the text before it and the remainder
/// after it. `None` if there is no terminator.
fn split_cstr(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == 0)?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

fn read_request(bytes: &[u8]) -> Result<(String, String), ParseError> {
    let (filename, rest) = split_cstr(bytes).ok_or(ParseError::MissingNullTerminator)?;
    let (mode, _) = split_cstr(rest).ok_or(ParseError::MissingNullTerminator)?;
    Ok((to_text(filename)?, to_text(mode)?))
}

fn read_data(mut bytes: &[u8]) -> Result<Packet, ParseError> {
    let block = bytes.read_u16::<BigEndian>().map_err(|_| ParseError::TooShort)?;
    Ok(Packet::Data { block, data: bytes.to_vec() })
}

fn read_ack(mut bytes: &[u8]) -> Result<Packet, ParseError> {
    if bytes.len() != 2 {
        return Err(ParseError::InvalidAckLength);
    }
    let block = bytes.read_u16::<BigEndian>().map_err(|_| ParseError::TooShort)?;
    Ok(Packet::Ack { block })
}

fn read_error(mut bytes: &[u8]) -> Result<Packet, ParseError> {
    let raw_code = bytes.read_u16::<BigEndian>().map_err(|_| ParseError::TooShort)?;
    let code = ErrorCode::from_u16(raw_code).ok_or(ParseError::UnknownErrorCode(raw_code))?;
    let (message, _) = split_cstr(bytes).ok_or(ParseError::MissingNullTerminator)?;
    Ok(Packet::Error { code, message: to_text(message)? })
}

fn to_text(bytes: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| ParseError::NotUtf8)
}
