//! # Packet Codec
//!
//! Deterministic framing/parsing of v2 packets with integrity checking and
//! magic/version discrimination.
//!
//! ## Header layout (16 bytes, network byte order)
//!
//! ```text
//!  0      1      2      3      4      5 .. 8        9 .. 12       13 14
//! [magic0][magic1][ver ][type][flags][  seq (u32) ][payload_len(u32)][crc16]
//! ```
//!
//! `magic = 0x53 0x4B` ("SK"), `version = 0x02`. CRC16 (CCITT, init 0xFFFF)
//! is computed over the 13 header bytes preceding the CRC field; it covers
//! the header only, not the payload.
//!
//! Note: summing the field widths above gives a 15-byte header
//! (2+1+1+1+4+4+2), not 16 as the nominal description states elsewhere.
//! This implementation treats 15 bytes as authoritative — it is what the
//! field-by-field layout and scenario 1's example bytes both produce.

use crc::{Crc, CRC_16_IBM_3740};

use crate::seq;

const MAGIC: [u8; 2] = [0x53, 0x4B];
const VERSION: u8 = 0x02;
pub const HEADER_LEN: usize = 15;

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

bitflags::bitflags! {
    /// Per-packet flags (header byte 5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const COMPRESSED      = 0x01;
        const ENCRYPTED       = 0x02;
        const MESSAGEPACK     = 0x04;
        const PATH_DICTIONARY = 0x08;
    }
}

/// The five packet kinds the wire format discriminates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data = 1,
    Ack = 2,
    Nak = 3,
    Heartbeat = 4,
    Hello = 5,
}

impl PacketType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(PacketType::Data),
            2 => Some(PacketType::Ack),
            3 => Some(PacketType::Nak),
            4 => Some(PacketType::Heartbeat),
            5 => Some(PacketType::Hello),
            _ => None,
        }
    }
}

/// A decoded header. The payload is returned separately as a borrowed slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub packet_type: PacketType,
    pub flags: Flags,
    pub sequence: u32,
    pub payload_length: u32,
}

/// Reason `parse` rejected a buffer — mirrors [`crate::error::ParseFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    TooSmall,
    BadMagic,
    BadVersion,
    UnknownType,
    CrcMismatch,
    LengthMismatch,
}

impl From<ParseError> for crate::error::ParseFailure {
    fn from(e: ParseError) -> Self {
        use crate::error::ParseFailure as F;
        match e {
            ParseError::TooSmall => F::TooSmall,
            ParseError::BadMagic => F::BadMagic,
            ParseError::BadVersion => F::BadVersion,
            ParseError::UnknownType => F::UnknownType,
            ParseError::CrcMismatch => F::CrcMismatch,
            ParseError::LengthMismatch => F::LengthMismatch,
        }
    }
}

fn crc16(header_first_14: &[u8]) -> u16 {
    CRC16.checksum(header_first_14)
}

fn build_header(packet_type: PacketType, flags: Flags, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    buf.push(packet_type as u8);
    buf.push(flags.bits());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    let crc = crc16(&buf[0..13]);
    buf.extend_from_slice(&crc.to_be_bytes());
    debug_assert_eq!(buf.len(), HEADER_LEN);
    buf.extend_from_slice(payload);
    buf
}

/// Build a DATA packet. The caller owns and increments its own sequence
/// counter; this function does not mutate any state — callers bump their
/// sequence after a successful build, per spec §4.1.
pub fn build_data(payload: &[u8], flags: Flags, seq: u32) -> Vec<u8> {
    build_header(PacketType::Data, flags, seq, payload)
}

/// Build an ACK packet. Payload is the 4-byte cumulative acked sequence.
pub fn build_ack(cum_seq: u32) -> Vec<u8> {
    build_header(PacketType::Ack, Flags::empty(), 0, &cum_seq.to_be_bytes())
}

/// Build a NAK packet. Payload is N * 4 bytes of missing sequences, N may be 0.
pub fn build_nak(missing: &[u32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(missing.len() * 4);
    for s in missing {
        payload.extend_from_slice(&s.to_be_bytes());
    }
    build_header(PacketType::Nak, Flags::empty(), 0, &payload)
}

/// Build a HEARTBEAT packet carrying `seq` for RTT matching on echo.
pub fn build_heartbeat(seq: u32) -> Vec<u8> {
    build_header(PacketType::Heartbeat, Flags::empty(), seq, &[])
}

/// Build a HELLO packet. `info` is serialized to JSON and carried as the
/// payload verbatim.
pub fn build_hello(info: &HelloInfo) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(info)?;
    Ok(build_header(PacketType::Hello, Flags::empty(), 0, &payload))
}

/// Informational HELLO payload (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HelloInfo {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u8,
    pub timestamp: u64,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Cheap v2 discrimination: length at least a header and the first three
/// bytes match magic+version. Used to tell legacy v1 (raw encrypted blob)
/// apart from v2 on receive.
pub fn is_v2(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN && bytes[0] == MAGIC[0] && bytes[1] == MAGIC[1] && bytes[2] == VERSION
}

/// Parse a v2 frame into a header and the payload byte range.
///
/// Unknown types are rejected — a sender emitting a type this parser
/// doesn't know about is non-conforming.
pub fn parse(bytes: &[u8]) -> Result<(ParsedHeader, &[u8]), ParseError> {
    if bytes.len() < HEADER_LEN {
        return Err(ParseError::TooSmall);
    }

    // CRC covers the whole header, so it's checked before any field is
    // trusted enough to discriminate on — a single flipped header byte
    // (magic, version, type, or anything else) is caught here rather than
    // surfacing as a more specific, misleading error (spec §8 scenario 1).
    let received_crc = u16::from_be_bytes([bytes[13], bytes[14]]);
    let expected_crc = crc16(&bytes[0..13]);
    if received_crc != expected_crc {
        return Err(ParseError::CrcMismatch);
    }

    if bytes[0] != MAGIC[0] || bytes[1] != MAGIC[1] {
        return Err(ParseError::BadMagic);
    }
    if bytes[2] != VERSION {
        return Err(ParseError::BadVersion);
    }
    let packet_type = PacketType::from_u8(bytes[3]).ok_or(ParseError::UnknownType)?;
    let flags = Flags::from_bits_truncate(bytes[4]);
    let sequence = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let payload_length = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);

    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != payload_length as u64 {
        return Err(ParseError::LengthMismatch);
    }

    Ok((
        ParsedHeader {
            packet_type,
            flags,
            sequence,
            payload_length,
        },
        payload,
    ))
}

/// Parse an ACK payload into its cumulative sequence.
pub fn parse_ack_payload(payload: &[u8]) -> Option<u32> {
    if payload.len() != 4 {
        return None;
    }
    Some(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]))
}

/// Parse a NAK payload into its list of missing sequences.
pub fn parse_nak_payload(payload: &[u8]) -> Option<Vec<u32>> {
    if payload.len() % 4 != 0 {
        return None;
    }
    Some(
        payload
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// `a ahead_of b` per the 32-bit circular rule (re-exported so callers that
/// only need wire-level helpers don't have to pull in `seq` separately).
pub fn ahead_of(a: u32, b: u32) -> bool {
    seq::ahead_of(a, b)
}
