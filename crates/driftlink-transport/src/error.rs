//! The error taxonomy (spec §7). Every variant here is non-fatal except
//! [`DriftlinkError::Config`], which is the only one a caller should treat as
//! reason to abort startup.

use thiserror::Error;

/// Reason a packet failed to parse, mirroring `wire::parse`'s failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    TooSmall,
    BadMagic,
    BadVersion,
    UnknownType,
    CrcMismatch,
    LengthMismatch,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParseFailure::TooSmall => "too small",
            ParseFailure::BadMagic => "bad magic",
            ParseFailure::BadVersion => "bad version",
            ParseFailure::UnknownType => "unknown type",
            ParseFailure::CrcMismatch => "crc mismatch",
            ParseFailure::LengthMismatch => "length mismatch",
        };
        f.write_str(s)
    }
}

/// Every error surfaced inside the core. Non-fatal variants are always
/// counted and logged at the point of occurrence, never propagated to the
/// host (spec §7 / §5).
#[derive(Debug, Error)]
pub enum DriftlinkError {
    #[error("packet parse failed: {0}")]
    Parse(ParseFailure),

    #[error("AEAD authentication failed")]
    AuthFailure,

    #[error("brotli decompression failed")]
    DecompressFailure,

    #[error("brotli compression failed")]
    CompressFailure,

    #[error("delta serialization failed: {0}")]
    SerializeFailure(#[from] serde_json::Error),

    #[error("socket send failed: {0}")]
    SendFailure(std::io::Error),

    #[error("retransmit queue overflow, evicted oldest entry")]
    QueueOverflow,

    #[error("sequence tracker resynced after a large discontinuity")]
    Resync,

    #[error("link down with no healthy backup")]
    LinkDown,

    #[error("configuration error: {0}")]
    Config(String),
}
