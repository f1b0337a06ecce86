use thiserror::Error;

use crate::features::{FeatureFlags, PacketFamily};

/// Errors that can occur while encoding or decoding FS4 packets.
///
/// `UnknownCode` and `UnsupportedFeatureFlag` mean the packet comes from a
/// newer (or broken) peer and should be dropped while keeping the connection;
/// see [`ProtocolError::is_discardable`]. `ContractViolation` is only ever
/// produced while encoding and points at a bug on the producing side.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("buffer too short: needed {needed} bytes, {available} available")]
    BufferTooShort { needed: usize, available: usize },

    #[error("unknown packet code {0}")]
    UnknownCode(u32),

    #[error("unsupported feature flags {unsupported} in {flags} for {family:?} packet")]
    UnsupportedFeatureFlag {
        family: PacketFamily,
        flags: FeatureFlags,
        unsupported: FeatureFlags,
    },

    #[error("length mismatch: header declares {declared} bytes, {available} available")]
    LengthMismatch { declared: usize, available: usize },

    #[error("{0} trailing bytes after packet body")]
    TrailingBytes(usize),

    #[error("corrupt query stack: {0}")]
    StackCorrupt(String),

    #[error("field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("packet contract violation: {0}")]
    ContractViolation(String),
}

impl ProtocolError {
    /// Whether the transport should drop just this packet and keep reading.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCode(_) | ProtocolError::UnsupportedFeatureFlag { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
