use serde::{Deserialize, Serialize};

/// Byte order used for every multi-byte integer on the wire, header included.
///
/// Deployed peers talk network order, hence the default; little endian is
/// kept for peers that dump host-order integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Codec parameters a host can embed in its own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub byte_order: ByteOrder,
}

impl CodecConfig {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self { byte_order }
    }
}
