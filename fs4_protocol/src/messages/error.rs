use crate::{
    config::ByteOrder,
    errors::Result,
    types::{WireReader, WireWriter},
    Serializable,
};

/// A failure reported by a search node or a lower dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorPacket {
    pub error_code: u32,
    pub message: String,
}

impl ErrorPacket {
    pub fn new(error_code: u32, message: &str) -> Self {
        Self {
            error_code,
            message: message.to_string(),
        }
    }
}

impl Serializable for ErrorPacket {
    /// ```md
    /// 0         8        16        24        32
    /// +---------+---------+---------+---------+
    /// |               errorCode               |
    /// +---------+---------+---------+---------+
    /// |              messageLen               |
    /// +---------+---------+---------+---------+
    /// |           message (UTF-8) ...         |
    /// +---------+---------+---------+---------+
    /// ```
    fn to_bytes(&self, byte_order: ByteOrder) -> Result<Vec<u8>> {
        let mut wire = WireWriter::new(byte_order);
        wire.write_u32(self.error_code);
        wire.write_string(&self.message)?;

        Ok(wire.into_bytes())
    }

    fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Result<Self> {
        let mut wire = WireReader::new(bytes, byte_order);
        let error_code = wire.read_u32()?;
        let message = wire.read_string("error message")?;
        wire.finish()?;

        Ok(ErrorPacket {
            error_code,
            message,
        })
    }
}
