use crate::{
    config::ByteOrder,
    errors::Result,
    types::{WireReader, WireWriter},
    Serializable,
};

/// Sent ahead of a query result when the query asked for `REPORT_QUEUELEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueLen {
    pub queue_len: u32,
    pub dispatchers: u32,
}

impl Serializable for QueueLen {
    /// ```md
    /// queueLen (4), dispatchers (4)
    /// ```
    fn to_bytes(&self, byte_order: ByteOrder) -> Result<Vec<u8>> {
        let mut wire = WireWriter::new(byte_order);
        wire.write_u32(self.queue_len);
        wire.write_u32(self.dispatchers);

        Ok(wire.into_bytes())
    }

    fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Result<Self> {
        let mut wire = WireReader::new(bytes, byte_order);
        let queue_len = QueueLen {
            queue_len: wire.read_u32()?,
            dispatchers: wire.read_u32()?,
        };
        wire.finish()?;

        Ok(queue_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProtocolError;

    #[test]
    fn queue_len_to_bytes() {
        let queue_len = QueueLen {
            queue_len: 3,
            dispatchers: 2,
        };

        assert_eq!(
            queue_len.to_bytes(ByteOrder::LittleEndian).unwrap(),
            vec![3, 0, 0, 0, 2, 0, 0, 0]
        );
    }

    #[test]
    fn queue_len_with_extra_bytes_is_rejected() {
        let bytes = [0, 0, 0, 3, 0, 0, 0, 2, 0xFF];

        assert_eq!(
            QueueLen::from_bytes(&bytes, ByteOrder::BigEndian),
            Err(ProtocolError::TrailingBytes(1))
        );
    }
}
