use crate::{
    config::ByteOrder,
    errors::Result,
    features::getdocsums_flags,
    types::{WireReader, WireWriter},
    Serializable,
};

/// One document summary. The summary itself is opaque to the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Docsum {
    pub docid: u32,
    pub data: Vec<u8>,
}

impl Docsum {
    pub fn new(docid: u32, data: Vec<u8>) -> Self {
        Self { docid, data }
    }

    /// Whether the summary is a slime blob, which starts with
    /// [`SLIME_MAGIC_ID`](getdocsums_flags::SLIME_MAGIC_ID).
    pub fn is_slime(&self, byte_order: ByteOrder) -> bool {
        let mut wire = WireReader::new(&self.data, byte_order);
        matches!(wire.read_u32(), Ok(magic) if magic == getdocsums_flags::SLIME_MAGIC_ID)
    }
}

impl Serializable for Docsum {
    /// ```md
    /// docid (4), summary bytes to the end of the packet
    /// ```
    fn to_bytes(&self, byte_order: ByteOrder) -> Result<Vec<u8>> {
        let mut wire = WireWriter::new(byte_order);
        wire.write_u32(self.docid);
        wire.write_raw(&self.data);

        Ok(wire.into_bytes())
    }

    fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Result<Self> {
        let mut wire = WireReader::new(bytes, byte_order);
        let docid = wire.read_u32()?;
        let data = wire.read_to_end()?;

        Ok(Docsum { docid, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProtocolError;

    #[test]
    fn docsum_from_to_bytes() {
        let docsum = Docsum::new(17, b"<title>x</title>".to_vec());

        let bytes = docsum.to_bytes(ByteOrder::BigEndian).unwrap();

        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x00, 0x11]);
        assert_eq!(Docsum::from_bytes(&bytes, ByteOrder::BigEndian).unwrap(), docsum);
    }

    #[test]
    fn empty_summary_is_allowed() {
        let docsum = Docsum::from_bytes(&[0, 0, 0, 5], ByteOrder::BigEndian).unwrap();

        assert_eq!(docsum, Docsum::new(5, Vec::new()));
    }

    #[test]
    fn missing_docid_is_too_short() {
        let result = Docsum::from_bytes(&[0, 0], ByteOrder::BigEndian);

        assert_eq!(
            result,
            Err(ProtocolError::BufferTooShort {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn slime_summary_is_recognised() {
        let docsum = Docsum::new(1, vec![0x55, 0x55, 0x55, 0x55, 0x01]);

        assert!(docsum.is_slime(ByteOrder::BigEndian));
        assert!(!Docsum::new(1, vec![0x55]).is_slime(ByteOrder::BigEndian));
    }
}
