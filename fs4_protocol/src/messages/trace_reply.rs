use crate::{
    config::ByteOrder,
    errors::Result,
    types::{Properties, WireReader, WireWriter},
    Serializable,
};

/// Trace information returned alongside a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraceReply {
    pub properties: Properties,
}

impl Serializable for TraceReply {
    /// The body is a property set and nothing else.
    fn to_bytes(&self, byte_order: ByteOrder) -> Result<Vec<u8>> {
        let mut wire = WireWriter::new(byte_order);
        wire.write_properties(&self.properties)?;

        Ok(wire.into_bytes())
    }

    fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Result<Self> {
        let mut wire = WireReader::new(bytes, byte_order);
        let properties = wire.read_properties()?;
        wire.finish()?;

        Ok(TraceReply { properties })
    }
}
