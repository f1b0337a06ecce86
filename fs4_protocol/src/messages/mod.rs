//! Packet bodies.
//!
//! Bodies of packets that have a feature word implement [`BodyCodec`]. Their
//! optional sections go through [`BodyWriter`] and [`BodyReader`], which keep
//! every family's sections in the order given by
//! [`field_order`](crate::features::field_order) and derive the feature word
//! from the sections actually written.

use crate::{
    config::ByteOrder,
    errors::{ProtocolError, Result},
    features::{self, FeatureFlags, PacketFamily},
    types::{WireReader, WireWriter},
};

pub mod docsum;
pub mod error;
pub mod get_docsums;
pub mod monitor;
pub mod query;
pub mod query_result;
pub mod queue_len;
pub mod stack_dump;
pub mod trace_reply;

/// A packet body whose optional sections are announced by feature flags.
pub trait BodyCodec: Sized {
    const FAMILY: PacketFamily;

    /// Writes fixed fields through `body.wire()` and optional sections through
    /// `body.section(..)`, in declared order.
    fn encode_body(&self, body: &mut BodyWriter) -> Result<()>;

    /// Reads the body whose flags have already been validated.
    fn decode_body(body: &mut BodyReader<'_>) -> Result<Self>;
}

/// Collects a body, tracking which optional sections were written.
pub struct BodyWriter {
    family: PacketFamily,
    flags: FeatureFlags,
    last_section: Option<usize>,
    wire: WireWriter,
}

impl BodyWriter {
    pub fn new(family: PacketFamily, byte_order: ByteOrder) -> Self {
        Self {
            family,
            flags: FeatureFlags::NONE,
            last_section: None,
            wire: WireWriter::new(byte_order),
        }
    }

    /// Fixed fields.
    pub fn wire(&mut self) -> &mut WireWriter {
        &mut self.wire
    }

    /// Writes the section announced by `bit` and sets the bit.
    pub fn section<F>(&mut self, bit: FeatureFlags, write: F) -> Result<()>
    where
        F: FnOnce(&mut WireWriter) -> Result<()>,
    {
        let order = features::field_order(self.family);
        let index = order
            .iter()
            .position(|descriptor| descriptor.bit == bit)
            .ok_or_else(|| {
                ProtocolError::ContractViolation(format!(
                    "{bit} is not a {:?} section",
                    self.family
                ))
            })?;

        if let Some(last) = self.last_section {
            if index <= last {
                return Err(ProtocolError::ContractViolation(format!(
                    "{:?} section `{}` written after `{}`",
                    self.family, order[index].name, order[last].name
                )));
            }
        }

        self.last_section = Some(index);
        self.flags |= bit;
        write(&mut self.wire)
    }

    /// Writes the section only when `value` is present.
    pub fn optional<T, F>(&mut self, bit: FeatureFlags, value: Option<&T>, write: F) -> Result<()>
    where
        T: ?Sized,
        F: FnOnce(&mut WireWriter, &T) -> Result<()>,
    {
        match value {
            Some(value) => self.section(bit, |wire| write(wire, value)),
            None => Ok(()),
        }
    }

    pub fn finish(self) -> (FeatureFlags, Vec<u8>) {
        (self.flags, self.wire.into_bytes())
    }
}

/// Reads a body against an already validated feature word.
pub struct BodyReader<'a> {
    flags: FeatureFlags,
    wire: WireReader<'a>,
}

impl<'a> BodyReader<'a> {
    pub fn new(flags: FeatureFlags, wire: WireReader<'a>) -> Self {
        Self { flags, wire }
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    pub fn has(&self, bit: FeatureFlags) -> bool {
        self.flags.contains(bit)
    }

    pub fn wire(&mut self) -> &mut WireReader<'a> {
        &mut self.wire
    }

    /// Reads the section announced by `bit`, if the bit is set.
    pub fn section<T, F>(&mut self, bit: FeatureFlags, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut WireReader<'a>) -> Result<T>,
    {
        if self.has(bit) {
            read(&mut self.wire).map(Some)
        } else {
            Ok(None)
        }
    }

    fn finish(&self) -> Result<()> {
        self.wire.finish()
    }
}

/// The feature word `packet` would be sent with.
pub fn feature_flags<T: BodyCodec>(packet: &T) -> Result<FeatureFlags> {
    encode_sections(packet, ByteOrder::default()).map(|(flags, _)| flags)
}

fn encode_sections<T: BodyCodec>(
    packet: &T,
    byte_order: ByteOrder,
) -> Result<(FeatureFlags, Vec<u8>)> {
    let mut body = BodyWriter::new(T::FAMILY, byte_order);
    packet.encode_body(&mut body)?;

    Ok(body.finish())
}

/// ```md
/// +---------+---------+---------+---------+
/// |        feature flags (4 bytes)        |
/// +---------+---------+---------+---------+
/// |  fixed fields, optional sections ...  |
/// +---------+---------+---------+---------+
/// ```
pub fn encode_extended<T: BodyCodec>(packet: &T, byte_order: ByteOrder) -> Result<Vec<u8>> {
    let (flags, bytes) = encode_sections(packet, byte_order)?;

    let mut wire = WireWriter::new(byte_order);
    wire.write_u32(flags.bits());
    wire.write_raw(&bytes);

    Ok(wire.into_bytes())
}

/// Encodes a legacy body, which has no flags field and whose feature word is
/// fixed to `expected`.
pub fn encode_legacy<T: BodyCodec>(
    packet: &T,
    expected: FeatureFlags,
    byte_order: ByteOrder,
) -> Result<Vec<u8>> {
    let (flags, bytes) = encode_sections(packet, byte_order)?;

    if flags != expected {
        return Err(ProtocolError::ContractViolation(format!(
            "{:?} legacy packet requires features {expected}, got {flags}",
            T::FAMILY
        )));
    }

    Ok(bytes)
}

/// Reads the feature word, validates it and decodes the rest of the body.
pub fn decode_extended<T: BodyCodec>(bytes: &[u8], byte_order: ByteOrder) -> Result<T> {
    let mut wire = WireReader::new(bytes, byte_order);
    let flags = FeatureFlags::from_bits(wire.read_u32()?);

    decode_with_flags(flags, wire)
}

/// Decodes a legacy body with its implied feature word.
pub fn decode_legacy<T: BodyCodec>(
    bytes: &[u8],
    flags: FeatureFlags,
    byte_order: ByteOrder,
) -> Result<T> {
    decode_with_flags(flags, WireReader::new(bytes, byte_order))
}

fn decode_with_flags<T: BodyCodec>(flags: FeatureFlags, wire: WireReader<'_>) -> Result<T> {
    features::validate(flags, T::FAMILY)?;

    let mut body = BodyReader::new(flags, wire);
    let packet = T::decode_body(&mut body)?;
    body.finish()?;

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::query_result;

    #[test]
    fn section_sets_its_bit() {
        let mut body = BodyWriter::new(PacketFamily::QueryResult, ByteOrder::BigEndian);
        body.wire().write_u32(1);
        body.section(query_result::AGGRDATA, |wire| wire.write_blob(&[0xAA]))
            .unwrap();

        let (flags, bytes) = body.finish();

        assert_eq!(flags, query_result::AGGRDATA);
        assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 1, 0xAA]);
    }

    #[test]
    fn section_out_of_declared_order_is_rejected() {
        let mut body = BodyWriter::new(PacketFamily::QueryResult, ByteOrder::BigEndian);
        body.section(query_result::COVERAGE, |_| Ok(())).unwrap();

        let result = body.section(query_result::SORTDATA, |_| Ok(()));

        assert!(matches!(result, Err(ProtocolError::ContractViolation(_))));
    }

    #[test]
    fn section_of_other_family_is_rejected() {
        let mut body = BodyWriter::new(PacketFamily::MonitorQuery, ByteOrder::BigEndian);

        let result = body.section(query_result::COVERAGE, |_| Ok(()));

        assert!(matches!(result, Err(ProtocolError::ContractViolation(_))));
    }

    #[test]
    fn optional_none_writes_nothing() {
        let mut body = BodyWriter::new(PacketFamily::QueryResult, ByteOrder::BigEndian);
        body.optional(query_result::GROUPDATA, None::<&[u8]>, |wire, data| {
            wire.write_blob(data)
        })
        .unwrap();

        assert_eq!(body.finish(), (FeatureFlags::NONE, Vec::new()));
    }

    #[test]
    fn reader_skips_unset_sections() {
        let bytes = [0x00, 0x00, 0x00, 0x05];
        let mut body = BodyReader::new(
            query_result::COVERAGE,
            WireReader::new(&bytes, ByteOrder::BigEndian),
        );

        let aggr = body
            .section(query_result::AGGRDATA, |wire| wire.read_blob())
            .unwrap();
        let coverage = body
            .section(query_result::COVERAGE, |wire| wire.read_u32())
            .unwrap();

        assert_eq!(aggr, None);
        assert_eq!(coverage, Some(5));
        assert!(body.finish().is_ok());
    }
}
