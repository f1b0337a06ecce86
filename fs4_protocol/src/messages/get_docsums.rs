use chrono::{DateTime, Utc};

use crate::{
    errors::{ProtocolError, Result},
    features::{get_docsums, PacketFamily},
    types::{timestamp, Properties},
};

use super::{stack_dump::StackDump, BodyCodec, BodyReader, BodyWriter};

const DOC_SIZE: usize = 4;
const MLD_DOC_SIZE: usize = 12;

/// A document addressed through multi-level dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MldDoc {
    pub docid: u32,
    pub partition_id: u32,
    pub docstamp: u32,
}

/// The requested documents; the variant decides the `MLD` feature bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Docs {
    Plain(Vec<u32>),
    Mld(Vec<MldDoc>),
}

impl Default for Docs {
    fn default() -> Self {
        Docs::Plain(Vec::new())
    }
}

impl Docs {
    pub fn len(&self) -> usize {
        match self {
            Docs::Plain(docs) => docs.len(),
            Docs::Mld(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rank profile and query flags, sent together under `RANKP_QFLAGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankProfileFlags {
    pub rank_profile: u32,
    pub query_flags: u32,
}

/// A request for document summaries of earlier hits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetDocsums {
    pub docstamp: u32,
    pub rank: Option<RankProfileFlags>,
    pub result_class: Option<String>,
    pub properties: Option<Properties>,
    pub stack_dump: Option<StackDump>,
    pub location: Option<String>,
    /// See [`getdocsums_flags`](crate::features::getdocsums_flags).
    pub flags: Option<u32>,
    pub docs: Docs,
}

impl GetDocsums {
    pub fn docstamp_time(&self) -> Option<DateTime<Utc>> {
        timestamp(self.docstamp)
    }
}

impl BodyCodec for GetDocsums {
    const FAMILY: PacketFamily = PacketFamily::GetDocsums;

    /// ```md
    /// 0         8        16        24        32
    /// +---------+---------+---------+---------+
    /// |               docstamp                |
    /// +---------+---------+---------+---------+
    /// |  rankProfile, qflags                  |  RANKP_QFLAGS
    /// |  resClassNameLen, resClassName        |  RESCLASSNAME
    /// |  properties                           |  PROPERTIES
    /// |  stackItems, stackDumpLen, stackDump  |  QUERYSTACK
    /// |  locationLen, location                |  LOCATION
    /// |  flags                                |  FLAGS
    /// +---------+---------+---------+---------+
    /// |  N * { docid, partid, docstamp }      |  partid, docstamp only if MLD
    /// +---------+---------+---------+---------+
    /// ```
    /// The document list runs to the end of the packet.
    fn encode_body(&self, body: &mut BodyWriter) -> Result<()> {
        body.wire().write_u32(self.docstamp);

        body.optional(get_docsums::RANKP_QFLAGS, self.rank.as_ref(), |wire, rank| {
            wire.write_u32(rank.rank_profile);
            wire.write_u32(rank.query_flags);
            Ok(())
        })?;
        body.optional(
            get_docsums::RESCLASSNAME,
            self.result_class.as_deref(),
            |wire, name| wire.write_string(name),
        )?;
        body.optional(
            get_docsums::PROPERTIES,
            self.properties.as_deref(),
            |wire, properties| wire.write_properties(properties),
        )?;
        body.optional(
            get_docsums::QUERYSTACK,
            self.stack_dump.as_ref(),
            |wire, dump| dump.write_delimited(wire),
        )?;
        body.optional(
            get_docsums::LOCATION,
            self.location.as_deref(),
            |wire, location| wire.write_string(location),
        )?;
        body.optional(get_docsums::FLAGS, self.flags.as_ref(), |wire, flags| {
            wire.write_u32(*flags);
            Ok(())
        })?;

        match &self.docs {
            Docs::Plain(docs) => {
                let wire = body.wire();
                for docid in docs {
                    wire.write_u32(*docid);
                }
                Ok(())
            }
            Docs::Mld(docs) => body.section(get_docsums::MLD, |wire| {
                for doc in docs {
                    wire.write_u32(doc.docid);
                    wire.write_u32(doc.partition_id);
                    wire.write_u32(doc.docstamp);
                }
                Ok(())
            }),
        }
    }

    fn decode_body(body: &mut BodyReader<'_>) -> Result<Self> {
        let docstamp = body.wire().read_u32()?;

        let rank = body.section(get_docsums::RANKP_QFLAGS, |wire| {
            Ok(RankProfileFlags {
                rank_profile: wire.read_u32()?,
                query_flags: wire.read_u32()?,
            })
        })?;
        let result_class = body.section(get_docsums::RESCLASSNAME, |wire| {
            wire.read_string("result class name")
        })?;
        let properties = body.section(get_docsums::PROPERTIES, |wire| wire.read_properties())?;
        let stack_dump = body.section(get_docsums::QUERYSTACK, StackDump::read_delimited)?;
        let location = body.section(get_docsums::LOCATION, |wire| wire.read_string("location"))?;
        let flags = body.section(get_docsums::FLAGS, |wire| wire.read_u32())?;

        let mld = body.has(get_docsums::MLD);
        let wire = body.wire();
        let record_size = if mld { MLD_DOC_SIZE } else { DOC_SIZE };
        let remainder = wire.remaining() % record_size;
        if remainder != 0 {
            return Err(ProtocolError::TrailingBytes(remainder));
        }

        let count = wire.remaining() / record_size;
        let docs = if mld {
            let mut docs = Vec::with_capacity(count);
            for _ in 0..count {
                docs.push(MldDoc {
                    docid: wire.read_u32()?,
                    partition_id: wire.read_u32()?,
                    docstamp: wire.read_u32()?,
                });
            }
            Docs::Mld(docs)
        } else {
            let mut docs = Vec::with_capacity(count);
            for _ in 0..count {
                docs.push(wire.read_u32()?);
            }
            Docs::Plain(docs)
        };

        Ok(GetDocsums {
            docstamp,
            rank,
            result_class,
            properties,
            stack_dump,
            location,
            flags,
            docs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ByteOrder,
        features::{getdocsums_flags, qflags},
        messages::{
            decode_extended, decode_legacy, encode_extended, encode_legacy, feature_flags,
            stack_dump::TermNode,
        },
        types::PropertyMap,
    };

    #[test]
    fn legacy_getdocsums_to_bytes() {
        let request = GetDocsums {
            docstamp: 42,
            docs: Docs::Plain(vec![7, 9]),
            ..Default::default()
        };

        let bytes = encode_legacy(
            &request,
            crate::features::FeatureFlags::NONE,
            ByteOrder::BigEndian,
        )
        .unwrap();

        assert_eq!(
            bytes,
            vec![
                0x00, 0x00, 0x00, 0x2A, // docstamp
                0x00, 0x00, 0x00, 0x07, // docid
                0x00, 0x00, 0x00, 0x09, // docid
            ]
        );
    }

    #[test]
    fn mld_getdocsums_is_extended_without_flags() {
        let request = GetDocsums {
            docstamp: 42,
            docs: Docs::Mld(vec![MldDoc {
                docid: 7,
                partition_id: 2,
                docstamp: 41,
            }]),
            ..Default::default()
        };

        let legacy = encode_legacy(&request, get_docsums::MLD, ByteOrder::BigEndian).unwrap();
        let extended = encode_extended(&request, ByteOrder::BigEndian).unwrap();

        assert_eq!(&extended[4..], legacy.as_slice());

        let decoded: GetDocsums =
            decode_legacy(&legacy, get_docsums::MLD, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn all_sections_from_to_bytes() {
        let request = GetDocsums {
            docstamp: 1,
            rank: Some(RankProfileFlags {
                rank_profile: 2,
                query_flags: qflags::DUMP_FEATURES,
            }),
            result_class: Some("default".to_string()),
            properties: Some(vec![
                PropertyMap::new("highlightterms").with_entry("body", "red")
            ]),
            stack_dump: Some(StackDump::new(TermNode::Rank(vec![
                TermNode::term("body", "red"),
                TermNode::Not(vec![TermNode::term("body", "blue")]),
            ]))),
            location: Some("(2,0,0,100,0,1,0)".to_string()),
            flags: Some(getdocsums_flags::ALLOW_SLIME),
            docs: Docs::Mld(vec![
                MldDoc {
                    docid: 1,
                    partition_id: 0,
                    docstamp: 1,
                },
                MldDoc {
                    docid: 2,
                    partition_id: 1,
                    docstamp: 1,
                },
            ]),
        };

        assert_eq!(feature_flags(&request).unwrap(), get_docsums::SUPPORTED_MASK);

        let bytes = encode_extended(&request, ByteOrder::LittleEndian).unwrap();
        let decoded: GetDocsums = decode_extended(&bytes, ByteOrder::LittleEndian).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn partial_doc_record_is_trailing() {
        let request = GetDocsums {
            docs: Docs::Plain(vec![1, 2]),
            ..Default::default()
        };
        let mut bytes = encode_extended(&request, ByteOrder::BigEndian).unwrap();
        bytes.extend_from_slice(&[0x00, 0x01]);

        let result: Result<GetDocsums> = decode_extended(&bytes, ByteOrder::BigEndian);

        assert_eq!(result, Err(ProtocolError::TrailingBytes(2)));
    }

    #[test]
    fn corrupt_stack_dump_is_reported() {
        let request = GetDocsums {
            stack_dump: Some(StackDump::new(TermNode::term("a", "b"))),
            ..Default::default()
        };
        let mut bytes = encode_extended(&request, ByteOrder::BigEndian).unwrap();
        // flags, docstamp, then numStackItems: claim two items
        bytes[11] = 2;

        let result: Result<GetDocsums> = decode_extended(&bytes, ByteOrder::BigEndian);

        assert!(matches!(result, Err(ProtocolError::StackCorrupt(_))));
    }
}
