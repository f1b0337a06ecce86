use crate::{
    errors::{ProtocolError, Result},
    features::{query, PacketFamily},
    types::Properties,
};

use super::{stack_dump::StackDump, BodyCodec, BodyReader, BodyWriter};

/// A query sent from a dispatcher to a search node.
///
/// A `PARSEDQUERY2` packet is this body with exactly `rank_profile` and
/// `stack_dump` set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub query_type: u32,
    pub offset: u32,
    pub max_hits: u32,
    /// See [`qflags`](crate::features::qflags).
    pub query_flags: u32,
    pub rank_profile: Option<u32>,
    pub properties: Option<Properties>,
    pub sort_spec: Option<String>,
    pub aggregation_spec: Option<Vec<u8>>,
    pub group_spec: Option<Vec<u8>>,
    pub session_id: Option<Vec<u8>>,
    pub location: Option<String>,
    pub stack_dump: Option<StackDump>,
}

impl BodyCodec for Query {
    const FAMILY: PacketFamily = PacketFamily::Query;

    /// ```md
    /// 0         8        16        24        32
    /// +---------+---------+---------+---------+
    /// |               queryType               |
    /// +---------+---------+---------+---------+
    /// |                offset                 |
    /// +---------+---------+---------+---------+
    /// |                maxHits                |
    /// +---------+---------+---------+---------+
    /// |                qflags                 |
    /// +---------+---------+---------+---------+
    /// |  rankProfile                          |  RANKP
    /// |  properties                           |  PROPERTIES
    /// |  sortSpecLen, sortSpec                |  SORTSPEC
    /// |  aggrSpecLen, aggrSpec                |  AGGRSPEC
    /// |  groupSpecLen, groupSpec              |  GROUPSPEC
    /// |  sessionIdLen, sessionId              |  SESSIONID
    /// |  locationLen, location                |  LOCATION
    /// |  numStackItems, stack items           |  PARSEDQUERY
    /// +---------+---------+---------+---------+
    /// ```
    fn encode_body(&self, body: &mut BodyWriter) -> Result<()> {
        let wire = body.wire();
        wire.write_u32(self.query_type);
        wire.write_u32(self.offset);
        wire.write_u32(self.max_hits);
        wire.write_u32(self.query_flags);

        body.optional(query::RANKP, self.rank_profile.as_ref(), |wire, profile| {
            wire.write_u32(*profile);
            Ok(())
        })?;
        body.optional(
            query::PROPERTIES,
            self.properties.as_deref(),
            |wire, properties| wire.write_properties(properties),
        )?;
        body.optional(query::SORTSPEC, self.sort_spec.as_deref(), |wire, spec| {
            wire.write_string(spec)
        })?;
        body.optional(
            query::AGGRSPEC,
            self.aggregation_spec.as_deref(),
            |wire, spec| wire.write_blob(spec),
        )?;
        body.optional(query::GROUPSPEC, self.group_spec.as_deref(), |wire, spec| {
            wire.write_blob(spec)
        })?;
        body.optional(query::SESSIONID, self.session_id.as_deref(), |wire, id| {
            wire.write_blob(id)
        })?;
        body.optional(query::LOCATION, self.location.as_deref(), |wire, location| {
            wire.write_string(location)
        })?;
        body.optional(query::PARSEDQUERY, self.stack_dump.as_ref(), |wire, dump| {
            dump.write_counted(wire)
        })
    }

    fn decode_body(body: &mut BodyReader<'_>) -> Result<Self> {
        let wire = body.wire();
        let query_type = wire.read_u32()?;
        let offset = wire.read_u32()?;
        let max_hits = wire.read_u32()?;
        let query_flags = wire.read_u32()?;

        let rank_profile = body.section(query::RANKP, |wire| wire.read_u32())?;
        let properties = body.section(query::PROPERTIES, |wire| wire.read_properties())?;
        let sort_spec = body.section(query::SORTSPEC, |wire| wire.read_string("sort spec"))?;
        let aggregation_spec = body.section(query::AGGRSPEC, |wire| wire.read_blob())?;
        let group_spec = body.section(query::GROUPSPEC, |wire| wire.read_blob())?;
        let session_id = body.section(query::SESSIONID, |wire| wire.read_blob())?;
        let location = body.section(query::LOCATION, |wire| wire.read_string("location"))?;
        let stack_dump = body.section(query::PARSEDQUERY, StackDump::read_counted)?;

        // The stack dump closes the body, so anything after it is an item
        // the declared count left out.
        let remaining = body.wire().remaining();
        if stack_dump.is_some() && remaining > 0 {
            return Err(ProtocolError::StackCorrupt(format!(
                "{remaining} bytes follow the declared stack items"
            )));
        }

        Ok(Query {
            query_type,
            offset,
            max_hits,
            query_flags,
            rank_profile,
            properties,
            sort_spec,
            aggregation_spec,
            group_spec,
            session_id,
            location,
            stack_dump,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ByteOrder,
        errors::ProtocolError,
        features::{qflags, FeatureFlags},
        messages::{
            decode_extended, decode_legacy, encode_extended, encode_legacy, feature_flags,
            stack_dump::TermNode,
        },
        types::{PropertyMap, WireWriter},
    };

    fn parsed_query() -> Query {
        Query {
            query_type: 1,
            offset: 10,
            max_hits: 20,
            query_flags: qflags::REPORT_COVERAGE,
            rank_profile: Some(3),
            stack_dump: Some(StackDump::new(TermNode::Or(vec![
                TermNode::term("title", "blue"),
                TermNode::term("title", "suede"),
            ]))),
            ..Default::default()
        }
    }

    #[test]
    fn parsed_query_to_bytes() {
        let query = Query {
            stack_dump: Some(StackDump::new(TermNode::term("a", "b"))),
            ..parsed_query()
        };

        let bytes = encode_legacy(
            &query,
            query::PARSEDQUERY | query::RANKP,
            ByteOrder::BigEndian,
        )
        .unwrap();

        let expected = vec![
            0x00, 0x00, 0x00, 0x01, // queryType
            0x00, 0x00, 0x00, 0x0A, // offset
            0x00, 0x00, 0x00, 0x14, // maxHits
            0x00, 0x00, 0x80, 0x00, // qflags
            0x00, 0x00, 0x00, 0x03, // rankProfile
            0x00, 0x00, 0x00, 0x01, // numStackItems
            0x00, 0x00, 0x00, 0x04, // TERM
            0x00, 0x00, 0x00, 0x01, b'a', 0x00, 0x00, 0x00, 0x01, b'b',
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn parsed_query_is_query_x_without_flags() {
        let query = parsed_query();
        let legacy_flags = query::PARSEDQUERY | query::RANKP;

        let legacy = encode_legacy(&query, legacy_flags, ByteOrder::BigEndian).unwrap();
        let extended = encode_extended(&query, ByteOrder::BigEndian).unwrap();

        assert_eq!(&extended[..4], &legacy_flags.bits().to_be_bytes());
        assert_eq!(&extended[4..], legacy.as_slice());

        let decoded: Query = decode_legacy(&legacy, legacy_flags, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, query);
    }

    #[test]
    fn all_sections_from_to_bytes() {
        let query = Query {
            properties: Some(vec![PropertyMap::new("rank").with_entry("x", "1")]),
            sort_spec: Some("+year -[rank]".to_string()),
            aggregation_spec: Some(vec![1, 2, 3]),
            group_spec: Some(vec![4, 5]),
            session_id: Some(b"session-1".to_vec()),
            location: Some("(2,10,10,1000,0,1,0)".to_string()),
            ..parsed_query()
        };

        assert_eq!(feature_flags(&query).unwrap(), query::SUPPORTED_MASK);

        let bytes = encode_extended(&query, ByteOrder::BigEndian).unwrap();
        let decoded: Query = decode_extended(&bytes, ByteOrder::BigEndian).unwrap();

        assert_eq!(decoded, query);
    }

    #[test]
    fn bare_query_has_no_flags() {
        let query = Query::default();

        assert_eq!(feature_flags(&query).unwrap(), FeatureFlags::NONE);
        assert_eq!(
            encode_extended(&query, ByteOrder::BigEndian).unwrap().len(),
            20
        );
    }

    #[test]
    fn parsed_query_without_rank_profile_is_not_legacy() {
        let query = Query {
            rank_profile: None,
            ..parsed_query()
        };

        let result = encode_legacy(
            &query,
            query::PARSEDQUERY | query::RANKP,
            ByteOrder::BigEndian,
        );

        assert!(matches!(result, Err(ProtocolError::ContractViolation(_))));
    }

    #[test]
    fn warmup_flag_is_rejected() {
        let mut bytes = encode_extended(&parsed_query(), ByteOrder::BigEndian).unwrap();
        bytes[1] |= 0x20; // QF_WARMUP

        let result: Result<Query> = decode_extended(&bytes, ByteOrder::BigEndian);

        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedFeatureFlag { unsupported, .. })
                if unsupported == query::WARMUP
        ));
    }

    #[test]
    fn stack_dump_cut_short_is_corrupt() {
        let bytes = encode_extended(&parsed_query(), ByteOrder::BigEndian).unwrap();

        let result: Result<Query> = decode_extended(&bytes[..bytes.len() - 3], ByteOrder::BigEndian);

        assert!(matches!(result, Err(ProtocolError::StackCorrupt(_))));
    }

    #[test]
    fn stack_items_beyond_the_declared_count_are_corrupt() {
        let dump = StackDump {
            roots: vec![TermNode::term("a", "x"), TermNode::term("a", "y")],
        };
        let query = Query {
            stack_dump: Some(dump.clone()),
            ..Default::default()
        };
        let mut dump_bytes = WireWriter::new(ByteOrder::BigEndian);
        dump.write_counted(&mut dump_bytes).unwrap();

        let mut bytes = encode_extended(&query, ByteOrder::BigEndian).unwrap();
        let count_at = bytes.len() - dump_bytes.len();
        bytes[count_at + 3] = 1;

        let result: Result<Query> = decode_extended(&bytes, ByteOrder::BigEndian);

        assert!(matches!(result, Err(ProtocolError::StackCorrupt(_))));
    }
}
