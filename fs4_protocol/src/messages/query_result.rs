use chrono::{DateTime, Utc};

use crate::{
    errors::{ProtocolError, Result},
    features::{query_result, PacketFamily},
    types::{timestamp, wire_count, WireReader, WireWriter},
};

use super::{BodyCodec, BodyReader, BodyWriter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub docid: u32,
    pub metric: f64,
}

/// A hit as reported through multi-level dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MldHit {
    pub docid: u32,
    pub metric: f64,
    pub partition_id: u32,
    pub docstamp: u32,
}

/// The hit list; its variant decides the `MLD` feature bit.
#[derive(Debug, Clone, PartialEq)]
pub enum Hits {
    Plain(Vec<Hit>),
    Mld(Vec<MldHit>),
}

impl Default for Hits {
    fn default() -> Self {
        Hits::Plain(Vec::new())
    }
}

impl Hits {
    pub fn len(&self) -> usize {
        match self {
            Hits::Plain(hits) => hits.len(),
            Hits::Mld(hits) => hits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coverage {
    pub docs: u64,
    pub nodes: u32,
    pub full: u32,
}

/// The answer of a search node (or a lower dispatch level) to a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub offset: u32,
    pub total_hits: u32,
    pub max_rank: f64,
    pub docstamp: u32,
    pub hits: Hits,
    /// One sort blob per hit.
    pub sort_data: Option<Vec<Vec<u8>>>,
    pub aggregation_data: Option<Vec<u8>>,
    pub group_data: Option<Vec<u8>>,
    pub coverage: Option<Coverage>,
}

impl QueryResult {
    pub fn docstamp_time(&self) -> Option<DateTime<Utc>> {
        timestamp(self.docstamp)
    }

    fn write_sort_data(&self, wire: &mut WireWriter, sort_data: &[Vec<u8>]) -> Result<()> {
        if sort_data.len() != self.hits.len() {
            return Err(ProtocolError::ContractViolation(format!(
                "{} sort blobs for {} hits",
                sort_data.len(),
                self.hits.len()
            )));
        }

        let mut end = 0usize;
        for blob in sort_data {
            end += blob.len();
            wire.write_u32(wire_count(end, "sort data length")?);
        }
        for blob in sort_data {
            wire.write_raw(blob);
        }

        Ok(())
    }

    fn read_sort_data(wire: &mut WireReader<'_>, num_docs: u32) -> Result<Vec<Vec<u8>>> {
        let mut ends = Vec::new();
        let mut previous = 0u32;
        for _ in 0..num_docs {
            let end = wire.read_u32()?;
            if end < previous {
                return Err(ProtocolError::InvalidField {
                    field: "sort index",
                    reason: format!("offset {end} follows {previous}"),
                });
            }
            ends.push(end);
            previous = end;
        }

        let data = wire.read_bytes(previous as usize)?;

        let mut start = 0usize;
        let blobs = ends
            .into_iter()
            .map(|end| {
                let blob = data[start..end as usize].to_vec();
                start = end as usize;
                blob
            })
            .collect();

        Ok(blobs)
    }
}

impl BodyCodec for QueryResult {
    const FAMILY: PacketFamily = PacketFamily::QueryResult;

    /// ```md
    /// 0         8        16        24        32
    /// +---------+---------+---------+---------+
    /// |                offset                 |
    /// +---------+---------+---------+---------+
    /// |               numDocs                 |
    /// +---------+---------+---------+---------+
    /// |              totNumDocs               |
    /// +---------+---------+---------+---------+
    /// |            maxRank (8 bytes)          |
    /// +---------+---------+---------+---------+
    /// |               docstamp                |
    /// +---------+---------+---------+---------+
    /// |  numDocs * sortIndex, sortData        |  SORTDATA
    /// |  aggrDataLen, aggrData                |  AGGRDATA
    /// |  groupDataLen, groupData              |  GROUPDATA
    /// |  coverageDocs (8), nodes, full        |  COVERAGE
    /// +---------+---------+---------+---------+
    /// |  numDocs * { docid, metric (8),       |
    /// |              partid, docstamp }       |  partid, docstamp only if MLD
    /// +---------+---------+---------+---------+
    /// ```
    fn encode_body(&self, body: &mut BodyWriter) -> Result<()> {
        let wire = body.wire();
        wire.write_u32(self.offset);
        wire.write_u32(wire_count(self.hits.len(), "hit count")?);
        wire.write_u32(self.total_hits);
        wire.write_f64(self.max_rank);
        wire.write_u32(self.docstamp);

        body.optional(
            query_result::SORTDATA,
            self.sort_data.as_deref(),
            |wire, sort_data| self.write_sort_data(wire, sort_data),
        )?;
        body.optional(
            query_result::AGGRDATA,
            self.aggregation_data.as_deref(),
            |wire, data| wire.write_blob(data),
        )?;
        body.optional(
            query_result::GROUPDATA,
            self.group_data.as_deref(),
            |wire, data| wire.write_blob(data),
        )?;
        body.optional(
            query_result::COVERAGE,
            self.coverage.as_ref(),
            |wire, coverage| {
                wire.write_u64(coverage.docs);
                wire.write_u32(coverage.nodes);
                wire.write_u32(coverage.full);
                Ok(())
            },
        )?;

        match &self.hits {
            Hits::Plain(hits) => {
                let wire = body.wire();
                for hit in hits {
                    wire.write_u32(hit.docid);
                    wire.write_f64(hit.metric);
                }
                Ok(())
            }
            Hits::Mld(hits) => body.section(query_result::MLD, |wire| {
                for hit in hits {
                    wire.write_u32(hit.docid);
                    wire.write_f64(hit.metric);
                    wire.write_u32(hit.partition_id);
                    wire.write_u32(hit.docstamp);
                }
                Ok(())
            }),
        }
    }

    fn decode_body(body: &mut BodyReader<'_>) -> Result<Self> {
        let wire = body.wire();
        let offset = wire.read_u32()?;
        let num_docs = wire.read_u32()?;
        let total_hits = wire.read_u32()?;
        let max_rank = wire.read_f64()?;
        let docstamp = wire.read_u32()?;

        let sort_data = body.section(query_result::SORTDATA, |wire| {
            Self::read_sort_data(wire, num_docs)
        })?;
        let aggregation_data = body.section(query_result::AGGRDATA, |wire| wire.read_blob())?;
        let group_data = body.section(query_result::GROUPDATA, |wire| wire.read_blob())?;
        let coverage = body.section(query_result::COVERAGE, |wire| {
            Ok(Coverage {
                docs: wire.read_u64()?,
                nodes: wire.read_u32()?,
                full: wire.read_u32()?,
            })
        })?;

        let mld = body.has(query_result::MLD);
        let wire = body.wire();
        let hits = if mld {
            let mut hits = Vec::new();
            for _ in 0..num_docs {
                hits.push(MldHit {
                    docid: wire.read_u32()?,
                    metric: wire.read_f64()?,
                    partition_id: wire.read_u32()?,
                    docstamp: wire.read_u32()?,
                });
            }
            Hits::Mld(hits)
        } else {
            let mut hits = Vec::new();
            for _ in 0..num_docs {
                hits.push(Hit {
                    docid: wire.read_u32()?,
                    metric: wire.read_f64()?,
                });
            }
            Hits::Plain(hits)
        };

        Ok(QueryResult {
            offset,
            total_hits,
            max_rank,
            docstamp,
            hits,
            sort_data,
            aggregation_data,
            group_data,
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ByteOrder,
        features::FeatureFlags,
        messages::{decode_extended, decode_legacy, encode_extended, encode_legacy, feature_flags},
    };

    fn three_hits() -> QueryResult {
        QueryResult {
            offset: 0,
            total_hits: 57,
            max_rank: 9.5,
            docstamp: 1_700_000_000,
            hits: Hits::Plain(vec![
                Hit {
                    docid: 3,
                    metric: 9.5,
                },
                Hit {
                    docid: 11,
                    metric: 4.25,
                },
                Hit {
                    docid: 2,
                    metric: 1.0,
                },
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn empty_result_to_bytes() {
        let result = QueryResult::default();

        let bytes = encode_extended(&result, ByteOrder::BigEndian).unwrap();

        let expected = vec![
            0x00, 0x00, 0x00, 0x00, // flags
            0x00, 0x00, 0x00, 0x00, // offset
            0x00, 0x00, 0x00, 0x00, // numDocs
            0x00, 0x00, 0x00, 0x00, // totNumDocs
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // maxRank
            0x00, 0x00, 0x00, 0x00, // docstamp
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn coverage_from_to_bytes() {
        let mut result = three_hits();
        result.coverage = Some(Coverage {
            docs: 100,
            nodes: 2,
            full: 1,
        });

        let with_coverage = encode_extended(&result, ByteOrder::BigEndian).unwrap();
        let decoded: QueryResult = decode_extended(&with_coverage, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, result);

        result.coverage = None;
        let without_coverage = encode_extended(&result, ByteOrder::BigEndian).unwrap();
        assert_eq!(with_coverage.len() - without_coverage.len(), 16);
    }

    #[test]
    fn all_sections_from_to_bytes() {
        let result = QueryResult {
            hits: Hits::Mld(vec![
                MldHit {
                    docid: 1,
                    metric: 2.0,
                    partition_id: 4,
                    docstamp: 77,
                },
                MldHit {
                    docid: 5,
                    metric: 1.5,
                    partition_id: 0,
                    docstamp: 77,
                },
            ]),
            sort_data: Some(vec![vec![0x01, 0x02], vec![]]),
            aggregation_data: Some(vec![0xA0; 5]),
            group_data: Some(vec![0x60, 0x61]),
            coverage: Some(Coverage::default()),
            ..three_hits()
        };

        let flags = feature_flags(&result).unwrap();
        assert_eq!(flags, query_result::SUPPORTED_MASK);

        let bytes = encode_extended(&result, ByteOrder::LittleEndian).unwrap();
        let decoded: QueryResult = decode_extended(&bytes, ByteOrder::LittleEndian).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn legacy_body_is_extended_body_without_flags() {
        let result = three_hits();

        let legacy = encode_legacy(&result, FeatureFlags::NONE, ByteOrder::BigEndian).unwrap();
        let extended = encode_extended(&result, ByteOrder::BigEndian).unwrap();

        assert_eq!(&extended[4..], legacy.as_slice());

        let decoded: QueryResult =
            decode_legacy(&legacy, FeatureFlags::NONE, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn legacy_with_optional_section_is_rejected() {
        let mut result = three_hits();
        result.group_data = Some(vec![1]);

        let error = encode_legacy(&result, FeatureFlags::NONE, ByteOrder::BigEndian).unwrap_err();

        assert!(matches!(error, ProtocolError::ContractViolation(_)));
    }

    #[test]
    fn sort_data_must_match_hit_count() {
        let mut result = three_hits();
        result.sort_data = Some(vec![vec![1]]);

        let error = encode_extended(&result, ByteOrder::BigEndian).unwrap_err();

        assert!(matches!(error, ProtocolError::ContractViolation(_)));
    }

    #[test]
    fn decreasing_sort_index_is_rejected() {
        let mut wire = WireWriter::new(ByteOrder::BigEndian);
        wire.write_u32(query_result::SORTDATA.bits());
        wire.write_u32(0); // offset
        wire.write_u32(2); // numDocs
        wire.write_u32(2); // totNumDocs
        wire.write_f64(0.0);
        wire.write_u32(0); // docstamp
        wire.write_u32(3); // sort index
        wire.write_u32(1);
        let bytes = wire.into_bytes();

        let result: Result<QueryResult> = decode_extended(&bytes, ByteOrder::BigEndian);

        assert!(matches!(
            result,
            Err(ProtocolError::InvalidField {
                field: "sort index",
                ..
            })
        ));
    }

    #[test]
    fn unsupported_flag_stops_before_the_body() {
        let mut bytes = encode_extended(&three_hits(), ByteOrder::BigEndian).unwrap();
        bytes[2] |= 0x04; // QRF_PROPERTIES

        let result: Result<QueryResult> = decode_extended(&bytes, ByteOrder::BigEndian);

        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedFeatureFlag { unsupported, .. })
                if unsupported == query_result::PROPERTIES
        ));
    }

    #[test]
    fn docstamp_as_time() {
        let result = three_hits();

        let time = result.docstamp_time().unwrap();

        assert_eq!(time.timestamp(), 1_700_000_000);
    }
}
