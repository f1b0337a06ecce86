use crate::{
    config::ByteOrder,
    errors::{ProtocolError, Result},
    features::PacketFamily,
    types::{WireReader, WireWriter},
};

/// Size of the length and code fields every packet starts with.
pub const HEADER_SIZE: usize = 8;
/// Size of the query id that follows the code on persistent connections.
pub const QUERY_ID_SIZE: usize = 4;

/// Packet codes exchanged between dispatch and search nodes.
///
/// The retired codes 201, 212, 214 and 215 are left out on purpose: they
/// decode as [`ProtocolError::UnknownCode`] like anything at or above 223.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketCode {
    Eol = 200,
    QueryResult = 202,
    Error = 203,
    GetDocsums = 204,
    Docsum = 205,
    MonitorQuery = 206,
    MonitorResult = 207,
    MldQueryResult = 208,
    MldGetDocsums = 209,
    MldMonitorResult = 210,
    ClearCaches = 211,
    ParsedQuery2 = 213,
    QueueLen = 216,
    QueryResultX = 217,
    QueryX = 218,
    GetDocsumsX = 219,
    MonitorQueryX = 220,
    MonitorResultX = 221,
    TraceReply = 222,
}

impl PacketCode {
    pub fn from_u32(value: u32) -> Result<PacketCode> {
        let code = match value {
            200 => PacketCode::Eol,
            202 => PacketCode::QueryResult,
            203 => PacketCode::Error,
            204 => PacketCode::GetDocsums,
            205 => PacketCode::Docsum,
            206 => PacketCode::MonitorQuery,
            207 => PacketCode::MonitorResult,
            208 => PacketCode::MldQueryResult,
            209 => PacketCode::MldGetDocsums,
            210 => PacketCode::MldMonitorResult,
            211 => PacketCode::ClearCaches,
            213 => PacketCode::ParsedQuery2,
            216 => PacketCode::QueueLen,
            217 => PacketCode::QueryResultX,
            218 => PacketCode::QueryX,
            219 => PacketCode::GetDocsumsX,
            220 => PacketCode::MonitorQueryX,
            221 => PacketCode::MonitorResultX,
            222 => PacketCode::TraceReply,
            _ => return Err(ProtocolError::UnknownCode(value)),
        };

        Ok(code)
    }

    pub fn to_u32(&self) -> u32 {
        *self as u32
    }

    /// Whether the code carries a query id on persistent connections.
    pub fn is_session_aware(&self) -> bool {
        matches!(
            self,
            PacketCode::Eol
                | PacketCode::QueryResult
                | PacketCode::Error
                | PacketCode::GetDocsums
                | PacketCode::Docsum
                | PacketCode::MldQueryResult
                | PacketCode::MldGetDocsums
                | PacketCode::ParsedQuery2
                | PacketCode::QueryResultX
                | PacketCode::QueryX
                | PacketCode::GetDocsumsX
        )
    }

    /// The feature flag namespace of the code, if its body has one.
    pub fn family(&self) -> Option<PacketFamily> {
        match self {
            PacketCode::QueryResult | PacketCode::MldQueryResult | PacketCode::QueryResultX => {
                Some(PacketFamily::QueryResult)
            }
            PacketCode::ParsedQuery2 | PacketCode::QueryX => Some(PacketFamily::Query),
            PacketCode::GetDocsums | PacketCode::MldGetDocsums | PacketCode::GetDocsumsX => {
                Some(PacketFamily::GetDocsums)
            }
            PacketCode::MonitorQuery | PacketCode::MonitorQueryX => {
                Some(PacketFamily::MonitorQuery)
            }
            PacketCode::MonitorResult
            | PacketCode::MldMonitorResult
            | PacketCode::MonitorResultX => Some(PacketFamily::MonitorResult),
            _ => None,
        }
    }

    /// Extended codes read their feature word off the wire.
    pub fn is_extended(&self) -> bool {
        matches!(
            self,
            PacketCode::QueryResultX
                | PacketCode::QueryX
                | PacketCode::GetDocsumsX
                | PacketCode::MonitorQueryX
                | PacketCode::MonitorResultX
        )
    }
}

/// Whether `code` maps to a packet this codec can decode.
pub fn is_known_code(code: u32) -> bool {
    PacketCode::from_u32(code).is_ok()
}

/// The common prefix of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Bytes following the length field: code, query id and body.
    pub length: u32,
    pub code: PacketCode,
    pub query_id: Option<u32>,
}

impl PacketHeader {
    pub fn new(length: u32, code: PacketCode, query_id: Option<u32>) -> Self {
        Self {
            length,
            code,
            query_id,
        }
    }

    /// Bytes of the header that count towards `length`.
    pub fn prefix_len(&self) -> usize {
        4 + self.query_id.map_or(0, |_| QUERY_ID_SIZE)
    }

    /// Builds the header for an already encoded body of `body_len` bytes.
    pub fn for_body(code: PacketCode, query_id: Option<u32>, body_len: usize) -> Result<Self> {
        let prefix = 4 + query_id.map_or(0, |_| QUERY_ID_SIZE);
        let length = u32::try_from(body_len + prefix).map_err(|_| {
            ProtocolError::ContractViolation(format!("{code:?} packet does not fit in u32 length"))
        })?;

        Ok(PacketHeader::new(length, code, query_id))
    }
}

/// ```md
/// 0         8        16        24        32
/// +---------+---------+---------+---------+
/// |            length (4 bytes)           |
/// +---------+---------+---------+---------+
/// |             code (4 bytes)            |
/// +---------+---------+---------+---------+
/// |   query id (4 bytes, persistent only) |
/// +---------+---------+---------+---------+
/// ```
/// Splits a packet into its header and the body bytes the header declares.
///
/// The returned body may be followed by more bytes in `bytes`; whether that is
/// acceptable is up to the caller.
pub fn decode_header(
    bytes: &[u8],
    persistent: bool,
    byte_order: ByteOrder,
) -> Result<(PacketHeader, &[u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::BufferTooShort {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let mut reader = WireReader::new(bytes, byte_order);
    let length = reader.read_u32()?;
    let code = PacketCode::from_u32(reader.read_u32()?)?;

    let query_id = if persistent && code.is_session_aware() {
        Some(reader.read_u32()?)
    } else {
        None
    };

    let header = PacketHeader::new(length, code, query_id);

    let declared = length as usize;
    let consumed = header.prefix_len();
    let available = bytes.len() - 4;
    if declared < consumed || declared > available {
        return Err(ProtocolError::LengthMismatch {
            declared,
            available,
        });
    }

    let start = reader.position();
    let end = start + (declared - consumed);

    Ok((header, &bytes[start..end]))
}

/// Writes length, code and, when the header has one, the query id.
pub fn encode_header(header: &PacketHeader, byte_order: ByteOrder) -> Vec<u8> {
    let mut writer = WireWriter::new(byte_order);

    writer.write_u32(header.length);
    writer.write_u32(header.code.to_u32());
    if let Some(query_id) = header.query_id {
        writer.write_u32(query_id);
    }

    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_from_u32_rejects_retired_and_out_of_range() {
        for code in [0, 199, 201, 212, 214, 215, 223, u32::MAX] {
            assert_eq!(
                PacketCode::from_u32(code),
                Err(ProtocolError::UnknownCode(code))
            );
            assert!(!is_known_code(code));
        }

        assert_eq!(PacketCode::from_u32(213), Ok(PacketCode::ParsedQuery2));
        assert!(is_known_code(222));
    }

    #[test]
    fn header_to_bytes_with_query_id() {
        let header = PacketHeader::new(8, PacketCode::Eol, Some(7));

        assert_eq!(
            encode_header(&header, ByteOrder::BigEndian),
            vec![0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x00, 0x00, 0x07]
        );
    }

    #[test]
    fn decode_header_reads_query_id_only_when_persistent() {
        let bytes = [0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x00, 0x00, 0x07];

        let (header, body) = decode_header(&bytes, true, ByteOrder::BigEndian).unwrap();
        assert_eq!(header, PacketHeader::new(8, PacketCode::Eol, Some(7)));
        assert!(body.is_empty());

        let (header, body) = decode_header(&bytes, false, ByteOrder::BigEndian).unwrap();
        assert_eq!(header.query_id, None);
        assert_eq!(body, &[0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn decode_header_skips_query_id_for_monitor_packets() {
        // MONITORQUERY (206), persistent, empty body
        let bytes = [0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xCE];

        let (header, body) = decode_header(&bytes, true, ByteOrder::BigEndian).unwrap();

        assert_eq!(header.query_id, None);
        assert!(body.is_empty());
    }

    #[test]
    fn decode_header_needs_eight_bytes() {
        let bytes = [0x00, 0x00, 0x00, 0x04, 0x00, 0x00];

        assert_eq!(
            decode_header(&bytes, false, ByteOrder::BigEndian),
            Err(ProtocolError::BufferTooShort {
                needed: 8,
                available: 6
            })
        );
    }

    #[test]
    fn decode_header_rejects_unknown_code() {
        let bytes = [0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xDF];

        assert_eq!(
            decode_header(&bytes, false, ByteOrder::BigEndian),
            Err(ProtocolError::UnknownCode(223))
        );
    }

    #[test]
    fn decode_header_rejects_declared_length_past_buffer() {
        let bytes = [0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00, 0xCA, 0x01];

        assert_eq!(
            decode_header(&bytes, false, ByteOrder::BigEndian),
            Err(ProtocolError::LengthMismatch {
                declared: 12,
                available: 5
            })
        );
    }

    #[test]
    fn decode_header_rejects_length_shorter_than_code() {
        let bytes = [0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0xC8];

        assert!(matches!(
            decode_header(&bytes, false, ByteOrder::BigEndian),
            Err(ProtocolError::LengthMismatch { declared: 2, .. })
        ));
    }

    #[test]
    fn decode_header_little_endian() {
        let bytes = [0x04, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x00, 0x00];

        let (header, _) = decode_header(&bytes, false, ByteOrder::LittleEndian).unwrap();

        assert_eq!(header, PacketHeader::new(4, PacketCode::Eol, None));
    }

    #[test]
    fn header_length_counts_code_and_query_id() {
        let header = PacketHeader::for_body(PacketCode::QueryX, Some(1), 10).unwrap();
        assert_eq!(header.length, 18);

        let header = PacketHeader::for_body(PacketCode::QueueLen, None, 8).unwrap();
        assert_eq!(header.length, 12);
    }

    #[test]
    fn family_matches_extended_counterpart() {
        assert_eq!(
            PacketCode::MldQueryResult.family(),
            PacketCode::QueryResultX.family()
        );
        assert_eq!(PacketCode::ParsedQuery2.family(), PacketCode::QueryX.family());
        assert_eq!(PacketCode::TraceReply.family(), None);
        assert!(PacketCode::MonitorResultX.is_extended());
        assert!(!PacketCode::MldMonitorResult.is_session_aware());
    }
}
