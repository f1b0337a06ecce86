use tracing::{debug, warn};

use crate::{
    config::{ByteOrder, CodecConfig},
    errors::{ProtocolError, Result},
    features,
    header::{decode_header, encode_header, PacketCode, PacketHeader},
    messages::{
        decode_extended, decode_legacy, docsum::Docsum, encode_extended, encode_legacy,
        error::ErrorPacket, get_docsums::GetDocsums, monitor::MonitorQuery,
        monitor::MonitorResult, query::Query, query_result::QueryResult, queue_len::QueueLen,
        trace_reply::TraceReply, BodyCodec,
    },
    Serializable,
};

/// One variant per packet code.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// End of a reply stream.
    Eol,
    QueryResult(QueryResult),
    Error(ErrorPacket),
    GetDocsums(GetDocsums),
    Docsum(Docsum),
    MonitorQuery(MonitorQuery),
    MonitorResult(MonitorResult),
    MldQueryResult(QueryResult),
    MldGetDocsums(GetDocsums),
    MldMonitorResult(MonitorResult),
    ClearCaches,
    ParsedQuery2(Query),
    QueueLen(QueueLen),
    QueryResultX(QueryResult),
    QueryX(Query),
    GetDocsumsX(GetDocsums),
    MonitorQueryX(MonitorQuery),
    MonitorResultX(MonitorResult),
    TraceReply(TraceReply),
}

impl Packet {
    pub fn code(&self) -> PacketCode {
        match self {
            Packet::Eol => PacketCode::Eol,
            Packet::QueryResult(_) => PacketCode::QueryResult,
            Packet::Error(_) => PacketCode::Error,
            Packet::GetDocsums(_) => PacketCode::GetDocsums,
            Packet::Docsum(_) => PacketCode::Docsum,
            Packet::MonitorQuery(_) => PacketCode::MonitorQuery,
            Packet::MonitorResult(_) => PacketCode::MonitorResult,
            Packet::MldQueryResult(_) => PacketCode::MldQueryResult,
            Packet::MldGetDocsums(_) => PacketCode::MldGetDocsums,
            Packet::MldMonitorResult(_) => PacketCode::MldMonitorResult,
            Packet::ClearCaches => PacketCode::ClearCaches,
            Packet::ParsedQuery2(_) => PacketCode::ParsedQuery2,
            Packet::QueueLen(_) => PacketCode::QueueLen,
            Packet::QueryResultX(_) => PacketCode::QueryResultX,
            Packet::QueryX(_) => PacketCode::QueryX,
            Packet::GetDocsumsX(_) => PacketCode::GetDocsumsX,
            Packet::MonitorQueryX(_) => PacketCode::MonitorQueryX,
            Packet::MonitorResultX(_) => PacketCode::MonitorResultX,
            Packet::TraceReply(_) => PacketCode::TraceReply,
        }
    }

    fn body_to_bytes(&self, byte_order: ByteOrder) -> Result<Vec<u8>> {
        let code = self.code();

        match self {
            Packet::Eol | Packet::ClearCaches => Ok(Vec::new()),
            Packet::Error(error) => error.to_bytes(byte_order),
            Packet::Docsum(docsum) => docsum.to_bytes(byte_order),
            Packet::QueueLen(queue_len) => queue_len.to_bytes(byte_order),
            Packet::TraceReply(reply) => reply.to_bytes(byte_order),
            Packet::QueryResult(result)
            | Packet::MldQueryResult(result)
            | Packet::QueryResultX(result) => encode_body(code, result, byte_order),
            Packet::GetDocsums(request)
            | Packet::MldGetDocsums(request)
            | Packet::GetDocsumsX(request) => encode_body(code, request, byte_order),
            Packet::MonitorQuery(query) | Packet::MonitorQueryX(query) => {
                encode_body(code, query, byte_order)
            }
            Packet::MonitorResult(result)
            | Packet::MldMonitorResult(result)
            | Packet::MonitorResultX(result) => encode_body(code, result, byte_order),
            Packet::ParsedQuery2(query) | Packet::QueryX(query) => {
                encode_body(code, query, byte_order)
            }
        }
    }

    fn body_from_bytes(code: PacketCode, body: &[u8], byte_order: ByteOrder) -> Result<Packet> {
        let packet = match code {
            PacketCode::Eol => empty_body(code, body).map(|_| Packet::Eol)?,
            PacketCode::ClearCaches => empty_body(code, body).map(|_| Packet::ClearCaches)?,
            PacketCode::Error => Packet::Error(ErrorPacket::from_bytes(body, byte_order)?),
            PacketCode::Docsum => Packet::Docsum(Docsum::from_bytes(body, byte_order)?),
            PacketCode::QueueLen => Packet::QueueLen(QueueLen::from_bytes(body, byte_order)?),
            PacketCode::TraceReply => {
                Packet::TraceReply(TraceReply::from_bytes(body, byte_order)?)
            }
            PacketCode::QueryResult => {
                Packet::QueryResult(decode_body(code, body, byte_order)?)
            }
            PacketCode::MldQueryResult => {
                Packet::MldQueryResult(decode_body(code, body, byte_order)?)
            }
            PacketCode::QueryResultX => {
                Packet::QueryResultX(decode_body(code, body, byte_order)?)
            }
            PacketCode::GetDocsums => Packet::GetDocsums(decode_body(code, body, byte_order)?),
            PacketCode::MldGetDocsums => {
                Packet::MldGetDocsums(decode_body(code, body, byte_order)?)
            }
            PacketCode::GetDocsumsX => Packet::GetDocsumsX(decode_body(code, body, byte_order)?),
            PacketCode::MonitorQuery => {
                Packet::MonitorQuery(decode_body(code, body, byte_order)?)
            }
            PacketCode::MonitorQueryX => {
                Packet::MonitorQueryX(decode_body(code, body, byte_order)?)
            }
            PacketCode::MonitorResult => {
                Packet::MonitorResult(decode_body(code, body, byte_order)?)
            }
            PacketCode::MldMonitorResult => {
                Packet::MldMonitorResult(decode_body(code, body, byte_order)?)
            }
            PacketCode::MonitorResultX => {
                Packet::MonitorResultX(decode_body(code, body, byte_order)?)
            }
            PacketCode::ParsedQuery2 => {
                Packet::ParsedQuery2(decode_body(code, body, byte_order)?)
            }
            PacketCode::QueryX => Packet::QueryX(decode_body(code, body, byte_order)?),
        };

        Ok(packet)
    }
}

fn empty_body(code: PacketCode, body: &[u8]) -> Result<()> {
    if body.is_empty() {
        Ok(())
    } else {
        debug!(code = ?code, len = body.len(), "fs4_unexpected_body");
        Err(ProtocolError::TrailingBytes(body.len()))
    }
}

fn encode_body<T: BodyCodec>(code: PacketCode, body: &T, byte_order: ByteOrder) -> Result<Vec<u8>> {
    if code.is_extended() {
        return encode_extended(body, byte_order);
    }

    let flags = features::legacy_flags(code).ok_or_else(|| {
        ProtocolError::ContractViolation(format!("{code:?} has no fixed feature flags"))
    })?;
    encode_legacy(body, flags, byte_order)
}

fn decode_body<T: BodyCodec>(code: PacketCode, body: &[u8], byte_order: ByteOrder) -> Result<T> {
    if code.is_extended() {
        return decode_extended(body, byte_order);
    }

    let flags = features::legacy_flags(code).ok_or_else(|| ProtocolError::InvalidField {
        field: "code",
        reason: format!("{code:?} has no fixed feature flags"),
    })?;
    decode_legacy(body, flags, byte_order)
}

/// A packet together with the query id it travels under on persistent
/// connections.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub query_id: Option<u32>,
    pub packet: Packet,
}

impl Frame {
    pub fn new(packet: Packet) -> Self {
        Self {
            query_id: None,
            packet,
        }
    }

    pub fn with_query_id(packet: Packet, query_id: u32) -> Self {
        Self {
            query_id: Some(query_id),
            packet,
        }
    }
}

/// Encodes and decodes whole packets with a fixed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Decodes exactly one packet. `persistent` tells whether session-aware
    /// codes carry a query id.
    ///
    /// Errors for which [`ProtocolError::is_discardable`] holds are logged at
    /// `warn` before being returned.
    pub fn decode(&self, bytes: &[u8], persistent: bool) -> Result<Frame> {
        let result = self.decode_frame(bytes, persistent);

        match &result {
            Ok(frame) => debug!(
                code = ?frame.packet.code(),
                query_id = ?frame.query_id,
                len = bytes.len(),
                "fs4_packet_decoded"
            ),
            Err(error) if error.is_discardable() => {
                warn!(error = %error, len = bytes.len(), "fs4_packet_discarded")
            }
            Err(error) => debug!(error = %error, len = bytes.len(), "fs4_packet_decode_failed"),
        }

        result
    }

    fn decode_frame(&self, bytes: &[u8], persistent: bool) -> Result<Frame> {
        let byte_order = self.config.byte_order;
        let (header, body) = decode_header(bytes, persistent, byte_order)?;

        let total = 4 + header.length as usize;
        if bytes.len() > total {
            return Err(ProtocolError::TrailingBytes(bytes.len() - total));
        }

        let packet = Packet::body_from_bytes(header.code, body, byte_order)?;

        Ok(Frame {
            query_id: header.query_id,
            packet,
        })
    }

    /// ```md
    /// 0         8        16        24        32
    /// +---------+---------+---------+---------+
    /// |                length                 |
    /// +---------+---------+---------+---------+
    /// |                 code                  |
    /// +---------+---------+---------+---------+
    /// |        query id (session-aware)       |
    /// +---------+---------+---------+---------+
    /// |                                       |
    /// .             ...  body ...             .
    /// +---------------------------------------+
    /// ```
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let byte_order = self.config.byte_order;
        let code = frame.packet.code();

        if frame.query_id.is_some() && !code.is_session_aware() {
            return Err(ProtocolError::ContractViolation(format!(
                "{code:?} packets cannot carry a query id"
            )));
        }

        let body = frame.packet.body_to_bytes(byte_order)?;
        let header = PacketHeader::for_body(code, frame.query_id, body.len())?;

        let mut bytes = encode_header(&header, byte_order);
        bytes.extend_from_slice(&body);

        debug!(
            code = ?code,
            query_id = ?frame.query_id,
            len = bytes.len(),
            "fs4_packet_encoded"
        );

        Ok(bytes)
    }
}

/// Decodes one packet in network byte order.
pub fn decode(bytes: &[u8], persistent: bool) -> Result<Frame> {
    Codec::default().decode(bytes, persistent)
}

/// Encodes one packet in network byte order.
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    Codec::default().encode(frame)
}
