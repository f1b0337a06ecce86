use chrono::{DateTime, Utc};

use crate::{
    errors::Result,
    features::{monitor_query, monitor_result, PacketFamily},
    types::timestamp,
};

use super::{BodyCodec, BodyReader, BodyWriter};

/// A health probe from a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorQuery {
    /// See [`monitor_query_flags`](crate::features::monitor_query_flags).
    pub query_flags: Option<u32>,
}

impl BodyCodec for MonitorQuery {
    const FAMILY: PacketFamily = PacketFamily::MonitorQuery;

    /// ```md
    /// [qflags (4)]  QFLAGS
    /// ```
    fn encode_body(&self, body: &mut BodyWriter) -> Result<()> {
        body.optional(monitor_query::QFLAGS, self.query_flags.as_ref(), |wire, flags| {
            wire.write_u32(*flags);
            Ok(())
        })
    }

    fn decode_body(body: &mut BodyReader<'_>) -> Result<Self> {
        Ok(MonitorQuery {
            query_flags: body.section(monitor_query::QFLAGS, |wire| wire.read_u32())?,
        })
    }
}

/// Node and partition counts reported by a multi-level dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStats {
    pub total_nodes: u32,
    pub active_nodes: u32,
    pub total_parts: u32,
    pub active_parts: u32,
}

impl NodeStats {
    pub fn is_degraded(&self) -> bool {
        self.active_nodes < self.total_nodes || self.active_parts < self.total_parts
    }
}

/// The answer to a [`MonitorQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorResult {
    pub partition_id: u32,
    pub timestamp: u32,
    pub node_stats: Option<NodeStats>,
    pub result_flags: Option<u32>,
    pub active_docs: Option<u64>,
}

impl MonitorResult {
    pub fn timestamp_time(&self) -> Option<DateTime<Utc>> {
        timestamp(self.timestamp)
    }
}

impl BodyCodec for MonitorResult {
    const FAMILY: PacketFamily = PacketFamily::MonitorResult;

    /// ```md
    /// 0         8        16        24        32
    /// +---------+---------+---------+---------+
    /// |              partitionId              |
    /// +---------+---------+---------+---------+
    /// |               timestamp               |
    /// +---------+---------+---------+---------+
    /// |  totalNodes, activeNodes,             |  MLD
    /// |  totalParts, activeParts              |
    /// |  rflags                               |  RFLAGS
    /// |  activeDocs (8)                       |  ACTIVEDOCS
    /// +---------+---------+---------+---------+
    /// ```
    fn encode_body(&self, body: &mut BodyWriter) -> Result<()> {
        let wire = body.wire();
        wire.write_u32(self.partition_id);
        wire.write_u32(self.timestamp);

        body.optional(monitor_result::MLD, self.node_stats.as_ref(), |wire, stats| {
            wire.write_u32(stats.total_nodes);
            wire.write_u32(stats.active_nodes);
            wire.write_u32(stats.total_parts);
            wire.write_u32(stats.active_parts);
            Ok(())
        })?;
        body.optional(
            monitor_result::RFLAGS,
            self.result_flags.as_ref(),
            |wire, flags| {
                wire.write_u32(*flags);
                Ok(())
            },
        )?;
        body.optional(
            monitor_result::ACTIVEDOCS,
            self.active_docs.as_ref(),
            |wire, docs| {
                wire.write_u64(*docs);
                Ok(())
            },
        )
    }

    fn decode_body(body: &mut BodyReader<'_>) -> Result<Self> {
        let wire = body.wire();
        let partition_id = wire.read_u32()?;
        let timestamp = wire.read_u32()?;

        let node_stats = body.section(monitor_result::MLD, |wire| {
            Ok(NodeStats {
                total_nodes: wire.read_u32()?,
                active_nodes: wire.read_u32()?,
                total_parts: wire.read_u32()?,
                active_parts: wire.read_u32()?,
            })
        })?;

        Ok(MonitorResult {
            partition_id,
            timestamp,
            node_stats,
            result_flags: body.section(monitor_result::RFLAGS, |wire| wire.read_u32())?,
            active_docs: body.section(monitor_result::ACTIVEDOCS, |wire| wire.read_u64())?,
        })
    }
}
