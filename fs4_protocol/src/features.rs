//! Feature flag registry.
//!
//! Every extended ("X") packet carries a 32-bit feature word right after the
//! header. Each bit announces an optional section of the body; the meaning of
//! a bit is scoped to the packet family. Bits outside a family's support mask
//! come from a protocol generation this codec does not understand, and the
//! whole packet must be dropped.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use crate::{
    errors::{ProtocolError, Result},
    header::PacketCode,
};

/// A feature bitmask, interpreted per [`PacketFamily`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureFlags(u32);

impl FeatureFlags {
    pub const NONE: FeatureFlags = FeatureFlags(0);

    pub const fn from_bits(bits: u32) -> Self {
        FeatureFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: FeatureFlags) -> Self {
        FeatureFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: FeatureFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FeatureFlags {
    type Output = FeatureFlags;

    fn bitor(self, rhs: FeatureFlags) -> FeatureFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for FeatureFlags {
    fn bitor_assign(&mut self, rhs: FeatureFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FeatureFlags {
    type Output = FeatureFlags;

    fn bitand(self, rhs: FeatureFlags) -> FeatureFlags {
        FeatureFlags(self.0 & rhs.0)
    }
}

impl Not for FeatureFlags {
    type Output = FeatureFlags;

    fn not(self) -> FeatureFlags {
        FeatureFlags(!self.0)
    }
}

impl fmt::Display for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Groups of packet codes that share one feature flag namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketFamily {
    Query,
    QueryResult,
    GetDocsums,
    MonitorQuery,
    MonitorResult,
}

/// Query result features (`QUERYRESULT`, `MLD_QUERYRESULT`, `QUERYRESULTX`).
pub mod query_result {
    use super::FeatureFlags;

    /// Hits carry partition id and docstamp.
    pub const MLD: FeatureFlags = FeatureFlags::from_bits(0x0000_0001);
    pub const SORTDATA: FeatureFlags = FeatureFlags::from_bits(0x0000_0010);
    pub const AGGRDATA: FeatureFlags = FeatureFlags::from_bits(0x0000_0020);
    pub const COVERAGE: FeatureFlags = FeatureFlags::from_bits(0x0000_0040);
    pub const GROUPDATA: FeatureFlags = FeatureFlags::from_bits(0x0000_0200);
    /// Defined by newer peers, not supported here.
    pub const PROPERTIES: FeatureFlags = FeatureFlags::from_bits(0x0000_0400);

    pub const SUPPORTED_MASK: FeatureFlags = MLD
        .union(SORTDATA)
        .union(AGGRDATA)
        .union(COVERAGE)
        .union(GROUPDATA);
}

/// Query features (`PARSEDQUERY2`, `QUERYX`).
pub mod query {
    use super::FeatureFlags;

    pub const PARSEDQUERY: FeatureFlags = FeatureFlags::from_bits(0x0000_0002);
    pub const RANKP: FeatureFlags = FeatureFlags::from_bits(0x0000_0004);
    pub const SORTSPEC: FeatureFlags = FeatureFlags::from_bits(0x0000_0080);
    pub const AGGRSPEC: FeatureFlags = FeatureFlags::from_bits(0x0000_0100);
    pub const LOCATION: FeatureFlags = FeatureFlags::from_bits(0x0000_0800);
    pub const PROPERTIES: FeatureFlags = FeatureFlags::from_bits(0x0010_0000);
    /// Deprecated, never accepted.
    pub const WARMUP: FeatureFlags = FeatureFlags::from_bits(0x0020_0000);
    pub const GROUPSPEC: FeatureFlags = FeatureFlags::from_bits(0x0040_0000);
    pub const SESSIONID: FeatureFlags = FeatureFlags::from_bits(0x0080_0000);

    pub const SUPPORTED_MASK: FeatureFlags = PARSEDQUERY
        .union(RANKP)
        .union(SORTSPEC)
        .union(AGGRSPEC)
        .union(LOCATION)
        .union(PROPERTIES)
        .union(GROUPSPEC)
        .union(SESSIONID);
}

/// GetDocsums features (`GETDOCSUMS`, `MLD_GETDOCSUMS`, `GETDOCSUMSX`).
pub mod get_docsums {
    use super::FeatureFlags;

    pub const MLD: FeatureFlags = FeatureFlags::from_bits(0x0000_0001);
    pub const QUERYSTACK: FeatureFlags = FeatureFlags::from_bits(0x0000_0004);
    pub const RANKP_QFLAGS: FeatureFlags = FeatureFlags::from_bits(0x0000_0010);
    pub const LOCATION: FeatureFlags = FeatureFlags::from_bits(0x0000_0080);
    pub const RESCLASSNAME: FeatureFlags = FeatureFlags::from_bits(0x0000_0800);
    pub const PROPERTIES: FeatureFlags = FeatureFlags::from_bits(0x0000_1000);
    pub const FLAGS: FeatureFlags = FeatureFlags::from_bits(0x0000_2000);

    pub const SUPPORTED_MASK: FeatureFlags = MLD
        .union(QUERYSTACK)
        .union(RANKP_QFLAGS)
        .union(LOCATION)
        .union(RESCLASSNAME)
        .union(PROPERTIES)
        .union(FLAGS);
}

/// Monitor query features (`MONITORQUERY`, `MONITORQUERYX`).
pub mod monitor_query {
    use super::FeatureFlags;

    pub const QFLAGS: FeatureFlags = FeatureFlags::from_bits(0x0000_0002);

    pub const SUPPORTED_MASK: FeatureFlags = QFLAGS;
}

/// Monitor result features (`MONITORRESULT`, `MLD_MONITORRESULT`, `MONITORRESULTX`).
pub mod monitor_result {
    use super::FeatureFlags;

    pub const MLD: FeatureFlags = FeatureFlags::from_bits(0x0000_0001);
    pub const RFLAGS: FeatureFlags = FeatureFlags::from_bits(0x0000_0008);
    pub const ACTIVEDOCS: FeatureFlags = FeatureFlags::from_bits(0x0000_0010);

    pub const SUPPORTED_MASK: FeatureFlags = MLD.union(RFLAGS).union(ACTIVEDOCS);
}

/// One optional section of a family's body layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub bit: FeatureFlags,
    pub name: &'static str,
}

const fn field(bit: FeatureFlags, name: &'static str) -> FieldDescriptor {
    FieldDescriptor { bit, name }
}

static QUERY_RESULT_FIELDS: [FieldDescriptor; 5] = [
    field(query_result::SORTDATA, "sort data"),
    field(query_result::AGGRDATA, "aggregation data"),
    field(query_result::GROUPDATA, "group data"),
    field(query_result::COVERAGE, "coverage"),
    field(query_result::MLD, "mld hits"),
];

static QUERY_FIELDS: [FieldDescriptor; 8] = [
    field(query::RANKP, "rank profile"),
    field(query::PROPERTIES, "properties"),
    field(query::SORTSPEC, "sort spec"),
    field(query::AGGRSPEC, "aggregation spec"),
    field(query::GROUPSPEC, "group spec"),
    field(query::SESSIONID, "session id"),
    field(query::LOCATION, "location"),
    field(query::PARSEDQUERY, "query stack"),
];

static GET_DOCSUMS_FIELDS: [FieldDescriptor; 7] = [
    field(get_docsums::RANKP_QFLAGS, "rank profile and query flags"),
    field(get_docsums::RESCLASSNAME, "result class name"),
    field(get_docsums::PROPERTIES, "properties"),
    field(get_docsums::QUERYSTACK, "query stack"),
    field(get_docsums::LOCATION, "location"),
    field(get_docsums::FLAGS, "getdocsums flags"),
    field(get_docsums::MLD, "mld doc ids"),
];

static MONITOR_QUERY_FIELDS: [FieldDescriptor; 1] = [field(monitor_query::QFLAGS, "query flags")];

static MONITOR_RESULT_FIELDS: [FieldDescriptor; 3] = [
    field(monitor_result::MLD, "mld node stats"),
    field(monitor_result::RFLAGS, "result flags"),
    field(monitor_result::ACTIVEDOCS, "active docs"),
];

/// The feature bits this codec understands for `family`.
pub fn supported_mask(family: PacketFamily) -> FeatureFlags {
    match family {
        PacketFamily::Query => query::SUPPORTED_MASK,
        PacketFamily::QueryResult => query_result::SUPPORTED_MASK,
        PacketFamily::GetDocsums => get_docsums::SUPPORTED_MASK,
        PacketFamily::MonitorQuery => monitor_query::SUPPORTED_MASK,
        PacketFamily::MonitorResult => monitor_result::SUPPORTED_MASK,
    }
}

/// Rejects any bit outside the family's support mask.
pub fn validate(flags: FeatureFlags, family: PacketFamily) -> Result<()> {
    let unsupported = flags & !supported_mask(family);
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::UnsupportedFeatureFlag {
            family,
            flags,
            unsupported,
        })
    }
}

/// Optional sections of `family`, in the order they appear on the wire.
pub fn field_order(family: PacketFamily) -> &'static [FieldDescriptor] {
    match family {
        PacketFamily::Query => &QUERY_FIELDS,
        PacketFamily::QueryResult => &QUERY_RESULT_FIELDS,
        PacketFamily::GetDocsums => &GET_DOCSUMS_FIELDS,
        PacketFamily::MonitorQuery => &MONITOR_QUERY_FIELDS,
        PacketFamily::MonitorResult => &MONITOR_RESULT_FIELDS,
    }
}

/// The implied feature word of a legacy code, whose body is the extended
/// body minus the flags field. `None` for extended and flag-less codes.
pub fn legacy_flags(code: PacketCode) -> Option<FeatureFlags> {
    match code {
        PacketCode::QueryResult => Some(FeatureFlags::NONE),
        PacketCode::MldQueryResult => Some(query_result::MLD),
        PacketCode::GetDocsums => Some(FeatureFlags::NONE),
        PacketCode::MldGetDocsums => Some(get_docsums::MLD),
        PacketCode::ParsedQuery2 => Some(query::PARSEDQUERY | query::RANKP),
        PacketCode::MonitorQuery => Some(FeatureFlags::NONE),
        PacketCode::MonitorResult => Some(FeatureFlags::NONE),
        PacketCode::MldMonitorResult => Some(monitor_result::MLD),
        _ => None,
    }
}

/// Query flags carried as payload in query and getdocsums packets.
pub mod qflags {
    pub const REPORT_QUEUELEN: u32 = 0x0000_0008;
    pub const ESTIMATE: u32 = 0x0000_0080;
    pub const DROP_SORTDATA: u32 = 0x0000_4000;
    pub const REPORT_COVERAGE: u32 = 0x0000_8000;
    pub const NO_RESULTCACHE: u32 = 0x0001_0000;
    pub const DUMP_FEATURES: u32 = 0x0004_0000;
}

/// Payload flags of the getdocsums `FLAGS` section.
pub mod getdocsums_flags {
    pub const IGNORE_ROW: u32 = 0x0000_0001;
    pub const ALLOW_SLIME: u32 = 0x0000_0002;

    /// Docsum class id announcing a slime-encoded docsum blob.
    pub const SLIME_MAGIC_ID: u32 = 0x5555_5555;
}

/// Payload flags of the monitor query `QFLAGS` section.
pub mod monitor_query_flags {
    pub const REPORT_ACTIVEDOCS: u32 = 0x0000_0020;
}
