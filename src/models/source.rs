// Data source types and their merge priority

use serde::{Deserialize, Serialize};
use std::fmt;
use wincode::{SchemaRead, SchemaWrite};

/// The kind of a configured data source. A host has at most one source per kind, so the
/// kind doubles as the cache key component and the tie-break of last resort when merging.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    SchemaRead,
    SchemaWrite,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Agent,
    Program,
    Snmp,
    Piggyback,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Agent,
        SourceKind::Program,
        SourceKind::Snmp,
        SourceKind::Piggyback,
    ];

    /// Stable id used in cache paths and logs.
    pub fn id(self) -> &'static str {
        match self {
            SourceKind::Agent => "agent",
            SourceKind::Program => "program",
            SourceKind::Snmp => "snmp",
            SourceKind::Piggyback => "piggyback",
        }
    }

    /// Priority used when the source config does not set one. Lower wins.
    pub fn default_priority(self) -> u32 {
        match self {
            SourceKind::Agent => 10,
            SourceKind::Program => 20,
            SourceKind::Snmp => 30,
            SourceKind::Piggyback => 40,
        }
    }

    /// Piggyback files are written by other hosts' cycles and already act as a cache.
    pub fn uses_fetch_cache(self) -> bool {
        !matches!(self, SourceKind::Piggyback)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Merge rank of one source within a host: configured priority first, kind second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePriority {
    pub priority: u32,
    pub source: SourceKind,
}

impl SourcePriority {
    pub fn new(priority: u32, source: SourceKind) -> Self {
        Self { priority, source }
    }
}
