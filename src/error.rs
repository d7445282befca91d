// Error taxonomy of the fetch pipeline.
// Connector and cache errors are absorbed by the scheduler; only CycleError reaches callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use wincode::{SchemaRead, SchemaWrite};

use crate::models::{SourceKind, State};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "camelCase")]
pub enum FetchErrorKind {
    Timeout,
    ConnectionRefused,
    TlsHandshakeFailed,
    IncompletePayload,
    Unreachable,
    AuthFailed,
    NonZeroExit,
    SpawnFailed,
    /// Local data (the piggyback spool) exists but cannot be read.
    ReadFailed,
    NotFound,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::ConnectionRefused => "connection refused",
            FetchErrorKind::TlsHandshakeFailed => "TLS handshake failed",
            FetchErrorKind::IncompletePayload => "incomplete payload",
            FetchErrorKind::Unreachable => "unreachable",
            FetchErrorKind::AuthFailed => "authentication failed",
            FetchErrorKind::NonZeroExit => "non-zero exit",
            FetchErrorKind::SpawnFailed => "spawn failed",
            FetchErrorKind::ReadFailed => "read failed",
            FetchErrorKind::NotFound => "not found",
        }
    }

    /// Host state reported when this failure takes the whole host down.
    /// Connection, timeout and empty-output problems are CRIT; anything else is UNKNOWN.
    pub fn host_state(self) -> State {
        match self {
            FetchErrorKind::Timeout
            | FetchErrorKind::ConnectionRefused
            | FetchErrorKind::TlsHandshakeFailed
            | FetchErrorKind::IncompletePayload
            | FetchErrorKind::Unreachable
            | FetchErrorKind::AuthFailed
            | FetchErrorKind::NonZeroExit => State::Crit,
            FetchErrorKind::SpawnFailed | FetchErrorKind::ReadFailed => State::Unknown,
            FetchErrorKind::NotFound => State::Ok,
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Cache failures are never fatal: reads degrade to a miss, writes are logged.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache codec for {path}: {message}")]
    Codec { path: String, message: String },
}

/// Malformed input found while splitting a payload; the offending part is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("line {line}: section marker without a name")]
    EmptySectionName { line: usize },
    #[error("line {line}: section {section} has invalid separator {value:?}")]
    InvalidSeparator {
        line: usize,
        section: String,
        value: String,
    },
    #[error("line {line}: section {section} has invalid {option} option {value:?}")]
    InvalidOption {
        line: usize,
        section: String,
        option: String,
        value: String,
    },
    #[error("line {line}: invalid piggyback host name {name:?}")]
    InvalidPiggybackHost { line: usize, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("no candidates to merge")]
    Empty,
    #[error(
        "section {section} delivered by {first} and {second} with equal priority {priority}"
    )]
    Ambiguous {
        section: String,
        first: SourceKind,
        second: SourceKind,
        priority: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("missing section {0}")]
    MissingSection(String),
    #[error("malformed row in section {section}: {message}")]
    MalformedRow { section: String, message: String },
    #[error("plugin panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin {0} registered twice")]
    Duplicate(String),
    #[error("unknown plugin {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("host {0} is not configured")]
    UnknownHost(String),
    #[error("a check cycle for host {0} is already in flight")]
    AlreadyInFlight(String),
}
