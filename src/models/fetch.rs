// Raw connector results

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::error::{FetchError, FetchErrorKind};

/// Per-OID failure inside an otherwise successful SNMP fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct OidAnnotation {
    pub section: String,
    pub oid: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPayload {
    /// Agent-format bytes (`<<<section>>>` markers and data lines).
    pub payload: Vec<u8>,
    pub fetched_at_ms: i64,
    pub annotations: Vec<OidAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFetchResult {
    Success(FetchedPayload),
    Failure(FetchError),
}

impl RawFetchResult {
    pub fn success(payload: Vec<u8>) -> Self {
        Self::success_with_annotations(payload, Vec::new())
    }

    pub fn success_with_annotations(payload: Vec<u8>, annotations: Vec<OidAnnotation>) -> Self {
        RawFetchResult::Success(FetchedPayload {
            payload,
            fetched_at_ms: chrono::Utc::now().timestamp_millis(),
            annotations,
        })
    }

    pub fn failure(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        RawFetchResult::Failure(FetchError::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RawFetchResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<FetchErrorKind> {
        match self {
            RawFetchResult::Success(_) => None,
            RawFetchResult::Failure(e) => Some(e.kind),
        }
    }
}
