// Host check cycle report (what the query API and CLI show)

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use super::{OidAnnotation, PluginReport, SourceKind, State};
use crate::error::FetchErrorKind;

/// Cycle states. Valid paths: Pending → Fetching → [PartiallyFailed →] Merging → Done,
/// or Pending → Fetching → Failed when every source failed and no cache existed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "camelCase")]
pub enum CycleState {
    Pending,
    Fetching,
    PartiallyFailed,
    Merging,
    Done,
    Failed,
}

impl CycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CycleState::Done | CycleState::Failed)
    }

    pub fn can_transition_to(self, next: CycleState) -> bool {
        matches!(
            (self, next),
            (CycleState::Pending, CycleState::Fetching)
                | (CycleState::Fetching, CycleState::PartiallyFailed)
                | (CycleState::Fetching, CycleState::Merging)
                | (CycleState::Fetching, CycleState::Failed)
                | (CycleState::PartiallyFailed, CycleState::Merging)
                | (CycleState::Merging, CycleState::Done)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "camelCase")]
pub enum SourceOutcome {
    /// Fresh fetch this cycle.
    Fetched,
    /// Fresh enough cache entry; no fetch attempted.
    FromCache,
    /// Fetch failed; an outdated cache entry was used instead.
    StaleFallback,
    /// Source legitimately had nothing this cycle (no piggyback files).
    NoData,
    Failed,
}

impl SourceOutcome {
    pub fn has_data(self) -> bool {
        matches!(
            self,
            SourceOutcome::Fetched | SourceOutcome::FromCache | SourceOutcome::StaleFallback
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source: SourceKind,
    pub priority: u32,
    pub outcome: SourceOutcome,
    pub error_kind: Option<FetchErrorKind>,
    pub message: String,
    /// Unix millis of the payload used (fetch time or cache entry time), 0 when none.
    pub payload_time_ms: i64,
    pub sections: Vec<String>,
    pub annotations: Vec<OidAnnotation>,
}

impl SourceReport {
    pub fn new(source: SourceKind, priority: u32, outcome: SourceOutcome) -> Self {
        Self {
            source,
            priority,
            outcome,
            error_kind: None,
            message: String::new(),
            payload_time_ms: 0,
            sections: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub host: String,
    pub forced: bool,
    /// Every state the cycle went through, in order.
    pub path: Vec<CycleState>,
    pub state: CycleState,
    pub host_state: State,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub sources: Vec<SourceReport>,
    /// Sections served from cache (fresh cache hit, fallback or persisted).
    pub stale_sections: Vec<String>,
    /// Sections some plugin requires that no source delivered.
    pub missing_sections: Vec<String>,
    pub plugins: Vec<PluginReport>,
}

impl CycleReport {
    pub fn new(host: impl Into<String>, forced: bool, started_at_ms: i64) -> Self {
        Self {
            host: host.into(),
            forced,
            path: vec![CycleState::Pending],
            state: CycleState::Pending,
            host_state: State::Ok,
            started_at_ms,
            finished_at_ms: started_at_ms,
            sources: Vec::new(),
            stale_sections: Vec::new(),
            missing_sections: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Record a state change. Invalid transitions are a bug in the scheduler.
    pub fn transition(&mut self, next: CycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid cycle transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.path.push(next);
    }

    pub fn is_failed(&self) -> bool {
        self.state == CycleState::Failed
    }

    pub fn exit_code(&self) -> i32 {
        self.host_state.code()
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == kind)
    }
}
