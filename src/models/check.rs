// Check states and plugin results

use serde::{Deserialize, Serialize};
use std::fmt;
use wincode::{SchemaRead, SchemaWrite};

/// Monitoring state; the numeric code is also the process exit code of `checkengine check`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Ok,
    Warn,
    Crit,
    Unknown,
}

impl State {
    pub fn code(self) -> i32 {
        match self {
            State::Ok => 0,
            State::Warn => 1,
            State::Crit => 2,
            State::Unknown => 3,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => State::Ok,
            1 => State::Warn,
            2 => State::Crit,
            _ => State::Unknown,
        }
    }

    // CRIT outranks UNKNOWN, which outranks WARN.
    fn severity(self) -> u8 {
        match self {
            State::Ok => 0,
            State::Warn => 1,
            State::Unknown => 2,
            State::Crit => 3,
        }
    }

    pub fn worst(self, other: State) -> State {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn worst_of(states: impl IntoIterator<Item = State>) -> State {
        states.into_iter().fold(State::Ok, State::worst)
    }

    pub fn label(self) -> &'static str {
        match self {
            State::Ok => "OK",
            State::Warn => "WARN",
            State::Crit => "CRIT",
            State::Unknown => "UNKNOWN",
        }
    }

    /// Suffix appended to summaries, e.g. `used 93% (!!)`.
    pub fn marker(self) -> &'static str {
        match self {
            State::Ok => "",
            State::Warn => "(!)",
            State::Crit => "(!!)",
            State::Unknown => "(?)",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub warn: Option<f64>,
    pub crit: Option<f64>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            warn: None,
            crit: None,
        }
    }

    pub fn with_levels(mut self, warn: f64, crit: f64) -> Self {
        self.warn = Some(warn);
        self.crit = Some(crit);
        self
    }
}

/// One `(state, summary, metrics)` tuple produced by a check function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub state: State,
    pub summary: String,
    pub metrics: Vec<Metric>,
}

impl CheckResult {
    pub fn new(state: State, summary: impl Into<String>) -> Self {
        Self {
            state,
            summary: summary.into(),
            metrics: Vec::new(),
        }
    }

    pub fn ok(summary: impl Into<String>) -> Self {
        Self::new(State::Ok, summary)
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Ran,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct PluginReport {
    pub plugin: String,
    pub status: PluginStatus,
    pub results: Vec<CheckResult>,
    /// Required sections that were absent (status `Skipped`).
    pub missing_sections: Vec<String>,
    pub error: Option<String>,
}

impl PluginReport {
    /// Aggregate state, `None` for skipped plugins. A crashed plugin is UNKNOWN.
    pub fn state(&self) -> Option<State> {
        match self.status {
            PluginStatus::Ran => Some(State::worst_of(self.results.iter().map(|r| r.state))),
            PluginStatus::Failed => Some(State::Unknown),
            PluginStatus::Skipped => None,
        }
    }
}
