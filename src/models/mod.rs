// Domain models shared by connectors, scheduler, plugins and the result store

mod check;
mod cycle;
mod fetch;
mod section;
mod source;

pub use check::{CheckResult, Metric, PluginReport, PluginStatus, State};
pub use cycle::{CycleReport, CycleState, SourceOutcome, SourceReport};
pub use fetch::{FetchedPayload, OidAnnotation, RawFetchResult};
pub use section::{CacheInfo, MergedHostData, Row, Section};
pub use source::{SourceKind, SourcePriority};
