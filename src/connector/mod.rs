// Source connectors. Every connector turns one configured source into a RawFetchResult
// and never runs past its deadline: min(now + source timeout, cycle deadline).

mod piggyback;
mod program;
mod snmp;
mod tcp;

pub use program::substitute_macros;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::{HostConfig, SourceConfig};
use crate::error::FetchErrorKind;
use crate::models::RawFetchResult;
use crate::piggyback::PiggybackSpool;

/// Fetch one source of `host`. No retries and no caching happen here.
#[instrument(skip_all, fields(host = %host.name, source = %source.kind(), operation = "fetch"))]
pub async fn fetch(
    source: &SourceConfig,
    host: &HostConfig,
    spool: &PiggybackSpool,
    cycle_deadline: Instant,
) -> RawFetchResult {
    let started = Instant::now();
    let deadline = cycle_deadline.min(started + source.timeout());
    // SNMP bounds each query itself so that answered queries survive a late timeout.
    let result = if matches!(source, SourceConfig::Snmp(_)) {
        fetch_source(source, host, spool, deadline).await
    } else {
        match tokio::time::timeout_at(deadline, fetch_source(source, host, spool, deadline)).await {
            Ok(r) => r,
            Err(_) => RawFetchResult::failure(
                FetchErrorKind::Timeout,
                format!(
                    "no complete answer within {} ms",
                    deadline.saturating_duration_since(started).as_millis()
                ),
            ),
        }
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        RawFetchResult::Success(p) => debug!(
            bytes = p.payload.len(),
            annotations = p.annotations.len(),
            elapsed_ms,
            "Fetch succeeded"
        ),
        RawFetchResult::Failure(e) if e.kind == FetchErrorKind::NotFound => {
            debug!(elapsed_ms, "No data: {}", e.message)
        }
        RawFetchResult::Failure(e) => {
            warn!(kind = %e.kind, error = %e.message, elapsed_ms, "Fetch failed")
        }
    }
    result
}

async fn fetch_source(
    source: &SourceConfig,
    host: &HostConfig,
    spool: &PiggybackSpool,
    deadline: Instant,
) -> RawFetchResult {
    match source {
        SourceConfig::Agent(c) => tcp::fetch(c, host.address()).await,
        SourceConfig::Program(c) => program::fetch(c, host).await,
        SourceConfig::Piggyback(_) => piggyback::fetch(spool, &host.name).await,
        SourceConfig::Snmp(c) => snmp::fetch(c, host.address(), deadline).await,
    }
}
