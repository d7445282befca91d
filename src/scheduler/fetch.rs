// Source collection for one cycle: fresh cache hits, bounded parallel fetches, stale fallback.

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{AppConfig, HostConfig, SourceConfig};
use crate::connector;
use crate::error::FetchErrorKind;
use crate::fetch_cache::FetchCache;
use crate::models::{RawFetchResult, SourceOutcome, SourceReport};
use crate::piggyback::PiggybackSpool;

/// What one source contributed to the cycle.
pub(super) struct Collected<'a> {
    pub source: &'a SourceConfig,
    pub report: SourceReport,
    pub payload: Option<Vec<u8>>,
    /// The payload was fetched during this cycle.
    pub fresh: bool,
}

impl<'a> Collected<'a> {
    fn new(source: &'a SourceConfig, outcome: SourceOutcome) -> Self {
        Self {
            source,
            report: SourceReport::new(source.kind(), source.priority(), outcome),
            payload: None,
            fresh: false,
        }
    }
}

/// Gather every source of `host`, ordered by priority. Fetches run concurrently under a
/// semaphore of `max_parallel_fetches` permits; whatever is still running at `deadline`
/// is dropped and recorded as a timeout.
pub(super) async fn collect<'a>(
    config: &AppConfig,
    host: &'a HostConfig,
    cache: &FetchCache,
    spool: &PiggybackSpool,
    force: bool,
    deadline: Instant,
) -> Vec<Collected<'a>> {
    let mut sources: Vec<&'a SourceConfig> = host.sources.iter().collect();
    sources.sort_by_key(|s| (s.priority(), s.kind()));

    let mut slots: Vec<Option<Collected<'a>>> = Vec::with_capacity(sources.len());
    let mut to_fetch = Vec::new();
    for (i, source) in sources.iter().copied().enumerate() {
        let kind = source.kind();
        if !force
            && let Some(entry) = cache
                .get_if_fresh(&host.name, kind, config.max_age_for(host, kind))
                .await
        {
            debug!(host = %host.name, source = %kind, age_ms = entry.age_ms(chrono::Utc::now().timestamp_millis()), "Using cached payload");
            let mut c = Collected::new(source, SourceOutcome::FromCache);
            c.report.payload_time_ms = entry.fetched_at_ms;
            c.payload = Some(entry.payload);
            slots.push(Some(c));
        } else {
            slots.push(None);
            to_fetch.push(i);
        }
    }

    let semaphore = Semaphore::new(config.parallel_fetches_for(host));
    let semaphore = &semaphore;
    let fetches = to_fetch.into_iter().map(|i| {
        let source = sources[i];
        async move {
            let bounded = async {
                let _permit = semaphore.acquire().await;
                connector::fetch(source, host, spool, deadline).await
            };
            let result = match tokio::time::timeout_at(deadline, bounded).await {
                Ok(r) => r,
                Err(_) => RawFetchResult::failure(
                    FetchErrorKind::Timeout,
                    "cycle deadline exceeded",
                ),
            };
            (i, result)
        }
    });
    let results = futures_util::future::join_all(fetches).await;

    for (i, result) in results {
        let source = sources[i];
        slots[i] = Some(absorb(host, source, result, cache).await);
    }
    slots.into_iter().flatten().collect()
}

/// Turn a fetch result into the source's contribution: write successes through to the
/// cache, fall back to an outdated cache entry on failure.
async fn absorb<'a>(
    host: &HostConfig,
    source: &'a SourceConfig,
    result: RawFetchResult,
    cache: &FetchCache,
) -> Collected<'a> {
    let kind = source.kind();
    match result {
        RawFetchResult::Success(p) => {
            if let Err(e) = cache.put(&host.name, kind, &p.payload, p.fetched_at_ms).await {
                warn!(host = %host.name, source = %kind, error = %e, operation = "cache_put", "Cache write failed");
            }
            let mut c = Collected::new(source, SourceOutcome::Fetched);
            c.report.payload_time_ms = p.fetched_at_ms;
            c.report.annotations = p.annotations;
            c.payload = Some(p.payload);
            c.fresh = true;
            c
        }
        RawFetchResult::Failure(e) if e.kind == FetchErrorKind::NotFound => {
            let mut c = Collected::new(source, SourceOutcome::NoData);
            c.report.error_kind = Some(e.kind);
            c.report.message = e.message;
            c
        }
        RawFetchResult::Failure(e) => match cache.get(&host.name, kind).await {
            Some(entry) => {
                warn!(host = %host.name, source = %kind, error = %e, "Fetch failed; using outdated cache entry");
                let mut c = Collected::new(source, SourceOutcome::StaleFallback);
                c.report.error_kind = Some(e.kind);
                c.report.message = e.message;
                c.report.payload_time_ms = entry.fetched_at_ms;
                c.payload = Some(entry.payload);
                c
            }
            None => {
                let mut c = Collected::new(source, SourceOutcome::Failed);
                c.report.error_kind = Some(e.kind);
                c.report.message = e.message;
                c
            }
        },
    }
}
