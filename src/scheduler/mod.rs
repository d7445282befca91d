// Host check cycle: Pending → Fetching → [PartiallyFailed →] Merging → Done, or → Failed
// when no source produced data and at least one failed.

mod fetch;
mod gate;

pub use gate::{InFlightGate, InFlightGuard};

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock};

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{AppConfig, HostConfig};
use crate::error::CycleError;
use crate::fetch_cache::FetchCache;
use crate::models::{
    CycleReport, CycleState, MergedHostData, PluginStatus, Section, SourceKind, SourceOutcome,
    SourcePriority, State,
};
use crate::piggyback::PiggybackSpool;
use crate::registry::PluginRegistry;
use crate::result_store::ResultStore;
use crate::sections::{merge_sections, parse_payload};

/// Result of one cycle: the report and the merged sections it was built from.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub report: CycleReport,
    pub data: MergedHostData,
}

pub struct CycleRunner {
    /// Swapped by `reload_config`; each cycle works on the snapshot it started with.
    config: RwLock<Arc<AppConfig>>,
    cache: FetchCache,
    spool: PiggybackSpool,
    registry: Arc<PluginRegistry>,
    store: Option<Arc<ResultStore>>,
    gate: InFlightGate,
}

impl CycleRunner {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<PluginRegistry>,
        store: Option<Arc<ResultStore>>,
    ) -> Self {
        let cache = FetchCache::from_config(&config.cache);
        let spool = PiggybackSpool::from_config(&config.piggyback);
        Self {
            config: RwLock::new(config),
            cache,
            spool,
            registry,
            store,
            gate: InFlightGate::new(),
        }
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the host list and engine limits for cycles started from now on.
    /// Cache and piggyback directories stay as they were at construction.
    pub fn reload_config(&self, config: Arc<AppConfig>) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn is_in_flight(&self, host: &str) -> bool {
        self.gate.is_in_flight(host)
    }

    /// Run one cycle for `host`. `force` skips fresh cache entries and fetches every source.
    /// Only configuration problems and concurrent cycles are errors; source failures end
    /// up in the report.
    #[instrument(skip(self), fields(operation = "run_cycle"))]
    pub async fn run_cycle(&self, host: &str, force: bool) -> Result<CycleOutcome, CycleError> {
        let config = self.config();
        let host_config = config
            .host(host)
            .ok_or_else(|| CycleError::UnknownHost(host.to_string()))?;
        let Some(_guard) = self.gate.try_enter(host) else {
            warn!(host, "Check cycle already in flight; request rejected");
            return Err(CycleError::AlreadyInFlight(host.to_string()));
        };

        let started = Instant::now();
        let deadline = started + config.cycle_deadline_for(host_config);
        let mut report = CycleReport::new(host, force, chrono::Utc::now().timestamp_millis());
        report.transition(CycleState::Fetching);

        let collected = fetch::collect(
            &config,
            host_config,
            &self.cache,
            &self.spool,
            force,
            deadline,
        )
        .await;

        let any_data = collected.iter().any(|c| c.report.outcome.has_data());
        let any_failed = collected
            .iter()
            .any(|c| c.report.outcome == SourceOutcome::Failed);
        let all_clean = collected.iter().all(|c| {
            matches!(
                c.report.outcome,
                SourceOutcome::Fetched | SourceOutcome::FromCache
            )
        });

        if !any_data && any_failed {
            report.sources = collected.into_iter().map(|c| c.report).collect();
            report.transition(CycleState::Failed);
            report.host_state = failure_state(&report);
            report.finished_at_ms = chrono::Utc::now().timestamp_millis();
            warn!(
                host,
                host_state = %report.host_state,
                duration_ms = started.elapsed().as_millis() as u64,
                "Check cycle failed: no source delivered data"
            );
            return Ok(CycleOutcome {
                report,
                data: MergedHostData::new(),
            });
        }

        if !all_clean {
            report.transition(CycleState::PartiallyFailed);
        }
        report.transition(CycleState::Merging);

        let (candidates, sources) = self.sections_of(host_config, collected).await;
        report.sources = sources;
        let data = merge_sections(candidates);
        report.stale_sections = data
            .iter()
            .filter(|s| s.cached)
            .map(|s| s.name.clone())
            .collect();

        report.plugins = self.registry.dispatch(host, &data);
        report.missing_sections = report
            .plugins
            .iter()
            .filter(|p| p.status == PluginStatus::Skipped)
            .flat_map(|p| p.missing_sections.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        report.host_state = host_state(&report);
        report.transition(CycleState::Done);
        report.finished_at_ms = chrono::Utc::now().timestamp_millis();

        if let Some(store) = &self.store
            && let Err(e) = store.write(host, &data, &report).await
        {
            warn!(host, error = %e, operation = "store_write", "Failed to store cycle result");
        }

        info!(
            host,
            state = ?report.state,
            host_state = %report.host_state,
            sections = data.len(),
            stale = report.stale_sections.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Check cycle done"
        );
        Ok(CycleOutcome { report, data })
    }

    /// Parse every payload into merge candidates, re-add persisted sections and spool
    /// piggyback blocks found in fresh payloads.
    async fn sections_of(
        &self,
        host: &HostConfig,
        collected: Vec<fetch::Collected<'_>>,
    ) -> (Vec<(SourcePriority, Section)>, Vec<crate::models::SourceReport>) {
        let now_secs = chrono::Utc::now().timestamp();
        let mut candidates = Vec::new();
        let mut reports = Vec::with_capacity(collected.len());
        let mut piggyback: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut any_fresh = false;

        for mut c in collected {
            let kind = c.source.kind();
            let priority = SourcePriority::new(c.source.priority(), kind);
            let Some(payload) = c.payload.take() else {
                reports.push(c.report);
                continue;
            };

            let parsed = parse_payload(&payload, &host.name, kind, now_secs);
            for w in &parsed.warnings {
                warn!(host = %host.name, source = %kind, warning = %w, "Malformed payload content skipped");
            }

            let previous = self.cache.load_persisted(&host.name, kind, now_secs).await;
            if c.fresh {
                let fresh_persisted = parsed.persisted_sections();
                if let Err(e) = self
                    .cache
                    .store_persisted(&host.name, kind, previous.clone(), fresh_persisted, now_secs)
                    .await
                {
                    warn!(host = %host.name, source = %kind, error = %e, "Failed to store persisted sections");
                }
                if kind != SourceKind::Piggyback {
                    any_fresh = true;
                    for (target, lines) in &parsed.piggyback {
                        piggyback
                            .entry(target.clone())
                            .or_default()
                            .extend(lines.iter().cloned());
                    }
                }
            }

            let live: HashSet<&str> = parsed.sections.iter().map(|s| s.name.as_str()).collect();
            let restored: Vec<Section> = previous
                .iter()
                .filter(|p| !live.contains(p.section.name.as_str()))
                .map(|p| p.to_cached_section())
                .collect();

            c.report.sections = parsed.section_names();
            c.report
                .sections
                .extend(restored.iter().map(|s| s.name.clone()));
            for mut section in parsed.sections {
                if !c.fresh {
                    section.cached = true;
                }
                candidates.push((priority, section));
            }
            candidates.extend(restored.into_iter().map(|s| (priority, s)));
            reports.push(c.report);
        }

        if any_fresh && let Err(e) = self.spool.store(&host.name, &piggyback).await {
            warn!(host = %host.name, error = %e, operation = "piggyback_store", "Failed to spool piggyback data");
        }
        (candidates, reports)
    }
}

/// Worst of the plugin states and of the failures of sources that were fetched this cycle.
fn host_state(report: &CycleReport) -> State {
    let plugin_states = report.plugins.iter().filter_map(|p| p.state());
    let source_states = report.sources.iter().filter_map(|s| match s.outcome {
        SourceOutcome::Failed | SourceOutcome::StaleFallback => s.error_kind.map(|k| k.host_state()),
        _ => None,
    });
    State::worst_of(plugin_states.chain(source_states))
}

fn failure_state(report: &CycleReport) -> State {
    State::worst_of(
        report
            .sources
            .iter()
            .filter_map(|s| s.error_kind.map(|k| k.host_state())),
    )
}
