// Periodic check worker: starts a cycle for every configured host on each tick.
// Host cycles run as tasks bounded by a global semaphore; a host is never queued twice.

use crate::config::AppConfig;
use crate::models::CycleState;
use crate::scheduler::{CycleRunner, InFlightGate, InFlightGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Runner and shutdown for the worker.
pub struct WorkerDeps {
    pub runner: Arc<CycleRunner>,
    pub stats: Arc<WorkerStats>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Worker timing and concurrency config.
pub struct WorkerConfig {
    pub check_interval_secs: u64,
    /// How often to log worker stats (real seconds).
    pub stats_log_interval_secs: u64,
    pub max_concurrent_hosts: usize,
    /// Config file re-read on every tick; `None` keeps the runner's config.
    pub config_path: Option<String>,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            check_interval_secs: config.engine.check_interval_secs,
            stats_log_interval_secs: config.engine.stats_log_interval_secs,
            max_concurrent_hosts: config.engine.max_concurrent_hosts,
            config_path: None,
        }
    }

    pub fn with_config_reload(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub cycles_done: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub cycles_rejected: AtomicU64,
    /// Ticks that found the host's previous cycle still queued or running.
    pub cycles_skipped: AtomicU64,
    pub config_reload_failures: AtomicU64,
}

impl WorkerStats {
    pub fn done(&self) -> u64 {
        self.cycles_done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        runner,
        stats,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        check_interval_secs,
        stats_log_interval_secs,
        max_concurrent_hosts,
        config_path,
    } = config;

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(check_interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let permits = Arc::new(Semaphore::new(max_concurrent_hosts));
        let mut tasks: JoinSet<()> = JoinSet::new();
        // Hosts with a queued or running task; the guard travels with the task.
        let scheduled = InFlightGate::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Some(path) = &config_path {
                        reload_config(&runner, &stats, path).await;
                    }
                    let config = runner.config();
                    for host in &config.hosts {
                        let Some(guard) = scheduled.try_enter(&host.name) else {
                            stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(host = %host.name, "Previous cycle still pending; skipping");
                            continue;
                        };
                        tasks.spawn(run_host(
                            runner.clone(),
                            stats.clone(),
                            permits.clone(),
                            host.name.clone(),
                            guard,
                        ));
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, operation = "join_cycle", "Check cycle task failed");
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        hosts = runner.config().hosts.len(),
                        running = tasks.len(),
                        cycles_done = stats.done(),
                        cycles_failed = stats.failed(),
                        cycles_rejected = stats.cycles_rejected.load(Ordering::Relaxed),
                        cycles_skipped = stats.cycles_skipped.load(Ordering::Relaxed),
                        config_reload_failures = stats.config_reload_failures.load(Ordering::Relaxed),
                        "worker stats"
                    );
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, operation = "join_cycle", "Check cycle task failed");
            }
        }
        tracing::debug!("Worker stopped");
    }
    .instrument(tracing::debug_span!("worker", check_interval_secs)))
}

/// A config that fails to load or validate leaves the previous one in place.
async fn reload_config(runner: &CycleRunner, stats: &WorkerStats, path: &str) {
    match AppConfig::reload(path).await {
        Ok(config) => runner.reload_config(Arc::new(config)),
        Err(e) => {
            stats.config_reload_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(path, error = %e, operation = "reload_config", "Config reload failed; keeping previous config");
        }
    }
}

async fn run_host(
    runner: Arc<CycleRunner>,
    stats: Arc<WorkerStats>,
    permits: Arc<Semaphore>,
    host: String,
    _scheduled: InFlightGuard,
) {
    let _permit = permits.acquire_owned().await;
    match runner.run_cycle(&host, false).await {
        Ok(outcome) if outcome.report.state == CycleState::Failed => {
            stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(_) => {
            stats.cycles_done.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.cycles_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(host = %host, error = %e, operation = "run_cycle", "Check cycle rejected");
        }
    }
}
