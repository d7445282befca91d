use anyhow::Result;
use checkengine::*;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use checkengine::config::AppConfig;
use checkengine::models::{CycleReport, PluginStatus, State};
use checkengine::registry::PluginRegistry;
use checkengine::result_store::ResultStore;
use checkengine::scheduler::CycleRunner;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser, Debug)]
#[command(name = "checkengine")]
#[command(version)]
struct Cli {
    /// Config file; defaults to $CONFIG_FILE, then ./config.toml.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one check cycle for a host and print the results.
    Check {
        host: String,
        /// Ignore fresh cache entries and fetch every source.
        #[arg(long)]
        force: bool,
        /// Print the cycle report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check all hosts periodically and serve the HTTP query API.
    Run,
    /// Print the stored data of a host as JSON.
    Show { host: String },
    /// Print an example configuration.
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::PrintConfig => {
            print!("{}", AppConfig::example_toml());
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { host, force, json } => {
            check(cli.config.as_deref(), &host, force, json).await
        }
        Command::Show { host } => show(cli.config.as_deref(), &host).await,
        Command::Run => {
            run(cli.config.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_store(app_config: &AppConfig) -> Result<Arc<ResultStore>> {
    let store = ResultStore::connect(&app_config.store.path).await?;
    store.init().await?;
    Ok(Arc::new(store))
}

fn state_exit(state: State) -> ExitCode {
    ExitCode::from(state.code() as u8)
}

async fn check_runner(config_path: Option<&str>) -> Result<CycleRunner> {
    let app_config = Arc::new(AppConfig::load(config_path)?);
    let registry = Arc::new(PluginRegistry::from_names(&app_config.plugins.enabled)?);
    let store = open_store(&app_config).await?;
    Ok(CycleRunner::new(app_config, registry, Some(store)))
}

async fn check(config_path: Option<&str>, host: &str, force: bool, json: bool) -> Result<ExitCode> {
    // Exit 1 means WARN for `check`, so setup errors report UNKNOWN instead.
    let runner = match check_runner(config_path).await {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{:#}", e);
            return Ok(state_exit(State::Unknown));
        }
    };

    match runner.run_cycle(host, force).await {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            } else {
                print_report(&outcome.report);
            }
            Ok(state_exit(outcome.report.host_state))
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(state_exit(State::Unknown))
        }
    }
}

fn print_report(report: &CycleReport) {
    println!(
        "{} - {} ({:?}, {} ms)",
        report.host,
        report.host_state,
        report.state,
        report.finished_at_ms - report.started_at_ms
    );
    for s in &report.sources {
        match s.error_kind {
            Some(kind) => println!("  [{}] {:?}: {} ({})", s.source, s.outcome, kind, s.message),
            None => println!("  [{}] {:?}: {} sections", s.source, s.outcome, s.sections.len()),
        }
        for a in &s.annotations {
            println!("    {} {}: {} ({})", a.section, a.oid, a.kind, a.message);
        }
    }
    for p in &report.plugins {
        match p.status {
            PluginStatus::Ran => {
                for r in &p.results {
                    println!("  {}: {} - {}", p.plugin, r.state, r.summary);
                }
            }
            PluginStatus::Skipped => println!(
                "  {}: skipped, missing {}",
                p.plugin,
                p.missing_sections.join(", ")
            ),
            PluginStatus::Failed => println!(
                "  {}: {} - {}",
                p.plugin,
                State::Unknown,
                p.error.as_deref().unwrap_or("failed")
            ),
        }
    }
    if !report.stale_sections.is_empty() {
        println!("  stale sections: {}", report.stale_sections.join(", "));
    }
    if !report.missing_sections.is_empty() {
        println!("  missing sections: {}", report.missing_sections.join(", "));
    }
}

async fn show(config_path: Option<&str>, host: &str) -> Result<ExitCode> {
    let app_config = AppConfig::load(config_path)?;
    let store = open_store(&app_config).await?;
    match store.read(host).await? {
        Some(data) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("no data stored for host {}", host);
            Ok(state_exit(State::Unknown))
        }
    }
}

async fn run(config_path: Option<&str>) -> Result<()> {
    let config_path = AppConfig::resolve_path(config_path);
    let app_config = Arc::new(AppConfig::load(Some(&config_path))?);
    let registry = Arc::new(PluginRegistry::from_names(&app_config.plugins.enabled)?);
    let store = open_store(&app_config).await?;
    tracing::info!(
        version = %version::banner(),
        hosts = app_config.hosts.len(),
        plugins = ?registry.names(),
        "Starting check engine"
    );

    let runner = Arc::new(CycleRunner::new(
        app_config.clone(),
        registry,
        Some(store.clone()),
    ));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            runner,
            stats: Arc::new(worker::WorkerStats::default()),
            shutdown_rx,
        },
        worker::WorkerConfig::from_app_config(&app_config).with_config_reload(config_path),
    );

    let app = routes::app(store);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = worker_handle.await;
        }
    }

    Ok(())
}
