//! `workflow-gateway` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`                     — start the API server (HTTP ingress + webhooks).
//! - `trigger-loop`              — run the cron schedule sub-loop of the TriggerLoop (§4.6).
//! - `anomaly-baseline-refresh`  — run the hourly baseline refresh loop (§4.9).
//! - `migrate`                   — run pending database migrations.
//! - `validate`                  — validate a workflow JSON file against the graph builder and input schema.

mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use engine::anomaly::AnomalyDetector;
use engine::recorder::ExecutionRecorder;
use engine::stats::StatsAggregator;
use engine::Orchestrator;
use notify::NotifyHub;
use queue::ScheduleLoop;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::Config;

#[derive(Parser)]
#[command(name = "workflow-gateway", about = "Dynamic workflow gateway execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Run the cron half of the TriggerLoop until interrupted.
    TriggerLoop,
    /// Run the AnomalyDetector's baseline refresh loop until interrupted.
    AnomalyBaselineRefresh,
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file: builds its execution
    /// graph and, if `--input` is given, checks it against the declared
    /// input schema.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
        /// Path to a JSON file with a candidate execution input.
        #[arg(long)]
        input: Option<std::path::PathBuf>,
    },
}

/// Everything `serve`, `trigger-loop`, and `anomaly-baseline-refresh` need
/// in common: a catalog, an orchestrator, and the recorder/detector behind
/// it, all pointed at the same Postgres database.
struct Runtime {
    catalog: Arc<catalog::CatalogCache>,
    recorder: Arc<dyn ExecutionRecorder>,
    notify: NotifyHub,
    anomaly: AnomalyDetector,
    orchestrator: Arc<Orchestrator>,
    pool: db::DbPool,
}

async fn build_runtime(config: Config) -> anyhow::Result<Runtime> {
    let pool = db::pool::create_pool(&config.database_url, config.database_max_connections).await?;

    let source = Arc::new(db::PgCatalogSource::new(pool.clone()));
    let catalog = Arc::new(
        catalog::CatalogCache::bootstrap_with_ttl(source, config.catalog_namespace.clone(), config.catalog_ttl).await?,
    );

    let recorder: Arc<dyn ExecutionRecorder> = Arc::new(db::PgExecutionRecorder::new(pool.clone()));
    let notify = NotifyHub::new();
    let stats = StatsAggregator::new();
    let anomaly = AnomalyDetector::with_min_samples(config.anomaly_min_samples);

    let orchestrator = Orchestrator::new(
        catalog.clone(),
        recorder.clone(),
        Arc::new(notify.clone()),
        stats,
        anomaly.clone(),
        config.orchestrator_config(),
    );

    Ok(Runtime { catalog, recorder, notify, anomaly, orchestrator, pool })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => {
            info!("starting API server on {bind}");
            let config = Config::from_env();
            let runtime = build_runtime(config).await?;
            let secrets = Arc::new(api::secrets::PgSecretResolver::new(runtime.pool.clone()));

            let state = api::AppState {
                pool: runtime.pool,
                catalog: runtime.catalog,
                orchestrator: runtime.orchestrator,
                recorder: runtime.recorder,
                anomaly: runtime.anomaly,
                notify: runtime.notify,
                secrets,
            };
            api::serve(&bind, state).await?;
        }
        Command::TriggerLoop => {
            info!("starting trigger loop (cron schedule sub-loop)");
            let config = Config::from_env();
            let poll_interval = config.trigger_poll_interval;
            let runtime = build_runtime(config).await?;

            let loop_handle = ScheduleLoop::new(runtime.catalog, runtime.orchestrator, poll_interval);
            let shutdown = CancellationToken::new();
            let shutdown_clone = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_clone.cancel();
            });
            loop_handle.run(shutdown).await;
            info!("trigger loop stopped");
        }
        Command::AnomalyBaselineRefresh => {
            info!("starting anomaly baseline refresh loop");
            let config = Config::from_env();
            let sample_size = config.baseline_sample_size;
            let interval = config.baseline_refresh_interval;
            let runtime = build_runtime(config).await?;

            let loop_handle =
                queue::BaselineRefreshLoop::new(runtime.catalog, runtime.recorder, runtime.anomaly, sample_size, interval);
            let shutdown = CancellationToken::new();
            let shutdown_clone = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_clone.cancel();
            });
            loop_handle.run(shutdown).await;
            info!("baseline refresh loop stopped");
        }
        Command::Migrate { database_url } => {
            info!("running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("migrations applied successfully");
        }
        Command::Validate { path, input } => {
            let content = std::fs::read_to_string(&path)?;
            let spec: engine::model::WorkflowSpec = serde_json::from_str(&content)?;

            let (graph, diagnostics) = match engine::graph::build(&spec) {
                Ok(result) => result,
                Err(err) => {
                    eprintln!("graph build failed: {err}");
                    std::process::exit(1);
                }
            };

            let implicit_edges =
                diagnostics.edges.iter().filter(|edge| edge.classification == engine::graph::EdgeClassification::Implicit).count();

            println!("workflow '{}' is structurally valid", spec.name);
            println!("parallel groups: {:?}", graph.parallel_groups());
            println!("implicit edges discovered: {implicit_edges}");

            if let Some(input_path) = input {
                let input_content = std::fs::read_to_string(&input_path)?;
                let input_value: serde_json::Value = serde_json::from_str(&input_content)?;
                let validation = engine::InputValidator::validate(&spec, &input_value);
                if validation.valid {
                    println!("input is valid against the declared schema");
                } else {
                    eprintln!("input validation failed:");
                    for missing in &validation.missing {
                        eprintln!("  - missing required input '{}'", missing.field);
                    }
                    for invalid in &validation.invalid {
                        eprintln!("  - input '{}': {}", invalid.field, invalid.reason);
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
