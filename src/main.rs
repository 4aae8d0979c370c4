use anyhow::Context;
use clap::Parser;
use fleetwatch::agent::{Agent, AgentTasks, AnalysisAgent, HealthMonitorAgent};
use fleetwatch::bus::CommunicationHub;
use fleetwatch::config::{Config, MetricsBackend};
use fleetwatch::insight::HeuristicInsightGenerator;
use fleetwatch::metrics::{MetricSource, PrometheusSource, StaticMetricSource};
use fleetwatch::registry::ServiceDirectory;
use fleetwatch::workflow::WorkflowExecutor;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command-line arguments for the fleet monitor
#[derive(Parser)]
#[command(
    name = "fleetwatch",
    about = "Fleet health monitoring and analysis agents",
    long_about = "Runs the health monitoring and analysis agents over a service fleet: \
                  periodic health evaluation, alert lifecycle management, root-cause and \
                  correlation analysis, and ad-hoc workflows."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output (sets RUST_LOG=debug)")]
    verbose: bool,
}

/// Load configuration from file or fall back to defaults
fn load_config(config_path: Option<&PathBuf>) -> Config {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match Config::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Configuration error in '{}': {}", path.display(), e);
                    warn!("Using default configuration");
                    Config::default()
                }
            }
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let config = load_config(cli.config.as_ref());

    let directory = Arc::new(ServiceDirectory::new(&config.services));
    let metrics: Arc<dyn MetricSource> = match config.metrics.backend {
        MetricsBackend::Prometheus => Arc::new(PrometheusSource::new(
            config.metrics.endpoint.clone(),
            Duration::from_secs(config.metrics.timeout_seconds),
            directory.clone(),
        )),
        MetricsBackend::Static => {
            warn!("Using static metric source; no external metrics will be queried");
            Arc::new(StaticMetricSource::healthy(&directory))
        }
    };
    let insight = Arc::new(HeuristicInsightGenerator::new());

    let hub = Arc::new(CommunicationHub::new(config.bus.history_limit));
    let health = Arc::new(HealthMonitorAgent::new(
        metrics.clone(),
        directory.clone(),
        &config.monitoring,
    ));
    let analysis = Arc::new(AnalysisAgent::new(
        metrics,
        insight,
        directory.clone(),
        &config.analysis,
    ));

    hub.register(health.clone() as Arc<dyn Agent>);
    hub.register(analysis.clone() as Arc<dyn Agent>);

    let tasks: Vec<AgentTasks> = hub.start_all();
    info!("Agents started; press Ctrl-C to stop");

    let executor = WorkflowExecutor::new(health.clone(), analysis.clone(), directory);

    // Initial fleet check so a fresh start logs the current picture
    let result = executor.perform_health_check().await;
    match (&result.success, result.result.get("health_summary")) {
        (true, Some(summary)) => info!(
            "Initial health check: {}",
            summary["overall_health"].as_str().unwrap_or("unknown")
        ),
        _ => warn!(
            "Initial health check failed: {}",
            result.error_message.unwrap_or_else(|| "unknown".to_string())
        ),
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping agents");

    hub.stop_all();

    // Give the loops a bounded window to observe the stop flag
    for agent_tasks in tasks {
        if tokio::time::timeout(Duration::from_secs(5), agent_tasks.join())
            .await
            .is_err()
        {
            warn!("Agent loops did not exit in time");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
