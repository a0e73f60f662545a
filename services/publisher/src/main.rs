//! AQI heat-map publisher service.
//!
//! Publishes an interpolated AQI raster on a fixed interval with:
//! - Multiple observation sources (HTTP or file snapshots)
//! - File or Redis publish sinks
//! - Configuration reload on SIGHUP
//! - HTTP status API with Prometheus metrics

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use publisher::config::PublisherConfig;
use publisher::server::{self, ServerState};
use publisher::source::CompositeSource;
use publisher::{metrics, sink, Scheduler};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "publisher")]
#[command(about = "Periodic AQI heat-map publisher")]
struct Args {
    /// Configuration file
    #[arg(long, env = "PUBLISHER_CONFIG", default_value = "config/publisher.yaml")]
    config: PathBuf,

    /// Run a single cycle and exit (vs continuous publishing)
    #[arg(long)]
    once: bool,

    /// Override schedule.interval_secs
    #[arg(long, env = "PUBLISH_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8082")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,
}

fn load_config(args: &Args) -> Result<PublisherConfig> {
    let mut config = PublisherConfig::load(&args.config)?;
    if let Some(secs) = args.interval_secs {
        config.schedule.interval_secs = secs;
        config.validate().context("Invalid --interval-secs")?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    metrics::describe();

    info!("Starting AQI publisher");

    let config = load_config(&args)?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("aqi-publisher/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let source = CompositeSource::from_config(&config, &client);
    let sink = sink::from_config(&config.sink).context("Failed to create publish sink")?;
    info!(
        sources = source.len(),
        sink = %sink.describe(),
        channel = %config.sink.channel,
        "Publisher wired"
    );

    let (config_tx, config_rx) = watch::channel(Arc::new(config));
    let scheduler = Scheduler::new(config_rx, Arc::new(source), Arc::from(sink));

    if args.once {
        info!("Running single publish cycle");
        let report = scheduler.run_cycle().await?;
        info!(
            cycle_id = %report.cycle_id,
            observations = report.observations,
            bytes = report.bytes,
            "Single cycle complete"
        );
        return Ok(());
    }

    // Start status server (unless disabled)
    if !args.no_status_server {
        let state = Arc::new(ServerState {
            status: scheduler.status_handle(),
            prometheus: Some(prometheus_handle),
        });
        let status_port = args.status_port;
        tokio::spawn(async move {
            if let Err(e) = server::run_server(state, status_port).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    spawn_reload_listener(args, config_tx);

    scheduler.run_forever(shutdown_tx.subscribe()).await;

    let status = scheduler.status().await;
    info!(
        cycles = status.cycles_total,
        succeeded = status.cycles_succeeded,
        failed = status.cycles_failed,
        "Publisher stopped"
    );

    Ok(())
}

/// Reload the configuration file on SIGHUP. The new values apply from the
/// next cycle; an invalid file keeps the running configuration.
#[cfg(unix)]
fn spawn_reload_listener(args: Args, config_tx: watch::Sender<Arc<PublisherConfig>>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGHUP, reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!(path = %args.config.display(), "Reloading configuration");
            let config = match load_config(&args) {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Reload failed, keeping current configuration");
                    continue;
                }
            };

            let current = config_tx.borrow().clone();
            if rewires(&current, &config) {
                warn!("Source and sink changes take effect after a restart");
            }
            config_tx.send_replace(Arc::new(config));
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_args: Args, _config_tx: watch::Sender<Arc<PublisherConfig>>) {}

/// Whether `new` changes the sources or the sink target, which are built once
/// at startup.
fn rewires(current: &PublisherConfig, new: &PublisherConfig) -> bool {
    let as_json = |c: &PublisherConfig| {
        (
            serde_json::to_value(&c.sources).ok(),
            serde_json::to_value(&c.sink.target).ok(),
            c.allow_partial_sources,
        )
    };
    as_json(current) != as_json(new)
}
