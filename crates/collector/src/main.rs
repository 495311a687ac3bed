//! obd-collector: OBD-II telemetry collection daemon

use anyhow::{Context, Result};
use clap::Parser;
use collector::{storage_from_config, Collector, CollectorConfig, CollectorHandle};
use inference_engine::{load_classifier, RuleEngine};
use metrics_exporter_prometheus::PrometheusBuilder;
use obd_protocol::{Connector, SerialConnector, SimulatedConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "obd-collector", version, about = "Collect and classify OBD-II telemetry")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the simulated adapter instead of a serial device
    #[arg(long)]
    simulate: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
    .context("failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    info!("=== OBD-II Collector v{} ===", env!("CARGO_PKG_VERSION"));

    let config = CollectorConfig::load(args.config.as_deref())?;

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start metrics exporter")?;
        info!("Serving metrics on http://{}/metrics", addr);
    }

    let connector: Arc<dyn Connector> = if args.simulate {
        info!("Using simulated adapter");
        Arc::new(SimulatedConnector::default())
    } else {
        Arc::new(SerialConnector::new(config.baud_rate, config.query_timeout()))
    };
    let storage = storage_from_config(&config)?;
    let classifier = load_classifier(config.model_dir.as_deref(), RuleEngine::default());

    let reconnect_attempts = config.max_reconnect_attempts;
    let handle = CollectorHandle::spawn(Collector::new(config, connector, storage, classifier)?);

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let outcome = handle
        .run_until(ctrl_c)
        .await
        .and_then(|report| report.map(|r| r.into_result(reconnect_attempts)).transpose());
    if let Err(e) = &outcome {
        error!("{}", e);
    }
    outcome?;
    Ok(())
}
