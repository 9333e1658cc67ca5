use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use ward_sentinel::alerter::AlertManager;
use ward_sentinel::config::Config;
use ward_sentinel::types::EngineState;
use ward_sentinel::Engine;

#[derive(Parser, Debug)]
#[command(name = "ward-sentinel", about = "Real-time pollutant spike detection for monitored wards")]
struct Cli {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Zone to monitor first, overriding the configuration
    #[arg(short, long)]
    zone: Option<String>,

    /// Seed for the simulated reading source
    #[arg(long)]
    seed: Option<u64>,

    /// Print every snapshot as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("ward-sentinel {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.zone.is_some() {
        config.engine.initial_zone = cli.zone.clone();
    }
    if cli.seed.is_some() {
        config.source.seed = cli.seed;
    }
    config.validate()?;

    if cli.check {
        println!("Configuration is valid ({} zones).", config.zones.len());
        return Ok(());
    }

    // Initialize logging
    init_logging(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %config.engine.hostname,
        "Starting ward sentinel"
    );

    if let Err(e) = run(config, cli.json).await {
        error!(error = %e, "Engine terminated with error");
        return Err(e);
    }

    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.engine.log_level)
        });

    // Logs go to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

async fn run(config: Config, json: bool) -> Result<()> {
    let mut alerter = AlertManager::new(&config.alerting)?;
    let (alert_tx, mut alert_rx) = tokio::sync::mpsc::channel(config.engine.alert_queue_size);

    let engine = Arc::new(Engine::from_config(&config, Some(alert_tx))?);

    // Spawn alerter task
    tokio::spawn(async move {
        while let Some(alert) = alert_rx.recv().await {
            alerter.dispatch(alert).await;
        }
    });

    // Spawn snapshot consumer
    let mut snapshots = engine.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let state = snapshots.borrow_and_update().clone();
            report(&state, json);
        }
    });

    // Spawn control input: one zone id per line
    let control = engine.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(zone_id) = parse_zone_command(&line) else { continue };
                    if let Err(e) = control.switch_zone(zone_id).await {
                        let known: Vec<&str> = control.registry().iter().map(|z| z.id.as_str()).collect();
                        warn!(error = %e, known = ?known, "Zone switch rejected");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Control input closed");
                    break;
                }
            }
        }
    });

    engine.start().await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping engine");
    engine.stop().await;

    Ok(())
}

fn report(state: &EngineState, json: bool) {
    if json {
        match serde_json::to_string(state) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to serialize snapshot"),
        }
        return;
    }

    match state.latest {
        Some(ref latest) => info!(
            zone = %state.active_zone.id,
            value = latest.value,
            spike = latest.spike_detected,
            cause = %latest.cause,
            history = state.history.len(),
            "Snapshot"
        ),
        None => info!(zone = %state.active_zone.id, "Snapshot (no reading yet)"),
    }
}

/// Accepts `zone <id>`, `switch <id>` or a bare id
fn parse_zone_command(line: &str) -> Option<&str> {
    let mut parts = line.split_whitespace();
    match (parts.next()?, parts.next()) {
        ("zone" | "switch", Some(id)) => Some(id),
        (id, None) => Some(id),
        _ => None,
    }
}
