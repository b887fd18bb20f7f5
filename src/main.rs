// src/main.rs

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};
use traffic_light_control::collector::{LaneObservationCollector, LaneWorker};
use traffic_light_control::config::ParamsHandle;
use traffic_light_control::pipeline::{
    shutdown_channel, ControlLoop, JsonLinesBroadcaster, RollingStats,
};
use traffic_light_control::render::JpegRenderer;
use traffic_light_control::types::Config;

const CONFIG_ENV: &str = "TRAFFIC_CONFIG";
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);
/// Level used until the config file has been read
const STARTUP_LOG_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins over the configured level when set
    let env_filter = EnvFilter::try_from_default_env().ok();
    let level_from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| log_filter(STARTUP_LOG_LEVEL)));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;
    if !level_from_env {
        filter_handle
            .reload(log_filter(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    info!("🚦 Traffic Light Controller Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Signal timing: base={}s, min={}s, max={}s, yellow={}s, emergency={}s",
        config.signal.base_green_time,
        config.signal.min_green_time,
        config.signal.max_green_time,
        config.signal.yellow_duration,
        config.signal.emergency_priority_time
    );

    let pairs = config.lane_pairs()?;
    let workers = build_workers(&config)?;
    info!("✓ {} lanes ready, pairs {:?}", workers.len(), config.lanes.pairs);

    let collector = LaneObservationCollector::new(workers, Arc::new(JpegRenderer::default()));

    let out: Box<dyn Write + Send> = match &config.session.snapshot_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create snapshot file {}", path))?;
            info!("💾 Snapshots will be written to: {}", path);
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout()),
    };
    let mut broadcaster = JsonLinesBroadcaster::new(out);
    if config.session.snapshot_path.is_none() {
        broadcaster = broadcaster.without_frames();
    }

    let params = ParamsHandle::new(config.session_params());
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let control = ControlLoop::new(
        collector,
        pairs,
        broadcaster,
        params.subscribe(),
        shutdown_rx,
    )?;
    let stats_logger = tokio::spawn(log_stats(control.stats()));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let result = control.run().await;
    stats_logger.abort();

    match result {
        Ok(report) => {
            info!("\n========================================");
            info!("✓ Session finished after {} ticks", report.ticks);
            log_totals(&report.stats);
            info!("========================================\n");
            Ok(())
        }
        Err(e) => {
            error!("Session failed: {}", e);
            Err(e.into())
        }
    }
}

fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("traffic_light_control={},ort=warn", level))
}

#[cfg(not(feature = "vision"))]
fn build_workers(config: &Config) -> Result<Vec<LaneWorker>> {
    info!("Using synthetic lanes (seed {})", config.simulation.seed);
    Ok(traffic_light_control::sim::synthetic_workers(config))
}

#[cfg(feature = "vision")]
fn build_workers(config: &Config) -> Result<Vec<LaneWorker>> {
    traffic_light_control::vision::video_workers(config)
}

async fn log_stats(mut stats: tokio::sync::watch::Receiver<RollingStats>) {
    let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let current = stats.borrow_and_update().clone();
        info!(
            "📊 {} ticks, avg processing {:.3}s, uptime {:.0}s",
            current.ticks, current.average_processing_time, current.uptime_seconds
        );
    }
}

fn log_totals(stats: &RollingStats) {
    info!("  Frames processed: {}", stats.total_frames_processed);
    info!("  Vehicles detected: {}", stats.total_vehicles_detected);
    info!("  People detected: {}", stats.total_people_detected);
    info!("  🚨 Emergency vehicles: {}", stats.emergency_vehicles_detected);
    info!(
        "  Avg processing time: {:.3}s over {} samples",
        stats.average_processing_time, stats.processing_samples
    );
    info!("  Uptime: {:.1}s", stats.uptime_seconds);
}
