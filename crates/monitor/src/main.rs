//! Drowsiness Monitor - Main Entry Point

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use monitor::{init_logging, load_config, run, Monitor, DEFAULT_CONFIG_PATH};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;
    init_logging(&config.log_level, config.log_format)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Prometheus metrics exporter listening on {}/metrics", addr);
    }

    let pace = config.replay_interval()?;
    let mut monitor = Monitor::new(&config)?;
    let stdout = tokio::io::stdout();

    let analyzed = tokio::select! {
        result = async {
            match &config.input.path {
                Some(path) => {
                    info!(path = %path.display(), "Reading frames from file");
                    let file = tokio::fs::File::open(path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    run(&mut monitor, BufReader::new(file), stdout, pace).await
                }
                None => {
                    info!("Reading frames from stdin");
                    run(&mut monitor, BufReader::new(tokio::io::stdin()), stdout, pace).await
                }
            }
        } => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            0
        }
    };

    monitor.finish();
    let stats = monitor.alert_stats();
    info!(
        frames = analyzed,
        episodes = stats.episodes,
        total_alert_ms = stats.total_alert_time.as_millis() as u64,
        "Monitor stopped"
    );

    Ok(())
}
