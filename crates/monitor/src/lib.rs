//! Drowsiness Monitor
//!
//! Host for the DMS core: loads configuration, reads landmark frames as JSON
//! lines and writes one `DmsAnalysis` JSON line per frame.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alerting::{AlertConfig, AlertLoop, AlertManager, EpisodeStats, IncidentLog, Playback, TonePlayback};
use anyhow::{anyhow, Context, Result};
use dms::{DmsAnalysis, DmsConfig, DmsModule};
use face_landmarks::{Clock, LandmarkFrame, LandmarkSet, MonotonicClock};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Config file looked up when no path is given (any extension `config` supports)
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor";

/// Environment override prefix, e.g. `DROWSY__DMS__EAR_THRESHOLD=0.22`
pub const ENV_PREFIX: &str = "DROWSY";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Frame source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// JSON-lines file; stdin when unset
    pub path: Option<PathBuf>,
    /// Pace frames at this rate instead of as fast as they arrive
    pub replay_fps: Option<f64>,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus exporter listen address; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
    pub dms: DmsConfig,
    pub alerting: AlertConfig,
    pub input: InputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: None,
            dms: DmsConfig::default(),
            alerting: AlertConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl AppConfig {
    /// Frame pacing interval, if any
    pub fn replay_interval(&self) -> Result<Option<Duration>> {
        match self.input.replay_fps {
            None => Ok(None),
            Some(fps) if fps.is_finite() && fps > 0.0 => Ok(Some(Duration::from_secs_f64(1.0 / fps))),
            Some(fps) => Err(anyhow!("replay_fps must be > 0, got {}", fps)),
        }
    }
}

/// Load configuration: optional file, then `DROWSY__*` environment overrides
pub fn load_config(path: &str) -> Result<AppConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path))?;

    config
        .try_deserialize()
        .context("Invalid configuration")
}

/// Initialize logging to stderr (stdout carries the analysis stream)
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let level: Level = level
        .parse()
        .map_err(|_| anyhow!("Invalid log level: {}", level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("Failed to set tracing subscriber")
}

/// One input line. Timestamp and sequence are optional on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub landmarks: Option<LandmarkSet>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub timestamp_ns: Option<u64>,
    #[serde(default)]
    pub sequence: Option<u32>,
}

/// Frame-processing host around a [`DmsModule`]
pub struct Monitor {
    dms: DmsModule,
    clock: Box<dyn Clock>,
    alerts: AlertManager,
    next_sequence: u32,
    last_timestamp_ns: u64,
    /// Last explicit stream timestamp and the clock reading when it arrived
    anchor: (u64, u64),
}

impl Monitor {
    /// Build the module with every alert collaborator attached.
    /// Must be called from within a tokio runtime.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let player = Arc::new(TonePlayback::new(config.alerting.clip_duration()));
        Self::with_player(config, player, Box::new(MonotonicClock::new()))
    }

    /// Same as [`Monitor::new`] with a caller-supplied audio output and clock
    pub fn with_player(config: &AppConfig, player: Arc<dyn Playback>, clock: Box<dyn Clock>) -> Result<Self> {
        let mut monitor = Self::with_clock(config.dms.clone(), clock)?;

        let alert_loop = AlertLoop::new(player, &config.alerting).context("Failed to create alert loop")?;
        monitor.dms.add_listener(Box::new(alert_loop));

        if let Some(path) = &config.alerting.incident_log_path {
            info!(path = %path.display(), "Incident log enabled");
            monitor.dms.add_listener(Box::new(IncidentLog::new(path.clone())));
        }

        Ok(monitor)
    }

    /// Module with episode bookkeeping only
    pub fn with_clock(config: DmsConfig, clock: Box<dyn Clock>) -> Result<Self> {
        let mut dms = DmsModule::new(config).context("Invalid DMS configuration")?;
        let alerts = AlertManager::new();
        dms.add_listener(Box::new(alerts.clone()));

        Ok(Self {
            dms,
            clock,
            alerts,
            next_sequence: 0,
            last_timestamp_ns: 0,
            anchor: (0, 0),
        })
    }

    pub fn alert_stats(&self) -> EpisodeStats {
        self.alerts.stats()
    }

    /// Parse and analyze one input line; blank lines yield `None`
    pub fn handle_line(&mut self, line: &str) -> Result<Option<DmsAnalysis>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let record: FrameRecord = serde_json::from_str(line).context("Malformed frame")?;
        let frame = self.stamp(record);
        let analysis = self.dms.process(&frame)?;
        Ok(Some(analysis))
    }

    // Frames without a timestamp continue from the last explicit one, so a
    // stream may mix stamped and unstamped frames
    fn stamp(&mut self, record: FrameRecord) -> LandmarkFrame {
        let now = self.clock.now_ns();
        let timestamp_ns = match record.timestamp_ns {
            Some(ts) => {
                self.anchor = (ts, now);
                ts
            }
            None => {
                let (stream_ns, clock_ns) = self.anchor;
                stream_ns
                    .saturating_add(now.saturating_sub(clock_ns))
                    .max(self.last_timestamp_ns)
            }
        };
        let sequence = record.sequence.unwrap_or(self.next_sequence);
        self.next_sequence = sequence.wrapping_add(1);
        self.last_timestamp_ns = timestamp_ns;

        LandmarkFrame {
            landmarks: record.landmarks,
            width: record.width,
            height: record.height,
            timestamp_ns,
            sequence,
        }
    }

    /// End of input: close any active alert
    pub fn finish(&mut self) {
        self.dms.reset_state(self.last_timestamp_ns);
    }
}

/// Pump frames from `reader` to `writer` until EOF. Returns frames analyzed.
pub async fn run<R, W>(monitor: &mut Monitor, reader: R, mut writer: W, pace: Option<Duration>) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut ticker = pace.map(|period| {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut analyzed = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        match monitor.handle_line(&line) {
            Ok(Some(analysis)) => {
                let mut out = serde_json::to_string(&analysis)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                analyzed += 1;
            }
            Ok(None) => debug!(line = line_no, "Blank line"),
            Err(e) => warn!(line = line_no, error = %e, "Skipping frame"),
        }
    }

    writer.flush().await?;
    Ok(analyzed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use face_landmarks::{Landmark, LandmarkIndices, ManualClock};

    fn monitor() -> Monitor {
        Monitor::with_clock(DmsConfig::default(), Box::new(ManualClock::new(42))).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.metrics_addr.is_none());
        assert_eq!(config.dms.drowsiness_threshold_ms, 1500);
        assert_eq!(config.replay_interval().unwrap(), None);
    }

    #[test]
    fn test_replay_interval() {
        let mut config = AppConfig::default();
        config.input.replay_fps = Some(20.0);
        assert_eq!(config.replay_interval().unwrap(), Some(Duration::from_millis(50)));
        config.input.replay_fps = Some(0.0);
        assert!(config.replay_interval().is_err());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.dms.ear_threshold, 0.25);
    }

    #[test]
    fn test_config_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("monitor.toml"),
            "log_format = \"json\"\n\n[dms]\near_threshold = 0.2\n\n[alerting]\npoll_interval_ms = 50\n",
        )
        .unwrap();

        let path = dir.path().join("monitor");
        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.dms.ear_threshold, 0.2);
        assert_eq!(config.dms.mar_threshold, 0.5);
        assert_eq!(config.alerting.poll_interval_ms, 50);
    }

    #[test]
    fn test_handle_line_stamps_missing_fields() {
        let mut monitor = monitor();
        let analysis = monitor
            .handle_line(r#"{"landmarks": null, "width": 640, "height": 480}"#)
            .unwrap()
            .unwrap();
        assert_eq!(analysis.timestamp_ns, 42);
        assert_eq!(analysis.sequence, 0);
        assert!(!analysis.face_detected);

        let next = monitor
            .handle_line(r#"{"width": 640, "height": 480, "timestamp_ns": 7, "sequence": 9}"#)
            .unwrap()
            .unwrap();
        assert_eq!(next.timestamp_ns, 7);
        assert_eq!(next.sequence, 9);
    }

    #[test]
    fn test_handle_line_errors() {
        let mut monitor = monitor();
        assert!(monitor.handle_line("   ").unwrap().is_none());
        assert!(monitor.handle_line("not json").is_err());
        assert!(monitor.handle_line(r#"{"width": 0, "height": 480}"#).is_err());
        assert!(monitor
            .handle_line(r#"{"width": 640, "height": 480, "landmarks": [{"x": 0.5, "y": 0.5}]}"#)
            .is_err());
    }

    #[tokio::test]
    async fn test_run_skips_bad_lines() {
        let mut monitor = monitor();
        let input = concat!(
            "{\"width\": 640, \"height\": 480, \"timestamp_ns\": 0}\n",
            "garbage\n",
            "\n",
            "{\"width\": 640, \"height\": 480, \"timestamp_ns\": 33000000}\n",
        );
        let mut output = Vec::new();

        let analyzed = run(&mut monitor, input.as_bytes(), &mut output, None).await.unwrap();
        assert_eq!(analyzed, 2);

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["timestamp_ns"], 33_000_000);
        assert_eq!(lines[0]["label"], "awake");
    }

    fn closed_eyes() -> LandmarkSet {
        let indices = LandmarkIndices::default();
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); 478];
        for (eye, x) in [(indices.left_eye, 0.35), (indices.right_eye, 0.6)] {
            // Lids meet: p2/p6 and p3/p5 coincide, EAR = 0
            let xs = [0.0, 0.02, 0.04, 0.06, 0.04, 0.02];
            for (&index, dx) in eye.iter().zip(xs) {
                points[index] = Landmark::new(x + dx, 0.4, 0.0);
            }
        }
        LandmarkSet::new(points)
    }

    fn closed_line(timestamp_ns: Option<u64>) -> String {
        serde_json::json!({
            "landmarks": closed_eyes(),
            "width": 640,
            "height": 480,
            "timestamp_ns": timestamp_ns,
        })
        .to_string()
    }

    #[test]
    fn test_unstamped_frames_continue_explicit_timeline() {
        const EPOCH_NS: u64 = 1_700_000_000_000_000_000;
        let clock = Arc::new(ManualClock::new(5_000_000));
        let mut monitor = Monitor::with_clock(DmsConfig::default(), Box::new(clock.clone())).unwrap();

        let first = monitor.handle_line(&closed_line(Some(EPOCH_NS))).unwrap().unwrap();
        assert_eq!(first.timestamp_ns, EPOCH_NS);

        let mut last = first;
        for _ in 0..4 {
            clock.advance(Duration::from_millis(500));
            last = monitor.handle_line(&closed_line(None)).unwrap().unwrap();
        }

        assert_eq!(last.timestamp_ns, EPOCH_NS + 2_000_000_000);
        assert!(last.alert_active());
        assert!(monitor.alert_stats().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_with_alert_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("drowsiness_log.txt");
        let mut config = AppConfig::default();
        config.alerting.incident_log_path = Some(log_path.clone());

        let player = Arc::new(TonePlayback::new(config.alerting.clip_duration()));
        let mut monitor = Monitor::with_player(&config, player.clone(), Box::new(ManualClock::new(0))).unwrap();

        for step in 0..5u64 {
            monitor.handle_line(&closed_line(Some(step * 500_000_000))).unwrap();
        }
        assert!(monitor.alert_stats().is_active());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(player.plays(), 1);
        assert!(player.is_busy());

        monitor.finish();
        assert!(!player.is_busy());
        let stats = monitor.alert_stats();
        assert_eq!(stats.episodes, 1);
        assert!(!stats.is_active());

        let log = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Drowsiness detected at "));
        assert!(lines[1].starts_with("Drowsiness cleared at "));
    }
}
