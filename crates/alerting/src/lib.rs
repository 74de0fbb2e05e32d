//! Alerting
//!
//! Collaborators driven by drowsiness alert edges. Each implements
//! [`dms::AlertListener`] and owns none of the driver state.

mod incident;
mod manager;
mod player;

pub use incident::IncidentLog;
pub use manager::{AlertManager, EpisodeStats};
pub use player::{AlertLoop, Playback, TonePlayback};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Alerting errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// How often the alert loop checks its flag (default: 100)
    pub poll_interval_ms: u64,
    /// Length of one alert clip (default: 2000)
    pub clip_duration_ms: u64,
    /// Incident log file; `None` disables it
    pub incident_log_path: Option<PathBuf>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            clip_duration_ms: 2000,
            incident_log_path: Some(PathBuf::from("logs/drowsiness_log.txt")),
        }
    }
}

impl AlertConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn clip_duration(&self) -> Duration {
        Duration::from_millis(self.clip_duration_ms)
    }

    pub fn validate(&self) -> Result<(), AlertError> {
        if self.poll_interval_ms == 0 {
            return Err(AlertError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.clip_duration_ms == 0 {
            return Err(AlertError::Config("clip_duration_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AlertConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = AlertConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AlertError::Config(_))));
    }
}
