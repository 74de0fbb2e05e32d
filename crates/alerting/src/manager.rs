//! Alert episode bookkeeping

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dms::{AlertEvent, AlertListener};
use serde::Serialize;
use tracing::info;

/// Running totals over alert episodes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpisodeStats {
    /// Episodes started
    pub episodes: u64,
    /// Frame timestamp the current alert became active
    pub active_since_ns: Option<u64>,
    /// Time spent alerting over all finished episodes
    pub total_alert_time: Duration,
    pub last_episode: Option<Duration>,
    pub longest_episode: Duration,
}

impl EpisodeStats {
    pub fn is_active(&self) -> bool {
        self.active_since_ns.is_some()
    }
}

/// Tracks alert episodes and exports them as metrics.
///
/// Clones share the same statistics, so one clone can be registered as a
/// listener while another is kept for reporting.
#[derive(Debug, Clone, Default)]
pub struct AlertManager {
    stats: Arc<Mutex<EpisodeStats>>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current statistics
    pub fn stats(&self) -> EpisodeStats {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, EpisodeStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AlertListener for AlertManager {
    fn on_alert_activated(&mut self, event: &AlertEvent) {
        let mut stats = self.lock();
        stats.episodes = stats.episodes.max(event.episode);
        stats.active_since_ns = Some(event.alert_started_ns);

        metrics::counter!("drowsiness_alerts_activated_total").increment(1);
        metrics::gauge!("drowsiness_alert_active").set(1.0);
    }

    fn on_alert_deactivated(&mut self, event: &AlertEvent) {
        let duration = event.alert_duration();
        let mut stats = self.lock();
        stats.active_since_ns = None;
        stats.total_alert_time += duration;
        stats.last_episode = Some(duration);
        stats.longest_episode = stats.longest_episode.max(duration);

        info!(
            episode = event.episode,
            total_alert_ms = stats.total_alert_time.as_millis() as u64,
            "Alert episode recorded"
        );

        metrics::counter!("drowsiness_alerts_deactivated_total").increment(1);
        metrics::gauge!("drowsiness_alert_active").set(0.0);
        metrics::histogram!("drowsiness_alert_duration_seconds").record(duration.as_secs_f64());
    }
}
