//! Alert lifecycle events

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One edge of a drowsiness alert episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Episode number, starting at 1
    pub episode: u64,
    /// Frame timestamp of the edge (nanoseconds)
    pub timestamp_ns: u64,
    /// When the eyes were first seen closed in this episode
    pub eyes_closed_since_ns: u64,
    /// When the alert became active
    pub alert_started_ns: u64,
}

impl AlertEvent {
    /// Continuous eye closure up to this event
    pub fn eyes_closed_for(&self) -> Duration {
        Duration::from_nanos(self.timestamp_ns.saturating_sub(self.eyes_closed_since_ns))
    }

    /// Time spent alerting; zero on activation
    pub fn alert_duration(&self) -> Duration {
        Duration::from_nanos(self.timestamp_ns.saturating_sub(self.alert_started_ns))
    }
}

/// Edge-triggered alert transition, at most one per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertTransition {
    Activated(AlertEvent),
    Deactivated(AlertEvent),
}

impl AlertTransition {
    pub fn event(&self) -> &AlertEvent {
        match self {
            Self::Activated(e) | Self::Deactivated(e) => e,
        }
    }
}

/// Collaborator notified on alert edges (audio, incident log, bookkeeping).
///
/// Called synchronously from the frame pipeline; implementations must not block.
pub trait AlertListener: Send {
    fn on_alert_activated(&mut self, event: &AlertEvent);

    fn on_alert_deactivated(&mut self, event: &AlertEvent);

    /// Route a transition to the matching hook
    fn notify(&mut self, transition: &AlertTransition) {
        match transition {
            AlertTransition::Activated(e) => self.on_alert_activated(e),
            AlertTransition::Deactivated(e) => self.on_alert_deactivated(e),
        }
    }
}
