//! Driver state tracking
//!
//! Debounces eye closure into a sustained drowsiness alert:
//!
//! ```text
//! Awake --ear < th--> EyeClosurePending --closed >= duration--> DrowsyAlerting
//!   ^                        |                                       |
//!   +------ ear >= th -------+------------------ ear >= th ----------+
//! ```
//!
//! Frames without a defined EAR (no face, degenerate eye geometry) never
//! change the phase, so a running closure timer survives detection dropouts.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DmsConfig;
use crate::events::{AlertEvent, AlertTransition};

const NANOS_PER_MS: u64 = 1_000_000;

/// Drowsiness phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DrowsinessPhase {
    #[default]
    Awake,

    /// Eyes closed, timer running, not yet alerting
    EyeClosurePending { since_ns: u64 },

    /// Eyes closed for at least the duration threshold
    DrowsyAlerting {
        since_ns: u64,
        activated_ns: u64,
        episode: u64,
    },
}

impl DrowsinessPhase {
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::DrowsyAlerting { .. })
    }

    /// Start of the current eye closure, if a timer is running
    pub fn closure_started_ns(&self) -> Option<u64> {
        match *self {
            Self::Awake => None,
            Self::EyeClosurePending { since_ns } | Self::DrowsyAlerting { since_ns, .. } => Some(since_ns),
        }
    }
}

/// Thresholds bound at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub ear: f64,
    pub closure_duration_ns: u64,
    pub mar: f64,
    pub pitch_degrees: f64,
}

impl From<&DmsConfig> for Thresholds {
    fn from(config: &DmsConfig) -> Self {
        Self {
            ear: config.ear_threshold,
            closure_duration_ns: config.drowsiness_threshold_ms.saturating_mul(NANOS_PER_MS),
            mar: config.mar_threshold,
            pitch_degrees: config.pitch_threshold_degrees,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&DmsConfig::default())
    }
}

/// Per-frame metrics consumed by the state machine; `None` = unavailable this frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    pub avg_ear: Option<f64>,
    pub mar: Option<f64>,
    pub pitch: Option<f64>,
    pub timestamp_ns: u64,
}

impl FrameInput {
    /// Frame with nothing measured (no face)
    pub fn empty(timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            ..Default::default()
        }
    }
}

/// Result of one state machine step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateUpdate {
    pub phase: DrowsinessPhase,
    pub transition: Option<AlertTransition>,
    /// MAR above threshold this frame
    pub yawning: bool,
    /// Pitch above threshold this frame
    pub nodding: bool,
}

/// Rolling PERCLOS (percentage of eye closure) over a time window
#[derive(Debug, Clone)]
pub struct PerclosWindow {
    window_ns: u64,
    samples: VecDeque<(u64, bool)>,
    closed: usize,
}

impl PerclosWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ns: window_ms.saturating_mul(NANOS_PER_MS),
            samples: VecDeque::new(),
            closed: 0,
        }
    }

    /// Add an eye closure sample
    pub fn push(&mut self, timestamp_ns: u64, closed: bool) {
        self.samples.push_back((timestamp_ns, closed));
        if closed {
            self.closed += 1;
        }

        let cutoff = timestamp_ns.saturating_sub(self.window_ns);
        while let Some(&(ts, was_closed)) = self.samples.front() {
            if ts >= cutoff {
                break;
            }
            self.samples.pop_front();
            if was_closed {
                self.closed -= 1;
            }
        }
    }

    /// Fraction of closed samples in the window (0.0 when empty)
    pub fn perclos(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.closed as f64 / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.closed = 0;
    }
}

/// The only stateful part of the core; single writer, one step per frame
#[derive(Debug, Clone)]
pub struct DrowsinessStateMachine {
    thresholds: Thresholds,
    phase: DrowsinessPhase,
    episodes: u64,
    perclos: PerclosWindow,
}

impl DrowsinessStateMachine {
    pub fn new(thresholds: Thresholds, perclos_window_ms: u64) -> Self {
        Self {
            thresholds,
            phase: DrowsinessPhase::Awake,
            episodes: 0,
            perclos: PerclosWindow::new(perclos_window_ms),
        }
    }

    pub fn from_config(config: &DmsConfig) -> Self {
        Self::new(Thresholds::from(config), config.perclos_window_ms)
    }

    pub fn phase(&self) -> DrowsinessPhase {
        self.phase
    }

    pub fn is_alerting(&self) -> bool {
        self.phase.is_alerting()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Number of alert episodes so far
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub fn perclos(&self) -> f64 {
        self.perclos.perclos()
    }

    /// Advance by one frame
    pub fn update(&mut self, input: &FrameInput) -> StateUpdate {
        let now = input.timestamp_ns;
        let mut transition = None;

        if let Some(ear) = input.avg_ear {
            let closed = ear < self.thresholds.ear;
            self.perclos.push(now, closed);
            self.phase = self.step(ear, closed, now, &mut transition);
        }

        StateUpdate {
            phase: self.phase,
            transition,
            yawning: input.mar.is_some_and(|mar| mar > self.thresholds.mar),
            nodding: input.pitch.is_some_and(|pitch| pitch > self.thresholds.pitch_degrees),
        }
    }

    fn step(&mut self, ear: f64, closed: bool, now: u64, transition: &mut Option<AlertTransition>) -> DrowsinessPhase {
        match (self.phase, closed) {
            (DrowsinessPhase::Awake, true) => {
                debug!(ear, "Eye closure started");
                DrowsinessPhase::EyeClosurePending { since_ns: now }
            }
            (DrowsinessPhase::EyeClosurePending { since_ns }, true) => {
                if now.saturating_sub(since_ns) < self.thresholds.closure_duration_ns {
                    return DrowsinessPhase::EyeClosurePending { since_ns };
                }
                self.episodes += 1;
                let event = AlertEvent {
                    episode: self.episodes,
                    timestamp_ns: now,
                    eyes_closed_since_ns: since_ns,
                    alert_started_ns: now,
                };
                info!(
                    episode = event.episode,
                    closed_ms = event.eyes_closed_for().as_millis() as u64,
                    "Drowsiness alert activated"
                );
                *transition = Some(AlertTransition::Activated(event));
                DrowsinessPhase::DrowsyAlerting {
                    since_ns,
                    activated_ns: now,
                    episode: self.episodes,
                }
            }
            (alerting @ DrowsinessPhase::DrowsyAlerting { .. }, true) => alerting,
            (DrowsinessPhase::DrowsyAlerting { since_ns, activated_ns, episode }, false) => {
                *transition = Some(self.deactivate(since_ns, activated_ns, episode, now));
                DrowsinessPhase::Awake
            }
            (DrowsinessPhase::EyeClosurePending { .. }, false) => {
                debug!(ear, "Eye closure ended before alert");
                DrowsinessPhase::Awake
            }
            (DrowsinessPhase::Awake, false) => DrowsinessPhase::Awake,
        }
    }

    fn deactivate(&self, since_ns: u64, activated_ns: u64, episode: u64, now: u64) -> AlertTransition {
        let event = AlertEvent {
            episode,
            timestamp_ns: now,
            eyes_closed_since_ns: since_ns,
            alert_started_ns: activated_ns,
        };
        info!(
            episode,
            alert_ms = event.alert_duration().as_millis() as u64,
            "Drowsiness alert deactivated"
        );
        AlertTransition::Deactivated(event)
    }

    /// Reset state (on driver change). Ends an active alert with a deactivation.
    pub fn reset(&mut self, now_ns: u64) -> Option<AlertTransition> {
        let transition = match self.phase {
            DrowsinessPhase::DrowsyAlerting { since_ns, activated_ns, episode } => {
                Some(self.deactivate(since_ns, activated_ns, episode, now_ns))
            }
            _ => None,
        };
        self.phase = DrowsinessPhase::Awake;
        self.perclos.clear();
        transition
    }
}

impl Default for DrowsinessStateMachine {
    fn default() -> Self {
        Self::from_config(&DmsConfig::default())
    }
}
