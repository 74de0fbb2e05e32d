//! DMS configuration

use face_landmarks::LandmarkIndices;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Average EAR below this counts as eyes closed
    pub ear_threshold: f64,

    /// Eyes closed threshold for drowsiness alert (milliseconds)
    pub drowsiness_threshold_ms: u64,

    /// MAR above this counts as a yawn
    pub mar_threshold: f64,

    /// Pitch above this counts as a head nod (degrees)
    pub pitch_threshold_degrees: f64,

    /// Consecutive face-less frames before reporting the face as not visible
    pub face_absent_alert_frames: u32,

    /// Rolling window for PERCLOS (milliseconds)
    pub perclos_window_ms: u64,

    /// Landmark index tables
    pub indices: LandmarkIndices,

    /// Head pose solver settings
    pub pose: PoseConfig,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            drowsiness_threshold_ms: 1500,
            mar_threshold: 0.5,
            pitch_threshold_degrees: 20.0,
            face_absent_alert_frames: 30,
            perclos_window_ms: 60_000,
            indices: LandmarkIndices::default(),
            pose: PoseConfig::default(),
        }
    }
}

impl DmsConfig {
    /// Create strict config (alert sooner)
    pub fn strict() -> Self {
        Self {
            drowsiness_threshold_ms: 1000,
            pitch_threshold_degrees: 15.0,
            ..Default::default()
        }
    }

    /// Create lenient config (alert later)
    pub fn lenient() -> Self {
        Self {
            drowsiness_threshold_ms: 2500,
            pitch_threshold_degrees: 30.0,
            ..Default::default()
        }
    }

    /// Reject thresholds that would make the state machine meaningless
    pub fn validate(&self) -> Result<(), DmsError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(DmsError::Config(format!("{} must be finite and > 0, got {}", name, value)))
            }
        };

        positive("ear_threshold", self.ear_threshold)?;
        positive("mar_threshold", self.mar_threshold)?;
        if !self.pitch_threshold_degrees.is_finite() {
            return Err(DmsError::Config("pitch_threshold_degrees must be finite".into()));
        }
        if self.perclos_window_ms == 0 {
            return Err(DmsError::Config("perclos_window_ms must be > 0".into()));
        }
        self.pose.validate()
    }
}

/// Head pose solver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Levenberg-Marquardt iteration cap
    pub max_iterations: usize,

    /// Solutions whose RMS reprojection error exceeds this fraction of the
    /// landmarks' spread in the image are rejected
    pub max_relative_reprojection_error: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_relative_reprojection_error: 0.25,
        }
    }
}

impl PoseConfig {
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.max_iterations == 0 {
            return Err(DmsError::Config("pose.max_iterations must be > 0".into()));
        }
        if !(self.max_relative_reprojection_error.is_finite() && self.max_relative_reprojection_error > 0.0) {
            return Err(DmsError::Config(
                "pose.max_relative_reprojection_error must be finite and > 0".into(),
            ));
        }
        Ok(())
    }
}
