//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis from facial landmarks:
//! - Eye aspect ratio (eye closure)
//! - Mouth aspect ratio (yawning)
//! - Head pose estimation (nodding)
//! - Time-qualified drowsiness alert with edge-triggered events
//!
//! The module is schedule-agnostic: the host calls [`DmsModule::process`]
//! once per frame from a single thread, at whatever rate it runs.

pub mod analysis;
pub mod config;
pub mod events;
pub mod head_pose;
pub mod ratio;
pub mod state;

pub use analysis::{AlertColor, AlertLabel, DmsAnalysis, FrameMetrics};
pub use config::{DmsConfig, PoseConfig};
pub use events::{AlertEvent, AlertListener, AlertTransition};
pub use head_pose::{CameraIntrinsics, EulerAngles, HeadPose, HeadPoseEstimator, HeadPoseModel, PoseError};
pub use ratio::{compute_ear, compute_mar, EyeLandmarks, MetricError, MouthLandmarks};
pub use state::{DrowsinessPhase, DrowsinessStateMachine, FrameInput, StateUpdate};

use face_landmarks::{LandmarkError, LandmarkFrame, LandmarkSet, Point2};
use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
}

/// Raw measurements of one face
struct Measurement {
    avg_ear: Option<f64>,
    mar: Option<f64>,
    head_pose: Option<HeadPose>,
    nose_point: Point2,
}

/// Driver monitoring module
pub struct DmsModule {
    config: DmsConfig,
    pose_estimator: HeadPoseEstimator,
    state: DrowsinessStateMachine,
    face_absent_frames: u32,
    listeners: Vec<Box<dyn AlertListener>>,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        info!(
            ear_threshold = config.ear_threshold,
            drowsiness_threshold_ms = config.drowsiness_threshold_ms,
            "Creating DMS module"
        );
        Ok(Self {
            pose_estimator: HeadPoseEstimator::new(config.pose.clone()),
            state: DrowsinessStateMachine::from_config(&config),
            face_absent_frames: 0,
            listeners: Vec::new(),
            config,
        })
    }

    /// Register a collaborator for alert activation/deactivation
    pub fn add_listener(&mut self, listener: Box<dyn AlertListener>) {
        self.listeners.push(listener);
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    pub fn state(&self) -> &DrowsinessStateMachine {
        &self.state
    }

    /// Analyze one landmark frame.
    ///
    /// An `Err` means the frame violated the landmark contract and was
    /// skipped; driver state is untouched in that case.
    pub fn process(&mut self, frame: &LandmarkFrame) -> Result<DmsAnalysis, DmsError> {
        let result = self.process_frame(frame);
        match &result {
            Ok(_) => metrics::counter!("dms_frames_processed_total").increment(1),
            Err(e) => {
                debug!(sequence = frame.sequence, error = %e, "Frame skipped");
                metrics::counter!("dms_frames_skipped_total").increment(1);
            }
        }
        result
    }

    fn process_frame(&mut self, frame: &LandmarkFrame) -> Result<DmsAnalysis, DmsError> {
        frame.validate()?;

        let Some(landmarks) = &frame.landmarks else {
            return Ok(self.face_absent(frame));
        };

        // Everything fallible happens before state is touched
        let measured = self.measure(landmarks, frame)?;
        self.face_absent_frames = 0;

        let update = self.state.update(&FrameInput {
            avg_ear: measured.avg_ear,
            mar: measured.mar,
            pitch: measured.head_pose.as_ref().map(|p| p.pitch),
            timestamp_ns: frame.timestamp_ns,
        });
        self.dispatch(update.transition);

        let label = AlertLabel::select(update.phase.is_alerting(), update.yawning, update.nodding, false);
        let pose = measured.head_pose.as_ref();

        Ok(DmsAnalysis {
            timestamp_ns: frame.timestamp_ns,
            sequence: frame.sequence,
            face_detected: true,
            metrics: FrameMetrics {
                avg_ear: measured.avg_ear,
                mar: measured.mar,
                pitch: pose.map(|p| p.pitch),
                yaw: pose.map(|p| p.yaw),
                roll: pose.map(|p| p.roll),
            },
            nose_point: pose.map(|_| measured.nose_point),
            facing_point: pose.and_then(|p| p.facing_point),
            head_pose: measured.head_pose,
            phase: update.phase,
            label,
            color: label.color(),
            yawning: update.yawning,
            nodding: update.nodding,
            transition: update.transition,
            perclos: self.state.perclos(),
        })
    }

    fn measure(&self, landmarks: &LandmarkSet, frame: &LandmarkFrame) -> Result<Measurement, DmsError> {
        let indices = &self.config.indices;
        let left = EyeLandmarks(landmarks.select_xy(&indices.left_eye)?);
        let right = EyeLandmarks(landmarks.select_xy(&indices.right_eye)?);
        let mouth = MouthLandmarks(landmarks.select_xy(&indices.mouth)?);
        let pose_points = landmarks.select_pixels(&indices.head_pose, frame.width, frame.height)?;

        let avg_ear = ratio::average_ear(&left, &right)
            .map_err(|e| debug!(sequence = frame.sequence, error = %e, "EAR undefined"))
            .ok();
        let mar = compute_mar(&mouth)
            .map_err(|e| debug!(sequence = frame.sequence, error = %e, "MAR undefined"))
            .ok();
        let head_pose = match self.pose_estimator.estimate(&pose_points, frame.width, frame.height) {
            Ok(pose) => Some(pose),
            Err(e) => {
                debug!(sequence = frame.sequence, error = %e, "Head pose unavailable");
                metrics::counter!("dms_pose_failures_total").increment(1);
                None
            }
        };

        Ok(Measurement {
            avg_ear,
            mar,
            head_pose,
            nose_point: pose_points[0],
        })
    }

    fn face_absent(&mut self, frame: &LandmarkFrame) -> DmsAnalysis {
        self.face_absent_frames = self.face_absent_frames.saturating_add(1);
        let update = self.state.update(&FrameInput::empty(frame.timestamp_ns));
        let face_missing = self.face_absent_frames >= self.config.face_absent_alert_frames;
        let label = AlertLabel::select(update.phase.is_alerting(), false, false, face_missing);

        DmsAnalysis {
            timestamp_ns: frame.timestamp_ns,
            sequence: frame.sequence,
            face_detected: false,
            phase: update.phase,
            label,
            color: label.color(),
            perclos: self.state.perclos(),
            ..Default::default()
        }
    }

    fn dispatch(&mut self, transition: Option<AlertTransition>) {
        if let Some(transition) = transition {
            for listener in self.listeners.iter_mut() {
                listener.notify(&transition);
            }
        }
    }

    /// Reset driver state (on driver change)
    pub fn reset_state(&mut self, now_ns: u64) {
        let transition = self.state.reset(now_ns);
        self.dispatch(transition);
        self.face_absent_frames = 0;
    }
}
