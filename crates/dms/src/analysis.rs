//! DMS analysis results and alert labels

use face_landmarks::Point2;
use serde::{Deserialize, Serialize};

use crate::events::AlertTransition;
use crate::head_pose::HeadPose;
use crate::state::DrowsinessPhase;

/// Status shown to the driver, one per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLabel {
    #[default]
    Awake,

    /// Sustained eye closure
    Drowsiness,

    /// Mouth aspect ratio above threshold
    Yawn,

    /// Head pitched past threshold
    HeadNod,

    /// No face for a while (camera blocked?)
    FaceNotVisible,
}

/// Display color category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertColor {
    #[default]
    Green,
    Orange,
    Red,
}

impl AlertLabel {
    /// Pick the label for a frame.
    ///
    /// Priority: Drowsiness > Yawn > HeadNod > FaceNotVisible > Awake, so a
    /// yawn can never mask an eye-closure alert.
    pub fn select(alerting: bool, yawning: bool, nodding: bool, face_missing: bool) -> Self {
        if alerting {
            Self::Drowsiness
        } else if yawning {
            Self::Yawn
        } else if nodding {
            Self::HeadNod
        } else if face_missing {
            Self::FaceNotVisible
        } else {
            Self::Awake
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::Awake => "Status: Awake",
            Self::Drowsiness => "DROWSINESS ALERT!",
            Self::Yawn => "YAWN DETECTED",
            Self::HeadNod => "HEAD NOD",
            Self::FaceNotVisible => "FACE NOT VISIBLE",
        }
    }

    pub fn color(&self) -> AlertColor {
        match self {
            Self::Awake => AlertColor::Green,
            Self::Drowsiness => AlertColor::Red,
            Self::Yawn | Self::HeadNod | Self::FaceNotVisible => AlertColor::Orange,
        }
    }
}

/// Geometric metrics of one frame; `None` where undefined
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub avg_ear: Option<f64>,
    pub mar: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub roll: Option<f64>,
}

/// Complete DMS analysis result for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Frame timestamp (nanoseconds)
    pub timestamp_ns: u64,

    /// Frame sequence number
    pub sequence: u32,

    /// Whether a face was detected
    pub face_detected: bool,

    /// Ratios and angles
    pub metrics: FrameMetrics,

    /// Full pose solution (if solved)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_pose: Option<HeadPose>,

    /// Nose tip in pixels, start of the facing-direction line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nose_point: Option<Point2>,

    /// Projected facing-direction point in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facing_point: Option<Point2>,

    /// Current drowsiness phase
    pub phase: DrowsinessPhase,

    /// Highest-priority condition this frame
    pub label: AlertLabel,

    /// Color category of `label`
    pub color: AlertColor,

    pub yawning: bool,

    pub nodding: bool,

    /// Alert edge produced by this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<AlertTransition>,

    /// Rolling percentage of eye closure (0-1)
    pub perclos: f64,
}

impl DmsAnalysis {
    /// Whether the drowsiness alert is active
    pub fn alert_active(&self) -> bool {
        self.phase.is_alerting()
    }

    /// Label text for the presentation layer
    pub fn label_text(&self) -> &'static str {
        self.label.text()
    }
}
