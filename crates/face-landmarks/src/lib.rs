//! Facial Landmark Library for Driver Monitoring
//!
//! Data handed over by the upstream face-landmark detector:
//! - Normalized landmark points (x/y in [0,1], z relative depth)
//! - Per-frame landmark sets with image size and capture timestamp
//! - Anatomical index tables for eyes, mouth and head pose
//! - Monotonic clock for stamping live frames

pub mod clock;
pub mod frame;
pub mod indices;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use frame::{Landmark, LandmarkFrame, LandmarkSet, Point2};
pub use indices::LandmarkIndices;

use thiserror::Error;

/// Landmark error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("Landmark index {index} out of range for set of {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Expected {expected} points, got {actual}")]
    Cardinality { expected: usize, actual: usize },

    #[error("Invalid frame size: {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
}
