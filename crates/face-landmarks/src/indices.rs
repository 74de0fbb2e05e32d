//! Anatomical landmark index tables
//!
//! Contract with the upstream detector. Defaults follow the 468/478-point
//! MediaPipe FaceMesh topology. Order matters: each table is read
//! positionally by the ratio and pose calculations.

use serde::{Deserialize, Serialize};

/// Index tables consumed by the driver monitoring core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkIndices {
    /// Left eye p1..p6: outer corner, upper lid x2, inner corner, lower lid x2
    pub left_eye: [usize; 6],
    /// Right eye p1..p6, same ordering as the left eye
    pub right_eye: [usize; 6],
    /// Upper lip, lower lip, left corner, right corner
    pub mouth: [usize; 4],
    /// Nose tip, chin, left eye outer corner, right eye outer corner,
    /// left mouth corner, right mouth corner
    pub head_pose: [usize; 6],
}

impl Default for LandmarkIndices {
    fn default() -> Self {
        Self {
            left_eye: [33, 160, 158, 133, 153, 144],
            right_eye: [362, 385, 387, 263, 373, 380],
            mouth: [13, 14, 78, 308],
            head_pose: [1, 199, 33, 263, 61, 291],
        }
    }
}

impl LandmarkIndices {
    /// Smallest landmark set length that satisfies every table
    pub fn required_len(&self) -> usize {
        self.left_eye
            .iter()
            .chain(self.right_eye.iter())
            .chain(self.mouth.iter())
            .chain(self.head_pose.iter())
            .max()
            .map_or(0, |max| max + 1)
    }
}
