//! Landmark frame types

use serde::{Deserialize, Serialize};

use crate::LandmarkError;

/// Single facial landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// Horizontal position (0 = left edge, 1 = right edge)
    pub x: f64,
    /// Vertical position (0 = top edge, 1 = bottom edge)
    pub y: f64,
    /// Relative depth, same scale as x
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Drop depth
    pub fn xy(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    /// Scale to pixel coordinates, depth dropped
    pub fn to_pixels(&self, width: u32, height: u32) -> Point2 {
        Point2::new(self.x * width as f64, self.y * height as f64)
    }
}

/// 2D point, normalized or in pixels depending on context
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Landmarks of one detected face, indexed by the detector's anatomical scheme
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Pick landmarks by index, preserving the order of `indices`
    pub fn select<const N: usize>(&self, indices: &[usize; N]) -> Result<[Landmark; N], LandmarkError> {
        let mut out = [Landmark::default(); N];
        for (slot, &index) in out.iter_mut().zip(indices.iter()) {
            *slot = *self.points.get(index).ok_or(LandmarkError::IndexOutOfRange {
                index,
                len: self.points.len(),
            })?;
        }
        Ok(out)
    }

    /// Pick landmarks by index and keep x/y only
    pub fn select_xy<const N: usize>(&self, indices: &[usize; N]) -> Result<[Point2; N], LandmarkError> {
        Ok(self.select(indices)?.map(|lm| lm.xy()))
    }

    /// Pick landmarks by index and scale them to pixel coordinates
    pub fn select_pixels<const N: usize>(
        &self,
        indices: &[usize; N],
        width: u32,
        height: u32,
    ) -> Result<[Point2; N], LandmarkError> {
        Ok(self.select(indices)?.map(|lm| lm.to_pixels(width, height)))
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}

/// Detector output for one video frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Landmarks of the tracked face, `None` when no face was found
    pub landmarks: Option<LandmarkSet>,
    /// Source image width (pixels)
    pub width: u32,
    /// Source image height (pixels)
    pub height: u32,
    /// Monotonic capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    #[serde(default)]
    pub sequence: u32,
}

impl LandmarkFrame {
    /// Frame with a detected face
    pub fn new(landmarks: LandmarkSet, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            landmarks: Some(landmarks),
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Frame where the detector found no face
    pub fn empty(width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            landmarks: None,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    pub fn has_face(&self) -> bool {
        self.landmarks.is_some()
    }

    /// Reject zero-sized frames before any pixel scaling
    pub fn validate(&self) -> Result<(), LandmarkError> {
        if self.width == 0 || self.height == 0 {
            return Err(LandmarkError::InvalidFrameSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}
