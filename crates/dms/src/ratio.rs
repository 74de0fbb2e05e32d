//! Eye and mouth aspect ratios
//!
//! EAR = (|p2-p6| + |p3-p5|) / (2 * |p1-p4|)
//! MAR = |upper-lower| / |left-right|
//!
//! Distances are 2D; depth is ignored. A zero horizontal baseline makes the
//! ratio undefined and is reported as an error instead of NaN/inf, because a
//! NaN EAR would compare as "not below threshold" and silently read as open.

use face_landmarks::{LandmarkError, Point2};
use thiserror::Error;

/// Horizontal baselines at or below this are treated as zero
pub const MIN_BASELINE: f64 = 1e-9;

/// Undefined ratio for this frame
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum MetricError {
    #[error("Horizontal baseline is degenerate ({0:e})")]
    DegenerateBaseline(f64),

    #[error("Non-finite landmark coordinate")]
    NonFinite,
}

/// Six eye contour points p1..p6
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLandmarks(pub [Point2; 6]);

impl TryFrom<&[Point2]> for EyeLandmarks {
    type Error = LandmarkError;

    fn try_from(points: &[Point2]) -> Result<Self, Self::Error> {
        let points: [Point2; 6] = points.try_into().map_err(|_| LandmarkError::Cardinality {
            expected: 6,
            actual: points.len(),
        })?;
        Ok(Self(points))
    }
}

/// Upper lip, lower lip, left corner, right corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthLandmarks(pub [Point2; 4]);

impl MouthLandmarks {
    pub fn upper_lip(&self) -> Point2 {
        self.0[0]
    }

    pub fn lower_lip(&self) -> Point2 {
        self.0[1]
    }

    pub fn left_corner(&self) -> Point2 {
        self.0[2]
    }

    pub fn right_corner(&self) -> Point2 {
        self.0[3]
    }
}

impl TryFrom<&[Point2]> for MouthLandmarks {
    type Error = LandmarkError;

    fn try_from(points: &[Point2]) -> Result<Self, Self::Error> {
        let points: [Point2; 4] = points.try_into().map_err(|_| LandmarkError::Cardinality {
            expected: 4,
            actual: points.len(),
        })?;
        Ok(Self(points))
    }
}

fn ensure_finite(points: &[Point2]) -> Result<(), MetricError> {
    if points.iter().all(Point2::is_finite) {
        Ok(())
    } else {
        Err(MetricError::NonFinite)
    }
}

fn baseline(a: &Point2, b: &Point2) -> Result<f64, MetricError> {
    let d = a.distance(b);
    if d <= MIN_BASELINE {
        return Err(MetricError::DegenerateBaseline(d));
    }
    Ok(d)
}

/// Eye aspect ratio of a single eye
pub fn compute_ear(eye: &EyeLandmarks) -> Result<f64, MetricError> {
    let [p1, p2, p3, p4, p5, p6] = eye.0;
    ensure_finite(&eye.0)?;

    let horizontal = baseline(&p1, &p4)?;
    let vertical = p2.distance(&p6) + p3.distance(&p5);
    Ok(vertical / (2.0 * horizontal))
}

/// Mouth aspect ratio
pub fn compute_mar(mouth: &MouthLandmarks) -> Result<f64, MetricError> {
    ensure_finite(&mouth.0)?;

    let horizontal = baseline(&mouth.left_corner(), &mouth.right_corner())?;
    Ok(mouth.upper_lip().distance(&mouth.lower_lip()) / horizontal)
}

/// Mean EAR of both eyes; undefined if either eye is
pub fn average_ear(left: &EyeLandmarks, right: &EyeLandmarks) -> Result<f64, MetricError> {
    Ok((compute_ear(left)? + compute_ear(right)?) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn open_eye() -> EyeLandmarks {
        EyeLandmarks([
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.5),
            Point2::new(2.0, 0.5),
            Point2::new(3.0, 0.0),
            Point2::new(2.0, -0.5),
            Point2::new(1.0, -0.5),
        ])
    }

    fn mouth() -> MouthLandmarks {
        MouthLandmarks([
            Point2::new(0.5, 0.4),
            Point2::new(0.5, 0.6),
            Point2::new(0.3, 0.5),
            Point2::new(0.7, 0.5),
        ])
    }

    fn transform(p: Point2, k: f64, dx: f64, dy: f64) -> Point2 {
        Point2::new(p.x * k + dx, p.y * k + dy)
    }

    #[test]
    fn test_ear_known_value() {
        // (1 + 1) / (2 * 3)
        let ear = compute_ear(&open_eye()).unwrap();
        assert!((ear - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_closed_eye_is_zero() {
        let mut eye = open_eye();
        for p in eye.0.iter_mut() {
            p.y = 0.0;
        }
        assert_eq!(compute_ear(&eye).unwrap(), 0.0);
    }

    #[test]
    fn test_mar_known_value() {
        let mar = compute_mar(&mouth()).unwrap();
        assert!((mar - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_eye_baseline() {
        let mut eye = open_eye();
        eye.0[3] = eye.0[0];
        assert_eq!(compute_ear(&eye), Err(MetricError::DegenerateBaseline(0.0)));
    }

    #[test]
    fn test_degenerate_mouth_baseline() {
        let mut m = mouth();
        m.0[3] = m.0[2];
        assert!(matches!(compute_mar(&m), Err(MetricError::DegenerateBaseline(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut eye = open_eye();
        eye.0[1].x = f64::NAN;
        assert_eq!(compute_ear(&eye), Err(MetricError::NonFinite));
    }

    #[test]
    fn test_average_requires_both_eyes() {
        let mut broken = open_eye();
        broken.0[3] = broken.0[0];
        assert!(average_ear(&open_eye(), &broken).is_err());
        let avg = average_ear(&open_eye(), &open_eye()).unwrap();
        assert!((avg - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_cardinality_checked_at_boundary() {
        let five = vec![Point2::default(); 5];
        assert_eq!(
            EyeLandmarks::try_from(five.as_slice()),
            Err(LandmarkError::Cardinality { expected: 6, actual: 5 })
        );
        let four = vec![Point2::default(); 4];
        assert!(MouthLandmarks::try_from(four.as_slice()).is_ok());
        assert!(MouthLandmarks::try_from(&four[..3]).is_err());
    }

    proptest! {
        #[test]
        fn prop_ear_similarity_invariant(k in 0.01f64..100.0, dx in -10.0f64..10.0, dy in -10.0f64..10.0) {
            let eye = open_eye();
            let moved = EyeLandmarks(eye.0.map(|p| transform(p, k, dx, dy)));
            let a = compute_ear(&eye).unwrap();
            let b = compute_ear(&moved).unwrap();
            prop_assert!((a - b).abs() < 1e-9);
        }

        #[test]
        fn prop_mar_similarity_invariant(k in 0.01f64..100.0, dx in -10.0f64..10.0, dy in -10.0f64..10.0) {
            let m = mouth();
            let moved = MouthLandmarks(m.0.map(|p| transform(p, k, dx, dy)));
            let a = compute_mar(&m).unwrap();
            let b = compute_mar(&moved).unwrap();
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
