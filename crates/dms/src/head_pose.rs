//! Head pose from six facial landmarks
//!
//! Solves the perspective-n-point problem between a fixed anthropometric face
//! model and the observed image points, then decomposes the rotation into
//! pitch/yaw/roll. The solve is a normalized DLT for the initial estimate
//! followed by Levenberg-Marquardt refinement of the reprojection error.

use std::f64::consts::PI;

use face_landmarks::{LandmarkError, LandmarkIndices, LandmarkSet, Point2};
use nalgebra::{DMatrix, Matrix2, Matrix2x3, Matrix3, Matrix3x6, Matrix6, Rotation3, Vector2, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::config::PoseConfig;

/// Point in model space projected to visualize the facing direction
pub const FACING_POINT: [f64; 3] = [0.0, 0.0, 1000.0];

/// Rotation matrices with `sqrt(R00² + R10²)` below this are treated as gimbal-locked
const SINGULAR_EPS: f64 = 1e-6;

/// Pose solve failure; the caller gets no pose for the frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("Invalid image size: {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("Degenerate landmark geometry: {0}")]
    DegenerateGeometry(&'static str),

    #[error("Pose solve did not converge: {0}")]
    NotConverged(String),

    #[error("Invalid landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
}

/// Pinhole camera derived from the image size, no lens distortion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub focal_length: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// focal = width, principal point at the image center
    pub fn from_image_size(width: u32, height: u32) -> Result<Self, PoseError> {
        if width == 0 || height == 0 {
            return Err(PoseError::InvalidImageSize { width, height });
        }
        Ok(Self {
            focal_length: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        })
    }

    /// Project a camera-space point; `None` on the camera plane
    pub fn project(&self, p: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p.z.abs() < f64::EPSILON {
            return None;
        }
        Some(Vector2::new(
            self.focal_length * p.x / p.z + self.cx,
            self.focal_length * p.y / p.z + self.cy,
        ))
    }

    /// Pixel to normalized image plane coordinates
    fn normalize(&self, p: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (p.x - self.cx) / self.focal_length,
            (p.y - self.cy) / self.focal_length,
        )
    }
}

/// Canonical 3D face points in model units, y up and z out of the face
#[derive(Debug, Clone, PartialEq)]
pub struct HeadPoseModel {
    points: [Vector3<f64>; 6],
}

impl HeadPoseModel {
    /// Nose tip, chin, left eye left corner, right eye right corner,
    /// left mouth corner, right mouth corner
    pub fn canonical() -> Self {
        Self {
            points: [
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.0, -330.0, -65.0),
                Vector3::new(-225.0, 170.0, -135.0),
                Vector3::new(225.0, 170.0, -135.0),
                Vector3::new(-150.0, -150.0, -125.0),
                Vector3::new(150.0, -150.0, -125.0),
            ],
        }
    }

    pub fn points(&self) -> &[Vector3<f64>; 6] {
        &self.points
    }
}

impl Default for HeadPoseModel {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Model-to-camera rigid transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSolution {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl PoseSolution {
    pub fn transform(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Left-multiplied rotation increment, additive translation increment
    fn perturbed(&self, delta: &Vector6<f64>) -> Self {
        let rot = Vector3::new(delta[0], delta[1], delta[2]);
        let trans = Vector3::new(delta[3], delta[4], delta[5]);
        Self {
            rotation: Rotation3::new(rot) * self.rotation,
            translation: self.translation + trans,
        }
    }
}

/// Euler angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Decompose a rotation matrix.
///
/// pitch = atan2(R21, R22), yaw = atan2(-R20, sy), roll = atan2(R10, R00)
/// with sy = sqrt(R00² + R10²). When sy vanishes the roll axis is fixed at 0
/// and pitch is taken from R12/R11.
pub fn euler_from_rotation(r: &Matrix3<f64>) -> EulerAngles {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    let (x, y, z) = if sy >= SINGULAR_EPS {
        (
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        ((-r[(1, 2)]).atan2(r[(1, 1)]), (-r[(2, 0)]).atan2(sy), 0.0)
    };

    EulerAngles {
        pitch: x.to_degrees(),
        yaw: y.to_degrees(),
        roll: z.to_degrees(),
    }
}

/// Estimated head pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Rotation about the lateral axis (degrees)
    pub pitch: f64,
    /// Rotation about the vertical axis (degrees)
    pub yaw: f64,
    /// Rotation about the frontal axis (degrees)
    pub roll: f64,
    /// Axis-angle rotation (radians)
    pub rotation_vector: [f64; 3],
    /// Translation in model units
    pub translation: [f64; 3],
    /// RMS reprojection error of the six points (pixels)
    pub reprojection_error_px: f64,
    /// Projection of [`FACING_POINT`], for drawing the nose direction
    pub facing_point: Option<Point2>,
}

/// Perspective pose estimator
pub struct HeadPoseEstimator {
    model: HeadPoseModel,
    config: PoseConfig,
}

impl HeadPoseEstimator {
    pub fn new(config: PoseConfig) -> Self {
        Self::with_model(HeadPoseModel::canonical(), config)
    }

    pub fn with_model(model: HeadPoseModel, config: PoseConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &HeadPoseModel {
        &self.model
    }

    /// Estimate pose from six pixel-space points ordered like the model
    pub fn estimate(&self, image_points: &[Point2; 6], width: u32, height: u32) -> Result<HeadPose, PoseError> {
        let camera = CameraIntrinsics::from_image_size(width, height)?;
        let observed = image_points.map(|p| Vector2::new(p.x, p.y));
        check_geometry(&observed)?;

        let solution = self.solve(&observed, &camera)?;
        Ok(self.describe(&solution, &observed, &camera))
    }

    /// Estimate pose straight from a normalized landmark set
    pub fn from_landmarks(
        &self,
        landmarks: &LandmarkSet,
        indices: &LandmarkIndices,
        width: u32,
        height: u32,
    ) -> Result<HeadPose, PoseError> {
        let points = landmarks.select_pixels(&indices.head_pose, width, height)?;
        self.estimate(&points, width, height)
    }

    /// Solve for the model-to-camera transform
    pub fn solve(&self, observed: &[Vector2<f64>; 6], camera: &CameraIntrinsics) -> Result<PoseSolution, PoseError> {
        let model = &self.model.points;
        let starts = [dlt_estimate(model, observed, camera), frontal_estimate(model, observed, camera)];

        let best = starts
            .into_iter()
            .flatten()
            .filter_map(|start| self.refine(observed, camera, start))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let Some((solution, cost)) = best else {
            return Err(PoseError::NotConverged("no valid solution in front of the camera".into()));
        };

        let rms = (cost / model.len() as f64).sqrt();
        if !rms.is_finite() || !solution.translation.iter().all(|v| v.is_finite()) {
            return Err(PoseError::NotConverged("non-finite solution".into()));
        }
        // Relative to the face's size in the image, so distance and resolution cancel out
        let relative = rms / point_spread(observed);
        if relative > self.config.max_relative_reprojection_error {
            return Err(PoseError::NotConverged(format!(
                "reprojection error {:.2}px is {:.3} of the landmark spread, limit {:.3}",
                rms, relative, self.config.max_relative_reprojection_error
            )));
        }

        Ok(solution)
    }

    fn describe(&self, solution: &PoseSolution, observed: &[Vector2<f64>; 6], camera: &CameraIntrinsics) -> HeadPose {
        let angles = euler_from_rotation(solution.rotation.matrix());
        let cost = reprojection_cost(&self.model.points, observed, camera, solution).unwrap_or(f64::INFINITY);
        let facing = camera
            .project(&solution.transform(&Vector3::from(FACING_POINT)))
            .map(|p| Point2::new(p.x, p.y));
        let rvec = solution.rotation.scaled_axis();

        HeadPose {
            pitch: angles.pitch,
            yaw: angles.yaw,
            roll: angles.roll,
            rotation_vector: [rvec.x, rvec.y, rvec.z],
            translation: [solution.translation.x, solution.translation.y, solution.translation.z],
            reprojection_error_px: (cost / observed.len() as f64).sqrt(),
            facing_point: facing,
        }
    }

    /// Levenberg-Marquardt on the summed squared pixel error.
    /// Returns the refined pose and its cost, or `None` if the start is invalid.
    fn refine(
        &self,
        observed: &[Vector2<f64>; 6],
        camera: &CameraIntrinsics,
        start: PoseSolution,
    ) -> Option<(PoseSolution, f64)> {
        let model = &self.model.points;
        let mut pose = start;
        let mut cost = reprojection_cost(model, observed, camera, &pose)?;
        let mut lambda = 1e-3;

        for iteration in 0..self.config.max_iterations {
            if cost < 1e-18 {
                break;
            }
            let (jtj, jtr) = normal_equations(model, observed, camera, &pose)?;

            let mut accepted = None;
            while lambda < 1e12 {
                let mut damped = jtj;
                for i in 0..6 {
                    damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
                }
                let Some(chol) = damped.cholesky() else {
                    lambda *= 10.0;
                    continue;
                };
                let delta = chol.solve(&(-jtr));
                let candidate = pose.perturbed(&delta);
                match reprojection_cost(model, observed, camera, &candidate) {
                    Some(c) if c < cost => {
                        accepted = Some((candidate, c));
                        lambda = (lambda * 0.1).max(1e-12);
                        break;
                    }
                    _ => lambda *= 10.0,
                }
            }

            let Some((candidate, new_cost)) = accepted else {
                trace!(iteration, cost, "LM stalled");
                break;
            };
            let improvement = cost - new_cost;
            pose = candidate;
            cost = new_cost;
            if improvement <= 1e-12 * cost.max(1e-12) {
                break;
            }
        }

        Some((pose, cost))
    }
}

/// Sum of squared pixel errors; `None` if any point lands behind the camera
fn reprojection_cost(
    model: &[Vector3<f64>; 6],
    observed: &[Vector2<f64>; 6],
    camera: &CameraIntrinsics,
    pose: &PoseSolution,
) -> Option<f64> {
    let mut cost = 0.0;
    for (x, u) in model.iter().zip(observed.iter()) {
        let pc = pose.transform(x);
        if pc.z <= f64::EPSILON {
            return None;
        }
        cost += (camera.project(&pc)? - u).norm_squared();
    }
    cost.is_finite().then_some(cost)
}

/// JᵀJ and Jᵀr for the current pose
fn normal_equations(
    model: &[Vector3<f64>; 6],
    observed: &[Vector2<f64>; 6],
    camera: &CameraIntrinsics,
    pose: &PoseSolution,
) -> Option<(Matrix6<f64>, Vector6<f64>)> {
    let f = camera.focal_length;
    let mut jtj = Matrix6::zeros();
    let mut jtr = Vector6::zeros();

    for (x, u) in model.iter().zip(observed.iter()) {
        let rx = pose.rotation * x;
        let pc = rx + pose.translation;
        if pc.z <= f64::EPSILON {
            return None;
        }
        let inv_z = 1.0 / pc.z;
        let residual = camera.project(&pc)? - u;

        let d_proj = Matrix2x3::new(
            f * inv_z, 0.0, -f * pc.x * inv_z * inv_z,
            0.0, f * inv_z, -f * pc.y * inv_z * inv_z,
        );
        let mut d_point = Matrix3x6::zeros();
        d_point.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-rx.cross_matrix()));
        d_point.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());

        let j = d_proj * d_point;
        jtj += j.transpose() * j;
        jtr += j.transpose() * residual;
    }

    Some((jtj, jtr))
}

/// Reject image points that cannot constrain a pose
/// RMS distance of the image points from their centroid (pixels)
fn point_spread(observed: &[Vector2<f64>; 6]) -> f64 {
    let n = observed.len() as f64;
    let centroid = observed.iter().sum::<Vector2<f64>>() / n;
    (observed.iter().map(|p| (p - centroid).norm_squared()).sum::<f64>() / n).sqrt()
}

fn check_geometry(observed: &[Vector2<f64>; 6]) -> Result<(), PoseError> {
    if !observed.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
        return Err(PoseError::DegenerateGeometry("non-finite image point"));
    }

    let n = observed.len() as f64;
    let centroid = observed.iter().sum::<Vector2<f64>>() / n;
    let mut cov = Matrix2::zeros();
    for p in observed {
        let d = p - centroid;
        cov += d * d.transpose();
    }
    cov /= n;

    let eig = cov.symmetric_eigenvalues();
    let (lo, hi) = (eig.min(), eig.max());
    if hi < 1e-12 {
        return Err(PoseError::DegenerateGeometry("coincident image points"));
    }
    if lo / hi < 1e-8 {
        return Err(PoseError::DegenerateGeometry("collinear image points"));
    }
    Ok(())
}

/// Linear estimate from the 12 DLT equations on normalized coordinates
fn dlt_estimate(
    model: &[Vector3<f64>; 6],
    observed: &[Vector2<f64>; 6],
    camera: &CameraIntrinsics,
) -> Option<PoseSolution> {
    let n = model.len() as f64;
    let centroid = model.iter().sum::<Vector3<f64>>() / n;
    let spread = model.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if spread < f64::EPSILON {
        return None;
    }
    let scale = spread / 3f64.sqrt();

    let mut a = DMatrix::<f64>::zeros(12, 12);
    for (i, (x, u)) in model.iter().zip(observed.iter()).enumerate() {
        let xs = (x - centroid) / scale;
        let xh = [xs.x, xs.y, xs.z, 1.0];
        let un = camera.normalize(u);
        for (k, v) in xh.iter().enumerate() {
            a[(2 * i, k)] = *v;
            a[(2 * i, 8 + k)] = -un.x * v;
            a[(2 * i + 1, 4 + k)] = *v;
            a[(2 * i + 1, 8 + k)] = -un.y * v;
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (smallest, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let m = v_t.row(smallest);

    let mut p = Matrix3::zeros();
    let mut p4 = Vector3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            p[(r, c)] = m[4 * r + c];
        }
        p4[r] = m[4 * r + 3];
    }

    // Overall sign is free; pick the one that puts the model in front of the camera
    let depth_sum: f64 = model
        .iter()
        .map(|x| {
            let xs = (x - centroid) / scale;
            p[(2, 0)] * xs.x + p[(2, 1)] * xs.y + p[(2, 2)] * xs.z + p4.z
        })
        .sum();
    if depth_sum < 0.0 {
        p = -p;
        p4 = -p4;
    }

    let svd = p.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let r = u * v_t;
    if r.determinant() <= 0.0 {
        return None;
    }
    let lambda = svd.singular_values.mean() / scale;
    if !(lambda.is_finite() && lambda > f64::EPSILON) {
        return None;
    }

    let rotation = Rotation3::from_matrix_unchecked(r);
    let translation = p4 / lambda - rotation * centroid;
    (translation.z > 0.0).then_some(PoseSolution { rotation, translation })
}

/// Face turned toward the camera, placed at the depth matching the image spread
fn frontal_estimate(
    model: &[Vector3<f64>; 6],
    observed: &[Vector2<f64>; 6],
    camera: &CameraIntrinsics,
) -> Option<PoseSolution> {
    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), PI);
    let n = model.len() as f64;

    let model_centroid = model.iter().sum::<Vector3<f64>>() / n;
    let model_spread = model
        .iter()
        .map(|p| (p - model_centroid).xy().norm())
        .sum::<f64>()
        / n;

    let normalized = observed.map(|u| camera.normalize(&u));
    let image_centroid = normalized.iter().sum::<Vector2<f64>>() / n;
    let image_spread = normalized.iter().map(|p| (p - image_centroid).norm()).sum::<f64>() / n;
    if image_spread < f64::EPSILON {
        return None;
    }

    let depth = model_spread / image_spread;
    let target = Vector3::new(image_centroid.x * depth, image_centroid.y * depth, depth);
    let translation = target - rotation * model_centroid;
    Some(PoseSolution { rotation, translation })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    fn project_model(pose: &PoseSolution) -> [Point2; 6] {
        let camera = CameraIntrinsics::from_image_size(WIDTH, HEIGHT).unwrap();
        HeadPoseModel::canonical().points().map(|x| {
            let p = camera.project(&pose.transform(&x)).unwrap();
            Point2::new(p.x, p.y)
        })
    }

    fn known_pose() -> PoseSolution {
        let facing = Rotation3::from_axis_angle(&Vector3::x_axis(), PI);
        let tilt = Rotation3::from_euler_angles(0.15, 0.2, 0.05);
        PoseSolution {
            rotation: tilt * facing,
            translation: Vector3::new(20.0, -10.0, 1500.0),
        }
    }

    #[test]
    fn test_intrinsics_from_size() {
        let k = CameraIntrinsics::from_image_size(WIDTH, HEIGHT).unwrap();
        assert_eq!(k.focal_length, 640.0);
        assert_eq!((k.cx, k.cy), (320.0, 240.0));
        assert!(CameraIntrinsics::from_image_size(0, 480).is_err());
    }

    #[test]
    fn test_round_trip_recovers_pose() {
        let truth = known_pose();
        let points = project_model(&truth);
        let estimator = HeadPoseEstimator::new(PoseConfig::default());

        let camera = CameraIntrinsics::from_image_size(WIDTH, HEIGHT).unwrap();
        let observed = points.map(|p| Vector2::new(p.x, p.y));
        let solved = estimator.solve(&observed, &camera).unwrap();

        let angle_err = (solved.rotation.inverse() * truth.rotation).angle();
        assert!(angle_err < 1e-6, "rotation error {}", angle_err);
        assert!((solved.translation - truth.translation).norm() < 1e-3);

        let pose = estimator.estimate(&points, WIDTH, HEIGHT).unwrap();
        let expected = euler_from_rotation(truth.rotation.matrix());
        assert!((pose.pitch - expected.pitch).abs() < 1e-4);
        assert!((pose.yaw - expected.yaw).abs() < 1e-4);
        assert!((pose.roll - expected.roll).abs() < 1e-4);
        assert!(pose.reprojection_error_px < 1e-6);
    }

    #[test]
    fn test_round_trip_with_pixel_noise() {
        let truth = known_pose();
        let noise = [(0.6, -0.4), (-0.5, 0.3), (0.2, 0.7), (-0.7, -0.2), (0.4, 0.5), (-0.3, -0.6)];
        let mut points = project_model(&truth);
        for (p, (dx, dy)) in points.iter_mut().zip(noise) {
            p.x += dx;
            p.y += dy;
        }

        let pose = HeadPoseEstimator::new(PoseConfig::default())
            .estimate(&points, WIDTH, HEIGHT)
            .unwrap();
        let expected = euler_from_rotation(truth.rotation.matrix());
        assert!(pose.reprojection_error_px < 1.0);
        assert!((pose.yaw - expected.yaw).abs() < 5.0);
        assert!((pose.roll - expected.roll).abs() < 5.0);
    }

    #[test]
    fn test_facing_point_projection() {
        let truth = PoseSolution {
            rotation: Rotation3::from_axis_angle(&Vector3::x_axis(), PI),
            translation: Vector3::new(0.0, 0.0, 2000.0),
        };
        let points = project_model(&truth);
        let pose = HeadPoseEstimator::new(PoseConfig::default())
            .estimate(&points, WIDTH, HEIGHT)
            .unwrap();

        // Straight at the camera: nose direction projects onto the nose tip
        let facing = pose.facing_point.unwrap();
        assert!((facing.x - 320.0).abs() < 1e-4);
        assert!((facing.y - 240.0).abs() < 1e-4);
        assert!((pose.pitch.abs() - 180.0).abs() < 1e-4);
    }

    #[test]
    fn test_euler_single_axes() {
        let pitch = euler_from_rotation(Rotation3::from_axis_angle(&Vector3::x_axis(), 0.4).matrix());
        assert!((pitch.pitch - 0.4f64.to_degrees()).abs() < 1e-9);
        assert!(pitch.yaw.abs() < 1e-9 && pitch.roll.abs() < 1e-9);

        let yaw = euler_from_rotation(Rotation3::from_axis_angle(&Vector3::y_axis(), 0.25).matrix());
        assert!((yaw.yaw - 0.25f64.to_degrees()).abs() < 1e-9);

        let roll = euler_from_rotation(Rotation3::from_axis_angle(&Vector3::z_axis(), -0.3).matrix());
        assert!((roll.roll + 0.3f64.to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn test_euler_gimbal_lock() {
        let r = Rotation3::from_axis_angle(&Vector3::y_axis(), PI / 2.0);
        let angles = euler_from_rotation(r.matrix());
        assert_eq!(angles.roll, 0.0);
        assert!((angles.yaw - 90.0).abs() < 1e-6);
        assert!(angles.pitch.abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_points_rejected() {
        let estimator = HeadPoseEstimator::new(PoseConfig::default());

        let same = [Point2::new(100.0, 100.0); 6];
        assert!(matches!(
            estimator.estimate(&same, WIDTH, HEIGHT),
            Err(PoseError::DegenerateGeometry(_))
        ));

        let line: [Point2; 6] = std::array::from_fn(|i| Point2::new(100.0 + 10.0 * i as f64, 200.0));
        assert!(matches!(
            estimator.estimate(&line, WIDTH, HEIGHT),
            Err(PoseError::DegenerateGeometry(_))
        ));

        let mut nan = project_model(&known_pose());
        nan[2].y = f64::NAN;
        assert!(estimator.estimate(&nan, WIDTH, HEIGHT).is_err());
    }

    #[test]
    fn test_invalid_image_size() {
        let estimator = HeadPoseEstimator::new(PoseConfig::default());
        let points = project_model(&known_pose());
        assert_eq!(
            estimator.estimate(&points, 0, 0),
            Err(PoseError::InvalidImageSize { width: 0, height: 0 })
        );
    }

    #[test]
    fn test_inconsistent_points_fail_explicitly() {
        let estimator = HeadPoseEstimator::new(PoseConfig::default());
        // Eyes 10px apart, mouth corners 300px apart, chin on the nose
        let points = [
            Point2::new(320.0, 240.0),
            Point2::new(322.0, 243.0),
            Point2::new(315.0, 150.0),
            Point2::new(325.0, 150.0),
            Point2::new(170.0, 330.0),
            Point2::new(470.0, 330.0),
        ];
        assert!(matches!(
            estimator.estimate(&points, WIDTH, HEIGHT),
            Err(PoseError::NotConverged(_))
        ));
    }

    #[test]
    fn test_from_landmarks_scales_to_pixels() {
        use face_landmarks::Landmark;

        let indices = LandmarkIndices::default();
        let pixels = project_model(&known_pose());
        let mut points = vec![Landmark::default(); indices.required_len()];
        for (p, &index) in pixels.iter().zip(indices.head_pose.iter()) {
            points[index] = Landmark::new(p.x / WIDTH as f64, p.y / HEIGHT as f64, 0.0);
        }

        let estimator = HeadPoseEstimator::new(PoseConfig::default());
        let direct = estimator.estimate(&pixels, WIDTH, HEIGHT).unwrap();
        let via_set = estimator
            .from_landmarks(&LandmarkSet::new(points), &indices, WIDTH, HEIGHT)
            .unwrap();
        assert!((direct.pitch - via_set.pitch).abs() < 1e-6);
        assert!((direct.yaw - via_set.yaw).abs() < 1e-6);

        let short = LandmarkSet::new(vec![Landmark::default(); 10]);
        assert!(matches!(
            estimator.from_landmarks(&short, &indices, WIDTH, HEIGHT),
            Err(PoseError::Landmarks(LandmarkError::IndexOutOfRange { .. }))
        ));
    }

    /// Canonical model with the chin pulled up a quarter: a face the generic
    /// model does not match exactly
    fn mismatched_face(depth: f64, width: u32, height: u32) -> [Point2; 6] {
        let camera = CameraIntrinsics::from_image_size(width, height).unwrap();
        let pose = PoseSolution {
            rotation: Rotation3::from_axis_angle(&Vector3::x_axis(), PI + 0.1),
            translation: Vector3::new(0.0, 0.0, depth),
        };
        let mut model = *HeadPoseModel::canonical().points();
        model[1].y *= 0.75;
        model.map(|x| {
            let p = camera.project(&pose.transform(&x)).unwrap();
            Point2::new(p.x, p.y)
        })
    }

    #[test]
    fn test_model_mismatch_accepted_at_any_distance() {
        let estimator = HeadPoseEstimator::new(PoseConfig::default());
        let far = estimator.estimate(&mismatched_face(1500.0, 1920, 1080), 1920, 1080).unwrap();

        for depth in [1200.0, 900.0] {
            let near = estimator.estimate(&mismatched_face(depth, 1920, 1080), 1920, 1080).unwrap();
            assert!(
                (near.pitch - far.pitch).abs() < 3.0,
                "depth {}: pitch {} vs {}",
                depth,
                near.pitch,
                far.pitch
            );
            assert!(near.reprojection_error_px > far.reprojection_error_px);
        }
    }
}
