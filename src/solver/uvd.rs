//! Image-coordinate-plus-depth (reprojection) residual model.
//!
//! Used for frame-to-frame tracking: the estimate is the world-to-camera
//! transform and the residual compares the predicted (u, v, depth) against
//! the observation. Points predicted behind the camera, beyond the depth
//! range or outside the image are skipped for the round.

use nalgebra::{Isometry3, Matrix3, Matrix3x6, Point3, Vector3};

use crate::config::UvdModelConfig;
use crate::geometry::{skew, PinholeCamera};

use super::aligner::{Linearization, MeasurementModel};

/// Extra weight on the depth channel relative to the image coordinates.
const DEPTH_CHANNEL_WEIGHT: f64 = 10.0;

/// One tracked point with its observation and prediction source.
#[derive(Debug, Clone)]
pub struct UvdMeasurement {
    /// Observed image coordinates plus depth: (u, v, d).
    pub image_coordinates: Vector3<f64>,

    /// World point to predict from: the landmark's validated estimate when
    /// available, otherwise the corresponding point from the previous frame.
    pub world_point: Vector3<f64>,

    /// Whether `world_point` is a validated landmark estimate. Raw points
    /// are attenuated since they are not stable landmarks yet.
    pub validated: bool,
}

/// Reprojection model over a pinhole camera.
pub struct UvdModel {
    pub camera: PinholeCamera,
    pub config: UvdModelConfig,
}

impl UvdModel {
    pub fn new(camera: PinholeCamera, config: UvdModelConfig) -> Self {
        Self { camera, config }
    }
}

impl MeasurementModel for UvdModel {
    type Item = UvdMeasurement;

    fn linearize(&self, estimate: &Isometry3<f64>, item: &Self::Item) -> Option<Linearization> {
        let mut omega = Matrix3::identity();
        omega[(2, 2)] *= DEPTH_CHANNEL_WEIGHT;
        if !item.validated {
            omega *= self.config.weight_framepoint;
        }

        let point_in_camera = estimate
            .transform_point(&Point3::from(item.world_point))
            .coords;
        let depth = point_in_camera.z;
        if depth <= 0.0 || depth > self.config.maximum_depth_far {
            return None;
        }

        // Homogeneous projection, with the depth restored in the third
        // component.
        let uvd_homogeneous = self.camera.camera_matrix * point_in_camera;
        let mut predicted = uvd_homogeneous / depth;
        predicted.z = depth;

        if !self.camera.is_in_field_of_view(&predicted) {
            return None;
        }

        let residual = predicted - item.image_coordinates;

        let inverse_depth = 1.0 / depth;
        let inverse_depth_squared = inverse_depth * inverse_depth;

        let mut jacobian_transform = Matrix3x6::zeros();
        // Translation constrains the projection only for near points.
        if depth < self.config.maximum_depth_near {
            jacobian_transform
                .fixed_view_mut::<3, 3>(0, 0)
                .copy_from(&Matrix3::identity());
        }
        jacobian_transform
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-skew(&point_in_camera)));

        let jacobian_projection = Matrix3::new(
            inverse_depth, 0.0, -uvd_homogeneous.x * inverse_depth_squared,
            0.0, inverse_depth, -uvd_homogeneous.y * inverse_depth_squared,
            0.0, 0.0, 1.0,
        );

        let jacobian = jacobian_projection * self.camera.camera_matrix * jacobian_transform;

        // Depth confidence drops towards the sensor's effective range limits.
        if depth < self.config.maximum_depth_near {
            omega *= (self.config.maximum_depth_near - depth) / self.config.maximum_depth_near;
        } else {
            omega *= (self.config.maximum_depth_far - depth) / self.config.maximum_depth_far;
        }

        Some(Linearization {
            residual,
            jacobian,
            weight: omega,
        })
    }
}
