//! Pinhole camera container used by the reprojection residual model.

use nalgebra::{Matrix3, Vector3};

/// Pinhole intrinsics plus image bounds.
///
/// Only the projection needed inside the aligner is modeled here; full
/// intrinsic/extrinsic calibration belongs to the external frontend.
#[derive(Debug, Clone, Copy)]
pub struct PinholeCamera {
    /// 3x3 camera matrix K.
    pub camera_matrix: Matrix3<f64>,

    /// Image height in pixels.
    pub image_rows: f64,

    /// Image width in pixels.
    pub image_cols: f64,
}

impl PinholeCamera {
    pub fn new(camera_matrix: Matrix3<f64>, image_rows: u32, image_cols: u32) -> Self {
        Self {
            camera_matrix,
            image_rows: f64::from(image_rows),
            image_cols: f64::from(image_cols),
        }
    }

    /// Whether image coordinates `(u, v)` fall inside the image bounds.
    pub fn is_in_field_of_view(&self, image_coordinates: &Vector3<f64>) -> bool {
        image_coordinates.x >= 0.0
            && image_coordinates.x <= self.image_cols
            && image_coordinates.y >= 0.0
            && image_coordinates.y <= self.image_rows
    }
}
