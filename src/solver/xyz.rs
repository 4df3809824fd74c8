//! 3D Euclidean point-to-point residual model.
//!
//! Used for closure verification: estimates the rigid transform mapping the
//! query cloud onto the reference cloud.

use nalgebra::{Isometry3, Matrix3, Matrix3x6, Point3, Vector3};

use crate::geometry::skew;

use super::aligner::{Linearization, MeasurementModel};

/// One 3D-3D correspondence between a moving and a fixed point.
#[derive(Debug, Clone)]
pub struct XyzCorrespondence {
    /// Point expressed in the frame the estimate transforms from.
    pub moving: Vector3<f64>,

    /// Target point in the frame the estimate transforms into.
    pub fixed: Vector3<f64>,

    /// Per-correspondence weight scale; below 1.0 for points whose landmark
    /// estimate is not yet validated.
    pub weight: f64,
}

/// Point-to-point model: residual = T * moving - fixed.
pub struct XyzModel;

impl MeasurementModel for XyzModel {
    type Item = XyzCorrespondence;

    fn linearize(&self, estimate: &Isometry3<f64>, item: &Self::Item) -> Option<Linearization> {
        let predicted = estimate.transform_point(&Point3::from(item.moving)).coords;
        let residual = predicted - item.fixed;

        let mut jacobian = Matrix3x6::zeros();
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&Matrix3::identity());
        jacobian
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-skew(&predicted)));

        Some(Linearization {
            residual,
            jacobian,
            weight: Matrix3::identity() * item.weight,
        })
    }
}
