//! SE(3) Lie group utilities for the alignment solver.
//!
//! Incremental solver updates live in the 6-dimensional tangent space
//! (3 translation + 3 rotation parameters) and are composed onto the
//! manifold through the exponential map, never added to a rotation matrix
//! directly.

use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3, Vector6};

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Maps a minimal 6-parameter update `(tx, ty, tz, rx, ry, rz)` to a rigid
/// transform.
///
/// The rotation part is the SO(3) exponential of the axis-angle vector; the
/// translation part is applied directly. This matches the first-order
/// Jacobians `[I | -skew(p)]` used by the residual models, so the pairing is
/// consistent for the small per-round increments the solver produces.
pub fn exp_se3(dx: &Vector6<f64>) -> Isometry3<f64> {
    let translation = Vector3::new(dx[0], dx[1], dx[2]);
    let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(dx[3], dx[4], dx[5]));
    Isometry3::from_parts(Translation3::from(translation), rotation)
}
