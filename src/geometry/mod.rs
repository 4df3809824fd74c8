//! Geometry utilities: SE(3) helpers and the pinhole camera model.

pub mod camera;
pub mod se3;

pub use camera::PinholeCamera;
pub use se3::{exp_se3, skew};
