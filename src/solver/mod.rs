//! Robust iterative least-squares alignment.
//!
//! A single damped Gauss-Newton driver ([`Aligner`]) is parameterized over a
//! pluggable residual strategy ([`MeasurementModel`]); the two shipped
//! models are the 3D point-to-point alignment used for closure verification
//! ([`XyzModel`]) and the image-coordinate-plus-depth model used for
//! frame-to-frame tracking ([`UvdModel`]).

pub mod aligner;
pub mod uvd;
pub mod xyz;

pub use aligner::{Aligner, Linearization, MeasurementModel};
pub use uvd::{UvdMeasurement, UvdModel};
pub use xyz::{XyzCorrespondence, XyzModel};
