//! Estimation back-end for a visual SLAM pipeline.
//!
//! Given frames already reduced to tracked feature points by an external
//! frontend, this crate maintains an incremental graph of local maps and 3D
//! landmarks, detects revisits of previously mapped places by matching
//! compact binary appearance descriptors, and geometrically verifies each
//! closure candidate with a robust damped Gauss-Newton alignment.
//!
//! The pipeline is strictly single-threaded: per incoming frame, window
//! accumulation, local-map segmentation and relocalization run in sequence.

pub mod config;
pub mod geometry;
pub mod io;
pub mod map;
pub mod metrics;
pub mod relocalization;
pub mod solver;
