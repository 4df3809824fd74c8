//! Persistence of estimation results.

pub mod trajectory;

pub use trajectory::write_trajectory;
