//! Loop-closure detection and geometric verification.
//!
//! The [`Relocalizer`] submits each new local map's appearance set to a
//! descriptor index, turns the raw matches into [`Closure`] hypotheses with
//! 1:1 landmark correspondences, and verifies them with the alignment
//! solver.

pub mod closure;
pub mod index;
pub mod relocalizer;

pub use closure::{Closure, ClosureAlignment, Correspondence};
pub use index::{
    AppearanceIndex, AppearanceMatch, AppearanceMerge, IndexedAppearance, LinearIndex,
};
pub use relocalizer::Relocalizer;
