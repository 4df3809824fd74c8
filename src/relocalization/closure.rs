//! Loop-closure hypotheses and their correspondence sets.

use nalgebra::{Isometry3, Matrix6};

use crate::map::{LandmarkId, LocalMapId};

/// A matched (query landmark, reference landmark) pair within a closure.
#[derive(Debug, Clone)]
pub struct Correspondence {
    pub query: LandmarkId,
    pub reference: LandmarkId,

    /// How many raw descriptor matches voted for this pairing.
    pub votes: usize,

    /// Fraction of the query landmark's matches that voted for it.
    pub confidence: f64,
}

/// Geometric-verification outcome attached by closure registration.
///
/// Acceptance or rejection of the closure stays with the consumer; the
/// convergence flag and inlier ratio are the signals exposed for it.
#[derive(Debug, Clone)]
pub struct ClosureAlignment {
    /// Estimated transform mapping query-local coordinates into the
    /// reference local map frame.
    pub query_to_reference: Isometry3<f64>,

    /// Final system matrix of the alignment, usable as the information
    /// matrix of the closure constraint.
    pub information: Matrix6<f64>,

    pub converged: bool,
    pub inlier_ratio: f64,
}

/// A candidate (and, once verified, resolved) loop closure between two
/// local maps.
#[derive(Debug, Clone)]
pub struct Closure {
    pub query: LocalMapId,
    pub reference: LocalMapId,

    /// Number of distinct query landmarks with at least one raw match.
    pub matched_landmarks: usize,

    /// Matched query descriptors over total query descriptors.
    pub match_ratio: f64,

    /// Accepted 1:1 landmark correspondences, in selection order.
    pub correspondences: Vec<Correspondence>,

    /// Filled in by registration; `None` until then.
    pub alignment: Option<ClosureAlignment>,
}

impl Closure {
    pub fn new(
        query: LocalMapId,
        reference: LocalMapId,
        matched_landmarks: usize,
        match_ratio: f64,
        correspondences: Vec<Correspondence>,
    ) -> Self {
        Self {
            query,
            reference,
            matched_landmarks,
            match_ratio,
            correspondences,
            alignment: None,
        }
    }
}
