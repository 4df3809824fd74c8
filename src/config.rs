//! Externally supplied configuration for the solver, relocalizer and
//! world-map lifecycle policies.
//!
//! Every struct carries a `Default` impl with the values used by the
//! reference pipeline and derives `Deserialize` so a caller can load the
//! whole set from a configuration file.

use serde::Deserialize;

/// Configuration for the iterative alignment solver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Maximum number of linearize-and-update rounds per `converge()` call.
    pub maximum_number_of_iterations: usize,

    /// Convergence threshold on the change of the total error between rounds.
    pub error_delta_for_convergence: f64,

    /// Chi-square threshold above which a correspondence is an outlier and
    /// its influence is bounded by the robust kernel.
    pub maximum_error_kernel: f64,

    /// Fixed damping added to the Hessian diagonal before solving, so the
    /// normal equations stay solvable even when near-singular.
    pub damping: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            maximum_number_of_iterations: 100,
            error_delta_for_convergence: 1e-5,
            maximum_error_kernel: 1.0,
            damping: 1.0,
        }
    }
}

/// Configuration for the reprojection (image-plus-depth) residual model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UvdModelConfig {
    /// Depth below which a point is near enough to constrain translation.
    pub maximum_depth_near: f64,

    /// Depth beyond which a predicted point is discarded for the round.
    pub maximum_depth_far: f64,

    /// Weight attenuation for raw frame points that are not yet backed by a
    /// validated landmark estimate.
    pub weight_framepoint: f64,
}

impl Default for UvdModelConfig {
    fn default() -> Self {
        Self {
            maximum_depth_near: 5.0,
            maximum_depth_far: 20.0,
            weight_framepoint: 0.1,
        }
    }
}

/// Configuration for closure detection and verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelocalizerConfig {
    /// Minimum number of indexed local maps before matching is attempted,
    /// and the minimum index gap between a query and an eligible reference.
    /// Prevents trivial self-matches against the immediate past.
    pub minimum_interspace: usize,

    /// Minimum fraction of query descriptors that must find a match in a
    /// reference entry for the candidate to be considered.
    pub minimum_matching_ratio: f64,

    /// Minimum number of distinct matched query landmarks per candidate.
    pub minimum_matched_landmarks: usize,

    /// A correspondence is accepted only if its majority vote count is
    /// strictly greater than this.
    pub minimum_matches_per_correspondence: usize,

    /// Maximum Hamming distance for a descriptor match.
    pub maximum_descriptor_distance: u32,

    /// Solver settings used for geometric verification of closures.
    pub aligner: AlignerConfig,

    /// Weight attenuation for correspondences whose landmarks are not yet
    /// validated.
    pub weight_unvalidated_landmark: f64,
}

impl Default for RelocalizerConfig {
    fn default() -> Self {
        Self {
            minimum_interspace: 5,
            minimum_matching_ratio: 0.1,
            minimum_matched_landmarks: 20,
            minimum_matches_per_correspondence: 0,
            maximum_descriptor_distance: 25,
            aligner: AlignerConfig {
                maximum_error_kernel: 0.25,
                ..AlignerConfig::default()
            },
            weight_unvalidated_landmark: 0.1,
        }
    }
}

/// Segmentation policy deciding when the sliding frame window crystallizes
/// into a new local map.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Minimum translational distance traveled since the last boundary.
    pub minimum_distance_traveled: f64,

    /// Minimum rotation accumulated since the last boundary, in radians.
    pub minimum_rotation_accumulated: f64,

    /// Minimum number of buffered frames before a local map may be created.
    /// Guards against over-segmentation on pure-rotation jitter.
    pub minimum_number_of_frames: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            minimum_distance_traveled: 0.5,
            minimum_rotation_accumulated: 0.5,
            minimum_number_of_frames: 4,
        }
    }
}

/// Policy for periodic landmark garbage collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PurificationConfig {
    /// Landmarks not observed for this many frames are reclaimed unless
    /// they are anchored by a local-map appearance.
    pub maximum_frames_unseen: u64,
}

impl Default for PurificationConfig {
    fn default() -> Self {
        Self {
            maximum_frames_unseen: 50,
        }
    }
}
