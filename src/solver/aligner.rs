//! Damped, robust Gauss-Newton convergence driver.

use nalgebra::{Isometry3, Matrix3, Matrix3x6, Matrix6, Vector3, Vector6};
use tracing::warn;

use crate::config::AlignerConfig;
use crate::geometry::exp_se3;

/// Number of outlier-excluding refinement rounds after convergence.
const REFINEMENT_ROUNDS: usize = 3;

/// One linearized correspondence: residual, Jacobian with respect to the
/// 6-parameter pose update, and the per-axis weight matrix.
#[derive(Debug, Clone)]
pub struct Linearization {
    pub residual: Vector3<f64>,
    pub jacobian: Matrix3x6<f64>,
    pub weight: Matrix3<f64>,
}

/// A residual strategy the alignment driver can iterate on.
///
/// `linearize` returns `None` when the predicted geometry is invalid for the
/// current estimate (behind the camera, out of the image, beyond the depth
/// range); such items are skipped silently for the round.
pub trait MeasurementModel {
    type Item;

    fn linearize(&self, estimate: &Isometry3<f64>, item: &Self::Item) -> Option<Linearization>;
}

/// Generic damped robust Gauss-Newton engine over a set of correspondences.
///
/// The estimate is updated through the rigid-motion exponential map and its
/// rotation is renormalized every round to counter numerical drift.
pub struct Aligner<'a, M: MeasurementModel> {
    model: &'a M,
    items: &'a [M::Item],
    config: &'a AlignerConfig,

    estimate: Isometry3<f64>,
    h: Matrix6<f64>,
    b: Vector6<f64>,

    total_error: f64,
    errors: Vec<f64>,
    inliers: Vec<bool>,
    number_of_inliers: usize,
    number_of_outliers: usize,

    information: Matrix6<f64>,
    converged: bool,
}

impl<'a, M: MeasurementModel> Aligner<'a, M> {
    pub fn new(model: &'a M, items: &'a [M::Item], config: &'a AlignerConfig) -> Self {
        Self {
            model,
            items,
            config,
            estimate: Isometry3::identity(),
            h: Matrix6::zeros(),
            b: Vector6::zeros(),
            total_error: 0.0,
            errors: vec![-1.0; items.len()],
            inliers: vec![false; items.len()],
            number_of_inliers: 0,
            number_of_outliers: 0,
            information: Matrix6::zeros(),
            converged: false,
        }
    }

    /// Reset all per-run accumulators and store the seed transform.
    pub fn initialize(&mut self, estimate: Isometry3<f64>) {
        self.estimate = estimate;
        self.h = Matrix6::zeros();
        self.b = Vector6::zeros();
        self.total_error = 0.0;
        self.errors = vec![-1.0; self.items.len()];
        self.inliers = vec![false; self.items.len()];
        self.number_of_inliers = 0;
        self.number_of_outliers = 0;
        self.information = Matrix6::zeros();
        self.converged = false;
    }

    /// Perform exactly one linearize-and-update step.
    ///
    /// Correspondences whose chi-square exceeds the kernel threshold are
    /// marked outliers; they are skipped when `ignore_outliers` is set and
    /// otherwise down-weighted by `threshold / chi` so their influence stays
    /// bounded.
    pub fn one_round(&mut self, ignore_outliers: bool) {
        self.h = Matrix6::zeros();
        self.b = Vector6::zeros();
        self.total_error = 0.0;
        self.number_of_inliers = 0;
        self.number_of_outliers = 0;

        for (index, item) in self.items.iter().enumerate() {
            self.errors[index] = -1.0;
            self.inliers[index] = false;

            let Some(linearization) = self.model.linearize(&self.estimate, item) else {
                continue;
            };
            let mut omega = linearization.weight;

            let chi = linearization.residual.norm_squared();
            self.errors[index] = chi;

            if chi > self.config.maximum_error_kernel {
                self.number_of_outliers += 1;
                if ignore_outliers {
                    continue;
                }
                omega *= self.config.maximum_error_kernel / chi;
            } else {
                self.inliers[index] = true;
                self.number_of_inliers += 1;
            }
            self.total_error += chi;

            let jacobian_transposed = linearization.jacobian.transpose();
            self.h += jacobian_transposed * omega * linearization.jacobian;
            self.b += jacobian_transposed * omega * linearization.residual;
        }

        // Levenberg-Marquardt style damping keeps the system solvable even
        // when the linearization is near-singular.
        self.h += self.config.damping * Matrix6::identity();

        let dx = match self.h.cholesky() {
            Some(cholesky) => cholesky.solve(&(-self.b)),
            None => Vector6::zeros(),
        };
        self.estimate = exp_se3(&dx) * self.estimate;
        let _ = self.estimate.rotation.renormalize();
    }

    /// Iterate `one_round` until the error improvement falls below the
    /// configured epsilon or the iteration budget is exhausted.
    ///
    /// On convergence, three outlier-excluding refinement rounds are run and
    /// the final Hessian is recorded as the information matrix. A
    /// non-converged run is reported through the `converged` flag plus a
    /// diagnostic, never an error; the caller decides what to do with it.
    pub fn converge(&mut self) {
        debug_assert!(
            !self.items.is_empty(),
            "converge called without correspondences"
        );
        if self.items.is_empty() {
            self.converged = false;
            warn!("alignment requested with no correspondences");
            return;
        }

        let mut total_error_previous = 0.0;
        for iteration in 0..self.config.maximum_number_of_iterations {
            self.one_round(false);

            if (total_error_previous - self.total_error).abs()
                < self.config.error_delta_for_convergence
            {
                for _ in 0..REFINEMENT_ROUNDS {
                    self.one_round(true);
                }
                self.information = self.h;
                self.converged = true;
                return;
            }
            total_error_previous = self.total_error;

            if iteration == self.config.maximum_number_of_iterations - 1 {
                self.converged = false;
                let measured = self.number_of_inliers + self.number_of_outliers;
                warn!(
                    total_error = self.total_error,
                    average_error = self.total_error / measured.max(1) as f64,
                    inliers = self.number_of_inliers,
                    outliers = self.number_of_outliers,
                    "alignment did not converge"
                );
            }
        }
    }

    pub fn estimate(&self) -> Isometry3<f64> {
        self.estimate
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Final Hessian of the converged system, usable as an inverse-covariance
    /// confidence measure for the estimate.
    pub fn information(&self) -> Matrix6<f64> {
        self.information
    }

    pub fn total_error(&self) -> f64 {
        self.total_error
    }

    /// Per-item chi-square of the last round; -1 for skipped items.
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn inliers(&self) -> &[bool] {
        &self.inliers
    }

    pub fn number_of_inliers(&self) -> usize {
        self.number_of_inliers
    }

    pub fn number_of_outliers(&self) -> usize {
        self.number_of_outliers
    }

    /// Fraction of measured correspondences classified as inliers in the
    /// last round.
    pub fn inlier_ratio(&self) -> f64 {
        let measured = self.number_of_inliers + self.number_of_outliers;
        if measured == 0 {
            0.0
        } else {
            self.number_of_inliers as f64 / measured as f64
        }
    }
}
