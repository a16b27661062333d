use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Hyperparameters of the spatial Gaussian process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialParams {
    pub sigma_sq: f64,
    pub phi: f64,
    /// Matérn smoothness. Ignored by the other families.
    pub nu: f64,
}

/// Log-density pieces of `w ~ N(0, C)` that depend on the hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityTerms {
    /// `w^T C^{-1} w`
    pub quad: f64,
    /// `log |C|`
    pub log_det: f64,
}

impl DensityTerms {
    /// `-1/2 log |C| - 1/2 w^T C^{-1} w`
    pub fn log_density(&self) -> f64 {
        -0.5 * self.log_det - 0.5 * self.quad
    }
}

/// A representation of the spatial covariance that can be rebuilt for new
/// hyperparameters and used to update the spatial effects.
///
/// The built state lives in `Self::Precision`, which the caller owns. The
/// model itself only keeps geometry and scratch space, so a current and a
/// candidate precision can be built by the same model.
pub trait SpatialModel: Send {
    type Precision: Send;

    fn n_sites(&self) -> usize;

    /// An unbuilt precision with storage for this model.
    fn empty_precision(&self) -> Self::Precision;

    /// Rebuild `out` from scratch for `params`.
    fn rebuild(&mut self, params: &SpatialParams, out: &mut Self::Precision) -> Result<()>;

    fn density_terms(&self, precision: &Self::Precision, w: &[f64]) -> DensityTerms;

    /// Update `w` from its full conditional given Polya-Gamma weights `omega`
    /// and the working response `resid = kappa - omega * offset`.
    fn draw_effects<R: Rng + ?Sized>(
        &mut self,
        precision: &Self::Precision,
        omega: &[f64],
        resid: &[f64],
        rng: &mut R,
        w: &mut [f64],
    ) -> Result<()>;
}

/// Owned current and candidate precisions. Accepting a proposal swaps the two
/// buffers instead of copying.
#[derive(Debug)]
pub struct PrecisionPair<P> {
    current: P,
    candidate: P,
}

impl<P> PrecisionPair<P> {
    pub fn new(current: P, candidate: P) -> Self {
        Self { current, candidate }
    }

    pub fn current(&self) -> &P {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut P {
        &mut self.current
    }

    pub fn candidate(&self) -> &P {
        &self.candidate
    }

    pub fn candidate_mut(&mut self) -> &mut P {
        &mut self.candidate
    }

    /// Make the candidate current. The old current becomes scratch space for
    /// the next proposal.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.candidate);
    }
}
