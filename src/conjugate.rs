//! Conjugate Gaussian and inverse-gamma updates.

use faer::linalg::solvers::DenseSolveCore;
use faer::Mat;
use rand::Rng;
use rand_distr::{Distribution, Gamma};

use crate::error::{check_len, Result, SpOccError};
use crate::linalg::{cholesky, draw_from_precision, mat_vec};
use crate::math::vector_dot;

/// Multivariate normal prior given by its mean and precision.
#[derive(Debug, Clone)]
pub struct NormalPrior {
    mean: Vec<f64>,
    precision: Mat<f64>,
    // Q0 * mu0, fixed for the whole run.
    precision_mean: Vec<f64>,
}

impl NormalPrior {
    pub fn new(mean: Vec<f64>, precision: Mat<f64>) -> Result<Self> {
        check_len("prior precision rows", mean.len(), precision.nrows())?;
        check_len("prior precision columns", mean.len(), precision.ncols())?;
        // Reject a degenerate precision before any sampling starts.
        cholesky(&precision, "prior precision")?;
        let mut precision_mean = vec![0f64; mean.len()];
        mat_vec(&precision, &mean, &mut precision_mean);
        Ok(Self {
            mean,
            precision,
            precision_mean,
        })
    }

    pub fn from_covariance(mean: Vec<f64>, covariance: &Mat<f64>) -> Result<Self> {
        check_len("prior covariance rows", mean.len(), covariance.nrows())?;
        check_len("prior covariance columns", mean.len(), covariance.ncols())?;
        let llt = cholesky(covariance, "prior covariance")?;
        Self::new(mean, llt.inverse())
    }

    /// Independent `N(mean, variance)` priors on every coefficient.
    pub fn isotropic(dim: usize, mean: f64, variance: f64) -> Result<Self> {
        if !(variance > 0.) {
            return Err(SpOccError::InvalidSetting(format!(
                "prior variance must be positive, got {}",
                variance
            )));
        }
        let precision = Mat::from_fn(dim, dim, |i, j| if i == j { 1. / variance } else { 0. });
        Self::new(vec![mean; dim], precision)
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn precision(&self) -> &Mat<f64> {
        &self.precision
    }
}

/// Reusable storage for [`draw_coefficients`].
#[derive(Debug, Clone)]
pub(crate) struct CoefScratch {
    posterior: Mat<f64>,
    rhs: Vec<f64>,
    weighted: Vec<f64>,
}

impl CoefScratch {
    pub(crate) fn new(n_rows: usize, dim: usize) -> Self {
        Self {
            posterior: Mat::zeros(dim, dim),
            rhs: vec![0f64; dim],
            weighted: vec![0f64; n_rows],
        }
    }
}

/// Draw regression coefficients from
/// `N(A^{-1} b, A^{-1})` with `A = X^T diag(omega) X + Q0` and
/// `b = X^T resid + Q0 mu0`.
///
/// Rows with zero weight and zero working response drop out, which is how
/// detection rows of unoccupied sites are excluded.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_coefficients<R: Rng + ?Sized>(
    design: &Mat<f64>,
    omega: &[f64],
    resid: &[f64],
    prior: &NormalPrior,
    scratch: &mut CoefScratch,
    what: &'static str,
    rng: &mut R,
    out: &mut [f64],
) -> Result<()> {
    let p = design.ncols();
    debug_assert_eq!(prior.dim(), p);
    debug_assert_eq!(omega.len(), design.nrows());

    for a in 0..p {
        let col_a = design.col_as_slice(a);
        for (wx, (&x, &om)) in scratch.weighted.iter_mut().zip(col_a.iter().zip(omega)) {
            *wx = x * om;
        }
        for b in a..p {
            let value = vector_dot(&scratch.weighted, design.col_as_slice(b)) + prior.precision[(b, a)];
            scratch.posterior[(b, a)] = value;
            scratch.posterior[(a, b)] = value;
        }
        scratch.rhs[a] = vector_dot(col_a, resid) + prior.precision_mean[a];
    }

    draw_from_precision(&scratch.posterior, &scratch.rhs, what, rng, out)
}

/// Draw from the inverse-gamma distribution with the given shape and rate.
pub fn sample_inv_gamma<R: Rng + ?Sized>(rng: &mut R, shape: f64, rate: f64) -> Result<f64> {
    let gamma = Gamma::new(shape, 1. / rate).map_err(|_| {
        SpOccError::InvalidSetting(format!(
            "invalid inverse-gamma parameters: shape {}, rate {}",
            shape, rate
        ))
    })?;
    Ok(1. / gamma.sample(rng))
}
