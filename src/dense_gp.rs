//! Full Gaussian process with a dense `J x J` covariance.

use faer::linalg::solvers::DenseSolveCore;
use faer::Mat;
use rand::Rng;

use crate::cov_model::{distance, BesselScratch, CovModel};
use crate::error::Result;
use crate::linalg::{cholesky, draw_from_precision, log_det_chol, quad_form};
use crate::spatial::{DensityTerms, SpatialModel, SpatialParams};

#[derive(Debug, Clone)]
pub struct DensePrecision {
    precision: Mat<f64>,
    log_det: f64,
}

impl DensePrecision {
    /// `C^{-1}`
    pub fn precision(&self) -> &Mat<f64> {
        &self.precision
    }

    /// `log |C|`
    pub fn log_det(&self) -> f64 {
        self.log_det
    }
}

#[derive(Debug, Clone)]
pub struct DenseGp {
    model: CovModel,
    dists: Mat<f64>,
    scratch: BesselScratch,
    cov: Mat<f64>,
    posterior: Mat<f64>,
}

impl DenseGp {
    pub fn new(coords: &[[f64; 2]], model: CovModel) -> Self {
        let n = coords.len();
        let dists = Mat::from_fn(n, n, |i, j| distance(&coords[i], &coords[j]));
        Self {
            model,
            dists,
            scratch: BesselScratch::new(),
            cov: Mat::zeros(n, n),
            posterior: Mat::zeros(n, n),
        }
    }

    pub fn covariance(&mut self, params: &SpatialParams) -> Mat<f64> {
        self.fill_covariance(params);
        let n = self.cov.nrows();
        Mat::from_fn(n, n, |i, j| {
            if i >= j {
                self.cov[(i, j)]
            } else {
                self.cov[(j, i)]
            }
        })
    }

    // Only the lower triangle is written; the factorization reads no more.
    fn fill_covariance(&mut self, params: &SpatialParams) {
        let n = self.dists.nrows();
        for j in 0..n {
            for i in j..n {
                self.cov[(i, j)] = self.model.covariance(
                    self.dists[(i, j)],
                    params.sigma_sq,
                    params.phi,
                    params.nu,
                    &mut self.scratch,
                );
            }
        }
    }
}

impl SpatialModel for DenseGp {
    type Precision = DensePrecision;

    fn n_sites(&self) -> usize {
        self.dists.nrows()
    }

    fn empty_precision(&self) -> DensePrecision {
        let n = self.n_sites();
        DensePrecision {
            precision: Mat::zeros(n, n),
            log_det: 0.,
        }
    }

    fn rebuild(&mut self, params: &SpatialParams, out: &mut DensePrecision) -> Result<()> {
        self.fill_covariance(params);
        let llt = cholesky(&self.cov, "spatial covariance")?;
        out.log_det = log_det_chol(&llt);
        out.precision = llt.inverse();
        Ok(())
    }

    fn density_terms(&self, precision: &DensePrecision, w: &[f64]) -> DensityTerms {
        DensityTerms {
            quad: quad_form(&precision.precision, w),
            log_det: precision.log_det,
        }
    }

    fn draw_effects<R: Rng + ?Sized>(
        &mut self,
        precision: &DensePrecision,
        omega: &[f64],
        resid: &[f64],
        rng: &mut R,
        w: &mut [f64],
    ) -> Result<()> {
        self.posterior.copy_from(&precision.precision);
        for (i, &om) in omega.iter().enumerate() {
            self.posterior[(i, i)] += om;
        }
        draw_from_precision(
            &self.posterior,
            resid,
            "spatial effect posterior precision",
            rng,
            w,
        )
    }
}
