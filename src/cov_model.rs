//! Isotropic correlation families for the spatial process.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use crate::error::SpOccError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovModel {
    Exponential,
    Spherical,
    Gaussian,
    Matern,
}

impl CovModel {
    /// Whether the family has a smoothness parameter that is sampled.
    pub fn has_smoothness(&self) -> bool {
        matches!(self, CovModel::Matern)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CovModel::Exponential => "exponential",
            CovModel::Spherical => "spherical",
            CovModel::Gaussian => "gaussian",
            CovModel::Matern => "matern",
        }
    }

    /// Correlation at distance `dist` for decay `phi` and smoothness `nu`.
    ///
    /// `nu` is ignored by every family except Matérn. The Bessel function
    /// workspace in `scratch` is only touched for Matérn.
    pub fn correlation(&self, dist: f64, phi: f64, nu: f64, scratch: &mut BesselScratch) -> f64 {
        match self {
            CovModel::Exponential => (-phi * dist).exp(),
            CovModel::Spherical => {
                if dist <= 0. {
                    1.
                } else if dist < 1. / phi {
                    let u = phi * dist;
                    1. - 1.5 * u + 0.5 * u * u * u
                } else {
                    0.
                }
            }
            CovModel::Gaussian => {
                let u = phi * dist;
                (-u * u).exp()
            }
            CovModel::Matern => {
                if dist <= 0. {
                    return 1.;
                }
                let u = phi * dist;
                let log_scaled_k = scratch.bessel_k_scaled(u, nu).ln();
                let log_corr = nu * u.ln() - (nu - 1.) * std::f64::consts::LN_2 - ln_gamma(nu)
                    + log_scaled_k
                    - u;
                log_corr.exp().min(1.)
            }
        }
    }

    #[inline]
    pub fn covariance(
        &self,
        dist: f64,
        sigma_sq: f64,
        phi: f64,
        nu: f64,
        scratch: &mut BesselScratch,
    ) -> f64 {
        sigma_sq * self.correlation(dist, phi, nu, scratch)
    }
}

impl FromStr for CovModel {
    type Err = SpOccError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exponential" => Ok(CovModel::Exponential),
            "spherical" => Ok(CovModel::Spherical),
            "gaussian" => Ok(CovModel::Gaussian),
            "matern" => Ok(CovModel::Matern),
            other => Err(SpOccError::InvalidSetting(format!(
                "unknown covariance model '{}'",
                other
            ))),
        }
    }
}

#[inline]
pub(crate) fn distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

const MAX_BESSEL_TERMS: usize = 1 << 16;

/// Workspace for the modified Bessel function of the second kind.
///
/// The buffer holds the quadrature terms of a single evaluation and is cleared
/// at the start of the next one, so it never carries values across calls.
#[derive(Debug, Clone, Default)]
pub struct BesselScratch {
    terms: Vec<f64>,
}

impl BesselScratch {
    pub fn new() -> Self {
        Self {
            terms: Vec::with_capacity(256),
        }
    }

    /// `exp(x) * K_nu(x)` for `x > 0`.
    ///
    /// Uses `K_nu(x) = ∫_0^∞ exp(-x cosh t) cosh(nu t) dt` with the trapezoidal
    /// rule, which converges geometrically for this doubly exponentially
    /// decaying integrand.
    pub fn bessel_k_scaled(&mut self, x: f64, nu: f64) -> f64 {
        debug_assert!(x > 0.);
        self.terms.clear();

        let h = (0.5 / x.sqrt()).min(0.1);
        // Past this point the integrand is monotonically decreasing.
        let t_peak = (nu.abs() / x).asinh();
        let mut sum = 0f64;
        for k in 0..MAX_BESSEL_TERMS {
            let t = k as f64 * h;
            let mut term = (-x * (t.cosh() - 1.)).exp() * (nu * t).cosh();
            if k == 0 {
                term *= 0.5;
            }
            if !term.is_finite() {
                break;
            }
            self.terms.push(term);
            sum += term;
            if t > t_peak && term <= sum * 1e-17 {
                break;
            }
        }
        // Accumulate from the tail to keep the small terms.
        h * self.terms.iter().rev().sum::<f64>()
    }

    pub fn bessel_k(&mut self, x: f64, nu: f64) -> f64 {
        self.bessel_k_scaled(x, nu) * (-x).exp()
    }
}
