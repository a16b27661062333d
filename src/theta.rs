//! Updates of the spatial hyperparameters.

use log::debug;
use rand::Rng;

use crate::adapt::{propose_logit, BatchTuner};
use crate::conjugate::sample_inv_gamma;
use crate::cov_model::CovModel;
use crate::data::{InvGammaPrior, Priors, SigmaSqPrior, UniformBounds};
use crate::error::Result;
use crate::math::log_jacobian_uniform;
use crate::settings::{SamplerSettings, SigmaSqUpdate};
use crate::spatial::{PrecisionPair, SpatialModel, SpatialParams};

pub const SIGMA_SQ: usize = 0;
pub const PHI: usize = 1;
pub const NU: usize = 2;

pub const THETA_NAMES: [&str; 3] = ["sigma_sq", "phi", "nu"];

#[inline]
fn get(params: &SpatialParams, which: usize) -> f64 {
    match which {
        SIGMA_SQ => params.sigma_sq,
        PHI => params.phi,
        _ => params.nu,
    }
}

#[inline]
fn set(params: &mut SpatialParams, which: usize, value: f64) {
    match which {
        SIGMA_SQ => params.sigma_sq = value,
        PHI => params.phi = value,
        _ => params.nu = value,
    }
}

/// Which hyperparameters move and how.
#[derive(Debug, Clone)]
pub(crate) struct ThetaUpdate {
    sigma_sq_ig: Option<InvGammaPrior>,
    /// Parameters in the joint Metropolis step, with their prior bounds.
    metropolis: Vec<(usize, UniformBounds)>,
}

impl ThetaUpdate {
    /// Assumes the inputs passed validation.
    pub(crate) fn new(priors: &Priors, model: CovModel, settings: &SamplerSettings) -> Self {
        let mut sigma_sq_ig = None;
        let mut metropolis = Vec::new();
        if !settings.fixed.sigma_sq {
            match (settings.sigma_sq_update, priors.sigma_sq) {
                (SigmaSqUpdate::InverseGamma, SigmaSqPrior::InverseGamma(prior)) => {
                    sigma_sq_ig = Some(prior)
                }
                (SigmaSqUpdate::Metropolis, SigmaSqPrior::Uniform(bounds)) => {
                    metropolis.push((SIGMA_SQ, bounds))
                }
                _ => {}
            }
        }
        if !settings.fixed.phi {
            metropolis.push((PHI, priors.phi));
            if let (true, Some(nu)) = (model.has_smoothness(), priors.nu) {
                metropolis.push((NU, nu));
            }
        }
        Self {
            sigma_sq_ig,
            metropolis,
        }
    }

    pub(crate) fn is_fixed(&self) -> bool {
        self.sigma_sq_ig.is_none() && self.metropolis.is_empty()
    }

    /// Full hyperparameter update for one iteration: the conjugate variance
    /// draw (if configured) followed by the joint Metropolis step.
    ///
    /// On return the current precision of `pair` matches `params`.
    pub(crate) fn update<S: SpatialModel, R: Rng + ?Sized>(
        &self,
        model: &mut S,
        pair: &mut PrecisionPair<S::Precision>,
        params: &mut SpatialParams,
        w: &[f64],
        tuner: &mut BatchTuner,
        rng: &mut R,
    ) -> Result<()> {
        if let Some(prior) = self.sigma_sq_ig {
            update_sigma_sq(model, pair, params, w, prior, rng)?;
        }
        if !self.metropolis.is_empty() {
            metropolis_step(model, pair, params, w, &self.metropolis, tuner, rng)?;
        }
        Ok(())
    }
}

/// `sigma^2 ~ IG(a + J/2, b + sigma^2 * w^T C^{-1} w / 2)`, followed by a
/// rebuild of the current precision.
pub(crate) fn update_sigma_sq<S: SpatialModel, R: Rng + ?Sized>(
    model: &mut S,
    pair: &mut PrecisionPair<S::Precision>,
    params: &mut SpatialParams,
    w: &[f64],
    prior: InvGammaPrior,
    rng: &mut R,
) -> Result<()> {
    let terms = model.density_terms(pair.current(), w);
    // sigma^2 * quad is the quadratic form under the correlation matrix.
    let rate = prior.rate + 0.5 * params.sigma_sq * terms.quad;
    let shape = prior.shape + 0.5 * w.len() as f64;
    params.sigma_sq = sample_inv_gamma(rng, shape, rate)?;
    model.rebuild(params, pair.current_mut())
}

/// Propose every listed parameter on its logit scale and accept or reject the
/// proposal as a whole. Returns whether the proposal was accepted.
///
/// A rejection leaves `params` and the current precision untouched.
pub(crate) fn metropolis_step<S: SpatialModel, R: Rng + ?Sized>(
    model: &mut S,
    pair: &mut PrecisionPair<S::Precision>,
    params: &mut SpatialParams,
    w: &[f64],
    free: &[(usize, UniformBounds)],
    tuner: &mut BatchTuner,
    rng: &mut R,
) -> Result<bool> {
    let mut candidate = *params;
    let mut log_post_curr = 0f64;
    let mut log_post_cand = 0f64;
    for &(which, bounds) in free {
        let current = get(params, which);
        let proposed = propose_logit(
            rng,
            current,
            bounds.lower,
            bounds.upper,
            tuner.proposal_sd(which),
        );
        set(&mut candidate, which, proposed);
        log_post_curr += log_jacobian_uniform(current, bounds.lower, bounds.upper);
        log_post_cand += log_jacobian_uniform(proposed, bounds.lower, bounds.upper);
    }

    model.rebuild(&candidate, pair.candidate_mut())?;
    log_post_cand += model.density_terms(pair.candidate(), w).log_density();
    log_post_curr += model.density_terms(pair.current(), w).log_density();

    let log_ratio = log_post_cand - log_post_curr;
    if rng.random::<f64>() <= log_ratio.exp() {
        pair.swap();
        *params = candidate;
        for &(which, _) in free {
            tuner.record_accept(which);
        }
        Ok(true)
    } else {
        debug!("rejected spatial proposal, log ratio {:.3}", log_ratio);
        Ok(false)
    }
}
