use serde::{Deserialize, Serialize};

use crate::error::{Result, SpOccError};

/// How the spatial variance is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigmaSqUpdate {
    /// Exact draw from its inverse-gamma full conditional.
    InverseGamma,
    /// Logit random walk under a bounded uniform prior, accepted jointly with
    /// the decay and smoothness.
    Metropolis,
}

/// Parameter groups that stay at their starting values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedParams {
    pub beta: bool,
    pub alpha: bool,
    pub sigma_sq: bool,
    /// Also holds the Matérn smoothness fixed.
    pub phi: bool,
    pub occ_re_variances: bool,
    pub det_re_variances: bool,
}

/// Settings for one chain of the occupancy sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Number of adaptation batches. The total number of iterations is
    /// `n_batch * batch_length`.
    pub n_batch: usize,
    pub batch_length: usize,
    /// Target acceptance rate of the hyperparameter proposals.
    pub accept_rate: f64,
    /// Iterations discarded before any draw is stored.
    pub n_burn: usize,
    /// Keep every `n_thin`-th iteration after burn-in.
    pub n_thin: usize,
    pub sigma_sq_update: SigmaSqUpdate,
    pub fixed: FixedParams,
    /// Worker threads for the NNGP rebuild.
    pub n_threads: usize,
    pub seed: u64,
    /// Stream id of the chain. Chains with the same seed and different ids
    /// are independent.
    pub chain: u64,
    /// Log a batch report every this many batches. Zero disables it.
    pub report_every: usize,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            n_batch: 400,
            batch_length: 25,
            accept_rate: 0.43,
            n_burn: 1000,
            n_thin: 1,
            sigma_sq_update: SigmaSqUpdate::InverseGamma,
            fixed: FixedParams::default(),
            n_threads: 1,
            seed: 0,
            chain: 0,
            report_every: 100,
        }
    }
}

impl SamplerSettings {
    pub fn n_samples(&self) -> usize {
        self.n_batch * self.batch_length
    }

    /// Number of stored draws after burn-in and thinning.
    pub fn n_kept(&self) -> usize {
        self.n_samples().saturating_sub(self.n_burn) / self.n_thin.max(1)
    }

    /// Whether iteration `iter` (zero based) is stored.
    #[inline]
    pub fn keeps(&self, iter: usize) -> bool {
        iter >= self.n_burn && (iter - self.n_burn + 1) % self.n_thin == 0
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SpOccError::InvalidSetting(msg));
        if self.n_batch == 0 || self.batch_length == 0 {
            return invalid(format!(
                "need at least one batch of positive length, got {} batches of length {}",
                self.n_batch, self.batch_length
            ));
        }
        if !(self.accept_rate > 0. && self.accept_rate < 1.) {
            return invalid(format!(
                "target acceptance rate must lie in (0, 1), got {}",
                self.accept_rate
            ));
        }
        if self.n_thin == 0 {
            return invalid("thinning interval must be at least one".to_string());
        }
        if self.n_burn >= self.n_samples() {
            return invalid(format!(
                "burn-in of {} leaves no draws out of {} iterations",
                self.n_burn,
                self.n_samples()
            ));
        }
        if self.n_threads == 0 {
            return invalid("need at least one thread".to_string());
        }
        Ok(())
    }
}
