use rand::Rng;
use rand_distr::StandardNormal;

use crate::math::{logit, logit_inv};

/// Batch-wise tuning of Metropolis proposal scales.
///
/// Every tuned parameter has a log proposal standard deviation. At the end of
/// each batch its acceptance rate is compared with the target and the log
/// scale moves up or down by `min(0.01, 1 / sqrt(batch))`.
#[derive(Debug, Clone)]
pub struct BatchTuner {
    log_sd: Vec<f64>,
    accepted: Vec<u64>,
    batch_length: usize,
    target: f64,
}

impl BatchTuner {
    pub fn new(initial_log_sd: Vec<f64>, batch_length: usize, target: f64) -> Self {
        let n = initial_log_sd.len();
        Self {
            log_sd: initial_log_sd,
            accepted: vec![0; n],
            batch_length,
            target,
        }
    }

    pub fn n_params(&self) -> usize {
        self.log_sd.len()
    }

    #[inline]
    pub fn proposal_sd(&self, param: usize) -> f64 {
        self.log_sd[param].exp()
    }

    pub fn log_sd(&self) -> &[f64] {
        &self.log_sd
    }

    #[inline]
    pub fn record_accept(&mut self, param: usize) {
        self.accepted[param] += 1;
    }

    /// Step applied to the log scales after batch `batch` (zero based).
    pub fn step_size(batch: usize) -> f64 {
        // The first batch would otherwise divide by zero.
        let batch = batch.max(1) as f64;
        0.01f64.min(1. / batch.sqrt())
    }

    /// Close batch `batch`: write the acceptance rates into `rates`, adjust the
    /// scales and reset the counters.
    pub fn end_batch(&mut self, batch: usize, rates: &mut [f64]) {
        debug_assert_eq!(rates.len(), self.n_params());
        let step = Self::step_size(batch);
        let length = self.batch_length.max(1) as f64;
        for ((log_sd, accepted), rate) in self
            .log_sd
            .iter_mut()
            .zip(self.accepted.iter_mut())
            .zip(rates.iter_mut())
        {
            *rate = *accepted as f64 / length;
            if *rate > self.target {
                *log_sd += step;
            } else {
                *log_sd -= step;
            }
            *accepted = 0;
        }
    }
}

/// Random walk proposal on the logit scale of `(lower, upper)`.
pub fn propose_logit<R: Rng + ?Sized>(
    rng: &mut R,
    current: f64,
    lower: f64,
    upper: f64,
    sd: f64,
) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    logit_inv(logit(current, lower, upper) + sd * z, lower, upper)
}
