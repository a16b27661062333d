//! Unstructured random intercepts with a shared variance per group.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::conjugate::sample_inv_gamma;
use crate::data::InvGammaPrior;
use crate::error::{Result, SpOccError};

/// One grouping factor: the level of every unit (site or observation).
#[derive(Debug, Clone, PartialEq)]
pub struct RandomEffectGroup {
    levels: Vec<usize>,
    n_levels: usize,
}

impl RandomEffectGroup {
    pub fn new(levels: Vec<usize>, n_levels: usize) -> Result<Self> {
        if let Some((unit, &level)) = levels.iter().enumerate().find(|(_, &l)| l >= n_levels) {
            return Err(SpOccError::InvalidSetting(format!(
                "unit {} has level {} but the group only has {} levels",
                unit, level, n_levels
            )));
        }
        Ok(Self { levels, n_levels })
    }

    /// Number the levels by order of first appearance.
    pub fn from_labels<T: PartialEq>(labels: &[T]) -> Self {
        let mut seen: Vec<&T> = Vec::new();
        let levels = labels
            .iter()
            .map(|label| match seen.iter().position(|s| *s == label) {
                Some(pos) => pos,
                None => {
                    seen.push(label);
                    seen.len() - 1
                }
            })
            .collect();
        Self {
            levels,
            n_levels: seen.len(),
        }
    }

    pub fn n_units(&self) -> usize {
        self.levels.len()
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    #[inline]
    pub fn level(&self, unit: usize) -> usize {
        self.levels[unit]
    }
}

/// Current intercepts and variances of all groups on one side of the model,
/// plus their summed contribution to every unit's linear predictor.
#[derive(Debug, Clone)]
pub(crate) struct RandomEffectState {
    values: Vec<Vec<f64>>,
    variances: Vec<f64>,
    contribution: Vec<f64>,
    precision: Vec<f64>,
    numerator: Vec<f64>,
}

impl RandomEffectState {
    /// Intercepts start at zero.
    pub(crate) fn new(groups: &[RandomEffectGroup], variances: Vec<f64>, n_units: usize) -> Self {
        let max_levels = groups.iter().map(|g| g.n_levels()).max().unwrap_or(0);
        Self {
            values: groups.iter().map(|g| vec![0f64; g.n_levels()]).collect(),
            variances,
            contribution: vec![0f64; n_units],
            precision: vec![0f64; max_levels],
            numerator: vec![0f64; max_levels],
        }
    }

    pub(crate) fn contribution(&self) -> &[f64] {
        &self.contribution
    }

    pub(crate) fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// All intercepts, group after group.
    pub(crate) fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied()
    }

    fn recompute(&mut self, groups: &[RandomEffectGroup]) {
        for (unit, total) in self.contribution.iter_mut().enumerate() {
            *total = groups
                .iter()
                .zip(self.values.iter())
                .map(|(group, values)| values[group.level(unit)])
                .sum();
        }
    }

    /// Gibbs update of every intercept, group by group.
    ///
    /// `offset` holds the fixed and spatial part of each unit's linear
    /// predictor. Units with zero weight and zero `kappa` drop out.
    pub(crate) fn update_levels<R: Rng + ?Sized>(
        &mut self,
        groups: &[RandomEffectGroup],
        omega: &[f64],
        kappa: &[f64],
        offset: &[f64],
        rng: &mut R,
    ) {
        for (g, group) in groups.iter().enumerate() {
            let n_levels = group.n_levels();
            let precision = &mut self.precision[..n_levels];
            let numerator = &mut self.numerator[..n_levels];
            precision.iter_mut().for_each(|p| *p = 0.);
            numerator.iter_mut().for_each(|n| *n = 0.);

            for unit in 0..group.n_units() {
                let level = group.level(unit);
                let others = offset[unit] + self.contribution[unit] - self.values[g][level];
                precision[level] += omega[unit];
                numerator[level] += kappa[unit] - omega[unit] * others;
            }

            let inv_var = 1. / self.variances[g];
            for (level, value) in self.values[g].iter_mut().enumerate() {
                let var = 1. / (precision[level] + inv_var);
                let z: f64 = rng.sample(StandardNormal);
                *value = var * numerator[level] + var.sqrt() * z;
            }
            self.recompute(groups);
        }
    }

    /// `sigma_g^2 ~ IG(a + L_g / 2, b + sum(level^2) / 2)` for every group.
    pub(crate) fn update_variances<R: Rng + ?Sized>(
        &mut self,
        priors: &[InvGammaPrior],
        rng: &mut R,
    ) -> Result<()> {
        for ((variance, values), prior) in self
            .variances
            .iter_mut()
            .zip(self.values.iter())
            .zip(priors)
        {
            let sum_sq: f64 = values.iter().map(|v| v * v).sum();
            *variance = sample_inv_gamma(
                rng,
                prior.shape + 0.5 * values.len() as f64,
                prior.rate + 0.5 * sum_sq,
            )?;
        }
        Ok(())
    }
}
