//! Model inputs: data, priors and starting values, and their validation.

use faer::Mat;
use serde::{Deserialize, Serialize};

use crate::conjugate::NormalPrior;
use crate::cov_model::CovModel;
use crate::error::{check_len, Result, SpOccError};
use crate::random_effects::RandomEffectGroup;
use crate::settings::{SamplerSettings, SigmaSqUpdate};
use crate::spatial::SpatialParams;

/// Detection data and covariates of the occupancy model.
///
/// Every observation belongs to exactly one site. An observation is either a
/// single visit (`trials == 1`) or an aggregated count of detections out of
/// `trials` visits.
#[derive(Debug, Clone)]
pub struct OccupancyData {
    pub y: Vec<u32>,
    pub trials: Vec<u32>,
    pub site_of_obs: Vec<usize>,
    /// Occurrence design, one row per site.
    pub x_occ: Mat<f64>,
    /// Detection design, one row per observation.
    pub x_det: Mat<f64>,
    pub coords: Vec<[f64; 2]>,
    /// Random intercepts on occurrence, indexed by site.
    pub occ_re: Vec<RandomEffectGroup>,
    /// Random intercepts on detection, indexed by observation.
    pub det_re: Vec<RandomEffectGroup>,
}

impl OccupancyData {
    pub fn n_sites(&self) -> usize {
        self.coords.len()
    }

    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n_sites = self.n_sites();
        let n_obs = self.n_obs();
        if n_sites == 0 {
            return Err(SpOccError::InvalidSetting("no sites".to_string()));
        }
        check_len("occurrence design rows", n_sites, self.x_occ.nrows())?;
        check_len("detection design rows", n_obs, self.x_det.nrows())?;
        check_len("trials", n_obs, self.trials.len())?;
        check_len("site index", n_obs, self.site_of_obs.len())?;
        for (obs, (&y, &k)) in self.y.iter().zip(&self.trials).enumerate() {
            if k == 0 || y > k {
                return Err(SpOccError::InvalidSetting(format!(
                    "observation {} has {} detections out of {} trials",
                    obs, y, k
                )));
            }
        }
        if let Some((obs, &site)) = self
            .site_of_obs
            .iter()
            .enumerate()
            .find(|(_, &site)| site >= n_sites)
        {
            return Err(SpOccError::InvalidSetting(format!(
                "observation {} refers to site {} of {}",
                obs, site, n_sites
            )));
        }
        for group in &self.occ_re {
            check_len("occurrence random effect units", n_sites, group.n_units())?;
        }
        for group in &self.det_re {
            check_len("detection random effect units", n_obs, group.n_units())?;
        }
        Ok(())
    }
}

/// Flat prior on an open interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformBounds {
    pub lower: f64,
    pub upper: f64,
}

impl UniformBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower && value < self.upper
    }

    fn check(&self, what: &'static str, value: f64) -> Result<()> {
        if !(self.lower < self.upper) {
            return Err(SpOccError::InvalidSetting(format!(
                "empty prior interval for {}: ({}, {})",
                what, self.lower, self.upper
            )));
        }
        if !self.contains(value) {
            return Err(SpOccError::OutOfBounds {
                what,
                value,
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
}

/// Inverse-gamma prior in the shape/rate parametrization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvGammaPrior {
    pub shape: f64,
    pub rate: f64,
}

impl InvGammaPrior {
    pub fn new(shape: f64, rate: f64) -> Self {
        Self { shape, rate }
    }

    fn check(&self, what: &str) -> Result<()> {
        if !(self.shape > 0. && self.rate > 0.) {
            return Err(SpOccError::InvalidSetting(format!(
                "inverse-gamma prior for {} needs positive shape and rate, got ({}, {})",
                what, self.shape, self.rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SigmaSqPrior {
    InverseGamma(InvGammaPrior),
    Uniform(UniformBounds),
}

#[derive(Debug, Clone)]
pub struct Priors {
    pub beta: NormalPrior,
    pub alpha: NormalPrior,
    pub sigma_sq: SigmaSqPrior,
    pub phi: UniformBounds,
    /// Required for the Matérn family.
    pub nu: Option<UniformBounds>,
    pub occ_re_variances: Vec<InvGammaPrior>,
    pub det_re_variances: Vec<InvGammaPrior>,
}

/// Starting values of one chain.
#[derive(Debug, Clone)]
pub struct InitialValues {
    pub beta: Vec<f64>,
    pub alpha: Vec<f64>,
    /// Sites with a detection always start occupied.
    pub z: Vec<bool>,
    pub w: Vec<f64>,
    pub params: SpatialParams,
    pub occ_re_variances: Vec<f64>,
    pub det_re_variances: Vec<f64>,
    /// Log proposal standard deviations of sigma^2, phi and (Matérn) nu.
    pub log_tuning: Vec<f64>,
}

/// Number of spatial hyperparameters reported for a covariance family.
pub fn n_theta(model: CovModel) -> usize {
    if model.has_smoothness() {
        3
    } else {
        2
    }
}

/// Check that data, priors, starting values and settings agree before any
/// sampling happens.
pub fn validate_inputs(
    data: &OccupancyData,
    priors: &Priors,
    inits: &InitialValues,
    model: CovModel,
    settings: &SamplerSettings,
) -> Result<()> {
    settings.validate()?;
    data.validate()?;

    let n_sites = data.n_sites();
    check_len("occurrence prior", data.x_occ.ncols(), priors.beta.dim())?;
    check_len("detection prior", data.x_det.ncols(), priors.alpha.dim())?;
    check_len("occurrence coefficients", data.x_occ.ncols(), inits.beta.len())?;
    check_len("detection coefficients", data.x_det.ncols(), inits.alpha.len())?;
    check_len("latent occupancy", n_sites, inits.z.len())?;
    check_len("spatial effects", n_sites, inits.w.len())?;
    check_len("tuning values", n_theta(model), inits.log_tuning.len())?;

    check_len("occurrence random effect priors", data.occ_re.len(), priors.occ_re_variances.len())?;
    check_len("detection random effect priors", data.det_re.len(), priors.det_re_variances.len())?;
    check_len("occurrence random effect variances", data.occ_re.len(), inits.occ_re_variances.len())?;
    check_len("detection random effect variances", data.det_re.len(), inits.det_re_variances.len())?;
    for prior in priors.occ_re_variances.iter() {
        prior.check("an occurrence random effect variance")?;
    }
    for prior in priors.det_re_variances.iter() {
        prior.check("a detection random effect variance")?;
    }
    if let Some(&v) = inits
        .occ_re_variances
        .iter()
        .chain(&inits.det_re_variances)
        .find(|&&v| !(v > 0.))
    {
        return Err(SpOccError::InvalidSetting(format!(
            "random effect variances must start positive, got {}",
            v
        )));
    }

    let params = &inits.params;
    if !(params.sigma_sq > 0.) {
        return Err(SpOccError::InvalidSetting(format!(
            "spatial variance must be positive, got {}",
            params.sigma_sq
        )));
    }
    if !settings.fixed.sigma_sq {
        match (settings.sigma_sq_update, &priors.sigma_sq) {
            (SigmaSqUpdate::InverseGamma, SigmaSqPrior::InverseGamma(prior)) => {
                prior.check("the spatial variance")?
            }
            (SigmaSqUpdate::Metropolis, SigmaSqPrior::Uniform(bounds)) => {
                bounds.check("sigma_sq", params.sigma_sq)?
            }
            (update, _) => {
                return Err(SpOccError::InvalidSetting(format!(
                    "the {:?} update of the spatial variance needs a matching prior",
                    update
                )))
            }
        }
    }
    if !(params.phi > 0.) {
        return Err(SpOccError::InvalidSetting(format!(
            "spatial decay must be positive, got {}",
            params.phi
        )));
    }
    if model.has_smoothness() && !(params.nu > 0.) {
        return Err(SpOccError::InvalidSetting(format!(
            "Matérn smoothness must be positive, got {}",
            params.nu
        )));
    }
    if !settings.fixed.phi {
        priors.phi.check("phi", params.phi)?;
        if model.has_smoothness() {
            let nu = priors.nu.ok_or_else(|| {
                SpOccError::InvalidSetting("the Matérn family needs a prior on nu".to_string())
            })?;
            nu.check("nu", params.nu)?;
        }
    }
    Ok(())
}
