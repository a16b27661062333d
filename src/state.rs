//! Mutable state of one chain and the Gibbs steps that act on it.

use rand::Rng;

use crate::conjugate::{draw_coefficients, CoefScratch};
use crate::data::{InitialValues, OccupancyData, Priors};
use crate::error::Result;
use crate::linalg::mat_vec;
use crate::math::axpy;
use crate::occupancy::{
    detected_sites, draw_replicates, site_likelihood, update_latent_state, ObsBySite,
};
use crate::polya_gamma::{sample_pg, sample_pg1};
use crate::random_effects::RandomEffectState;
use crate::settings::FixedParams;
use crate::spatial::{SpatialModel, SpatialParams};
use crate::trace::{write_row, Trace};

/// Everything a chain carries from one iteration to the next.
///
/// The linear predictors are caches: `occ_lin` is `x_beta + w + occ_re` and
/// `det_lin` is `x_alpha + det_re`. Each step that changes one of the parts
/// refreshes the cache it feeds.
#[derive(Debug)]
pub(crate) struct ChainState {
    pub beta: Vec<f64>,
    pub alpha: Vec<f64>,
    pub z: Vec<bool>,
    pub w: Vec<f64>,
    pub params: SpatialParams,
    pub occ_re: RandomEffectState,
    pub det_re: RandomEffectState,

    omega_occ: Vec<f64>,
    kappa_occ: Vec<f64>,
    omega_det: Vec<f64>,
    kappa_det: Vec<f64>,

    x_beta: Vec<f64>,
    x_alpha: Vec<f64>,
    occ_lin: Vec<f64>,
    det_lin: Vec<f64>,

    psi: Vec<f64>,
    like: Vec<f64>,
    y_rep: Vec<u32>,

    resid_occ: Vec<f64>,
    resid_det: Vec<f64>,
    offset_occ: Vec<f64>,
    beta_scratch: CoefScratch,
    alpha_scratch: CoefScratch,

    by_site: ObsBySite,
    detected: Vec<bool>,
}

impl ChainState {
    /// Assumes the inputs passed validation.
    pub(crate) fn new(data: &OccupancyData, inits: &InitialValues) -> Self {
        let n_sites = data.n_sites();
        let n_obs = data.n_obs();
        let by_site = ObsBySite::new(&data.site_of_obs, n_sites);
        let detected = detected_sites(data, &by_site);
        let z = inits
            .z
            .iter()
            .zip(detected.iter())
            .map(|(&z, &d)| z || d)
            .collect();

        let mut state = Self {
            beta: inits.beta.clone(),
            alpha: inits.alpha.clone(),
            z,
            w: inits.w.clone(),
            params: inits.params,
            occ_re: RandomEffectState::new(&data.occ_re, inits.occ_re_variances.clone(), n_sites),
            det_re: RandomEffectState::new(&data.det_re, inits.det_re_variances.clone(), n_obs),
            omega_occ: vec![0f64; n_sites],
            kappa_occ: vec![0f64; n_sites],
            omega_det: vec![0f64; n_obs],
            kappa_det: vec![0f64; n_obs],
            x_beta: vec![0f64; n_sites],
            x_alpha: vec![0f64; n_obs],
            occ_lin: vec![0f64; n_sites],
            det_lin: vec![0f64; n_obs],
            psi: vec![0f64; n_sites],
            like: vec![0f64; n_sites],
            y_rep: vec![0u32; n_obs],
            resid_occ: vec![0f64; n_sites],
            resid_det: vec![0f64; n_obs],
            offset_occ: vec![0f64; n_sites],
            beta_scratch: CoefScratch::new(n_sites, data.x_occ.ncols()),
            alpha_scratch: CoefScratch::new(n_obs, data.x_det.ncols()),
            by_site,
            detected,
        };
        mat_vec(&data.x_occ, &state.beta, &mut state.x_beta);
        mat_vec(&data.x_det, &state.alpha, &mut state.x_alpha);
        state.refresh_occ_lin();
        state.refresh_det_lin();
        state
    }

    fn refresh_occ_lin(&mut self) {
        self.occ_lin.copy_from_slice(&self.x_beta);
        axpy(&self.w, &mut self.occ_lin, 1.);
        axpy(self.occ_re.contribution(), &mut self.occ_lin, 1.);
    }

    fn refresh_det_lin(&mut self) {
        self.det_lin.copy_from_slice(&self.x_alpha);
        axpy(self.det_re.contribution(), &mut self.det_lin, 1.);
    }

    /// Polya-Gamma weights and working responses of both model levels.
    ///
    /// Detection rows of unoccupied sites get zero weight and zero response so
    /// they drop out of every detection update.
    pub(crate) fn draw_auxiliaries<R: Rng + ?Sized>(&mut self, data: &OccupancyData, rng: &mut R) {
        for site in 0..self.z.len() {
            self.omega_occ[site] = sample_pg1(rng, self.occ_lin[site]);
            self.kappa_occ[site] = if self.z[site] { 0.5 } else { -0.5 };
        }
        for i in 0..data.n_obs() {
            if self.z[data.site_of_obs[i]] {
                let trials = data.trials[i];
                self.omega_det[i] = sample_pg(rng, trials as usize, self.det_lin[i]);
                self.kappa_det[i] = data.y[i] as f64 - 0.5 * trials as f64;
            } else {
                self.omega_det[i] = 0.;
                self.kappa_det[i] = 0.;
            }
        }
    }

    pub(crate) fn update_beta<R: Rng + ?Sized>(
        &mut self,
        data: &OccupancyData,
        priors: &Priors,
        rng: &mut R,
    ) -> Result<()> {
        let re = self.occ_re.contribution();
        for site in 0..self.resid_occ.len() {
            self.resid_occ[site] =
                self.kappa_occ[site] - self.omega_occ[site] * (self.w[site] + re[site]);
        }
        draw_coefficients(
            &data.x_occ,
            &self.omega_occ,
            &self.resid_occ,
            &priors.beta,
            &mut self.beta_scratch,
            "occurrence coefficient posterior",
            rng,
            &mut self.beta,
        )?;
        mat_vec(&data.x_occ, &self.beta, &mut self.x_beta);
        self.refresh_occ_lin();
        Ok(())
    }

    pub(crate) fn update_alpha<R: Rng + ?Sized>(
        &mut self,
        data: &OccupancyData,
        priors: &Priors,
        rng: &mut R,
    ) -> Result<()> {
        let re = self.det_re.contribution();
        for i in 0..self.resid_det.len() {
            self.resid_det[i] = self.kappa_det[i] - self.omega_det[i] * re[i];
        }
        draw_coefficients(
            &data.x_det,
            &self.omega_det,
            &self.resid_det,
            &priors.alpha,
            &mut self.alpha_scratch,
            "detection coefficient posterior",
            rng,
            &mut self.alpha,
        )?;
        mat_vec(&data.x_det, &self.alpha, &mut self.x_alpha);
        self.refresh_det_lin();
        Ok(())
    }

    /// Intercepts of both levels, then their variances unless fixed.
    pub(crate) fn update_random_effects<R: Rng + ?Sized>(
        &mut self,
        data: &OccupancyData,
        priors: &Priors,
        fixed: &FixedParams,
        rng: &mut R,
    ) -> Result<()> {
        if !data.occ_re.is_empty() {
            self.offset_occ.copy_from_slice(&self.x_beta);
            axpy(&self.w, &mut self.offset_occ, 1.);
            self.occ_re.update_levels(
                &data.occ_re,
                &self.omega_occ,
                &self.kappa_occ,
                &self.offset_occ,
                rng,
            );
            if !fixed.occ_re_variances {
                self.occ_re.update_variances(&priors.occ_re_variances, rng)?;
            }
            self.refresh_occ_lin();
        }
        if !data.det_re.is_empty() {
            self.det_re.update_levels(
                &data.det_re,
                &self.omega_det,
                &self.kappa_det,
                &self.x_alpha,
                rng,
            );
            if !fixed.det_re_variances {
                self.det_re.update_variances(&priors.det_re_variances, rng)?;
            }
            self.refresh_det_lin();
        }
        Ok(())
    }

    /// Gibbs update of the spatial effects under the current precision.
    pub(crate) fn update_spatial_effects<S: SpatialModel, R: Rng + ?Sized>(
        &mut self,
        model: &mut S,
        precision: &S::Precision,
        rng: &mut R,
    ) -> Result<()> {
        let re = self.occ_re.contribution();
        for site in 0..self.resid_occ.len() {
            self.resid_occ[site] =
                self.kappa_occ[site] - self.omega_occ[site] * (self.x_beta[site] + re[site]);
        }
        model.draw_effects(precision, &self.omega_occ, &self.resid_occ, rng, &mut self.w)?;
        self.refresh_occ_lin();
        Ok(())
    }

    /// Latent occupancy, then the site likelihood and replicate detections
    /// that depend on it.
    pub(crate) fn update_latent<R: Rng + ?Sized>(
        &mut self,
        data: &OccupancyData,
        rng: &mut R,
    ) -> Result<()> {
        update_latent_state(
            data,
            &self.by_site,
            &self.detected,
            &self.occ_lin,
            &self.det_lin,
            rng,
            &mut self.psi,
            &mut self.z,
        );
        site_likelihood(
            data,
            &self.by_site,
            &self.detected,
            &self.psi,
            &self.det_lin,
            &mut self.like,
        );
        draw_replicates(data, &self.z, &self.det_lin, rng, &mut self.y_rep)
    }

    pub(crate) fn record(&self, trace: &mut Trace, row: usize) {
        let theta = [self.params.sigma_sq, self.params.phi, self.params.nu];
        let n_theta = trace.theta.ncols();
        write_row(&mut trace.beta, row, self.beta.iter().copied());
        write_row(&mut trace.alpha, row, self.alpha.iter().copied());
        write_row(&mut trace.z, row, self.z.iter().map(|&z| if z { 1. } else { 0. }));
        write_row(&mut trace.psi, row, self.psi.iter().copied());
        write_row(&mut trace.theta, row, theta[..n_theta].iter().copied());
        write_row(&mut trace.w, row, self.w.iter().copied());
        write_row(&mut trace.occ_re_values, row, self.occ_re.values());
        write_row(&mut trace.occ_re_variances, row, self.occ_re.variances().iter().copied());
        write_row(&mut trace.det_re_values, row, self.det_re.values());
        write_row(&mut trace.det_re_variances, row, self.det_re.variances().iter().copied());
        write_row(&mut trace.like, row, self.like.iter().copied());
        write_row(&mut trace.y_rep, row, self.y_rep.iter().map(|&y| y as f64));
    }
}
