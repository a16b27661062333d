//! Latent occupancy state, site likelihood and replicate detections.

use rand::Rng;
use rand_distr::{Binomial, Distribution};
use statrs::function::factorial::ln_binomial;

use crate::data::OccupancyData;
use crate::error::{Result, SpOccError};
use crate::math::expit;

/// Observations grouped by site, in CSR form.
#[derive(Debug, Clone)]
pub(crate) struct ObsBySite {
    obs: Vec<usize>,
    offsets: Vec<usize>,
}

impl ObsBySite {
    pub(crate) fn new(site_of_obs: &[usize], n_sites: usize) -> Self {
        let mut counts = vec![0usize; n_sites];
        for &site in site_of_obs {
            counts[site] += 1;
        }
        let mut offsets = Vec::with_capacity(n_sites + 1);
        offsets.push(0);
        for count in counts {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + count);
        }
        let mut fill = offsets[..n_sites].to_vec();
        let mut obs = vec![0usize; site_of_obs.len()];
        for (i, &site) in site_of_obs.iter().enumerate() {
            obs[fill[site]] = i;
            fill[site] += 1;
        }
        Self { obs, offsets }
    }

    #[inline]
    pub(crate) fn of(&self, site: usize) -> &[usize] {
        &self.obs[self.offsets[site]..self.offsets[site + 1]]
    }
}

/// Whether any observation at each site recorded a detection.
pub(crate) fn detected_sites(data: &OccupancyData, by_site: &ObsBySite) -> Vec<bool> {
    (0..data.n_sites())
        .map(|site| by_site.of(site).iter().any(|&i| data.y[i] > 0))
        .collect()
}

/// Probability that a site without detections is occupied, given the
/// occurrence probability `psi` and the detection predictors of its
/// observations `obs`.
pub(crate) fn occupied_if_undetected(
    data: &OccupancyData,
    obs: &[usize],
    psi: f64,
    det_lin: &[f64],
) -> f64 {
    let miss: f64 = obs
        .iter()
        .map(|&i| (1. - expit(det_lin[i])).powi(data.trials[i] as i32))
        .product();
    let num = psi * miss;
    num / (num + 1. - psi)
}

/// Update `z` and write the occurrence probabilities into `psi`.
///
/// `occ_lin` is the occurrence linear predictor of every site and `det_lin`
/// the detection linear predictor of every observation. Sites with a detection
/// are occupied with certainty.
#[allow(clippy::too_many_arguments)]
pub(crate) fn update_latent_state<R: Rng + ?Sized>(
    data: &OccupancyData,
    by_site: &ObsBySite,
    detected: &[bool],
    occ_lin: &[f64],
    det_lin: &[f64],
    rng: &mut R,
    psi: &mut [f64],
    z: &mut [bool],
) {
    for site in 0..data.n_sites() {
        psi[site] = expit(occ_lin[site]);
        if detected[site] {
            z[site] = true;
            continue;
        }
        let prob = occupied_if_undetected(data, by_site.of(site), psi[site], det_lin);
        z[site] = rng.random::<f64>() < prob;
    }
}

/// Likelihood contribution of every site with `z` integrated out, for WAIC.
pub(crate) fn site_likelihood(
    data: &OccupancyData,
    by_site: &ObsBySite,
    detected: &[bool],
    psi: &[f64],
    det_lin: &[f64],
    like: &mut [f64],
) {
    for site in 0..data.n_sites() {
        let log_det: f64 = by_site
            .of(site)
            .iter()
            .map(|&i| {
                let p = expit(det_lin[i]);
                let (y, k) = (data.y[i], data.trials[i]);
                let mut value = ln_binomial(k as u64, y as u64);
                if y > 0 {
                    value += y as f64 * p.ln();
                }
                if k > y {
                    value += (k - y) as f64 * (1. - p).ln();
                }
                value
            })
            .sum();
        let occupied = psi[site] * log_det.exp();
        like[site] = if detected[site] {
            occupied
        } else {
            1. - psi[site] + occupied
        };
    }
}

/// Replicate detections given the current latent state.
pub(crate) fn draw_replicates<R: Rng + ?Sized>(
    data: &OccupancyData,
    z: &[bool],
    det_lin: &[f64],
    rng: &mut R,
    y_rep: &mut [u32],
) -> Result<()> {
    for (i, rep) in y_rep.iter_mut().enumerate() {
        if !z[data.site_of_obs[i]] {
            *rep = 0;
            continue;
        }
        let p = expit(det_lin[i]);
        let binom = Binomial::new(data.trials[i] as u64, p).map_err(|_| {
            SpOccError::InvalidSetting(format!(
                "invalid detection probability {} for observation {}",
                p, i
            ))
        })?;
        *rep = binom.sample(rng) as u32;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::tiny;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn groups_observations() {
        let by_site = ObsBySite::new(&[2, 0, 2, 1, 0], 4);
        assert_eq!(by_site.of(0), &[1, 4]);
        assert_eq!(by_site.of(1), &[3]);
        assert_eq!(by_site.of(2), &[0, 2]);
        assert!(by_site.of(3).is_empty());
    }

    proptest! {
        #[test]
        fn detected_sites_are_occupied(
            seed in 0u64..1000,
            occ in proptest::collection::vec(-6f64..6., 4),
            det in proptest::collection::vec(-6f64..6., 8),
        ) {
            let (data, _, _) = tiny();
            let by_site = ObsBySite::new(&data.site_of_obs, data.n_sites());
            let detected = detected_sites(&data, &by_site);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut psi = vec![0.; 4];
            let mut z = vec![false; 4];
            update_latent_state(&data, &by_site, &detected, &occ, &det, &mut rng, &mut psi, &mut z);
            prop_assert!(z[0]);
            prop_assert!(z[2]);
        }
    }

    #[test]
    fn site_likelihood_matches_closed_form() {
        let (data, _, _) = tiny();
        let by_site = ObsBySite::new(&data.site_of_obs, data.n_sites());
        let detected = detected_sites(&data, &by_site);
        assert_eq!(detected, vec![true, false, true, false]);
        let psi = [0.6; 4];
        let det_lin = [0.; 8];
        let mut like = [0.; 4];
        site_likelihood(&data, &by_site, &detected, &psi, &det_lin, &mut like);
        // p = 0.5 on every visit.
        assert_relative_eq!(like[0], 0.6 * 0.25, max_relative = 1e-12);
        assert_relative_eq!(like[1], 0.4 + 0.6 * 0.25, max_relative = 1e-12);
    }

    /// Aggregated counts: site 0 has detections, site 1 has none over seven
    /// visits in two observations, site 2 is a single detected visit.
    fn counts() -> OccupancyData {
        let (mut data, _, _) = tiny();
        data.y = vec![2, 0, 0, 0, 1];
        data.trials = vec![3, 2, 3, 4, 1];
        data.site_of_obs = vec![0, 0, 1, 1, 2];
        data.x_det = faer::Mat::from_fn(5, 1, |_, _| 1.);
        data.coords.truncate(3);
        data.x_occ = faer::Mat::from_fn(3, 1, |_, _| 1.);
        data
    }

    const COUNT_DET_LIN: [f64; 5] = [0.4, -0.2, -1.5, -2., 1.];

    #[test]
    fn site_likelihood_with_repeated_trials() {
        let data = counts();
        data.validate().unwrap();
        let by_site = ObsBySite::new(&data.site_of_obs, data.n_sites());
        let detected = detected_sites(&data, &by_site);
        assert_eq!(detected, vec![true, false, true]);

        let psi = [0.7, 0.6, 0.5];
        let p = COUNT_DET_LIN.map(expit);
        let mut like = [0.; 3];
        site_likelihood(&data, &by_site, &detected, &psi, &COUNT_DET_LIN, &mut like);

        // C(3, 2) p^2 (1 - p) for two of three, (1 - p)^2 for none of two.
        let site0 = 0.7 * 3. * p[0].powi(2) * (1. - p[0]) * (1. - p[1]).powi(2);
        let site1 = 0.4 + 0.6 * (1. - p[2]).powi(3) * (1. - p[3]).powi(4);
        assert_relative_eq!(like[0], site0, max_relative = 1e-12);
        assert_relative_eq!(like[1], site1, max_relative = 1e-12);
        assert_relative_eq!(like[2], 0.5 * p[4], max_relative = 1e-12);
    }

    #[test]
    fn latent_state_with_repeated_trials() {
        let data = counts();
        let by_site = ObsBySite::new(&data.site_of_obs, data.n_sites());
        let detected = detected_sites(&data, &by_site);
        let occ_lin = [0., 0.5, 0.];
        let psi1 = expit(0.5);
        let p = COUNT_DET_LIN.map(expit);

        let miss = (1. - p[2]).powi(3) * (1. - p[3]).powi(4);
        let expected = psi1 * miss / (psi1 * miss + 1. - psi1);
        let prob = occupied_if_undetected(&data, by_site.of(1), psi1, &COUNT_DET_LIN);
        assert_relative_eq!(prob, expected, max_relative = 1e-12);
        // Counting the seven visits as one would give a different answer.
        let single = psi1 * (1. - p[2]) * (1. - p[3]);
        assert!(prob < single / (single + 1. - psi1) - 0.1);

        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut psi = [0.; 3];
        let mut z = [false; 3];
        let draws = 20_000;
        let mut occupied = 0;
        for _ in 0..draws {
            update_latent_state(
                &data, &by_site, &detected, &occ_lin, &COUNT_DET_LIN, &mut rng, &mut psi, &mut z,
            );
            assert!(z[0] && z[2]);
            occupied += usize::from(z[1]);
        }
        assert_relative_eq!(psi[1], psi1);
        assert_relative_eq!(occupied as f64 / draws as f64, expected, epsilon = 0.015);
    }

    #[test]
    fn replicates_respect_trials() {
        let data = counts();
        let z = [true, true, false];
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut y_rep = [0; 5];
        let draws = 10_000;
        let mut sum = [0u64; 5];
        for _ in 0..draws {
            draw_replicates(&data, &z, &COUNT_DET_LIN, &mut rng, &mut y_rep).unwrap();
            for (i, &y) in y_rep.iter().enumerate() {
                assert!(y <= data.trials[i]);
                sum[i] += y as u64;
            }
        }
        assert_eq!(sum[4], 0);
        for i in 0..4 {
            let mean = sum[i] as f64 / draws as f64;
            let expected = data.trials[i] as f64 * expit(COUNT_DET_LIN[i]);
            assert_relative_eq!(mean, expected, epsilon = 0.05);
        }
    }

    #[test]
    fn unoccupied_sites_replicate_zeros() {
        let (data, _, _) = tiny();
        let z = [false, true, false, true];
        let det_lin = [5.; 8];
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut y_rep = [9; 8];
        draw_replicates(&data, &z, &det_lin, &mut rng, &mut y_rep).unwrap();
        assert_eq!(&y_rep[..2], &[0, 0]);
        assert!(y_rep.iter().all(|&y| y <= 1));
    }
}
