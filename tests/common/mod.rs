#![allow(dead_code)]

use faer::linalg::solvers::Llt;
use faer::{Mat, Side};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution, StandardNormal};
use spocc_rs::{
    expit, CovModel, DenseGp, InitialValues, InvGammaPrior, NormalPrior, OccupancyData, Priors,
    RandomEffectGroup, SigmaSqPrior, SpatialParams, UniformBounds,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sites on an `nx` by `ny` unit grid, row by row.
pub fn grid(nx: usize, ny: usize) -> Vec<[f64; 2]> {
    (0..nx * ny)
        .map(|k| [(k % nx) as f64, (k / nx) as f64])
        .collect()
}

/// Repeat every site `visits` times as separate single-trial observations.
fn visits_of(n_sites: usize, visits: usize) -> Vec<usize> {
    (0..n_sites * visits).map(|i| i / visits).collect()
}

/// A 5 by 4 grid where every other site is occupied in a checkerboard and
/// occupied sites are detected on three of four visits. The occupancy
/// fraction is one half, so the occurrence intercept is zero.
pub fn balanced_grid() -> OccupancyData {
    let coords = grid(5, 4);
    let n_sites = coords.len();
    let visits = 4;
    let site_of_obs = visits_of(n_sites, visits);
    let y = site_of_obs
        .iter()
        .enumerate()
        .map(|(i, &site)| {
            let occupied = (site % 5 + site / 5) % 2 == 0;
            if occupied && i % visits != site % visits {
                1
            } else {
                0
            }
        })
        .collect();
    let n_obs = site_of_obs.len();
    OccupancyData {
        y,
        trials: vec![1; n_obs],
        site_of_obs,
        x_occ: Mat::from_fn(n_sites, 1, |_, _| 1.),
        x_det: Mat::from_fn(n_obs, 1, |_, _| 1.),
        coords,
        occ_re: vec![],
        det_re: vec![],
    }
}

/// Draw a data set from the model with one occurrence covariate, one
/// detection covariate and an occurrence random effect on every site's grid
/// row. The spatial effect is left out of the simulation.
pub fn simulate(seed: u64, nx: usize, ny: usize, visits: usize) -> OccupancyData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let coords = grid(nx, ny);
    let n_sites = coords.len();
    let site_of_obs = visits_of(n_sites, visits);
    let n_obs = site_of_obs.len();

    let occ_cov: Vec<f64> = (0..n_sites).map(|_| rng.random::<f64>() - 0.5).collect();
    let det_cov: Vec<f64> = (0..n_obs).map(|_| rng.random::<f64>() - 0.5).collect();
    let x_occ = Mat::from_fn(n_sites, 2, |i, j| if j == 0 { 1. } else { occ_cov[i] });
    let x_det = Mat::from_fn(n_obs, 2, |i, j| if j == 0 { 1. } else { det_cov[i] });
    let rows: Vec<usize> = (0..n_sites).map(|site| site / nx).collect();
    let row_effect: Vec<f64> = (0..ny).map(|_| rng.random::<f64>() - 0.5).collect();

    let z: Vec<bool> = (0..n_sites)
        .map(|site| {
            let eta = 0.3 + 0.8 * occ_cov[site] + row_effect[rows[site]];
            rng.random::<f64>() < expit(eta)
        })
        .collect();
    let y = (0..n_obs)
        .map(|i| {
            let p = expit(0.5 - 0.6 * det_cov[i]);
            u32::from(z[site_of_obs[i]] && rng.random::<f64>() < p)
        })
        .collect();

    OccupancyData {
        y,
        trials: vec![1; n_obs],
        site_of_obs,
        x_occ,
        x_det,
        coords,
        occ_re: vec![RandomEffectGroup::new(rows, ny).expect("valid levels")],
        det_re: vec![],
    }
}

/// One draw of an exponential Gaussian process at `coords`.
pub fn gp_effects<R: Rng>(rng: &mut R, coords: &[[f64; 2]], params: &SpatialParams) -> Vec<f64> {
    let cov = DenseGp::new(coords, CovModel::Exponential).covariance(params);
    let llt = Llt::new(cov.as_ref(), Side::Lower).expect("positive definite covariance");
    let l = llt.L();
    let noise: Vec<f64> = (0..coords.len()).map(|_| rng.sample(StandardNormal)).collect();
    (0..coords.len())
        .map(|i| (0..=i).map(|k| l[(i, k)] * noise[k]).sum())
        .collect()
}

/// Intercept-only data on a 5 by 4 grid with four visits per site, drawn
/// from the model with an exponential spatial effect.
pub fn simulate_intercepts(
    seed: u64,
    beta0: f64,
    alpha0: f64,
    params: &SpatialParams,
) -> OccupancyData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let coords = grid(5, 4);
    let n_sites = coords.len();
    let visits = 4;
    let site_of_obs = visits_of(n_sites, visits);
    let n_obs = site_of_obs.len();

    let w = gp_effects(&mut rng, &coords, params);
    let z: Vec<bool> = w
        .iter()
        .map(|w| rng.random::<f64>() < expit(beta0 + w))
        .collect();
    let y = site_of_obs
        .iter()
        .map(|&site| u32::from(z[site] && rng.random::<f64>() < expit(alpha0)))
        .collect();

    OccupancyData {
        y,
        trials: vec![1; n_obs],
        site_of_obs,
        x_occ: Mat::from_fn(n_sites, 1, |_, _| 1.),
        x_det: Mat::from_fn(n_obs, 1, |_, _| 1.),
        coords,
        occ_re: vec![],
        det_re: vec![],
    }
}

/// Aggregated detection counts: every site has two observations pooling two
/// and three visits. Detection carries a covariate and an observer random
/// effect with three levels, occurrence a covariate and a spatial effect.
pub fn simulate_counts(seed: u64, nx: usize, ny: usize) -> OccupancyData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let coords = grid(nx, ny);
    let n_sites = coords.len();
    let site_of_obs = visits_of(n_sites, 2);
    let n_obs = site_of_obs.len();
    let trials: Vec<u32> = (0..n_obs).map(|i| 2 + (i % 2) as u32).collect();
    let observer: Vec<usize> = (0..n_obs).map(|i| i % 3).collect();
    let observer_effect = [-0.6, 0.1, 0.5];

    let occ_cov: Vec<f64> = (0..n_sites).map(|_| rng.random::<f64>() - 0.5).collect();
    let det_cov: Vec<f64> = (0..n_obs).map(|_| rng.random::<f64>() - 0.5).collect();
    let params = SpatialParams {
        sigma_sq: 0.8,
        phi: 1.,
        nu: 0.5,
    };
    let w = gp_effects(&mut rng, &coords, &params);
    let z: Vec<bool> = (0..n_sites)
        .map(|site| rng.random::<f64>() < expit(0.4 + 0.7 * occ_cov[site] + w[site]))
        .collect();
    let y = (0..n_obs)
        .map(|i| {
            if !z[site_of_obs[i]] {
                return 0;
            }
            let p = expit(0.2 - 0.5 * det_cov[i] + observer_effect[observer[i]]);
            let binom = Binomial::new(trials[i] as u64, p).expect("valid probability");
            binom.sample(&mut rng) as u32
        })
        .collect();

    OccupancyData {
        y,
        trials,
        site_of_obs,
        x_occ: Mat::from_fn(n_sites, 2, |i, j| if j == 0 { 1. } else { occ_cov[i] }),
        x_det: Mat::from_fn(n_obs, 2, |i, j| if j == 0 { 1. } else { det_cov[i] }),
        coords,
        occ_re: vec![],
        det_re: vec![RandomEffectGroup::new(observer, 3).expect("valid levels")],
    }
}

pub fn default_priors(data: &OccupancyData) -> Priors {
    let p_occ = data.x_occ.ncols();
    let p_det = data.x_det.ncols();
    Priors {
        beta: NormalPrior::isotropic(p_occ, 0., 2.72).expect("valid prior"),
        alpha: NormalPrior::isotropic(p_det, 0., 2.72).expect("valid prior"),
        sigma_sq: SigmaSqPrior::InverseGamma(InvGammaPrior::new(2., 1.)),
        phi: UniformBounds::new(0.3, 3.),
        nu: None,
        occ_re_variances: vec![InvGammaPrior::new(0.1, 0.1); data.occ_re.len()],
        det_re_variances: vec![InvGammaPrior::new(0.1, 0.1); data.det_re.len()],
    }
}

pub fn default_inits(data: &OccupancyData, n_theta: usize) -> InitialValues {
    InitialValues {
        beta: vec![0.; data.x_occ.ncols()],
        alpha: vec![0.; data.x_det.ncols()],
        z: vec![true; data.n_sites()],
        w: vec![0.; data.n_sites()],
        params: SpatialParams {
            sigma_sq: 1.,
            phi: 1.,
            nu: 0.5,
        },
        occ_re_variances: vec![1.; data.occ_re.len()],
        det_re_variances: vec![1.; data.det_re.len()],
        log_tuning: vec![-0.5; n_theta],
    }
}

/// Bit patterns of a draw matrix, column by column.
pub fn bits(mat: &Mat<f64>) -> Vec<u64> {
    let mut out = Vec::with_capacity(mat.nrows() * mat.ncols());
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            out.push(mat[(i, j)].to_bits());
        }
    }
    out
}
