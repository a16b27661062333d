//! Exact Polya-Gamma draws.
//!
//! PG(1, z) uses Devroye's alternating series sampler with a truncated
//! exponential proposal to the right of `TRUNC` and a truncated inverse
//! Gaussian proposal to the left. PG(b, z) for integer `b` is a sum of `b`
//! independent PG(1, z) draws.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use statrs::function::erf::erfc;

const TRUNC: f64 = 0.64;
const PI_SQ_8: f64 = PI * PI / 8.;

/// Draw from PG(`trials`, `z`). Zero trials give exactly zero.
pub fn sample_pg<R: Rng + ?Sized>(rng: &mut R, trials: usize, z: f64) -> f64 {
    (0..trials).map(|_| sample_pg1(rng, z)).sum()
}

/// Draw from PG(1, `z`).
pub fn sample_pg1<R: Rng + ?Sized>(rng: &mut R, z: f64) -> f64 {
    let z = 0.5 * z.abs();
    let fz = PI_SQ_8 + 0.5 * z * z;
    let texpon = mass_texpon(z, fz);

    loop {
        let x = if rng.random::<f64>() < texpon {
            let e: f64 = rng.sample(Exp1);
            TRUNC + e / fz
        } else {
            rtigauss(rng, z)
        };

        let mut s = series_coef(0, x);
        let y = rng.random::<f64>() * s;
        let mut n = 0;
        loop {
            n += 1;
            if n % 2 == 1 {
                s -= series_coef(n, x);
                if y <= s {
                    return 0.25 * x;
                }
            } else {
                s += series_coef(n, x);
                if y > s {
                    break;
                }
            }
        }
    }
}

#[inline]
fn norm_log_cdf(x: f64) -> f64 {
    (0.5 * erfc(-x * FRAC_1_SQRT_2)).ln()
}

/// Probability of proposing from the exponential tail.
fn mass_texpon(z: f64, fz: f64) -> f64 {
    let scale = (1. / TRUNC).sqrt();
    let b = scale * (TRUNC * z - 1.);
    let a = -scale * (TRUNC * z + 1.);

    let x0 = fz.ln() + fz * TRUNC;
    let xb = x0 - z + norm_log_cdf(b);
    let xa = x0 + z + norm_log_cdf(a);

    let qdivp = 4. / PI * (xb.exp() + xa.exp());
    1. / (1. + qdivp)
}

/// Inverse Gaussian with mean `1/z` and shape 1, truncated to `(0, TRUNC)`.
fn rtigauss<R: Rng + ?Sized>(rng: &mut R, z: f64) -> f64 {
    let mu = 1. / z;
    if mu > TRUNC {
        // Proposals from the Lévy distribution truncated at TRUNC.
        loop {
            let (mut e1, mut e2): (f64, f64) = (rng.sample(Exp1), rng.sample(Exp1));
            while e1 * e1 > 2. * e2 / TRUNC {
                e1 = rng.sample(Exp1);
                e2 = rng.sample(Exp1);
            }
            let x = TRUNC / ((1. + TRUNC * e1) * (1. + TRUNC * e1));
            let alpha = (-0.5 * z * z * x).exp();
            if rng.random::<f64>() <= alpha {
                return x;
            }
        }
    }

    loop {
        let n: f64 = rng.sample(StandardNormal);
        let y = n * n;
        let half_mu = 0.5 * mu;
        let mut x = mu + half_mu * mu * y - half_mu * (4. * mu * y + (mu * y) * (mu * y)).sqrt();
        if rng.random::<f64>() > mu / (mu + x) {
            x = mu * mu / x;
        }
        if x <= TRUNC {
            return x;
        }
    }
}

/// Coefficient `a_n(x)` of the alternating series for the PG(1, 0) density.
fn series_coef(n: usize, x: f64) -> f64 {
    let half = n as f64 + 0.5;
    let k = half * PI;
    if x > TRUNC {
        k * (-0.5 * k * k * x).exp()
    } else if x > 0. {
        let expnt = -1.5 * ((0.5 * PI).ln() + x.ln()) + k.ln() - 2. * half * half / x;
        expnt.exp()
    } else {
        0.
    }
}
