//! Dense Cholesky helpers on top of faer, plus a small in-place factorization
//! for the per-site NNGP systems that live in flat scratch buffers.

use faer::linalg::matmul::matmul;
use faer::linalg::solvers::{Llt, Solve};
use faer::linalg::triangular_solve::solve_upper_triangular_in_place;
use faer::{Accum, Mat, MatMut, MatRef, Par, Side};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{Result, SpOccError};
use crate::math::{axpy, vector_dot};

/// Cholesky factorization of a symmetric positive definite matrix.
///
/// Only the lower triangle of `a` is read.
pub(crate) fn cholesky(a: &Mat<f64>, what: &'static str) -> Result<Llt<f64>> {
    let llt =
        Llt::new(a.as_ref(), Side::Lower).map_err(|_| SpOccError::NotPositiveDefinite { what })?;
    let l = llt.L();
    let degenerate = (0..l.nrows()).any(|i| {
        let d = l[(i, i)];
        !(d.is_finite() && d > 0.)
    });
    if degenerate {
        return Err(SpOccError::NotPositiveDefinite { what });
    }
    Ok(llt)
}

/// `log |A|` from the factorization of `A`.
pub(crate) fn log_det_chol(llt: &Llt<f64>) -> f64 {
    let l = llt.L();
    (0..l.nrows()).map(|i| 2. * l[(i, i)].ln()).sum()
}

fn col_ref(x: &[f64]) -> MatRef<'_, f64> {
    MatRef::from_column_major_slice(x, x.len(), 1)
}

fn col_mut(x: &mut [f64]) -> MatMut<'_, f64> {
    let n = x.len();
    MatMut::from_column_major_slice_mut(x, n, 1)
}

/// `out = A x` for a dense matrix.
pub(crate) fn mat_vec(a: &Mat<f64>, x: &[f64], out: &mut [f64]) {
    debug_assert_eq!(a.ncols(), x.len());
    debug_assert_eq!(a.nrows(), out.len());
    matmul(col_mut(out), Accum::Replace, a, col_ref(x), 1., Par::Seq);
}

/// `x^T A x` for a dense symmetric matrix.
pub(crate) fn quad_form(a: &Mat<f64>, x: &[f64]) -> f64 {
    let mut ax = vec![0f64; x.len()];
    mat_vec(a, x, &mut ax);
    vector_dot(&ax, x)
}

/// Draw from `N(A^{-1} b, A^{-1})` given the precision `A` and the
/// right-hand side `b`, writing the draw into `out`.
///
/// With `A = L L^T` the draw is `A^{-1} b + L^{-T} e` for standard normal `e`,
/// so `A` is factored once and never inverted.
pub(crate) fn draw_from_precision<R: Rng + ?Sized>(
    precision: &Mat<f64>,
    rhs: &[f64],
    what: &'static str,
    rng: &mut R,
    out: &mut [f64],
) -> Result<()> {
    let n = precision.nrows();
    debug_assert_eq!(rhs.len(), n);
    debug_assert_eq!(out.len(), n);

    let llt = cholesky(precision, what)?;
    out.copy_from_slice(rhs);
    llt.solve_in_place(col_mut(out));

    let mut noise: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
    solve_upper_triangular_in_place(llt.L().transpose(), col_mut(&mut noise), Par::Seq);
    axpy(&noise, out, 1.);
    Ok(())
}

// The NNGP conditioning sets have at most a few dozen neighbors and are
// factored once per site per rebuild inside a flat arena, so the faer
// factorization object and its allocations are not used there.

/// In-place lower Cholesky of the `n x n` column-major matrix in `a`.
///
/// Returns `false` if a pivot is not strictly positive. Entries above the
/// diagonal are left untouched and must not be read afterwards.
pub(crate) fn chol_in_place(a: &mut [f64], n: usize) -> bool {
    debug_assert!(a.len() >= n * n);
    for j in 0..n {
        let mut d = a[j + j * n];
        for k in 0..j {
            let v = a[j + k * n];
            d -= v * v;
        }
        if !(d > 0.) || !d.is_finite() {
            return false;
        }
        let d = d.sqrt();
        a[j + j * n] = d;
        for i in (j + 1)..n {
            let mut s = a[i + j * n];
            for k in 0..j {
                s -= a[i + k * n] * a[j + k * n];
            }
            a[i + j * n] = s / d;
        }
    }
    true
}

/// Solve `A x = b` in place given the factor produced by [`chol_in_place`].
pub(crate) fn chol_solve_in_place(l: &[f64], n: usize, b: &mut [f64]) {
    for i in 0..n {
        let mut acc = b[i];
        for k in 0..i {
            acc -= l[i + k * n] * b[k];
        }
        b[i] = acc / l[i + i * n];
    }
    for i in (0..n).rev() {
        let mut acc = b[i];
        for k in (i + 1)..n {
            acc -= l[k + i * n] * b[k];
        }
        b[i] = acc / l[i + i * n];
    }
}

/// Solve `A x = b` in place with a faer factorization.
#[cfg(test)]
pub(crate) fn solve(llt: &Llt<f64>, b: &mut [f64]) {
    llt.solve_in_place(col_mut(b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use faer::linalg::solvers::DenseSolveCore;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn spd(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            let base = 1. / (1. + (i as f64 - j as f64).abs());
            if i == j {
                base + n as f64
            } else {
                base
            }
        })
    }

    /// Exponential correlation on a ring of `n` sites with a small nugget.
    fn correlated(n: usize) -> Mat<f64> {
        let angle = |i: usize| 2. * std::f64::consts::PI * i as f64 / n as f64;
        Mat::from_fn(n, n, |i, j| {
            let (a, b) = (angle(i), angle(j));
            let d = ((a.cos() - b.cos()).powi(2) + (a.sin() - b.sin()).powi(2)).sqrt();
            (-3. * d).exp() + if i == j { 0.05 } else { 0. }
        })
    }

    #[test]
    fn inverse_round_trip() {
        let a = spd(6);
        let inv = cholesky(&a, "test").unwrap().inverse();
        for i in 0..6 {
            for j in 0..6 {
                let v: f64 = (0..6).map(|k| a[(i, k)] * inv[(k, j)]).sum();
                let expected = if i == j { 1. } else { 0. };
                assert_relative_eq!(v, expected, epsilon = 1e-12);
                assert_eq!(inv[(i, j)], inv[(j, i)]);
            }
        }
    }

    #[test]
    fn log_det_diagonal() {
        let a = Mat::from_fn(3, 3, |i, j| if i == j { (i + 2) as f64 } else { 0. });
        let llt = cholesky(&a, "test").unwrap();
        assert_relative_eq!(log_det_chol(&llt), (2f64 * 3. * 4.).ln(), epsilon = 1e-12);
    }

    #[test]
    fn not_positive_definite() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1. } else { 2. });
        assert!(matches!(
            cholesky(&a, "indefinite"),
            Err(SpOccError::NotPositiveDefinite { what: "indefinite" })
        ));
    }

    #[test]
    fn products_match_loops() {
        let a = Mat::from_fn(7, 4, |i, j| (i as f64 - 2.5) * 0.3 + j as f64);
        let x = [0.5, -1., 2., 0.25];
        let mut out = vec![0.; 7];
        mat_vec(&a, &x, &mut out);
        for i in 0..7 {
            let expected: f64 = (0..4).map(|j| a[(i, j)] * x[j]).sum();
            assert_relative_eq!(out[i], expected, epsilon = 1e-12);
        }

        let s = spd(4);
        let expected: f64 = (0..4)
            .flat_map(|i| (0..4).map(move |j| (i, j)))
            .map(|(i, j)| x[i] * s[(i, j)] * x[j])
            .sum();
        assert_relative_eq!(quad_form(&s, &x), expected, epsilon = 1e-12);
    }

    #[test]
    fn small_factor_matches_dense() {
        let n = 5;
        let a = spd(n);
        let mut flat: Vec<f64> = (0..n * n).map(|idx| a[(idx % n, idx / n)]).collect();
        assert!(chol_in_place(&mut flat, n));
        let llt = cholesky(&a, "test").unwrap();
        let l = llt.L();
        for j in 0..n {
            for i in j..n {
                assert_relative_eq!(flat[i + j * n], l[(i, j)], epsilon = 1e-12);
            }
        }

        let mut b = vec![1., -2., 0.5, 3., 0.];
        let orig = b.clone();
        chol_solve_in_place(&flat, n, &mut b);
        let mut back = vec![0.; n];
        mat_vec(&a, &b, &mut back);
        for (x, y) in back.iter().zip(&orig) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn large_inverse_and_log_det() {
        let n = 200;
        let cov = correlated(n);
        let llt = cholesky(&cov, "test").unwrap();
        let inv = llt.inverse();

        let mut product = Mat::<f64>::zeros(n, n);
        matmul(product.as_mut(), Accum::Replace, &inv, &cov, 1., Par::Seq);
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1. } else { 0. };
                assert!((product[(i, j)] - expected).abs() < 1e-9);
            }
        }

        // log |C| + log |C^{-1}| = 0
        let inv_llt = cholesky(&inv, "test").unwrap();
        assert_relative_eq!(log_det_chol(&llt), -log_det_chol(&inv_llt), epsilon = 1e-8);
    }

    #[test]
    fn draw_from_precision_moments() {
        let precision = Mat::from_fn(2, 2, |i, j| if i == j { 4. } else { 1. });
        let rhs = [2., -1.];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut out = [0.; 2];
        let n = 20_000;
        let mut sum = [0.; 2];
        let mut cross = [[0.; 2]; 2];
        for _ in 0..n {
            draw_from_precision(&precision, &rhs, "test", &mut rng, &mut out).unwrap();
            for i in 0..2 {
                sum[i] += out[i];
                for j in 0..2 {
                    cross[i][j] += out[i] * out[j];
                }
            }
        }
        // A^{-1} b = [9/15, -6/15]
        let mean = [sum[0] / n as f64, sum[1] / n as f64];
        assert_relative_eq!(mean[0], 0.6, epsilon = 0.02);
        assert_relative_eq!(mean[1], -0.4, epsilon = 0.02);
        // A^{-1} = [[4, -1], [-1, 4]] / 15
        let cov = |i: usize, j: usize| cross[i][j] / n as f64 - mean[i] * mean[j];
        assert_relative_eq!(cov(0, 0), 4. / 15., epsilon = 0.01);
        assert_relative_eq!(cov(1, 1), 4. / 15., epsilon = 0.01);
        assert_relative_eq!(cov(0, 1), -1. / 15., epsilon = 0.01);
    }

    #[test]
    fn large_draw_matches_posterior() {
        // Posterior precision of a 200 site field with unit observation
        // weights. The mean of many draws must solve the linear system and
        // their spread must match the diagonal of the inverse.
        let n = 200;
        let mut precision = cholesky(&correlated(n), "test").unwrap().inverse();
        for i in 0..n {
            precision[(i, i)] += 1.;
        }
        let rhs: Vec<f64> = (0..n).map(|i| ((i % 7) as f64 - 3.) * 0.4).collect();
        let llt = cholesky(&precision, "test").unwrap();
        let mut expected = rhs.clone();
        solve(&llt, &mut expected);
        let cov = llt.inverse();

        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let draws = 2000;
        let mut out = vec![0.; n];
        let mut sum = vec![0.; n];
        let mut sum_sq = vec![0.; n];
        for _ in 0..draws {
            draw_from_precision(&precision, &rhs, "test", &mut rng, &mut out).unwrap();
            for i in 0..n {
                sum[i] += out[i];
                sum_sq[i] += out[i] * out[i];
            }
        }
        for i in 0..n {
            let mean = sum[i] / draws as f64;
            let var = sum_sq[i] / draws as f64 - mean * mean;
            let sd = cov[(i, i)].sqrt();
            // Five standard errors of the mean and a loose bound on the variance.
            assert!((mean - expected[i]).abs() < 5. * sd / (draws as f64).sqrt());
            assert!((var / cov[(i, i)] - 1.).abs() < 0.25, "site {} var {}", i, var);
        }
    }
}
