use itertools::izip;
use multiversion::multiversion;

/// Map `x` in `(lower, upper)` to the real line.
#[inline]
pub fn logit(x: f64, lower: f64, upper: f64) -> f64 {
    ((x - lower) / (upper - x)).ln()
}

/// Inverse of [`logit`]: map a real number back into `(lower, upper)`.
#[inline]
pub fn logit_inv(z: f64, lower: f64, upper: f64) -> f64 {
    upper - (upper - lower) / (1. + z.exp())
}

/// Standard logistic function on `(0, 1)`.
#[inline]
pub fn expit(z: f64) -> f64 {
    logit_inv(z, 0., 1.)
}

/// Log Jacobian of the logit transform plus the flat prior on `(lower, upper)`,
/// up to an additive constant.
#[inline]
pub fn log_jacobian_uniform(x: f64, lower: f64, upper: f64) -> f64 {
    (x - lower).ln() + (upper - x).ln()
}

#[multiversion(targets("x86_64+avx+avx2+fma", "x86_64+avx", "x86+sse"))]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());

    let head_length = a.len() - a.len() % 4;
    let (x, x_tail) = a.split_at(head_length);
    let (y, y_tail) = b.split_at(head_length);

    let mut acc = [0f64; 4];
    izip!(x.chunks_exact(4), y.chunks_exact(4)).for_each(|(x, y)| {
        acc[0] += x[0] * y[0];
        acc[1] += x[1] * y[1];
        acc[2] += x[2] * y[2];
        acc[3] += x[3] * y[3];
    });

    let mut result = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for (val1, val2) in x_tail.iter().zip(y_tail) {
        result += *val1 * *val2;
    }
    result
}

#[multiversion(targets("x86_64+avx+avx2+fma", "x86_64+avx", "x86+sse"))]
pub(crate) fn axpy(x: &[f64], y: &mut [f64], a: f64) {
    assert!(y.len() == x.len());

    izip!(x, y).for_each(|(x, y)| {
        *y += a * x;
    });
}
