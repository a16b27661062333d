use faer::Mat;

use crate::theta::THETA_NAMES;

/// Posterior draws of one chain.
///
/// Every draw matrix has one row per stored iteration. `accept` and `tuning`
/// have one row per batch and one column per spatial hyperparameter, in the
/// order of `theta_names`.
#[derive(Debug, Clone)]
pub struct Trace {
    pub beta: Mat<f64>,
    pub alpha: Mat<f64>,
    pub z: Mat<f64>,
    pub psi: Mat<f64>,
    pub theta: Mat<f64>,
    pub w: Mat<f64>,
    pub occ_re_values: Mat<f64>,
    pub occ_re_variances: Mat<f64>,
    pub det_re_values: Mat<f64>,
    pub det_re_variances: Mat<f64>,
    /// Site likelihood with the latent state integrated out, for WAIC.
    pub like: Mat<f64>,
    pub y_rep: Mat<f64>,
    pub accept: Mat<f64>,
    /// Log proposal standard deviations in effect during each batch.
    pub tuning: Mat<f64>,
    pub theta_names: Vec<&'static str>,
    pub chain: u64,
}

/// Column counts of the draw matrices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TraceDims {
    pub n_kept: usize,
    pub n_batch: usize,
    pub p_occ: usize,
    pub p_det: usize,
    pub n_sites: usize,
    pub n_obs: usize,
    pub n_theta: usize,
    pub n_occ_re_levels: usize,
    pub n_occ_re: usize,
    pub n_det_re_levels: usize,
    pub n_det_re: usize,
}

impl Trace {
    pub(crate) fn new(dims: TraceDims, chain: u64) -> Self {
        let draws = |cols: usize| -> Mat<f64> { Mat::zeros(dims.n_kept, cols) };
        Self {
            beta: draws(dims.p_occ),
            alpha: draws(dims.p_det),
            z: draws(dims.n_sites),
            psi: draws(dims.n_sites),
            theta: draws(dims.n_theta),
            w: draws(dims.n_sites),
            occ_re_values: draws(dims.n_occ_re_levels),
            occ_re_variances: draws(dims.n_occ_re),
            det_re_values: draws(dims.n_det_re_levels),
            det_re_variances: draws(dims.n_det_re),
            like: draws(dims.n_sites),
            y_rep: draws(dims.n_obs),
            accept: Mat::zeros(dims.n_batch, dims.n_theta),
            tuning: Mat::zeros(dims.n_batch, dims.n_theta),
            theta_names: THETA_NAMES[..dims.n_theta].to_vec(),
            chain,
        }
    }

    pub fn n_draws(&self) -> usize {
        self.beta.nrows()
    }
}

#[inline]
pub(crate) fn write_row<I: IntoIterator<Item = f64>>(mat: &mut Mat<f64>, row: usize, values: I) {
    for (col, value) in values.into_iter().enumerate() {
        mat[(row, col)] = value;
    }
}

pub fn column_mean(mat: &Mat<f64>, col: usize) -> f64 {
    let n = mat.nrows();
    mat.col_as_slice(col).iter().sum::<f64>() / n as f64
}

/// Sample standard deviation of one column.
pub fn column_sd(mat: &Mat<f64>, col: usize) -> f64 {
    let n = mat.nrows();
    let mean = column_mean(mat, col);
    let ss: f64 = mat
        .col_as_slice(col)
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum();
    (ss / (n as f64 - 1.)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn column_summaries() {
        let mut mat = Mat::zeros(4, 2);
        write_row(&mut mat, 0, [1., 0.]);
        write_row(&mut mat, 1, [2., 0.]);
        write_row(&mut mat, 2, [3., 0.]);
        write_row(&mut mat, 3, [4., 0.]);
        assert_relative_eq!(column_mean(&mat, 0), 2.5);
        assert_relative_eq!(column_sd(&mat, 0), (5f64 / 3.).sqrt());
        assert_relative_eq!(column_sd(&mat, 1), 0.);
    }
}
