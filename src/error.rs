use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpOccError {
    /// A Cholesky factorization failed. This points at degenerate priors or
    /// data and is never retried.
    #[error("Matrix is not positive definite: {what}")]
    NotPositiveDefinite { what: &'static str },

    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid neighbor structure at site {site}: {reason}")]
    InvalidNeighbors { site: usize, reason: String },

    #[error("Invalid sampler setting: {0}")]
    InvalidSetting(String),

    #[error("Starting value for {what} ({value}) lies outside its prior support ({lower}, {upper})")]
    OutOfBounds {
        what: &'static str,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Sampling was interrupted after iteration {iteration}")]
    Interrupted { iteration: usize },
}

pub type Result<T> = std::result::Result<T, SpOccError>;

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SpOccError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
