//! Polya-Gamma Gibbs sampling for single-season spatial occupancy models.
//!
//! Occurrence and detection are logistic regressions tied together by a
//! latent occupancy state. Spatial structure enters the occurrence level as a
//! Gaussian process, either dense or as a nearest-neighbor Gaussian process.
//! Covariance hyperparameters are updated with a batch-adaptive Metropolis
//! step, everything else by Gibbs steps.

pub(crate) mod adapt;
pub(crate) mod chain;
pub(crate) mod conjugate;
pub(crate) mod cov_model;
pub(crate) mod data;
pub(crate) mod dense_gp;
pub(crate) mod error;
pub(crate) mod linalg;
pub(crate) mod math;
pub(crate) mod neighbors;
pub(crate) mod nngp;
pub(crate) mod occupancy;
pub(crate) mod polya_gamma;
pub(crate) mod random_effects;
pub(crate) mod settings;
pub(crate) mod spatial;
pub(crate) mod state;
pub(crate) mod theta;
pub(crate) mod trace;

pub use adapt::{propose_logit, BatchTuner};
pub use chain::{OccupancySampler, SpatialVariant};
pub use conjugate::{sample_inv_gamma, NormalPrior};
pub use cov_model::{BesselScratch, CovModel};
pub use data::{
    n_theta, validate_inputs, InitialValues, InvGammaPrior, OccupancyData, Priors, SigmaSqPrior,
    UniformBounds,
};
pub use dense_gp::{DenseGp, DensePrecision};
pub use error::{Result, SpOccError};
pub use math::{expit, logit, logit_inv};
pub use neighbors::NeighborIndex;
pub use nngp::{Nngp, NngpFactors, SITE_CHUNK};
pub use polya_gamma::{sample_pg, sample_pg1};
pub use random_effects::RandomEffectGroup;
pub use settings::{FixedParams, SamplerSettings, SigmaSqUpdate};
pub use spatial::{DensityTerms, PrecisionPair, SpatialModel, SpatialParams};
pub use theta::THETA_NAMES;
pub use trace::{column_mean, column_sd, Trace};
