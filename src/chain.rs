use std::sync::mpsc::{channel, Receiver, TryRecvError};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;

use crate::adapt::BatchTuner;
use crate::cov_model::CovModel;
use crate::data::{n_theta, validate_inputs, InitialValues, OccupancyData, Priors};
use crate::dense_gp::DenseGp;
use crate::error::{check_len, SpOccError};
use crate::neighbors::NeighborIndex;
use crate::nngp::Nngp;
use crate::settings::SamplerSettings;
use crate::spatial::{PrecisionPair, SpatialModel};
use crate::state::ChainState;
use crate::theta::{ThetaUpdate, THETA_NAMES};
use crate::trace::{write_row, Trace, TraceDims};

/// How the spatial process is represented.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialVariant {
    /// Full Gaussian process with a dense covariance.
    Dense,
    /// Nearest-neighbor Gaussian process over the `n_neighbors` closest
    /// earlier sites.
    Nngp { n_neighbors: usize },
    /// Nearest-neighbor Gaussian process over caller-supplied neighbor sets.
    NngpNeighbors(NeighborIndex),
}

/// A validated spatial occupancy model, ready to run chains.
#[derive(Debug, Clone)]
pub struct OccupancySampler {
    data: OccupancyData,
    priors: Priors,
    inits: InitialValues,
    variant: SpatialVariant,
    cov_model: CovModel,
    settings: SamplerSettings,
}

impl OccupancySampler {
    pub fn new(
        data: OccupancyData,
        priors: Priors,
        inits: InitialValues,
        variant: SpatialVariant,
        cov_model: CovModel,
        settings: SamplerSettings,
    ) -> Result<Self> {
        validate_inputs(&data, &priors, &inits, cov_model, &settings)
            .context("Invalid occupancy model")?;
        match &variant {
            SpatialVariant::Dense => {}
            SpatialVariant::Nngp { n_neighbors } => {
                if *n_neighbors == 0 {
                    return Err(SpOccError::InvalidSetting(
                        "an NNGP needs at least one neighbor".to_string(),
                    ))
                    .context("Invalid occupancy model");
                }
            }
            SpatialVariant::NngpNeighbors(index) => {
                check_len("neighbor index sites", data.n_sites(), index.n_sites())
                    .context("Invalid occupancy model")?;
            }
        }
        Ok(Self {
            data,
            priors,
            inits,
            variant,
            cov_model,
            settings,
        })
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Run the chain to completion.
    pub fn sample(&self) -> Result<Trace> {
        // The sender is dropped right away, so the chain never sees a stop
        // request.
        let (_, interrupt) = channel::<()>();
        self.sample_with_interrupt(interrupt)
    }

    /// Run the chain, stopping after the current iteration once a message
    /// arrives on `interrupt`. An interrupted run returns
    /// [`SpOccError::Interrupted`] and no draws.
    pub fn sample_with_interrupt(&self, interrupt: Receiver<()>) -> Result<Trace> {
        let n_threads = self.settings.n_threads;
        if n_threads > self.data.n_sites() {
            warn!(
                "{} threads requested for {} sites, most of them will idle",
                n_threads,
                self.data.n_sites()
            );
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("spocc-worker-{}", i))
            .build()
            .context("Could not start thread pool")?;

        pool.install(move || {
            let interrupt = &interrupt;
            let coords = &self.data.coords;
            match &self.variant {
                SpatialVariant::Dense => {
                    self.run_chain(DenseGp::new(coords, self.cov_model), interrupt)
                }
                SpatialVariant::Nngp { n_neighbors } => {
                    let index = NeighborIndex::nearest(coords, *n_neighbors)
                        .context("Could not build the neighbor index")?;
                    let nngp = Nngp::new(coords, index, self.cov_model)
                        .context("Could not set up the NNGP")?;
                    self.run_chain(nngp, interrupt)
                }
                SpatialVariant::NngpNeighbors(index) => {
                    let nngp = Nngp::new(coords, index.clone(), self.cov_model)
                        .context("Could not set up the NNGP")?;
                    self.run_chain(nngp, interrupt)
                }
            }
        })
    }

    fn describe(&self) -> String {
        let variant = match &self.variant {
            SpatialVariant::Dense => "dense GP".to_string(),
            SpatialVariant::Nngp { n_neighbors } => format!("NNGP with {} neighbors", n_neighbors),
            SpatialVariant::NngpNeighbors(index) => {
                format!("NNGP with up to {} given neighbors", index.max_neighbors())
            }
        };
        format!(
            "spatial occupancy model: {} sites, {} observations, {} {} covariance, \
             {} occurrence and {} detection random effects",
            self.data.n_sites(),
            self.data.n_obs(),
            variant,
            self.cov_model.name(),
            self.data.occ_re.len(),
            self.data.det_re.len(),
        )
    }

    fn run_chain<S: SpatialModel>(&self, mut spatial: S, interrupt: &Receiver<()>) -> Result<Trace> {
        let data = &self.data;
        let priors = &self.priors;
        let settings = &self.settings;
        let n_theta = n_theta(self.cov_model);

        let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
        rng.set_stream(settings.chain);

        let mut state = ChainState::new(data, &self.inits);
        let mut current = spatial.empty_precision();
        spatial
            .rebuild(&state.params, &mut current)
            .context("Could not build the spatial precision at the starting values")?;
        let mut pair = PrecisionPair::new(current, spatial.empty_precision());

        let theta = ThetaUpdate::new(priors, self.cov_model, settings);
        let mut tuner = BatchTuner::new(
            self.inits.log_tuning.clone(),
            settings.batch_length,
            settings.accept_rate,
        );

        let dims = TraceDims {
            n_kept: settings.n_kept(),
            n_batch: settings.n_batch,
            p_occ: data.x_occ.ncols(),
            p_det: data.x_det.ncols(),
            n_sites: data.n_sites(),
            n_obs: data.n_obs(),
            n_theta,
            n_occ_re_levels: data.occ_re.iter().map(|g| g.n_levels()).sum(),
            n_occ_re: data.occ_re.len(),
            n_det_re_levels: data.det_re.iter().map(|g| g.n_levels()).sum(),
            n_det_re: data.det_re.len(),
        };
        let mut trace = Trace::new(dims, settings.chain);
        let mut rates = vec![0f64; n_theta];

        info!("{}", self.describe());
        info!(
            "chain {}: {} batches of {} iterations, {} kept draws",
            settings.chain,
            settings.n_batch,
            settings.batch_length,
            settings.n_kept()
        );
        if theta.is_fixed() {
            debug!("all spatial hyperparameters are fixed");
        }

        let mut iter = 0;
        let mut row = 0;
        for batch in 0..settings.n_batch {
            write_row(&mut trace.tuning, batch, tuner.log_sd().iter().copied());

            for _ in 0..settings.batch_length {
                state.draw_auxiliaries(data, &mut rng);
                if !settings.fixed.beta {
                    state
                        .update_beta(data, priors, &mut rng)
                        .with_context(|| format!("Occurrence update failed at iteration {}", iter))?;
                }
                if !settings.fixed.alpha {
                    state
                        .update_alpha(data, priors, &mut rng)
                        .with_context(|| format!("Detection update failed at iteration {}", iter))?;
                }
                state
                    .update_random_effects(data, priors, &settings.fixed, &mut rng)
                    .with_context(|| format!("Random effect update failed at iteration {}", iter))?;
                theta
                    .update(&mut spatial, &mut pair, &mut state.params, &state.w, &mut tuner, &mut rng)
                    .with_context(|| {
                        format!("Spatial hyperparameter update failed at iteration {}", iter)
                    })?;
                state
                    .update_spatial_effects(&mut spatial, pair.current(), &mut rng)
                    .with_context(|| format!("Spatial effect update failed at iteration {}", iter))?;
                state
                    .update_latent(data, &mut rng)
                    .with_context(|| format!("Latent state update failed at iteration {}", iter))?;

                if settings.keeps(iter) {
                    state.record(&mut trace, row);
                    row += 1;
                }
                iter += 1;

                match interrupt.try_recv() {
                    Ok(()) => {
                        info!("chain {} interrupted after {} iterations", settings.chain, iter);
                        return Err(SpOccError::Interrupted { iteration: iter }.into());
                    }
                    // Nobody can ask us to stop any more.
                    Err(TryRecvError::Disconnected) => {}
                    Err(TryRecvError::Empty) => {}
                }
            }

            tuner.end_batch(batch, &mut rates);
            write_row(&mut trace.accept, batch, rates.iter().copied());

            if settings.report_every > 0 && (batch + 1) % settings.report_every == 0 {
                let report = THETA_NAMES[..n_theta]
                    .iter()
                    .zip(rates.iter().zip(tuner.log_sd()))
                    .map(|(name, (rate, log_sd))| {
                        format!("{} {:.1}% (sd {:.4})", name, 100. * rate, log_sd.exp())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                info!(
                    "chain {} batch {}/{}: acceptance {}",
                    settings.chain,
                    batch + 1,
                    settings.n_batch,
                    report
                );
            }
        }
        debug_assert_eq!(row, settings.n_kept());
        Ok(trace)
    }
}
