//! Nearest-neighbor Gaussian process.
//!
//! The joint density of the spatial effects factors as
//! `prod_i N(w_i | B_i w_N(i), F_i)`, where `N(i)` are the earlier neighbors
//! of site `i`. Building the factors costs one small dense solve per site and
//! is done in parallel over fixed chunks of sites.

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::cov_model::{distance, BesselScratch, CovModel};
use crate::error::{check_len, Result, SpOccError};
use crate::linalg::{chol_in_place, chol_solve_in_place};
use crate::math::vector_dot;
use crate::neighbors::NeighborIndex;
use crate::spatial::{DensityTerms, SpatialModel, SpatialParams};

/// Number of sites handled by one parallel task.
///
/// Independent of the thread count, so the reduction order and therefore the
/// result bits do not change with the size of the pool.
pub const SITE_CHUNK: usize = 128;

/// Kriging weights `B` (aligned with the flat neighbor list) and conditional
/// variances `F`.
#[derive(Debug, Clone, PartialEq)]
pub struct NngpFactors {
    b: Vec<f64>,
    f: Vec<f64>,
}

impl NngpFactors {
    pub fn weights(&self) -> &[f64] {
        &self.b
    }

    pub fn cond_variances(&self) -> &[f64] {
        &self.f
    }
}

#[derive(Debug, Clone)]
struct ChunkArena {
    start: usize,
    end: usize,
    c_nn: Vec<f64>,
    c: Vec<f64>,
    bessel: BesselScratch,
}

#[derive(Debug, Clone)]
pub struct Nngp {
    model: CovModel,
    index: NeighborIndex,
    // Column-major `m_i x m_i` distances among the neighbors of each site.
    nb_dist: Vec<f64>,
    nb_dist_offsets: Vec<usize>,
    // Distance from each site to each of its neighbors.
    site_dist: Vec<f64>,
    arenas: Vec<ChunkArena>,
}

impl Nngp {
    pub fn new(coords: &[[f64; 2]], index: NeighborIndex, model: CovModel) -> Result<Self> {
        check_len("neighbor index sites", coords.len(), index.n_sites())?;
        let n = coords.len();
        let m = index.max_neighbors();

        let mut nb_dist = Vec::new();
        let mut nb_dist_offsets = Vec::with_capacity(n + 1);
        let mut site_dist = Vec::with_capacity(index.total_neighbors());
        nb_dist_offsets.push(0);
        for site in 0..n {
            let nbs = index.neighbors(site);
            for &a in nbs {
                for &b in nbs {
                    nb_dist.push(distance(&coords[a], &coords[b]));
                }
            }
            nb_dist_offsets.push(nb_dist.len());
            site_dist.extend(nbs.iter().map(|&nb| distance(&coords[site], &coords[nb])));
        }

        let arenas = (0..n)
            .step_by(SITE_CHUNK)
            .map(|start| ChunkArena {
                start,
                end: (start + SITE_CHUNK).min(n),
                c_nn: vec![0f64; m * m],
                c: vec![0f64; m],
                bessel: BesselScratch::new(),
            })
            .collect();

        Ok(Self {
            model,
            index,
            nb_dist,
            nb_dist_offsets,
            site_dist,
            arenas,
        })
    }

    pub fn index(&self) -> &NeighborIndex {
        &self.index
    }
}

fn build_chunk(
    arena: &mut ChunkArena,
    b_chunk: &mut [f64],
    f_chunk: &mut [f64],
    nngp: NngpView<'_>,
    params: &SpatialParams,
) -> Result<()> {
    let index = nngp.index;
    let base = index.offset(arena.start);
    for (local, site) in (arena.start..arena.end).enumerate() {
        let nbs = index.neighbors(site);
        let m = nbs.len();
        if m == 0 {
            f_chunk[local] = params.sigma_sq;
            continue;
        }
        let off = index.offset(site);
        let dists = &nngp.nb_dist[nngp.nb_dist_offsets[site]..nngp.nb_dist_offsets[site + 1]];

        let c_nn = &mut arena.c_nn[..m * m];
        for col in 0..m {
            for row in col..m {
                c_nn[row + col * m] = nngp.model.covariance(
                    dists[row + col * m],
                    params.sigma_sq,
                    params.phi,
                    params.nu,
                    &mut arena.bessel,
                );
            }
        }
        let c = &mut arena.c[..m];
        for (slot, &d) in c.iter_mut().zip(&nngp.site_dist[off..off + m]) {
            *slot = nngp.model.covariance(
                d,
                params.sigma_sq,
                params.phi,
                params.nu,
                &mut arena.bessel,
            );
        }

        if !chol_in_place(c_nn, m) {
            return Err(SpOccError::NotPositiveDefinite {
                what: "NNGP neighbor covariance",
            });
        }
        let b_site = &mut b_chunk[off - base..off - base + m];
        b_site.copy_from_slice(c);
        chol_solve_in_place(c_nn, m, b_site);

        let f = params.sigma_sq - vector_dot(b_site, c);
        if !(f > 0.) || !f.is_finite() {
            return Err(SpOccError::NotPositiveDefinite {
                what: "NNGP conditional variance",
            });
        }
        f_chunk[local] = f;
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct NngpView<'a> {
    model: CovModel,
    index: &'a NeighborIndex,
    nb_dist: &'a [f64],
    nb_dist_offsets: &'a [usize],
    site_dist: &'a [f64],
}

impl SpatialModel for Nngp {
    type Precision = NngpFactors;

    fn n_sites(&self) -> usize {
        self.index.n_sites()
    }

    fn empty_precision(&self) -> NngpFactors {
        NngpFactors {
            b: vec![0f64; self.index.total_neighbors()],
            f: vec![0f64; self.index.n_sites()],
        }
    }

    fn rebuild(&mut self, params: &SpatialParams, out: &mut NngpFactors) -> Result<()> {
        let view = NngpView {
            model: self.model,
            index: &self.index,
            nb_dist: &self.nb_dist,
            nb_dist_offsets: &self.nb_dist_offsets,
            site_dist: &self.site_dist,
        };

        let mut b_rest: &mut [f64] = &mut out.b;
        let mut f_rest: &mut [f64] = &mut out.f;
        let mut jobs = Vec::with_capacity(self.arenas.len());
        for arena in self.arenas.iter_mut() {
            let b_len = view.index.offset(arena.end) - view.index.offset(arena.start);
            let (b_chunk, b_tail) = std::mem::take(&mut b_rest).split_at_mut(b_len);
            b_rest = b_tail;
            let (f_chunk, f_tail) = std::mem::take(&mut f_rest).split_at_mut(arena.end - arena.start);
            f_rest = f_tail;
            jobs.push((arena, b_chunk, f_chunk));
        }

        jobs.into_par_iter()
            .try_for_each(|(arena, b_chunk, f_chunk)| {
                build_chunk(arena, b_chunk, f_chunk, view, params)
            })
    }

    fn density_terms(&self, precision: &NngpFactors, w: &[f64]) -> DensityTerms {
        let index = &self.index;
        let n = index.n_sites();
        let n_chunks = self.arenas.len();
        let partial: Vec<(f64, f64)> = (0..n_chunks)
            .into_par_iter()
            .map(|chunk| {
                let start = chunk * SITE_CHUNK;
                let end = (start + SITE_CHUNK).min(n);
                let mut quad = 0f64;
                let mut log_det = 0f64;
                for site in start..end {
                    let off = index.offset(site);
                    let nbs = index.neighbors(site);
                    let mean: f64 = nbs
                        .iter()
                        .zip(&precision.b[off..off + nbs.len()])
                        .map(|(&nb, &b)| b * w[nb])
                        .sum();
                    let resid = w[site] - mean;
                    quad += resid * resid / precision.f[site];
                    log_det += precision.f[site].ln();
                }
                (quad, log_det)
            })
            .collect();

        let (quad, log_det) = partial
            .iter()
            .fold((0f64, 0f64), |(q, l), &(pq, pl)| (q + pq, l + pl));
        DensityTerms { quad, log_det }
    }

    /// Single-site Gibbs sweep in site order.
    ///
    /// The full conditional of `w_i` collects its own conditional density and
    /// the densities of every later site that uses it as a neighbor.
    fn draw_effects<R: Rng + ?Sized>(
        &mut self,
        precision: &NngpFactors,
        omega: &[f64],
        resid: &[f64],
        rng: &mut R,
        w: &mut [f64],
    ) -> Result<()> {
        let index = &self.index;
        let b = &precision.b;
        let f = &precision.f;
        for site in 0..index.n_sites() {
            let mut a = 0f64;
            let mut v = 0f64;
            for (user, pos) in index.users(site) {
                let off = index.offset(user);
                let mut e = 0f64;
                for (k, &nb) in index.neighbors(user).iter().enumerate() {
                    if k != pos {
                        e += b[off + k] * w[nb];
                    }
                }
                let b_user = b[off + pos];
                a += b_user * (w[user] - e) / f[user];
                v += b_user * b_user / f[user];
            }

            let off = index.offset(site);
            let e: f64 = index
                .neighbors(site)
                .iter()
                .enumerate()
                .map(|(k, &nb)| b[off + k] * w[nb])
                .sum();

            let mu = resid[site] + e / f[site] + a;
            let var = 1. / (omega[site] + 1. / f[site] + v);
            let z: f64 = rng.sample(StandardNormal);
            w[site] = mu * var + var.sqrt() * z;
        }
        Ok(())
    }
}
