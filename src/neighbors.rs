use std::cmp::Ordering;

use crate::cov_model::distance;
use crate::error::{Result, SpOccError};

/// Fixed neighbor graph of an NNGP, stored in CSR form.
///
/// Site `i` conditions on `neighbors(i)`, all of which have an index smaller
/// than `i`. The reverse index lists, for every site, the later sites that use
/// it as a neighbor together with its position in their neighbor list.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborIndex {
    nn_indx: Vec<usize>,
    nn_offsets: Vec<usize>,
    u_indx: Vec<usize>,
    ui_indx: Vec<usize>,
    u_offsets: Vec<usize>,
    max_neighbors: usize,
}

impl NeighborIndex {
    /// Build the index from explicit neighbor lists, one per site.
    pub fn from_lists(lists: &[Vec<usize>]) -> Result<Self> {
        let n_sites = lists.len();
        let mut nn_indx = Vec::with_capacity(lists.iter().map(|l| l.len()).sum());
        let mut nn_offsets = Vec::with_capacity(n_sites + 1);
        nn_offsets.push(0);
        let mut max_neighbors = 0;
        for (site, list) in lists.iter().enumerate() {
            for (pos, &nb) in list.iter().enumerate() {
                if nb >= site {
                    return Err(SpOccError::InvalidNeighbors {
                        site,
                        reason: format!("neighbor {} does not precede the site", nb),
                    });
                }
                if list[..pos].contains(&nb) {
                    return Err(SpOccError::InvalidNeighbors {
                        site,
                        reason: format!("neighbor {} listed twice", nb),
                    });
                }
            }
            max_neighbors = max_neighbors.max(list.len());
            nn_indx.extend_from_slice(list);
            nn_offsets.push(nn_indx.len());
        }

        let mut counts = vec![0usize; n_sites];
        for &nb in nn_indx.iter() {
            counts[nb] += 1;
        }
        let mut u_offsets = Vec::with_capacity(n_sites + 1);
        u_offsets.push(0);
        for &count in counts.iter() {
            let last = u_offsets[u_offsets.len() - 1];
            u_offsets.push(last + count);
        }
        let mut fill = u_offsets[..n_sites].to_vec();
        let mut u_indx = vec![0usize; nn_indx.len()];
        let mut ui_indx = vec![0usize; nn_indx.len()];
        // Users are visited in increasing site order, so every reverse list
        // ends up sorted.
        for site in 0..n_sites {
            for (pos, &nb) in nn_indx[nn_offsets[site]..nn_offsets[site + 1]]
                .iter()
                .enumerate()
            {
                u_indx[fill[nb]] = site;
                ui_indx[fill[nb]] = pos;
                fill[nb] += 1;
            }
        }

        Ok(Self {
            nn_indx,
            nn_offsets,
            u_indx,
            ui_indx,
            u_offsets,
            max_neighbors,
        })
    }

    /// Condition every site on its `m` nearest predecessors in the given order.
    ///
    /// Ties in distance are broken by the smaller site index.
    pub fn nearest(coords: &[[f64; 2]], m: usize) -> Result<Self> {
        if m == 0 {
            return Err(SpOccError::InvalidSetting(
                "the number of neighbors must be at least one".to_string(),
            ));
        }
        let mut candidates: Vec<(f64, usize)> = Vec::with_capacity(coords.len());
        let lists: Vec<Vec<usize>> = coords
            .iter()
            .enumerate()
            .map(|(site, here)| {
                candidates.clear();
                candidates.extend((0..site).map(|other| (distance(here, &coords[other]), other)));
                candidates.sort_by(|a, b| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(Ordering::Equal)
                        .then(a.1.cmp(&b.1))
                });
                candidates.iter().take(m).map(|&(_, other)| other).collect()
            })
            .collect();
        Self::from_lists(&lists)
    }

    pub fn n_sites(&self) -> usize {
        self.nn_offsets.len() - 1
    }

    pub fn max_neighbors(&self) -> usize {
        self.max_neighbors
    }

    #[inline]
    pub fn neighbors(&self, site: usize) -> &[usize] {
        &self.nn_indx[self.nn_offsets[site]..self.nn_offsets[site + 1]]
    }

    /// Offset of the first entry of `site` in the flat neighbor list.
    #[inline]
    pub(crate) fn offset(&self, site: usize) -> usize {
        self.nn_offsets[site]
    }

    pub(crate) fn total_neighbors(&self) -> usize {
        self.nn_indx.len()
    }

    /// Sites that condition on `site`, with the position of `site` in each of
    /// their neighbor lists.
    #[inline]
    pub fn users(&self, site: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let range = self.u_offsets[site]..self.u_offsets[site + 1];
        self.u_indx[range.clone()]
            .iter()
            .copied()
            .zip(self.ui_indx[range].iter().copied())
    }
}
