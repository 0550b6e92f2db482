//! qk-means++ seeding
//!
//! k-means++ driven by swap-test distances: each new center is picked
//! greedily among a few candidates sampled in proportion to the current
//! closest-center distances.

use rand::Rng;
use tracing::debug;

use super::config::InitialCenter;
use crate::backend::Backend;
use crate::distance::SwapTestEstimator;
use crate::error::{QKMeansError, Result};
use crate::preprocess::dimension_of;

/// Chosen centers and the rows they were taken from
#[derive(Debug, Clone, PartialEq)]
pub struct Seeding {
    pub centers: Vec<Vec<f64>>,
    /// `centers[i] == dataset[indices[i]]`
    pub indices: Vec<usize>,
}

/// Candidates drawn per step when not configured: `2 + floor(ln k)`
pub fn default_trials(n_clusters: usize) -> usize {
    2 + (n_clusters.max(1) as f64).ln().floor() as usize
}

/// Pick `n_clusters` distinct rows of `dataset` as initial centers
pub fn seed_centers<B, R>(
    dataset: &[Vec<f64>],
    n_clusters: usize,
    estimator: &SwapTestEstimator<'_, B>,
    strategy: InitialCenter,
    n_local_trials: Option<usize>,
    rng: &mut R,
) -> Result<Seeding>
where
    B: Backend + ?Sized,
    R: Rng + ?Sized,
{
    dimension_of(dataset)?;
    let n = dataset.len();
    if n_clusters == 0 || n_clusters > n {
        return Err(QKMeansError::InvalidConfig(format!(
            "cannot seed {n_clusters} centers from {n} points"
        )));
    }
    let trials = n_local_trials.unwrap_or_else(|| default_trials(n_clusters)).max(1);

    let first = rng.gen_range(0..n);
    let mut indices = vec![first];
    if n_clusters == 1 {
        return Ok(Seeding {
            centers: vec![dataset[first].clone()],
            indices,
        });
    }
    let mut closest = distances_to(dataset, first, estimator)?;
    debug!(center = 0, index = first, "seeded first center");

    for c in 1..n_clusters {
        let (chosen, next_closest) = greedy_step(dataset, &closest, &indices, trials, estimator, rng)?;
        indices.push(chosen);
        closest = next_closest;
        debug!(center = c, index = chosen, potential = closest.iter().sum::<f64>(), "seeded center");

        if c == 1 && strategy == InitialCenter::Far {
            let second = indices[1];
            let from_second = distances_to(dataset, second, estimator)?;
            let (chosen, next_closest) =
                greedy_step(dataset, &from_second, &[second], trials, estimator, rng)?;
            indices[0] = chosen;
            closest = next_closest;
            debug!(index = chosen, "re-seeded first center away from the second");
        }
    }

    Ok(Seeding {
        centers: indices.iter().map(|&i| dataset[i].clone()).collect(),
        indices,
    })
}

fn distances_to<B: Backend + ?Sized>(
    dataset: &[Vec<f64>],
    index: usize,
    estimator: &SwapTestEstimator<'_, B>,
) -> Result<Vec<f64>> {
    let m = estimator.estimate(dataset, std::slice::from_ref(&dataset[index]))?;
    Ok(m.row(0).to_vec())
}

/// Sample candidates, then keep the one whose addition minimizes the summed
/// closest distance. Returns its row index and the updated closest vector.
fn greedy_step<B, R>(
    dataset: &[Vec<f64>],
    closest: &[f64],
    chosen: &[usize],
    trials: usize,
    estimator: &SwapTestEstimator<'_, B>,
    rng: &mut R,
) -> Result<(usize, Vec<f64>)>
where
    B: Backend + ?Sized,
    R: Rng + ?Sized,
{
    let mut weights: Vec<f64> = closest
        .iter()
        .map(|&d| if d.is_finite() && d > 0.0 { d } else { 0.0 })
        .collect();
    for &i in chosen {
        weights[i] = 0.0;
    }

    let candidates = sample_candidates(&weights, chosen, trials, rng);
    let candidate_centers: Vec<Vec<f64>> = candidates.iter().map(|&i| dataset[i].clone()).collect();
    let distances = estimator.estimate(dataset, &candidate_centers)?;

    let mut best: Option<(usize, f64, Vec<f64>)> = None;
    for (row, &candidate) in distances.rows().zip(&candidates) {
        let merged: Vec<f64> = closest.iter().zip(row).map(|(&a, &b)| a.min(b)).collect();
        let potential: f64 = merged.iter().sum();
        if best.as_ref().map_or(true, |(_, p, _)| potential < *p) {
            best = Some((candidate, potential, merged));
        }
    }

    best.map(|(index, _, merged)| (index, merged))
        .ok_or_else(|| QKMeansError::InvalidConfig("no seeding candidates".into()))
}

/// Inverse-CDF sampling over `weights`, deduplicated in draw order.
///
/// Falls back to uniform sampling over unchosen rows when every weight is
/// zero.
fn sample_candidates<R: Rng + ?Sized>(
    weights: &[f64],
    chosen: &[usize],
    trials: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for &w in weights {
        acc += w;
        cumulative.push(acc);
    }
    let potential = acc;

    let mut candidates = Vec::with_capacity(trials);
    if potential > 0.0 {
        let last_positive = weights.iter().rposition(|&w| w > 0.0).unwrap_or(0);
        for _ in 0..trials {
            let target = rng.gen::<f64>() * potential;
            let index = cumulative.partition_point(|&c| c <= target).min(last_positive);
            if !candidates.contains(&index) {
                candidates.push(index);
            }
        }
    } else {
        let free: Vec<usize> = (0..weights.len()).filter(|i| !chosen.contains(i)).collect();
        for _ in 0..trials {
            let index = free[rng.gen_range(0..free.len())];
            if !candidates.contains(&index) {
                candidates.push(index);
            }
        }
    }
    candidates
}
