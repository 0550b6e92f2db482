//! Quantum k-means estimator
//!
//! Lloyd iterations where the assignment step uses swap-test distances:
//! assign every point to its nearest center, move centers to the mean of
//! their points, repeat until the centers stop moving or `max_iter` is hit.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::config::{Init, QKMeansConfig};
use super::seeding::seed_centers;
use crate::backend::Backend;
use crate::distance::SwapTestEstimator;
use crate::encoding::EncodingScheme;
use crate::error::{QKMeansError, Result};
use crate::preprocess::{dimension_of, l2_norm, normalize, preprocess};

/// Phases of a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPhase {
    Initializing,
    Assigning,
    Updating,
    Converged,
    IterationLimitReached,
}

/// k-means with swap-test distances on an explicit backend
#[derive(Debug)]
pub struct QuantumKMeans<B: Backend> {
    backend: B,
    config: QKMeansConfig,
    cluster_centers: Vec<Vec<f64>>,
    labels: Vec<usize>,
    n_iter: usize,
    phase: Option<FitPhase>,
}

impl<B: Backend> QuantumKMeans<B> {
    pub fn new(backend: B, config: QKMeansConfig) -> Self {
        Self {
            backend,
            config,
            cluster_centers: Vec::new(),
            labels: Vec::new(),
            n_iter: 0,
            phase: None,
        }
    }

    /// Centers in the preprocessed feature space
    pub fn cluster_centers(&self) -> &[Vec<f64>] {
        &self.cluster_centers
    }

    /// Label of every training point from the last assignment
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Iterations run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Terminal phase of the last fit, `None` before fitting
    pub fn termination(&self) -> Option<FitPhase> {
        self.phase
    }

    pub fn is_fitted(&self) -> bool {
        !self.cluster_centers.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn params(&self) -> &QKMeansConfig {
        &self.config
    }

    /// Replace the configuration. Fitted state is kept.
    pub fn set_params(&mut self, config: QKMeansConfig) -> &mut Self {
        self.config = config;
        self
    }

    fn rng(&self) -> StdRng {
        match self.config.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Cluster `data`. On error the model is left as it was.
    pub fn fit(&mut self, data: &[Vec<f64>]) -> Result<&mut Self> {
        self.config.validate()?;
        let config = &self.config;
        let scheme = config.encoding_scheme();

        debug!(phase = ?FitPhase::Initializing, points = data.len(), "starting fit");
        let points = preprocess(data, &scheme)?;
        if config.n_clusters > points.len() {
            return Err(QKMeansError::InvalidConfig(format!(
                "n_clusters = {} exceeds {} samples",
                config.n_clusters,
                points.len()
            )));
        }

        let mut rng = self.rng();
        let estimator =
            SwapTestEstimator::new(&self.backend, scheme).with_options(config.estimator_options());
        let mut centers = initial_centers(&points, config, &estimator, &mut rng)?;

        let mut n_iter = 0;
        let (labels, phase) = loop {
            debug!(phase = ?FitPhase::Assigning, iteration = n_iter);
            let labels = estimator.estimate(&points, &centers)?.nearest_centers();

            debug!(phase = ?FitPhase::Updating, iteration = n_iter);
            let updated = update_centers(&points, &labels, &centers, &scheme, &mut rng);
            let shift = config.convergence.shift(&centers, &updated);
            centers = updated;
            n_iter += 1;
            info!(iteration = n_iter, shift, "qk-means iteration");

            if shift < config.tol {
                break (labels, FitPhase::Converged);
            }
            if n_iter >= config.max_iter {
                warn!(max_iter = config.max_iter, shift, "iteration limit reached before convergence");
                break (labels, FitPhase::IterationLimitReached);
            }
        };

        info!(phase = ?phase, n_iter, "fit finished");
        self.cluster_centers = centers;
        self.labels = labels;
        self.n_iter = n_iter;
        self.phase = Some(phase);
        Ok(self)
    }

    /// Nearest fitted center for every row of `data`.
    ///
    /// `weights`, when given, scales each preprocessed feature.
    pub fn predict(&self, data: &[Vec<f64>], weights: Option<&[f64]>) -> Result<Vec<usize>> {
        if !self.is_fitted() {
            return Err(QKMeansError::NotFitted);
        }
        let scheme = self.config.encoding_scheme();
        let mut points = preprocess(data, &scheme)?;

        if let Some(w) = weights {
            let dim = dimension_of(&points)?;
            if w.len() != dim {
                return Err(QKMeansError::DimensionMismatch {
                    expected: dim,
                    got: w.len(),
                });
            }
            for row in points.iter_mut() {
                row.iter_mut().zip(w).for_each(|(x, w)| *x *= w);
            }
        }

        let estimator = SwapTestEstimator::new(&self.backend, scheme)
            .with_options(self.config.estimator_options());
        Ok(estimator
            .estimate(&points, &self.cluster_centers)?
            .nearest_centers())
    }

    /// Fit, then return the training labels
    pub fn fit_predict(&mut self, data: &[Vec<f64>]) -> Result<Vec<usize>> {
        Ok(self.fit(data)?.labels.clone())
    }
}

fn initial_centers<B: Backend + ?Sized>(
    points: &[Vec<f64>],
    config: &QKMeansConfig,
    estimator: &SwapTestEstimator<'_, B>,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>> {
    let k = config.n_clusters;
    let centers = match &config.init {
        Init::QKMeansPlusPlus => {
            seed_centers(
                points,
                k,
                estimator,
                config.initial_center,
                config.n_local_trials,
                rng,
            )?
            .centers
        }
        Init::Random => sample(rng, points.len(), k)
            .into_iter()
            .map(|i| points[i].clone())
            .collect(),
        Init::Explicit(centers) => centers.clone(),
        Init::Custom(init) => init(points, k, rng),
    };
    check_centers(&centers, k, points[0].len())?;
    Ok(centers)
}

fn check_centers(centers: &[Vec<f64>], k: usize, dim: usize) -> Result<()> {
    if centers.len() != k {
        return Err(QKMeansError::InvalidConfig(format!(
            "initializer returned {} centers, expected {k}",
            centers.len()
        )));
    }
    for c in centers {
        if c.len() != dim {
            return Err(QKMeansError::DimensionMismatch {
                expected: dim,
                got: c.len(),
            });
        }
    }
    Ok(())
}

/// Mean of the points assigned to each center.
///
/// Empty clusters restart from a random point. Under probability encoding
/// means are projected back onto the unit sphere; a zero mean keeps the old
/// center.
fn update_centers<R: Rng + ?Sized>(
    points: &[Vec<f64>],
    labels: &[usize],
    old: &[Vec<f64>],
    scheme: &EncodingScheme,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let k = old.len();
    let dim = points[0].len();
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];

    for (point, &label) in points.iter().zip(labels) {
        for (s, &x) in sums[label].iter_mut().zip(point) {
            *s += x;
        }
        counts[label] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(c, (mut sum, count))| {
            if count == 0 {
                let i = rng.gen_range(0..points.len());
                warn!(cluster = c, point = i, "empty cluster, reinitializing from a random point");
                return points[i].clone();
            }
            sum.iter_mut().for_each(|s| *s /= count as f64);
            match scheme {
                EncodingScheme::Probability if l2_norm(&sum) == 0.0 => old[c].clone(),
                EncodingScheme::Probability => normalize(&sum),
                EncodingScheme::Angle { .. } => sum,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SwapTestSimulator;
    use crate::encoding::MapType;

    fn blobs(a: [f64; 2], b: [f64; 2], per: usize) -> Vec<Vec<f64>> {
        let mut out = Vec::new();
        for center in [a, b] {
            for i in 0..per {
                let dx = (i % 3) as f64 * 0.2 - 0.2;
                let dy = (i / 3 % 3) as f64 * 0.2 - 0.2;
                out.push(vec![center[0] + dx, center[1] + dy]);
            }
        }
        out
    }

    fn assert_two_groups(labels: &[usize], per: usize) {
        let first = labels[0];
        let second = labels[per];
        assert_ne!(first, second);
        assert!(labels[..per].iter().all(|&l| l == first));
        assert!(labels[per..].iter().all(|&l| l == second));
    }

    #[test]
    fn test_fit_probability_blobs() {
        let data = blobs([10.0, 1.0], [1.0, 10.0], 9);
        let config = QKMeansConfig::new(2)
            .with_map_type(MapType::Probability)
            .with_max_iter(20)
            .with_random_state(7);
        let mut model = QuantumKMeans::new(SwapTestSimulator::exact(4), config);
        model.fit(&data).unwrap();

        assert_eq!(model.termination(), Some(FitPhase::Converged));
        assert!(model.n_iter() < 20);
        assert_two_groups(model.labels(), 9);
        for c in model.cluster_centers() {
            assert!((l2_norm(c) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fit_angle_blobs() {
        let data = blobs([0.0, 0.0], [10.0, 10.0], 9);
        let config = QKMeansConfig::new(2)
            .with_map_type(MapType::Angle)
            .with_max_iter(20)
            .with_random_state(3);
        let mut model = QuantumKMeans::new(SwapTestSimulator::exact(8), config);
        let labels = model.fit_predict(&data).unwrap();

        assert_eq!(model.termination(), Some(FitPhase::Converged));
        assert_two_groups(&labels, 9);
    }

    #[test]
    fn test_iteration_limit() {
        let data = blobs([10.0, 1.0], [1.0, 10.0], 9);
        let config = QKMeansConfig::new(2)
            .with_init(Init::Explicit(vec![vec![1.0, 0.0], vec![0.6, 0.8]]))
            .with_tol(0.0)
            .with_max_iter(1);
        let mut model = QuantumKMeans::new(SwapTestSimulator::exact(4), config);
        model.fit(&data).unwrap();

        assert_eq!(model.n_iter(), 1);
        assert_eq!(model.termination(), Some(FitPhase::IterationLimitReached));
    }

    #[test]
    fn test_predict_requires_fit() {
        let model = QuantumKMeans::new(SwapTestSimulator::exact(4), QKMeansConfig::new(2));
        assert!(matches!(
            model.predict(&[vec![1.0, 0.0]], None),
            Err(QKMeansError::NotFitted)
        ));
    }

    #[test]
    fn test_predict_weights_length_checked() {
        let data = blobs([10.0, 1.0], [1.0, 10.0], 9);
        let mut model = QuantumKMeans::new(
            SwapTestSimulator::exact(4),
            QKMeansConfig::new(2).with_random_state(1),
        );
        model.fit(&data).unwrap();

        assert!(matches!(
            model.predict(&data, Some(&[1.0, 1.0, 1.0])),
            Err(QKMeansError::DimensionMismatch { expected: 2, got: 3 })
        ));
        let weighted = model.predict(&data, Some(&[1.0, 1.0])).unwrap();
        assert_eq!(weighted, model.predict(&data, None).unwrap());
    }

    #[test]
    fn test_custom_initializer_shape_checked() {
        let data = blobs([10.0, 1.0], [1.0, 10.0], 9);
        let config = QKMeansConfig::new(2).with_init(Init::Custom(std::sync::Arc::new(
            |points: &[Vec<f64>], _k: usize, _rng: &mut StdRng| vec![points[0].clone()],
        )));
        let mut model = QuantumKMeans::new(SwapTestSimulator::exact(4), config);
        assert!(matches!(model.fit(&data), Err(QKMeansError::InvalidConfig(_))));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_update_centers_empty_cluster_and_renormalize() {
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let old = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
        let mut rng = StdRng::seed_from_u64(0);
        let updated = update_centers(&points, &[0, 0], &old, &EncodingScheme::Probability, &mut rng);

        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert!((updated[0][0] - s).abs() < 1e-12 && (updated[0][1] - s).abs() < 1e-12);
        // empty clusters restart from one of the points
        assert!(points.contains(&updated[1]));
        assert!(points.contains(&updated[2]));
    }
}
