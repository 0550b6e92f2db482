//! Swap-test distance estimation
//!
//! Distances are not computed arithmetically: every (point, center) pair is
//! encoded into a swap-test circuit, executed on a [`Backend`], and the
//! frequency of the marked outcome on the control qubit is the distance.
//! The estimate lies in `[0, 0.5]` for ideal hardware and is noisy by
//! nature.

pub mod matrix;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{execute_with_retry, Backend, Histogram, RetryPolicy};
use crate::batch::{collect_results, make_batches, Batch};
use crate::circuit::Circuit;
use crate::encoding::EncodingScheme;
use crate::error::Result;

pub use matrix::DistanceMatrix;

/// Shots per circuit unless configured otherwise
pub const DEFAULT_SHOTS: u32 = 1024;

/// Turn one swap-test histogram into a distance.
///
/// A histogram with a single distinct outcome means both operands always
/// collapsed the same way and decodes to `0.0`, whatever that outcome is.
/// Otherwise the distance is the frequency of `marked` over `shots`.
#[inline]
pub fn decode_histogram(histogram: &Histogram, marked: &str, shots: u32) -> f64 {
    if histogram.distinct() <= 1 || shots == 0 {
        return 0.0;
    }
    histogram.count(marked) as f64 / shots as f64
}

/// Execution knobs shared by every distance computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorOptions {
    pub shots: u32,
    /// Pack many circuits per job instead of one job per pair
    pub batching: bool,
    /// Submit independent jobs concurrently
    pub parallel: bool,
    pub retry: RetryPolicy,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            shots: DEFAULT_SHOTS,
            batching: true,
            parallel: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Estimates distances by running swap tests on a backend
pub struct SwapTestEstimator<'b, B: Backend + ?Sized> {
    backend: &'b B,
    scheme: EncodingScheme,
    options: EstimatorOptions,
}

impl<'b, B: Backend + ?Sized> SwapTestEstimator<'b, B> {
    pub fn new(backend: &'b B, scheme: EncodingScheme) -> Self {
        Self {
            backend,
            scheme,
            options: EstimatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EstimatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn scheme(&self) -> &EncodingScheme {
        &self.scheme
    }

    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    /// Distance between two vectors, as a single one-circuit job
    pub fn distance(&self, x: &[f64], y: &[f64]) -> Result<f64> {
        let circuit = self.scheme.build_circuit(x, y)?;
        Ok(self.run_job(&[circuit])?[0])
    }

    /// Full centers × points matrix, batched or pairwise per the options
    pub fn estimate(&self, dataset: &[Vec<f64>], centers: &[Vec<f64>]) -> Result<DistanceMatrix> {
        if self.options.batching {
            self.estimate_batched(dataset, centers)
        } else {
            self.estimate_pairwise(dataset, centers)
        }
    }

    /// One job per batch; requires more points than centers
    pub fn estimate_batched(
        &self,
        dataset: &[Vec<f64>],
        centers: &[Vec<f64>],
    ) -> Result<DistanceMatrix> {
        let max_job = self.backend.max_job_size();
        let batches = make_batches(dataset, centers, max_job)?;
        debug!(
            points = dataset.len(),
            centers = centers.len(),
            batches = batches.len(),
            max_job,
            "estimating distances in batches"
        );

        let per_batch: Vec<Vec<f64>> = if self.options.parallel {
            batches.par_iter().map(|b| self.run_batch(b)).collect::<Result<_>>()?
        } else {
            batches.iter().map(|b| self.run_batch(b)).collect::<Result<_>>()?
        };

        let flat: Vec<f64> = per_batch.into_iter().flatten().collect();
        collect_results(&flat, centers.len(), dataset.len(), max_job)
    }

    /// One job per (point, center) pair
    pub fn estimate_pairwise(
        &self,
        dataset: &[Vec<f64>],
        centers: &[Vec<f64>],
    ) -> Result<DistanceMatrix> {
        let n_points = dataset.len();
        debug!(
            points = n_points,
            centers = centers.len(),
            "estimating distances pairwise"
        );

        let pair = |i: usize| self.distance(&dataset[i % n_points], &centers[i / n_points]);
        let total = centers.len() * n_points;
        let flat: Vec<f64> = if self.options.parallel {
            (0..total).into_par_iter().map(pair).collect::<Result<_>>()?
        } else {
            (0..total).map(pair).collect::<Result<_>>()?
        };

        Ok(DistanceMatrix::from_rows(
            flat.chunks(n_points.max(1)).map(<[f64]>::to_vec).collect(),
        ))
    }

    fn run_batch(&self, batch: &Batch<'_>) -> Result<Vec<f64>> {
        let circuits = batch
            .points
            .iter()
            .map(|p| self.scheme.build_circuit(p, batch.center))
            .collect::<Result<Vec<_>>>()?;
        self.run_job(&circuits)
    }

    fn run_job(&self, circuits: &[Circuit]) -> Result<Vec<f64>> {
        let shots = self.options.shots;
        let histograms = execute_with_retry(self.backend, circuits, shots, &self.options.retry)?;
        Ok(circuits
            .iter()
            .zip(&histograms)
            .map(|(c, h)| decode_histogram(h, &c.marked_outcome(), shots))
            .collect())
    }
}

/// Centers × points swap-test distances with default options
pub fn estimate_distances<B: Backend + ?Sized>(
    dataset: &[Vec<f64>],
    centers: &[Vec<f64>],
    backend: &B,
    scheme: &EncodingScheme,
    use_batching: bool,
) -> Result<DistanceMatrix> {
    let options = EstimatorOptions {
        batching: use_batching,
        ..EstimatorOptions::default()
    };
    SwapTestEstimator::new(backend, *scheme)
        .with_options(options)
        .estimate(dataset, centers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, SwapTestSimulator};
    use crate::error::QKMeansError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_decode_single_outcome_is_zero() {
        let only_marked: Histogram = [("001", 1024u64)].into_iter().collect();
        let only_zero: Histogram = [("000", 1024u64)].into_iter().collect();
        assert_eq!(decode_histogram(&only_marked, "001", 1024), 0.0);
        assert_eq!(decode_histogram(&only_zero, "001", 1024), 0.0);
    }

    #[test]
    fn test_decode_frequency() {
        let h: Histogram = [("000", 768u64), ("001", 256)].into_iter().collect();
        assert_eq!(decode_histogram(&h, "001", 1024), 0.25);

        let missing: Histogram = [("000", 768u64), ("010", 256)].into_iter().collect();
        assert_eq!(decode_histogram(&missing, "001", 1024), 0.0);
    }

    #[test]
    fn test_identical_and_opposite_angle_vectors() {
        let sim = SwapTestSimulator::exact(16);
        let est = SwapTestEstimator::new(&sim, EncodingScheme::ANGLE);

        assert_eq!(est.distance(&[0.3, -1.2], &[0.3, -1.2]).unwrap(), 0.0);
        let d = est.distance(&[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        assert!((d - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_batched_matches_pairwise() {
        let sim = SwapTestSimulator::exact(3);
        let data: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                let t = i as f64 * 0.7;
                vec![t.cos(), t.sin()]
            })
            .collect();
        let centers = vec![vec![1.0, 0.0], vec![0.0, -1.0]];

        let est = SwapTestEstimator::new(&sim, EncodingScheme::Probability);
        let batched = est.estimate_batched(&data, &centers).unwrap();
        let pairwise = est.estimate_pairwise(&data, &centers).unwrap();
        assert_eq!(batched, pairwise);
        assert_eq!(batched.n_centers(), 2);
        assert_eq!(batched.n_points(), 8);
    }

    /// Counts jobs and circuits, answering with a fixed histogram
    struct Recorder {
        jobs: AtomicUsize,
        largest: AtomicUsize,
        fail: bool,
    }

    impl Backend for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn max_job_size(&self) -> usize {
            4
        }

        fn execute(
            &self,
            circuits: &[Circuit],
            shots: u32,
        ) -> std::result::Result<Vec<Histogram>, BackendError> {
            if self.fail {
                return Err(BackendError::Rejected("offline".into()));
            }
            self.jobs.fetch_add(1, Ordering::SeqCst);
            self.largest.fetch_max(circuits.len(), Ordering::SeqCst);
            Ok(circuits
                .iter()
                .map(|c| {
                    [("000".to_string(), shots as u64 / 2), (c.marked_outcome(), shots as u64 / 2)]
                        .into_iter()
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_job_count_respects_max_job_size() {
        let backend = Recorder {
            jobs: AtomicUsize::new(0),
            largest: AtomicUsize::new(0),
            fail: false,
        };
        let data = vec![vec![1.0, 0.0]; 10];
        let centers = vec![vec![0.0, 1.0]; 3];

        let m = estimate_distances(&data, &centers, &backend, &EncodingScheme::ANGLE, true).unwrap();
        // ceil(10 / 4) chunks × 3 centers
        assert_eq!(backend.jobs.load(Ordering::SeqCst), 9);
        assert_eq!(backend.largest.load(Ordering::SeqCst), 4);
        assert!(m.rows().flatten().all(|&d| d == 0.5));
    }

    #[test]
    fn test_backend_failure_propagates() {
        let backend = Recorder {
            jobs: AtomicUsize::new(0),
            largest: AtomicUsize::new(0),
            fail: true,
        };
        let data = vec![vec![1.0, 0.0]; 3];
        let err = estimate_distances(&data, &data[..1], &backend, &EncodingScheme::ANGLE, false)
            .unwrap_err();
        assert!(matches!(err, QKMeansError::BackendExecution { attempts: 1, .. }));
    }
}
