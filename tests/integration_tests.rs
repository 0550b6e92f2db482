use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use qkmeans::{
    decode_histogram, estimate_distances, seed_centers, Backend, BackendError, Circuit,
    EncodingScheme, EstimatorOptions, FitPhase, Histogram, InitialCenter, MapType, QKMeansConfig,
    QKMeansError, QuantumKMeans, RetryPolicy, SwapTestEstimator, SwapTestSimulator,
};

fn circle_points(n: usize, phase: f64) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let t = phase + i as f64 * 0.37;
            vec![t.cos() * (1.0 + i as f64 * 0.1), t.sin()]
        })
        .collect()
}

#[test]
fn test_identical_vectors_have_zero_distance() {
    let sim = SwapTestSimulator::sampled(16, 11);
    let est = SwapTestEstimator::new(&sim, EncodingScheme::ANGLE);
    for v in circle_points(10, 0.0) {
        assert_eq!(est.distance(&v, &v).unwrap(), 0.0);
    }
}

#[test]
fn test_opposite_phase_near_maximum() {
    // sampled shots: the estimate is noisy around 0.5
    let sim = SwapTestSimulator::sampled(16, 5);
    let est = SwapTestEstimator::new(&sim, EncodingScheme::ANGLE);
    let d = est.distance(&[2.0, 1.0], &[-2.0, -1.0]).unwrap();
    assert!((d - 0.5).abs() < 0.08, "got {d}");
}

#[test]
fn test_degenerate_histogram_decodes_to_zero() {
    for outcome in ["000", "001", "111", "00001"] {
        let h: Histogram = [(outcome, 1024u64)].into_iter().collect();
        assert_eq!(decode_histogram(&h, "001", 1024), 0.0);
        assert_eq!(decode_histogram(&h, "00001", 1024), 0.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_batched_equals_pairwise(
        n_points in 2usize..24,
        n_centers in 1usize..6,
        max_job in 1usize..9,
        dim in 1usize..6,
        shot_seed in any::<u64>(),
        raw in proptest::collection::vec(0.05f64..1.0, 24 * 6 + 6 * 6),
    ) {
        prop_assume!(n_points > n_centers);

        let rows = |offset: usize, n: usize| -> Vec<Vec<f64>> {
            (0..n).map(|i| raw[offset + i * dim..offset + (i + 1) * dim].to_vec()).collect()
        };
        let data = rows(0, n_points);
        let centers = rows(24 * 6, n_centers);

        let sim = SwapTestSimulator::sampled(max_job, shot_seed);
        let batched = estimate_distances(&data, &centers, &sim, &EncodingScheme::Probability, true).unwrap();
        let pairwise = estimate_distances(&data, &centers, &sim, &EncodingScheme::Probability, false).unwrap();
        prop_assert_eq!(batched, pairwise);
    }

    #[test]
    fn prop_seeding_deterministic_and_distinct(
        seed in any::<u64>(),
        n_points in 6usize..20,
        k in 1usize..5,
    ) {
        let data = circle_points(n_points, 0.3);
        let sim = SwapTestSimulator::exact(7);
        let est = SwapTestEstimator::new(&sim, EncodingScheme::ANGLE);

        let run = || {
            let mut rng = StdRng::seed_from_u64(seed);
            seed_centers(&data, k, &est, InitialCenter::Random, None, &mut rng).unwrap()
        };
        let a = run();
        prop_assert_eq!(&a, &run());

        let mut idx = a.indices.clone();
        idx.sort_unstable();
        idx.dedup();
        prop_assert_eq!(idx.len(), k);
        prop_assert!(a.indices.iter().all(|&i| i < n_points));
    }
}

fn blobs() -> Vec<Vec<f64>> {
    let mut data = Vec::new();
    for (cx, cy) in [(0.0, 0.0), (10.0, 10.0)] {
        for i in 0..12 {
            let dx = (i % 4) as f64 * 0.1 - 0.15;
            let dy = (i / 4) as f64 * 0.1 - 0.1;
            data.push(vec![cx + dx, cy + dy]);
        }
    }
    data
}

#[test]
fn test_fit_two_blobs_and_predict_idempotent() {
    for map_type in [MapType::Angle, MapType::Probability] {
        // probability encoding clusters by direction, so shift the blobs off
        // the diagonal for it
        let data: Vec<Vec<f64>> = match map_type {
            MapType::Angle => blobs(),
            MapType::Probability => blobs()
                .into_iter()
                .map(|p| if p[0] > 5.0 { vec![p[0], p[1] - 9.0] } else { vec![p[0] + 1.0, p[1] + 10.0] })
                .collect(),
        };

        let config = QKMeansConfig::new(2)
            .with_map_type(map_type)
            .with_max_iter(25)
            .with_random_state(2024);
        let mut model = QuantumKMeans::new(SwapTestSimulator::exact(5), config);
        model.fit(&data).unwrap();

        assert_eq!(model.termination(), Some(FitPhase::Converged), "{map_type}");
        assert!(model.n_iter() < 25);

        let labels = model.labels();
        assert!(labels[..12].iter().all(|&l| l == labels[0]), "{map_type}");
        assert!(labels[12..].iter().all(|&l| l == labels[12]), "{map_type}");
        assert_ne!(labels[0], labels[12]);

        let centers = model.cluster_centers().to_vec();
        let first = model.predict(&data, None).unwrap();
        let second = model.predict(&data, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(model.cluster_centers(), &centers[..]);
    }
}

#[test]
fn test_fit_with_pairwise_distances() {
    let config = QKMeansConfig::new(2)
        .with_map_type(MapType::Angle)
        .with_batching(false)
        .with_parallel_batches(false)
        .with_random_state(1);
    let mut model = QuantumKMeans::new(SwapTestSimulator::exact(1), config);
    let labels = model.fit_predict(&blobs()).unwrap();
    assert_ne!(labels[0], labels[12]);
}

#[test]
fn test_far_initial_center_fits() {
    let config = QKMeansConfig::new(2)
        .with_map_type(MapType::Angle)
        .with_initial_center(InitialCenter::Far)
        .with_random_state(8);
    let mut model = QuantumKMeans::new(SwapTestSimulator::exact(6), config);
    model.fit(&blobs()).unwrap();
    assert_ne!(model.labels()[0], model.labels()[12]);
}

/// Answers the first `budget` jobs from a simulator, then goes offline
#[derive(Debug)]
struct Failing {
    inner: SwapTestSimulator,
    budget: usize,
    jobs: AtomicUsize,
}

impl Backend for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn max_job_size(&self) -> usize {
        self.inner.max_job_size()
    }

    fn execute(&self, circuits: &[Circuit], shots: u32) -> Result<Vec<Histogram>, BackendError> {
        if self.jobs.fetch_add(1, Ordering::SeqCst) >= self.budget {
            return Err(BackendError::Unavailable("device offline".into()));
        }
        self.inner.execute(circuits, shots)
    }
}

#[test]
fn test_backend_failure_aborts_fit_without_partial_state() {
    let backend = Failing {
        inner: SwapTestSimulator::exact(50),
        budget: 3,
        jobs: AtomicUsize::new(0),
    };
    let config = QKMeansConfig::new(2)
        .with_map_type(MapType::Angle)
        .with_parallel_batches(false)
        .with_random_state(4)
        .with_retry(RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
        });
    let mut model = QuantumKMeans::new(backend, config);

    let err = model.fit(&blobs()).unwrap_err();
    assert!(matches!(err, QKMeansError::BackendExecution { attempts: 2, .. }));
    assert!(!model.is_fitted());
    assert!(model.labels().is_empty());
    assert_eq!(model.termination(), None);
}

#[test]
fn test_unsupported_shape_surfaces() {
    let sim = SwapTestSimulator::exact(4);
    let data = circle_points(2, 0.0);
    let centers = circle_points(3, 1.0);
    let est = SwapTestEstimator::new(&sim, EncodingScheme::ANGLE).with_options(EstimatorOptions {
        parallel: false,
        ..EstimatorOptions::default()
    });
    assert!(matches!(
        est.estimate(&data, &centers),
        Err(QKMeansError::UnsupportedShape { points: 2, centers: 3 })
    ));
    // the pairwise path has no shape restriction
    let m = est.estimate_pairwise(&data, &centers).unwrap();
    assert_eq!((m.n_centers(), m.n_points()), (3, 2));
}
