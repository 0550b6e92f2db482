//! qkmeans - k-means clustering with quantum swap-test distances
//!
//! Distances between points and centroids are estimated by encoding both
//! vectors onto qubits, running a swap test on an execution backend and
//! reading the ancilla statistics. The crate covers the classical side:
//! preprocessing, circuit construction, job batching, histogram decoding,
//! qk-means++ seeding and the fit/predict loop.

pub mod backend;
pub mod batch;
pub mod circuit;
pub mod clustering;
pub mod distance;
pub mod encoding;
pub mod error;
pub mod preprocess;

// Re-export commonly used types
pub use backend::{Backend, BackendError, Histogram, RetryPolicy, ShotMode, SwapTestSimulator};
pub use batch::{collect_results, make_batches, Batch};
pub use circuit::{Circuit, CircuitBuilder, Gate};
pub use clustering::{
    seed_centers, ConvergenceCriterion, FitPhase, Init, InitialCenter, QKMeansConfig,
    QuantumKMeans, Seeding,
};
pub use distance::{
    decode_histogram, estimate_distances, DistanceMatrix, EstimatorOptions, SwapTestEstimator,
};
pub use encoding::{build_swap_test, EncodingScheme, MagnitudeScale, MapType};
pub use error::{QKMeansError, Result};
pub use preprocess::preprocess;
