//! Clustering on swap-test distances
//!
//! Provides:
//! - qk-means++ seeding
//! - the quantum k-means fit/predict loop and its configuration

pub mod config;
pub mod qkmeans;
pub mod seeding;

pub use config::{ConvergenceCriterion, Init, InitFn, InitialCenter, QKMeansConfig};
pub use qkmeans::{FitPhase, QuantumKMeans};
pub use seeding::{default_trials, seed_centers, Seeding};
