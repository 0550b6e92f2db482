//! Error types for clustering and distance estimation

use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum QKMeansError {
    #[error("invalid encoding scheme: {0}")]
    InvalidScheme(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unsupported batch shape: {points} points against {centers} centers (need more points than centers)")]
    UnsupportedShape { points: usize, centers: usize },

    #[error("backend '{backend}' failed after {attempts} attempt(s): {source}")]
    BackendExecution {
        backend: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("cannot amplitude-encode a zero-norm vector")]
    ZeroNorm,

    #[error("result count mismatch: expected {expected}, got {got}")]
    ResultCountMismatch { expected: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model has not been fitted")]
    NotFitted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QKMeansError>;
