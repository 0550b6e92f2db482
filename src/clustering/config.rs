//! Clustering configuration

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::backend::RetryPolicy;
use crate::distance::{EstimatorOptions, DEFAULT_SHOTS};
use crate::encoding::{EncodingScheme, MagnitudeScale, MapType};
use crate::error::{QKMeansError, Result};

/// User-supplied initializer: `(preprocessed data, n_clusters, rng) -> centers`
pub type InitFn = Arc<dyn Fn(&[Vec<f64>], usize, &mut StdRng) -> Vec<Vec<f64>> + Send + Sync>;

/// How the first set of centers is chosen
#[derive(Clone, Default, Serialize, Deserialize)]
pub enum Init {
    /// qk-means++ seeding on swap-test distances
    #[default]
    #[serde(rename = "qk-means++")]
    QKMeansPlusPlus,
    /// Uniformly sampled distinct rows
    #[serde(rename = "random")]
    Random,
    /// Fixed centers, given in the preprocessed feature space
    #[serde(rename = "explicit")]
    Explicit(Vec<Vec<f64>>),
    #[serde(skip)]
    Custom(InitFn),
}

impl fmt::Debug for Init {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Init::QKMeansPlusPlus => write!(f, "QKMeansPlusPlus"),
            Init::Random => write!(f, "Random"),
            Init::Explicit(c) => f.debug_tuple("Explicit").field(c).finish(),
            Init::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl FromStr for Init {
    type Err = QKMeansError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "qk-means++" => Ok(Init::QKMeansPlusPlus),
            "random" => Ok(Init::Random),
            other => Err(QKMeansError::InvalidConfig(format!("unknown init '{other}'"))),
        }
    }
}

/// Strategy for the first qk-means++ center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialCenter {
    #[default]
    Random,
    /// Re-pick the first center as far as possible from the second
    Far,
}

impl FromStr for InitialCenter {
    type Err = QKMeansError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(InitialCenter::Random),
            "far" => Ok(InitialCenter::Far),
            other => Err(QKMeansError::InvalidConfig(format!(
                "unknown initial_center '{other}'"
            ))),
        }
    }
}

/// When two consecutive center sets count as equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergenceCriterion {
    /// Largest absolute coordinate shift
    #[default]
    MaxShift,
    /// Absolute value of the signed sum of all coordinate shifts.
    /// Opposite shifts cancel, so this can stop early.
    SignedSum,
}

impl ConvergenceCriterion {
    pub fn shift(&self, old: &[Vec<f64>], new: &[Vec<f64>]) -> f64 {
        let deltas = old
            .iter()
            .zip(new)
            .flat_map(|(o, n)| o.iter().zip(n).map(|(a, b)| b - a));
        match self {
            ConvergenceCriterion::MaxShift => deltas.map(f64::abs).fold(0.0, f64::max),
            ConvergenceCriterion::SignedSum => deltas.sum::<f64>().abs(),
        }
    }
}

/// Parameters of [`QuantumKMeans`](super::QuantumKMeans)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QKMeansConfig {
    pub n_clusters: usize,
    pub init: Init,
    pub tol: f64,
    pub max_iter: usize,
    pub map_type: MapType,
    /// Encode 2D magnitude as a second angle (angle encoding only)
    pub norm_relevance: bool,
    pub initial_center: InitialCenter,
    pub magnitude_scale: MagnitudeScale,
    pub convergence: ConvergenceCriterion,
    /// Candidates per qk-means++ step; `2 + ln(k)` when unset
    pub n_local_trials: Option<usize>,
    pub random_state: Option<u64>,
    pub shots: u32,
    pub batching: bool,
    pub parallel_batches: bool,
    pub retry: RetryPolicy,
}

impl Default for QKMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            init: Init::QKMeansPlusPlus,
            tol: 1e-4,
            max_iter: 300,
            map_type: MapType::Probability,
            norm_relevance: false,
            initial_center: InitialCenter::Random,
            magnitude_scale: MagnitudeScale::Half,
            convergence: ConvergenceCriterion::MaxShift,
            n_local_trials: None,
            random_state: None,
            shots: DEFAULT_SHOTS,
            batching: true,
            parallel_batches: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl QKMeansConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    pub fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_map_type(mut self, map_type: MapType) -> Self {
        self.map_type = map_type;
        self
    }

    pub fn with_norm_relevance(mut self, norm_relevance: bool) -> Self {
        self.norm_relevance = norm_relevance;
        self
    }

    pub fn with_initial_center(mut self, initial_center: InitialCenter) -> Self {
        self.initial_center = initial_center;
        self
    }

    pub fn with_magnitude_scale(mut self, magnitude_scale: MagnitudeScale) -> Self {
        self.magnitude_scale = magnitude_scale;
        self
    }

    pub fn with_convergence(mut self, convergence: ConvergenceCriterion) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn with_n_local_trials(mut self, trials: usize) -> Self {
        self.n_local_trials = Some(trials);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_shots(mut self, shots: u32) -> Self {
        self.shots = shots;
        self
    }

    pub fn with_batching(mut self, batching: bool) -> Self {
        self.batching = batching;
        self
    }

    pub fn with_parallel_batches(mut self, parallel: bool) -> Self {
        self.parallel_batches = parallel;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn encoding_scheme(&self) -> EncodingScheme {
        EncodingScheme::new(self.map_type, self.norm_relevance, self.magnitude_scale)
    }

    pub fn estimator_options(&self) -> EstimatorOptions {
        EstimatorOptions {
            shots: self.shots,
            batching: self.batching,
            parallel: self.parallel_batches,
            retry: self.retry,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(QKMeansError::InvalidConfig("n_clusters must be at least 1".into()));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(QKMeansError::InvalidConfig(format!("tol must be >= 0, got {}", self.tol)));
        }
        if self.max_iter == 0 {
            return Err(QKMeansError::InvalidConfig("max_iter must be at least 1".into()));
        }
        if self.shots == 0 {
            return Err(QKMeansError::InvalidConfig("shots must be at least 1".into()));
        }
        if self.n_local_trials == Some(0) {
            return Err(QKMeansError::InvalidConfig("n_local_trials must be at least 1".into()));
        }
        if let Init::Explicit(centers) = &self.init {
            if centers.len() != self.n_clusters {
                return Err(QKMeansError::InvalidConfig(format!(
                    "{} explicit centers for {} clusters",
                    centers.len(),
                    self.n_clusters
                )));
            }
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
