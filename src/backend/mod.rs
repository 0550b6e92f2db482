//! Execution backends
//!
//! A backend accepts a list of circuits plus a shot count and returns one
//! measurement histogram per circuit. Real hardware or remote simulators plug
//! in by implementing [`Backend`]; [`SwapTestSimulator`] is an ideal local
//! backend used by tests, benches and the CLI.

pub mod simulator;

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::circuit::Circuit;
use crate::error::{QKMeansError, Result};

pub use simulator::{ShotMode, SwapTestSimulator};

/// Failures reported by an execution backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("job timed out")]
    Timeout,

    #[error("job rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Whether resubmitting the same job may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout)
    }
}

/// Outcome counts of one executed circuit, keyed by bitstring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    counts: HashMap<String, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` observations of `outcome`. Zero counts are not recorded.
    pub fn record(&mut self, outcome: impl Into<String>, count: u64) {
        if count > 0 {
            *self.counts.entry(outcome.into()).or_insert(0) += count;
        }
    }

    pub fn count(&self, outcome: &str) -> u64 {
        self.counts.get(outcome).copied().unwrap_or(0)
    }

    /// Number of distinct outcomes observed
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Histogram {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut h = Histogram::new();
        for (outcome, count) in iter {
            h.record(outcome, count);
        }
        h
    }
}

/// Something that runs circuits
pub trait Backend: Send + Sync {
    /// Human-readable backend name, used in logs and errors
    fn name(&self) -> &str;

    /// Largest number of circuits accepted in a single job
    fn max_job_size(&self) -> usize;

    /// Run every circuit `shots` times and return one histogram per circuit,
    /// in submission order
    fn execute(
        &self,
        circuits: &[Circuit],
        shots: u32,
    ) -> std::result::Result<Vec<Histogram>, BackendError>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn max_job_size(&self) -> usize {
        (**self).max_job_size()
    }

    fn execute(
        &self,
        circuits: &[Circuit],
        shots: u32,
    ) -> std::result::Result<Vec<Histogram>, BackendError> {
        (**self).execute(circuits, shots)
    }
}

impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn max_job_size(&self) -> usize {
        (**self).max_job_size()
    }

    fn execute(
        &self,
        circuits: &[Circuit],
        shots: u32,
    ) -> std::result::Result<Vec<Histogram>, BackendError> {
        (**self).execute(circuits, shots)
    }
}

/// Resubmission policy for transient backend failures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per job, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32 - 1);
        Duration::from_millis((self.initial_backoff_ms as f64 * factor) as u64)
    }
}

/// Submit one job, retrying transient failures per `policy`.
///
/// The response must carry exactly one histogram per circuit.
pub fn execute_with_retry<B: Backend + ?Sized>(
    backend: &B,
    circuits: &[Circuit],
    shots: u32,
    policy: &RetryPolicy,
) -> Result<Vec<Histogram>> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(
            backend = backend.name(),
            circuits = circuits.len(),
            shots,
            attempt,
            "submitting job"
        );

        let outcome = backend.execute(circuits, shots).and_then(|histograms| {
            if histograms.len() == circuits.len() {
                Ok(histograms)
            } else {
                Err(BackendError::MalformedResponse(format!(
                    "expected {} histograms, got {}",
                    circuits.len(),
                    histograms.len()
                )))
            }
        });

        match outcome {
            Ok(histograms) => return Ok(histograms),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                warn!(
                    backend = backend.name(),
                    attempt,
                    error = %e,
                    "transient backend failure, retrying in {:?}",
                    wait
                );
                thread::sleep(wait);
            }
            Err(source) => {
                return Err(QKMeansError::BackendExecution {
                    backend: backend.name().to_string(),
                    attempts: attempt,
                    source,
                })
            }
        }
    }
}
