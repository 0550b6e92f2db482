//! Encoding schemes and swap-test circuit construction
//!
//! Two ways of loading classical vectors onto qubits:
//! - Angle: a 2D vector becomes a rotation angle (its complex-plane phase),
//!   optionally followed by a second rotation carrying its magnitude
//! - Probability: a vector padded to a power-of-two length becomes the
//!   amplitudes of a qubit block
//!
//! Both feed the same swap test: a control qubit in superposition swaps the
//! two operand registers, and the probability of reading `1` on the control
//! grows with the dissimilarity of the operands.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, CircuitBuilder};
use crate::error::{QKMeansError, Result};
use crate::preprocess::l2_norm;

/// Encoding tag as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapType {
    Angle,
    Probability,
}

impl FromStr for MapType {
    type Err = QKMeansError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "angle" => Ok(MapType::Angle),
            "probability" => Ok(MapType::Probability),
            other => Err(QKMeansError::InvalidScheme(other.to_string())),
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapType::Angle => write!(f, "angle"),
            MapType::Probability => write!(f, "probability"),
        }
    }
}

/// Factor applied to the normalized magnitude before it becomes a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagnitudeScale {
    /// `ro = m * π`
    Full,
    /// `ro = m * π/2`
    #[default]
    Half,
}

impl MagnitudeScale {
    #[inline]
    pub fn factor(self) -> f64 {
        match self {
            MagnitudeScale::Full => PI,
            MagnitudeScale::Half => FRAC_PI_2,
        }
    }
}

/// How vectors are encoded onto qubits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EncodingScheme {
    Angle {
        norm_relevance: bool,
        magnitude_scale: MagnitudeScale,
    },
    Probability,
}

impl EncodingScheme {
    /// Plain angle encoding without magnitude information
    pub const ANGLE: EncodingScheme = EncodingScheme::Angle {
        norm_relevance: false,
        magnitude_scale: MagnitudeScale::Half,
    };

    pub fn new(map_type: MapType, norm_relevance: bool, magnitude_scale: MagnitudeScale) -> Self {
        match map_type {
            MapType::Angle => EncodingScheme::Angle {
                norm_relevance,
                magnitude_scale,
            },
            MapType::Probability => EncodingScheme::Probability,
        }
    }

    pub fn map_type(&self) -> MapType {
        match self {
            EncodingScheme::Angle { .. } => MapType::Angle,
            EncodingScheme::Probability => MapType::Probability,
        }
    }

    pub fn norm_relevance(&self) -> bool {
        matches!(
            self,
            EncodingScheme::Angle {
                norm_relevance: true,
                ..
            }
        )
    }

    /// Build the swap test comparing `x` against `y`
    pub fn build_circuit(&self, x: &[f64], y: &[f64]) -> Result<Circuit> {
        match *self {
            EncodingScheme::Angle {
                norm_relevance,
                magnitude_scale,
            } => angle_swap_test(x, y, norm_relevance, magnitude_scale),
            EncodingScheme::Probability => probability_swap_test(x, y),
        }
    }
}

/// Build the swap-test circuit for one (point, centroid) pair
pub fn build_swap_test(x: &[f64], y: &[f64], scheme: &EncodingScheme) -> Result<Circuit> {
    scheme.build_circuit(x, y)
}

/// Qubits needed to hold an `n`-dimensional vector as amplitudes
#[inline]
pub fn qubits_for(n: usize) -> usize {
    (n.max(2).next_power_of_two().trailing_zeros()) as usize
}

/// Length after zero-padding to the next power of two
#[inline]
pub fn padded_len(n: usize) -> usize {
    1 << qubits_for(n)
}

#[inline]
fn phase(v: &[f64]) -> f64 {
    v[1].atan2(v[0])
}

fn angle_swap_test(
    x: &[f64],
    y: &[f64],
    norm_relevance: bool,
    magnitude_scale: MagnitudeScale,
) -> Result<Circuit> {
    if x.len() != y.len() {
        return Err(QKMeansError::DimensionMismatch {
            expected: x.len(),
            got: y.len(),
        });
    }

    let with_magnitude = match (x.len(), norm_relevance) {
        (2, _) => false,
        (3, true) => true,
        (3, false) => {
            return Err(QKMeansError::UnsupportedEncoding(
                "angle encoding of 3 features requires norm_relevance".into(),
            ))
        }
        (n, _) => {
            return Err(QKMeansError::UnsupportedEncoding(format!(
                "angle encoding supports 2 or 3 features, got {n}"
            )))
        }
    };

    let mut builder = CircuitBuilder::new("swap_test_angle", 3)
        .h(0)
        .h(1)
        .h(2)
        .u3(phase(x), PI, PI, 1)
        .u3(phase(y), PI, PI, 2);

    if with_magnitude {
        let factor = magnitude_scale.factor();
        builder = builder.u3(x[2] * factor, 0.0, 0.0, 1).u3(y[2] * factor, 0.0, 0.0, 2);
    }

    Ok(builder
        .cswap(0, 1, 2)
        .h(0)
        .measure(0, 0)
        .reset_all()
        .build())
}

fn probability_swap_test(x: &[f64], y: &[f64]) -> Result<Circuit> {
    let len = padded_len(x.len());
    if len != padded_len(y.len()) {
        return Err(QKMeansError::DimensionMismatch {
            expected: len,
            got: padded_len(y.len()),
        });
    }

    let k = qubits_for(x.len());
    let block_a: Vec<usize> = (1..=k).collect();
    let block_b: Vec<usize> = (k + 1..=2 * k).collect();

    let mut builder = CircuitBuilder::new("swap_test_probability", 2 * k + 1)
        .initialize(amplitudes(x, len)?, block_a.clone())
        .initialize(amplitudes(y, len)?, block_b.clone())
        .h(0);
    for (&a, &b) in block_a.iter().zip(block_b.iter()) {
        builder = builder.cswap(0, a, b);
    }

    Ok(builder.h(0).measure(0, 0).reset_all().build())
}

/// Zero-pad `v` to `len` and scale it to unit norm
fn amplitudes(v: &[f64], len: usize) -> Result<Vec<f64>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(QKMeansError::ZeroNorm);
    }
    let mut amps = vec![0.0; len];
    for (a, &x) in amps.iter_mut().zip(v) {
        *a = x / norm;
    }
    Ok(amps)
}
