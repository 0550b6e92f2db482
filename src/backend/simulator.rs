//! Ideal statevector backend for swap-test circuits
//!
//! Supports the instruction set produced by the encoders: H, U3,
//! Initialize on qubits still in |0>, CSWAP, terminal measurements and a
//! final reset. Anything else is rejected rather than approximated.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Mul};

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::{Backend, BackendError, Histogram};
use crate::circuit::{Circuit, Gate};

/// Largest register the simulator will allocate a statevector for
pub const MAX_QUBITS: usize = 20;

/// Probabilities below this are treated as rounding noise
const PROBABILITY_FLOOR: f64 = 1e-12;

/// How shot counts are derived from outcome probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotMode {
    /// Expected counts, rounded with the largest-remainder method
    Exact,
    /// Multinomial sampling. The generator for each circuit is seeded from
    /// `seed` and the circuit contents, so identical circuits always produce
    /// identical histograms.
    Sampled { seed: u64 },
}

/// Local noiseless backend
#[derive(Debug, Clone)]
pub struct SwapTestSimulator {
    name: String,
    max_job_size: usize,
    mode: ShotMode,
}

impl SwapTestSimulator {
    pub fn new(max_job_size: usize, mode: ShotMode) -> Self {
        Self {
            name: "swap_test_simulator".to_string(),
            max_job_size,
            mode,
        }
    }

    /// Deterministic simulator with expected-value counts
    pub fn exact(max_job_size: usize) -> Self {
        Self::new(max_job_size, ShotMode::Exact)
    }

    pub fn sampled(max_job_size: usize, seed: u64) -> Self {
        Self::new(max_job_size, ShotMode::Sampled { seed })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Probability of every classical outcome of `circuit`
    pub fn outcome_probabilities(
        &self,
        circuit: &Circuit,
    ) -> Result<BTreeMap<String, f64>, BackendError> {
        let (state, measured) = run(circuit)?;

        let mut probs = BTreeMap::new();
        for (index, amp) in state.iter().enumerate() {
            let p = amp.norm_sqr();
            if p < PROBABILITY_FLOOR {
                continue;
            }
            let mut bits = vec![b'0'; circuit.num_clbits()];
            for &(qubit, clbit) in &measured {
                if index >> qubit & 1 == 1 {
                    bits[circuit.num_clbits() - 1 - clbit] = b'1';
                }
            }
            let key = String::from_utf8(bits).unwrap_or_default();
            *probs.entry(key).or_insert(0.0) += p;
        }
        Ok(probs)
    }

    fn histogram(&self, circuit: &Circuit, shots: u32) -> Result<Histogram, BackendError> {
        let probs = self.outcome_probabilities(circuit)?;
        let outcomes: Vec<(String, f64)> = probs.into_iter().collect();

        match self.mode {
            ShotMode::Exact => Ok(exact_counts(&outcomes, shots)),
            ShotMode::Sampled { seed } => {
                let weights = WeightedIndex::new(outcomes.iter().map(|(_, p)| *p))
                    .map_err(|e| BackendError::Rejected(format!("invalid distribution: {e}")))?;
                let mut rng = StdRng::seed_from_u64(seed ^ fingerprint(circuit));
                let mut counts = vec![0u64; outcomes.len()];
                for _ in 0..shots {
                    counts[weights.sample(&mut rng)] += 1;
                }
                Ok(outcomes
                    .into_iter()
                    .zip(counts)
                    .map(|((outcome, _), c)| (outcome, c))
                    .collect())
            }
        }
    }
}

impl Backend for SwapTestSimulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_job_size(&self) -> usize {
        self.max_job_size
    }

    fn execute(&self, circuits: &[Circuit], shots: u32) -> Result<Vec<Histogram>, BackendError> {
        if circuits.len() > self.max_job_size {
            return Err(BackendError::Rejected(format!(
                "job of {} circuits exceeds limit of {}",
                circuits.len(),
                self.max_job_size
            )));
        }
        debug!(backend = %self.name, circuits = circuits.len(), shots, "executing job");
        circuits.iter().map(|c| self.histogram(c, shots)).collect()
    }
}

/// Largest-remainder rounding of `p * shots`
fn exact_counts(outcomes: &[(String, f64)], shots: u32) -> Histogram {
    let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
    let expected: Vec<f64> = outcomes
        .iter()
        .map(|(_, p)| p / total * shots as f64)
        .collect();
    let mut counts: Vec<u64> = expected.iter().map(|e| e.floor() as u64).collect();

    let assigned: u64 = counts.iter().sum();
    let mut order: Vec<usize> = (0..outcomes.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = expected[a] - expected[a].floor();
        let fb = expected[b] - expected[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    for &i in order.iter().take((shots as u64).saturating_sub(assigned) as usize) {
        counts[i] += 1;
    }

    outcomes
        .iter()
        .zip(counts)
        .map(|((outcome, _), c)| (outcome.clone(), c))
        .collect()
}

/// Stable hash of the circuit's instructions
fn fingerprint(circuit: &Circuit) -> u64 {
    let mut h = DefaultHasher::new();
    circuit.num_qubits().hash(&mut h);
    for gate in circuit.gates() {
        match gate {
            Gate::H { qubit } => (0u8, qubit).hash(&mut h),
            Gate::U3 {
                theta,
                phi,
                lambda,
                qubit,
            } => (1u8, theta.to_bits(), phi.to_bits(), lambda.to_bits(), qubit).hash(&mut h),
            Gate::Initialize { qubits, amplitudes } => {
                (2u8, qubits).hash(&mut h);
                amplitudes.iter().for_each(|a| a.to_bits().hash(&mut h));
            }
            Gate::CSwap { control, a, b } => (3u8, control, a, b).hash(&mut h),
            Gate::Measure { qubit, clbit } => (4u8, qubit, clbit).hash(&mut h),
            Gate::ResetAll => 5u8.hash(&mut h),
        }
    }
    h.finish()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct C64 {
    re: f64,
    im: f64,
}

impl C64 {
    const ZERO: C64 = C64 { re: 0.0, im: 0.0 };
    const ONE: C64 = C64 { re: 1.0, im: 0.0 };

    fn real(re: f64) -> Self {
        C64 { re, im: 0.0 }
    }

    fn expi(phi: f64) -> Self {
        C64 {
            re: phi.cos(),
            im: phi.sin(),
        }
    }

    fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

impl Add for C64 {
    type Output = C64;

    fn add(self, o: C64) -> C64 {
        C64 {
            re: self.re + o.re,
            im: self.im + o.im,
        }
    }
}

impl Mul for C64 {
    type Output = C64;

    fn mul(self, o: C64) -> C64 {
        C64 {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }
}

type Matrix2 = [[C64; 2]; 2];

fn apply_single(state: &mut [C64], qubit: usize, m: &Matrix2) {
    let mask = 1 << qubit;
    for i in 0..state.len() {
        if i & mask != 0 {
            continue;
        }
        let j = i | mask;
        let (a, b) = (state[i], state[j]);
        state[i] = m[0][0] * a + m[0][1] * b;
        state[j] = m[1][0] * a + m[1][1] * b;
    }
}

fn hadamard() -> Matrix2 {
    let s = C64::real(std::f64::consts::FRAC_1_SQRT_2);
    let n = C64::real(-std::f64::consts::FRAC_1_SQRT_2);
    [[s, s], [s, n]]
}

fn u3(theta: f64, phi: f64, lambda: f64) -> Matrix2 {
    let c = C64::real((theta / 2.0).cos());
    let s = (theta / 2.0).sin();
    [
        [c, C64::expi(lambda) * C64::real(-s)],
        [C64::expi(phi) * C64::real(s), C64::expi(phi + lambda) * c],
    ]
}

fn check_qubit(qubit: usize, n: usize) -> Result<(), BackendError> {
    if qubit >= n {
        return Err(BackendError::Rejected(format!(
            "qubit {qubit} out of range for {n}-qubit circuit"
        )));
    }
    Ok(())
}

fn initialize(state: &mut Vec<C64>, qubits: &[usize], amplitudes: &[f64]) -> Result<(), BackendError> {
    if amplitudes.len() != 1 << qubits.len() {
        return Err(BackendError::Rejected(format!(
            "{} amplitudes for {} qubits",
            amplitudes.len(),
            qubits.len()
        )));
    }
    let norm: f64 = amplitudes.iter().map(|a| a * a).sum();
    if (norm - 1.0).abs() > 1e-9 {
        return Err(BackendError::Rejected(format!(
            "amplitudes are not normalized (norm^2 = {norm})"
        )));
    }

    let mask: usize = qubits.iter().map(|q| 1usize << q).sum();
    let leaked: f64 = state
        .iter()
        .enumerate()
        .filter(|(i, _)| i & mask != 0)
        .map(|(_, a)| a.norm_sqr())
        .sum();
    if leaked > 1e-9 {
        return Err(BackendError::Rejected(
            "initialize is only supported on qubits in |0>".into(),
        ));
    }

    let mut next = vec![C64::ZERO; state.len()];
    for (base, amp) in state.iter().enumerate() {
        if base & mask != 0 || amp.norm_sqr() == 0.0 {
            continue;
        }
        for (m, &value) in amplitudes.iter().enumerate() {
            let mut index = base;
            for (bit, &q) in qubits.iter().enumerate() {
                if m >> bit & 1 == 1 {
                    index |= 1 << q;
                }
            }
            next[index] = *amp * C64::real(value);
        }
    }
    *state = next;
    Ok(())
}

fn cswap(state: &mut [C64], control: usize, a: usize, b: usize) {
    let (c, a, b) = (1 << control, 1 << a, 1 << b);
    for i in 0..state.len() {
        if i & c != 0 && i & a != 0 && i & b == 0 {
            state.swap(i, i ^ a ^ b);
        }
    }
}

/// Evolve the statevector, returning it with the (qubit, clbit) measurements
fn run(circuit: &Circuit) -> Result<(Vec<C64>, Vec<(usize, usize)>), BackendError> {
    let n = circuit.num_qubits();
    if n == 0 || n > MAX_QUBITS {
        return Err(BackendError::Rejected(format!(
            "{n} qubits outside supported range 1..={MAX_QUBITS}"
        )));
    }

    let mut state = vec![C64::ZERO; 1 << n];
    state[0] = C64::ONE;
    let mut measured = Vec::new();

    for gate in circuit.gates() {
        if !measured.is_empty() && !matches!(gate, Gate::Measure { .. } | Gate::ResetAll) {
            return Err(BackendError::Rejected(
                "gates after measurement are not supported".into(),
            ));
        }
        match gate {
            Gate::H { qubit } => {
                check_qubit(*qubit, n)?;
                apply_single(&mut state, *qubit, &hadamard());
            }
            Gate::U3 {
                theta,
                phi,
                lambda,
                qubit,
            } => {
                check_qubit(*qubit, n)?;
                apply_single(&mut state, *qubit, &u3(*theta, *phi, *lambda));
            }
            Gate::Initialize { qubits, amplitudes } => {
                for &q in qubits {
                    check_qubit(q, n)?;
                }
                initialize(&mut state, qubits, amplitudes)?;
            }
            Gate::CSwap { control, a, b } => {
                for q in [*control, *a, *b] {
                    check_qubit(q, n)?;
                }
                cswap(&mut state, *control, *a, *b);
            }
            Gate::Measure { qubit, clbit } => {
                check_qubit(*qubit, n)?;
                if *clbit >= circuit.num_clbits() {
                    return Err(BackendError::Rejected(format!("clbit {clbit} out of range")));
                }
                measured.push((*qubit, *clbit));
            }
            Gate::ResetAll => break,
        }
    }

    Ok((state, measured))
}
