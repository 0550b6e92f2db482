//! Quantum circuit descriptions
//!
//! A [`Circuit`] is an immutable list of gate instructions over a fixed
//! number of qubits and classical bits. Circuits are assembled with
//! [`CircuitBuilder`] and handed to a [`Backend`](crate::backend::Backend)
//! for execution. Bitstrings follow the usual little-endian convention:
//! classical bit 0 is the rightmost character.

use serde::{Deserialize, Serialize};

/// A single circuit instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    /// Hadamard
    H { qubit: usize },
    /// Generic single-qubit rotation U3(theta, phi, lambda)
    U3 {
        theta: f64,
        phi: f64,
        lambda: f64,
        qubit: usize,
    },
    /// Prepare `qubits` (assumed |0...0>) in the given real amplitudes.
    /// `amplitudes.len()` is `2^qubits.len()`, `qubits[0]` is the least
    /// significant bit of the amplitude index.
    Initialize {
        qubits: Vec<usize>,
        amplitudes: Vec<f64>,
    },
    /// Controlled swap (Fredkin)
    CSwap {
        control: usize,
        a: usize,
        b: usize,
    },
    /// Measure `qubit` into classical bit `clbit`
    Measure { qubit: usize, clbit: usize },
    /// Reset every qubit to |0>
    ResetAll,
}

/// Immutable circuit description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    name: String,
    num_qubits: usize,
    num_clbits: usize,
    gates: Vec<Gate>,
}

impl Circuit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn num_clbits(&self) -> usize {
        self.num_clbits
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Qubits measured by this circuit, in instruction order
    pub fn measured_qubits(&self) -> Vec<(usize, usize)> {
        self.gates
            .iter()
            .filter_map(|g| match g {
                Gate::Measure { qubit, clbit } => Some((*qubit, *clbit)),
                _ => None,
            })
            .collect()
    }

    /// The bitstring that marks a "divergent" swap test: all zeros except
    /// classical bit 0.
    pub fn marked_outcome(&self) -> String {
        let mut s = "0".repeat(self.num_clbits.saturating_sub(1));
        s.push('1');
        s
    }
}

/// Incremental circuit assembly
#[derive(Debug)]
pub struct CircuitBuilder {
    circuit: Circuit,
}

impl CircuitBuilder {
    /// Circuit with `num_qubits` qubits and an equally wide classical register
    pub fn new(name: &str, num_qubits: usize) -> Self {
        Self {
            circuit: Circuit {
                name: name.to_string(),
                num_qubits,
                num_clbits: num_qubits,
                gates: Vec::new(),
            },
        }
    }

    pub fn h(mut self, qubit: usize) -> Self {
        debug_assert!(qubit < self.circuit.num_qubits);
        self.circuit.gates.push(Gate::H { qubit });
        self
    }

    pub fn u3(mut self, theta: f64, phi: f64, lambda: f64, qubit: usize) -> Self {
        debug_assert!(qubit < self.circuit.num_qubits);
        self.circuit.gates.push(Gate::U3 {
            theta,
            phi,
            lambda,
            qubit,
        });
        self
    }

    pub fn initialize(mut self, amplitudes: Vec<f64>, qubits: Vec<usize>) -> Self {
        debug_assert_eq!(amplitudes.len(), 1 << qubits.len());
        self.circuit.gates.push(Gate::Initialize { qubits, amplitudes });
        self
    }

    pub fn cswap(mut self, control: usize, a: usize, b: usize) -> Self {
        self.circuit.gates.push(Gate::CSwap { control, a, b });
        self
    }

    pub fn measure(mut self, qubit: usize, clbit: usize) -> Self {
        debug_assert!(clbit < self.circuit.num_clbits);
        self.circuit.gates.push(Gate::Measure { qubit, clbit });
        self
    }

    pub fn reset_all(mut self) -> Self {
        self.circuit.gates.push(Gate::ResetAll);
        self
    }

    pub fn build(self) -> Circuit {
        self.circuit
    }
}
