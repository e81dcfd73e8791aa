//! Quantum circuits over a fixed number of qubits.
//!
//! A [`Circuit`] is an ordered gate list plus a set of qubits marked for
//! measurement at the end. Gate indices are validated when the gate is added,
//! so unitary synthesis cannot fail. The synthesized unitary follows the
//! subsystem convention of the state manager: qubit 0 is the most significant
//! tensor factor.

use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_4};

use crate::error::QuantumError;
use crate::quantum::linalg::{embed, C64, Matrix, Matrix2x2};

fn c(re: f64) -> C64 {
    C64::new(re, 0.0)
}

/// H = (1/√2)[[1, 1], [1, -1]].
pub fn hadamard() -> Matrix2x2 {
    let s = FRAC_1_SQRT_2;
    [c(s), c(s), c(s), c(-s)]
}

/// Pauli X.
pub fn pauli_x() -> Matrix2x2 {
    [c(0.0), c(1.0), c(1.0), c(0.0)]
}

/// Pauli Y.
pub fn pauli_y() -> Matrix2x2 {
    [c(0.0), C64::new(0.0, -1.0), C64::new(0.0, 1.0), c(0.0)]
}

/// Pauli Z.
pub fn pauli_z() -> Matrix2x2 {
    [c(1.0), c(0.0), c(0.0), c(-1.0)]
}

/// Phase gate diag(1, e^{iθ}).
pub fn phase(theta: f64) -> Matrix2x2 {
    [c(1.0), c(0.0), c(0.0), C64::new(theta.cos(), theta.sin())]
}

/// |0⟩⟨0| projector.
pub(crate) fn proj0() -> Matrix2x2 {
    [c(1.0), c(0.0), c(0.0), c(0.0)]
}

/// |1⟩⟨1| projector.
pub(crate) fn proj1() -> Matrix2x2 {
    [c(0.0), c(0.0), c(0.0), c(1.0)]
}

/// One gate in a circuit.
#[derive(Debug, Clone)]
pub enum Gate {
    /// Arbitrary single-qubit unitary.
    Single { qubit: usize, matrix: Matrix2x2 },
    /// Controlled single-qubit unitary.
    Controlled {
        control: usize,
        target: usize,
        matrix: Matrix2x2,
    },
    /// Exchange two qubits.
    Swap(usize, usize),
}

/// An ordered gate list over `size` qubits with optional terminal
/// measurements.
#[derive(Debug, Clone)]
pub struct Circuit {
    size: usize,
    gates: Vec<Gate>,
    measured: Vec<usize>,
}

impl Circuit {
    /// Empty circuit over `size` qubits.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            gates: Vec::new(),
            measured: Vec::new(),
        }
    }

    /// Number of qubits the circuit acts on.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Qubits marked for measurement, in ascending order.
    pub fn measured(&self) -> &[usize] {
        &self.measured
    }

    fn check(&self, qubit: usize) -> Result<(), QuantumError> {
        if qubit >= self.size {
            return Err(QuantumError::QubitOutOfRange {
                index: qubit,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Append an arbitrary single-qubit unitary.
    pub fn unitary_gate(&mut self, qubit: usize, matrix: Matrix2x2) -> Result<&mut Self, QuantumError> {
        self.check(qubit)?;
        self.gates.push(Gate::Single { qubit, matrix });
        Ok(self)
    }

    /// Append a Hadamard.
    pub fn h(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, hadamard())
    }

    /// Append a Pauli X (bit flip).
    pub fn x(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, pauli_x())
    }

    /// Append a Pauli Y.
    pub fn y(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, pauli_y())
    }

    /// Append a Pauli Z (phase flip).
    pub fn z(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, pauli_z())
    }

    /// Append S = diag(1, i).
    pub fn s(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, phase(std::f64::consts::FRAC_PI_2))
    }

    /// Append T = diag(1, e^{iπ/4}).
    pub fn t(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, phase(FRAC_PI_4))
    }

    /// Append a phase gate diag(1, e^{iθ}).
    pub fn phase(&mut self, qubit: usize, theta: f64) -> Result<&mut Self, QuantumError> {
        self.unitary_gate(qubit, phase(theta))
    }

    fn controlled(
        &mut self,
        control: usize,
        target: usize,
        matrix: Matrix2x2,
    ) -> Result<&mut Self, QuantumError> {
        self.check(control)?;
        self.check(target)?;
        if control == target {
            return Err(QuantumError::QubitOutOfRange {
                index: target,
                size: self.size,
            });
        }
        self.gates.push(Gate::Controlled {
            control,
            target,
            matrix,
        });
        Ok(self)
    }

    /// Append a CNOT.
    pub fn cx(&mut self, control: usize, target: usize) -> Result<&mut Self, QuantumError> {
        self.controlled(control, target, pauli_x())
    }

    /// Append a controlled-Y.
    pub fn cy(&mut self, control: usize, target: usize) -> Result<&mut Self, QuantumError> {
        self.controlled(control, target, pauli_y())
    }

    /// Append a controlled-Z.
    pub fn cz(&mut self, control: usize, target: usize) -> Result<&mut Self, QuantumError> {
        self.controlled(control, target, pauli_z())
    }

    /// Append a SWAP.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<&mut Self, QuantumError> {
        self.check(a)?;
        self.check(b)?;
        self.gates.push(Gate::Swap(a, b));
        Ok(self)
    }

    /// Mark a qubit for measurement after all gates have been applied.
    pub fn measure(&mut self, qubit: usize) -> Result<&mut Self, QuantumError> {
        self.check(qubit)?;
        if self.measured.contains(&qubit) {
            return Err(QuantumError::AlreadyMeasured(qubit));
        }
        self.measured.push(qubit);
        self.measured.sort_unstable();
        Ok(self)
    }

    /// Synthesize the circuit's unitary over the full 2^size space.
    pub fn unitary(&self) -> Matrix {
        let n = self.size;
        let mut u = Matrix::identity(1 << n);
        for gate in &self.gates {
            let g = match gate {
                Gate::Single { qubit, matrix } => {
                    embed(n, 2, &[(*qubit, &Matrix::from_2x2(matrix))])
                }
                Gate::Controlled {
                    control,
                    target,
                    matrix,
                } => {
                    // |0⟩⟨0|_c ⊗ I + |1⟩⟨1|_c ⊗ U_t
                    let idle = embed(n, 2, &[(*control, &Matrix::from_2x2(&proj0()))]);
                    let act = embed(
                        n,
                        2,
                        &[
                            (*control, &Matrix::from_2x2(&proj1())),
                            (*target, &Matrix::from_2x2(matrix)),
                        ],
                    );
                    idle.add(&act)
                }
                Gate::Swap(a, b) => {
                    // Σ_{i,j} |i⟩⟨j|_a ⊗ |j⟩⟨i|_b
                    let ketbra = |i: usize, j: usize| -> Matrix {
                        let mut m = Matrix::zeros(2);
                        m.set(i, j, c(1.0));
                        m
                    };
                    let mut sum = Matrix::zeros(1 << n);
                    for i in 0..2 {
                        for j in 0..2 {
                            sum = sum.add(&embed(
                                n,
                                2,
                                &[(*a, &ketbra(i, j)), (*b, &ketbra(j, i))],
                            ));
                        }
                    }
                    sum
                }
            };
            u = g.mul(&u);
        }
        u
    }
}
