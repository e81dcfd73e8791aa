//! Bell-diagonal formalism: a compressed 4-parameter representation for
//! two-qubit states diagonal in the Bell basis.
//!
//! Where the physics guarantees the diagonal-in-Bell-basis property (e.g.
//! heralded entanglement generation followed by Pauli-twirled channels), a
//! pair is fully described by the four populations (Φ⁺, Φ⁻, Ψ⁺, Ψ⁻) at a
//! fraction of the full density-matrix cost. Operations outside that
//! structure (arbitrary circuits, loss channels) are rejected rather than
//! silently widened to a dense representation.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::QuantumError;
use crate::quantum::ket::{clamp01, NORM_TOLERANCE};
use crate::quantum::linalg::{C64, Matrix};

/// Index of each Bell population in the diagonal.
pub const PHI_PLUS: usize = 0;
pub const PHI_MINUS: usize = 1;
pub const PSI_PLUS: usize = 2;
pub const PSI_MINUS: usize = 3;

/// Reject element sets that are not probability distributions.
pub(crate) fn validate_diag(diag: &[f64; 4]) -> Result<(), QuantumError> {
    let total: f64 = diag.iter().sum();
    if diag.iter().any(|&p| p < -NORM_TOLERANCE) || (total - 1.0).abs() > NORM_TOLERANCE {
        return Err(QuantumError::BadBellDiagonal { total });
    }
    Ok(())
}

/// The four Bell basis vectors, in diagonal order.
pub fn bell_vectors() -> [[C64; 4]; 4] {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let z = C64::new(0.0, 0.0);
    let p = C64::new(s, 0.0);
    let m = C64::new(-s, 0.0);
    [
        [p, z, z, p], // Φ⁺ = (|00⟩ + |11⟩)/√2
        [p, z, z, m], // Φ⁻ = (|00⟩ - |11⟩)/√2
        [z, p, p, z], // Ψ⁺ = (|01⟩ + |10⟩)/√2
        [z, p, m, z], // Ψ⁻ = (|01⟩ - |10⟩)/√2
    ]
}

/// Materialize the 4×4 density matrix Σ pᵢ |Bᵢ⟩⟨Bᵢ|.
pub fn to_density(diag: &[f64; 4]) -> Matrix {
    let vectors = bell_vectors();
    let mut rho = Matrix::zeros(4);
    for (i, v) in vectors.iter().enumerate() {
        rho = rho.add(&Matrix::outer(v).scaled(C64::new(diag[i], 0.0)));
    }
    rho
}

/// Computational-basis measurement of both qubits of a Bell-diagonal pair.
///
/// The Φ populations produce correlated outcomes, the Ψ populations
/// anti-correlated; within each branch the first bit is uniform. Returns the
/// two outcome bits in key order.
pub(crate) fn measure_pair(diag: &[f64; 4], rng: &mut StdRng) -> (u32, u32) {
    let p_same = clamp01(diag[PHI_PLUS] + diag[PHI_MINUS]);
    let r: f64 = rng.gen();
    let correlated = r < p_same;
    let first = if rng.gen::<f64>() < 0.5 { 0 } else { 1 };
    let second = if correlated { first } else { 1 - first };
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn validate_rejects_non_distribution() {
        assert!(validate_diag(&[0.5, 0.5, 0.5, 0.0]).is_err());
        assert!(validate_diag(&[0.7, 0.1, 0.1, 0.1]).is_ok());
        assert!(validate_diag(&[-0.1, 0.5, 0.3, 0.3]).is_err());
    }

    #[test]
    fn density_of_pure_phi_plus_is_projector() {
        let rho = to_density(&[1.0, 0.0, 0.0, 0.0]);
        assert!((rho.trace().re - 1.0).abs() < 1e-12);
        assert!((rho.get(0, 0).re - 0.5).abs() < 1e-12);
        assert!((rho.get(0, 3).re - 0.5).abs() < 1e-12);
        assert!((rho.get(3, 3).re - 0.5).abs() < 1e-12);
        assert!(rho.get(1, 1).norm() < 1e-12);
    }

    #[test]
    fn werner_state_density_has_uniform_diagonal_offdiagonal_mix() {
        let f = 0.85;
        let rest = (1.0 - f) / 3.0;
        let rho = to_density(&[f, rest, rest, rest]);
        assert!((rho.trace().re - 1.0).abs() < 1e-12);
        // Diagonal: (F + rest)/2 on |00⟩/|11⟩, 2·rest/2 on |01⟩/|10⟩.
        assert!((rho.get(0, 0).re - (f + rest) / 2.0).abs() < 1e-12);
        assert!((rho.get(1, 1).re - rest).abs() < 1e-12);
    }

    #[test]
    fn phi_plus_measurement_is_perfectly_correlated() {
        let mut rng = StdRng::seed_from_u64(41);
        for _ in 0..200 {
            let (a, b) = measure_pair(&[1.0, 0.0, 0.0, 0.0], &mut rng);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn psi_minus_measurement_is_anticorrelated() {
        let mut rng = StdRng::seed_from_u64(43);
        for _ in 0..200 {
            let (a, b) = measure_pair(&[0.0, 0.0, 0.0, 1.0], &mut rng);
            assert_eq!(a, 1 - b);
        }
    }

    #[test]
    fn noisy_pair_correlation_tracks_fidelity() {
        // F = 0.9 Werner-like: P(same) = F + (1-F)/3.
        let f = 0.9;
        let rest = (1.0 - f) / 3.0;
        let diag = [f, rest, rest, rest];
        let mut rng = StdRng::seed_from_u64(47);
        let trials = 10_000;
        let mut same = 0;
        for _ in 0..trials {
            let (a, b) = measure_pair(&diag, &mut rng);
            if a == b {
                same += 1;
            }
        }
        let observed = same as f64 / trials as f64;
        let expected = f + rest;
        assert!(
            (observed - expected).abs() < 0.02,
            "correlation {observed} should be near {expected}"
        );
    }
}
