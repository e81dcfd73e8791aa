//! Pure-state (ket) formalism: normalized amplitude vectors.
//!
//! Measurement uses two algorithms that agree on their overlap: a single-key
//! fast path that groups amplitudes by the measured subsystem's digit, and a
//! multi-key path built from explicitly constructed projection operators.
//! Both clamp probabilities into [0, 1] before sampling and renormalize the
//! collapsed state by the *unclamped* branch probability so floating-point
//! drift cannot inflate amplitudes.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::QuantumError;
use crate::quantum::linalg::{digit, dim_pow, embed, norm_sqr, C64, Matrix};

/// Normalization tolerance for incoming amplitude vectors.
pub(crate) const NORM_TOLERANCE: f64 = 1e-6;

/// Reject amplitudes whose implied probabilities do not sum to 1.
pub(crate) fn validate_amplitudes(amps: &[C64]) -> Result<(), QuantumError> {
    let total = norm_sqr(amps);
    if (total - 1.0).abs() > NORM_TOLERANCE {
        return Err(QuantumError::NotNormalized { total });
    }
    Ok(())
}

#[inline]
pub(crate) fn clamp01(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

/// Measure a single qubit at `pos` of an `n`-qubit state vector, collapsing
/// in place. Returns the sampled outcome bit.
pub(crate) fn measure_single(psi: &mut [C64], n: usize, pos: usize, rng: &mut StdRng) -> u32 {
    let p0: f64 = psi
        .iter()
        .enumerate()
        .filter(|(i, _)| digit(*i, pos, 2, n) == 0)
        .map(|(_, a)| a.norm_sqr())
        .sum();

    let r: f64 = rng.gen();
    let outcome = if r < clamp01(p0) { 0 } else { 1 };
    let branch_prob = if outcome == 0 { p0 } else { 1.0 - p0 };

    collapse(psi, n, &[pos], &[outcome], branch_prob);
    outcome
}

/// Measure the qubits at `positions` (≥ 2 of them) jointly, collapsing in
/// place. Projection operators are constructed explicitly for each of the
/// 2^m outcomes. Returns one outcome bit per measured position.
pub(crate) fn measure_multi(
    psi: &mut [C64],
    n: usize,
    positions: &[usize],
    rng: &mut StdRng,
) -> Vec<u32> {
    let m = positions.len();
    let outcomes = dim_pow(2, m);

    // P_o = ⊗ |b⟩⟨b| at the measured positions, identity elsewhere.
    let projector = |o: usize| -> Matrix {
        let basis: Vec<Matrix> = (0..m)
            .map(|j| {
                let bit = digit(o, j, 2, m);
                let mut p = Matrix::zeros(2);
                p.set(bit, bit, C64::new(1.0, 0.0));
                p
            })
            .collect();
        let factors: Vec<(usize, &Matrix)> = positions
            .iter()
            .enumerate()
            .map(|(j, &pos)| (pos, &basis[j]))
            .collect();
        embed(n, 2, &factors)
    };

    let mut probs = Vec::with_capacity(outcomes);
    for o in 0..outcomes {
        let projected = projector(o).mul_vec(psi);
        probs.push(norm_sqr(&projected));
    }

    let chosen = sample_index(&probs, rng);
    let projected = projector(chosen).mul_vec(psi);
    let branch_prob = probs[chosen];
    let scale = 1.0 / branch_prob.max(f64::MIN_POSITIVE).sqrt();
    for (dst, src) in psi.iter_mut().zip(projected) {
        *dst = src * scale;
    }

    (0..m).map(|j| digit(chosen, j, 2, m) as u32).collect()
}

/// Sample an index from unnormalized branch probabilities, clamping each into
/// [0, 1] for the draw. Falls back to the most probable branch when
/// accumulated floating-point drift leaves the draw unclaimed.
pub(crate) fn sample_index(probs: &[f64], rng: &mut StdRng) -> usize {
    let r: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += clamp01(p);
        if r < cumulative {
            return i;
        }
    }
    probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Zero every amplitude whose digits at `positions` differ from `outcomes`,
/// then renormalize by the unclamped branch probability.
fn collapse(psi: &mut [C64], n: usize, positions: &[usize], outcomes: &[u32], branch_prob: f64) {
    let scale = 1.0 / branch_prob.max(f64::MIN_POSITIVE).sqrt();
    for (i, amp) in psi.iter_mut().enumerate() {
        let matches = positions
            .iter()
            .zip(outcomes)
            .all(|(&pos, &b)| digit(i, pos, 2, n) as u32 == b);
        if matches {
            *amp *= scale;
        } else {
            *amp = C64::new(0.0, 0.0);
        }
    }
}

/// Amplitude-damping loss on the qubit at `pos`, applied by Monte Carlo Kraus
/// sampling: one Kraus operator is chosen per application according to its
/// branch probability and applied with renormalization.
///
/// Kraus pair: E₀ = [[1, 0], [0, √(1-p)]], E₁ = [[0, √p], [0, 0]].
pub(crate) fn apply_loss(psi: &mut [C64], n: usize, pos: usize, p: f64, rng: &mut StdRng) {
    let p = clamp01(p);
    let excited: f64 = psi
        .iter()
        .enumerate()
        .filter(|(i, _)| digit(*i, pos, 2, n) == 1)
        .map(|(_, a)| a.norm_sqr())
        .sum();
    // ⟨ψ|E₁†E₁|ψ⟩ = p × P(|1⟩)
    let jump_prob = p * excited;

    let r: f64 = rng.gen();
    if r < clamp01(jump_prob) {
        // Photon lost: E₁/√p_jump maps each |…1…⟩ amplitude onto |…0…⟩.
        let scale = (p / jump_prob.max(f64::MIN_POSITIVE)).sqrt();
        let stride = dim_pow(2, n - 1 - pos);
        for i in 0..psi.len() {
            if digit(i, pos, 2, n) == 0 {
                psi[i] = psi[i + stride] * scale;
            }
        }
        for (i, amp) in psi.iter_mut().enumerate() {
            if digit(i, pos, 2, n) == 1 {
                *amp = C64::new(0.0, 0.0);
            }
        }
    } else {
        // No jump: E₀/√(1-p_jump) damps the excited amplitudes.
        let survive = (1.0 - jump_prob).max(f64::MIN_POSITIVE);
        let ground_scale = 1.0 / survive.sqrt();
        let excited_scale = ((1.0 - p) / survive).sqrt();
        for (i, amp) in psi.iter_mut().enumerate() {
            if digit(i, pos, 2, n) == 0 {
                *amp *= ground_scale;
            } else {
                *amp *= excited_scale;
            }
        }
    }
}
