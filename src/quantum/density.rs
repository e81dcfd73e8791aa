//! General density-matrix formalism.
//!
//! Supports mixed states at the same exponential memory profile as the ket
//! formalism. The measurement paths mirror `ket`: a single-subsystem fast
//! path grouping diagonal entries by the measured digit, and a
//! multi-subsystem path with explicit projection operators, `ρ → PρP / tr(Pρ)`.
//! Both are written mixed-radix so the truncated-Fock formalism reuses them
//! with a local dimension larger than 2.

use rand::rngs::StdRng;

use crate::error::QuantumError;
use crate::quantum::ket::{clamp01, sample_index, NORM_TOLERANCE};
use crate::quantum::linalg::{digit, dim_pow, embed, C64, Matrix};

/// Reject density matrices whose trace is not 1.
pub(crate) fn validate_density(rho: &Matrix) -> Result<(), QuantumError> {
    let total = rho.trace().re;
    if (total - 1.0).abs() > NORM_TOLERANCE {
        return Err(QuantumError::NotNormalized { total });
    }
    Ok(())
}

/// Measure the subsystem at `pos` of an `n`-subsystem density matrix with
/// local dimension `d`, collapsing in place. Returns the sampled digit.
pub(crate) fn measure_single(
    rho: &mut Matrix,
    d: usize,
    n: usize,
    pos: usize,
    rng: &mut StdRng,
) -> u32 {
    let dim = rho.dim();
    let mut probs = vec![0.0; d];
    for i in 0..dim {
        probs[digit(i, pos, d, n)] += rho.get(i, i).re;
    }

    let chosen = sample_index(&probs, rng);
    collapse(rho, d, n, &[pos], &[chosen as u32], probs[chosen]);
    chosen as u32
}

/// Jointly measure the subsystems at `positions` (≥ 2), collapsing in place
/// via explicitly constructed projectors. Returns one digit per position.
pub(crate) fn measure_multi(
    rho: &mut Matrix,
    d: usize,
    n: usize,
    positions: &[usize],
    rng: &mut StdRng,
) -> Vec<u32> {
    let m = positions.len();
    let outcomes = dim_pow(d, m);

    let projector = |o: usize| -> Matrix {
        let basis: Vec<Matrix> = (0..m)
            .map(|j| {
                let dig = digit(o, j, d, m);
                let mut p = Matrix::zeros(d);
                p.set(dig, dig, C64::new(1.0, 0.0));
                p
            })
            .collect();
        let factors: Vec<(usize, &Matrix)> = positions
            .iter()
            .enumerate()
            .map(|(j, &pos)| (pos, &basis[j]))
            .collect();
        embed(n, d, &factors)
    };

    let mut probs = Vec::with_capacity(outcomes);
    for o in 0..outcomes {
        probs.push(projector(o).mul(rho).trace().re);
    }

    let chosen = sample_index(&probs, rng);
    let p = projector(chosen);
    let mut collapsed = p.mul(rho).mul(&p.dagger());
    collapsed.scale_mut(1.0 / probs[chosen].max(f64::MIN_POSITIVE));
    *rho = collapsed;

    (0..m).map(|j| digit(chosen, j, d, m) as u32).collect()
}

/// Zero every entry whose row or column digits at `positions` differ from
/// `outcomes`, then renormalize by the unclamped branch probability.
fn collapse(rho: &mut Matrix, d: usize, n: usize, positions: &[usize], outcomes: &[u32], prob: f64) {
    let dim = rho.dim();
    let matches = |i: usize| {
        positions
            .iter()
            .zip(outcomes)
            .all(|(&pos, &o)| digit(i, pos, d, n) as u32 == o)
    };
    let scale = 1.0 / prob.max(f64::MIN_POSITIVE);
    for r in 0..dim {
        for c in 0..dim {
            if matches(r) && matches(c) {
                rho.set(r, c, rho.get(r, c) * scale);
            } else {
                rho.set(r, c, C64::new(0.0, 0.0));
            }
        }
    }
}

/// Amplitude-damping channel on the qubit at `pos`, applied exactly as a
/// Kraus sum: ρ → E₀ρE₀† + E₁ρE₁†.
pub(crate) fn apply_amplitude_damping(rho: &mut Matrix, n: usize, pos: usize, p: f64) {
    let p = clamp01(p);
    let zero = C64::new(0.0, 0.0);
    let e0 = Matrix::from_flat(
        2,
        vec![C64::new(1.0, 0.0), zero, zero, C64::new((1.0 - p).sqrt(), 0.0)],
    );
    let e1 = Matrix::from_flat(2, vec![zero, C64::new(p.sqrt(), 0.0), zero, zero]);

    let k0 = embed(n, 2, &[(pos, &e0)]);
    let k1 = embed(n, 2, &[(pos, &e1)]);
    let damped = k0
        .mul(rho)
        .mul(&k0.dagger())
        .add(&k1.mul(rho).mul(&k1.dagger()));
    *rho = damped;
}
