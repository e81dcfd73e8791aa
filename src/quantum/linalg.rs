//! Dense complex linear algebra for small joint Hilbert spaces.
//!
//! States are flat `Vec<Complex<f64>>` amplitude vectors; operators are
//! square matrices stored flattened row-major. Subsystem bookkeeping is
//! mixed-radix: every subsystem has the same local dimension `d` (2 for
//! qubits, `truncation + 1` for truncated Fock modes), and a joint basis
//! index decomposes into one base-`d` digit per subsystem, most significant
//! first. The same swap and partial-trace code therefore serves every
//! formalism.

use num_complex::Complex;
use num_traits::{One, Zero};

/// Complex scalar used throughout the state manager.
pub type C64 = Complex<f64>;

/// A single-qubit operator stored as [row0col0, row0col1, row1col0, row1col1].
pub type Matrix2x2 = [C64; 4];

/// Square complex matrix, flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    dim: usize,
    data: Vec<C64>,
}

impl Matrix {
    /// All-zero matrix of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![C64::zero(); dim * dim],
        }
    }

    /// Identity matrix of the given dimension.
    pub fn identity(dim: usize) -> Self {
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            m.data[i * dim + i] = C64::one();
        }
        m
    }

    /// Build from a flat row-major buffer. Length must be a perfect square.
    pub fn from_flat(dim: usize, data: Vec<C64>) -> Self {
        assert_eq!(data.len(), dim * dim, "flat buffer is not {dim}×{dim}");
        Self { dim, data }
    }

    /// Lift a 2×2 array into a `Matrix`.
    pub fn from_2x2(m: &Matrix2x2) -> Self {
        Self {
            dim: 2,
            data: m.to_vec(),
        }
    }

    /// Diagonal matrix from real entries.
    pub fn from_diag(diag: &[f64]) -> Self {
        let mut m = Self::zeros(diag.len());
        for (i, &v) in diag.iter().enumerate() {
            m.data[i * diag.len() + i] = C64::new(v, 0.0);
        }
        m
    }

    /// Projector |ψ⟩⟨ψ| from an amplitude vector.
    pub fn outer(v: &[C64]) -> Self {
        let dim = v.len();
        let mut m = Self::zeros(dim);
        for r in 0..dim {
            for c in 0..dim {
                m.data[r * dim + c] = v[r] * v[c].conj();
            }
        }
        m
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn data(&self) -> &[C64] {
        &self.data
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> C64 {
        self.data[r * self.dim + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: C64) {
        self.data[r * self.dim + c] = v;
    }

    /// Matrix product `self · other`.
    pub fn mul(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.dim, other.dim, "dimension mismatch in matrix product");
        let dim = self.dim;
        let mut data = vec![C64::zero(); dim * dim];
        mul_rows(&mut data, &self.data, &other.data, dim);
        Matrix { dim, data }
    }

    /// Matrix-vector product `self · v`.
    pub fn mul_vec(&self, v: &[C64]) -> Vec<C64> {
        assert_eq!(self.dim, v.len(), "dimension mismatch in matrix-vector product");
        let dim = self.dim;
        let mut out = vec![C64::zero(); dim];
        for r in 0..dim {
            let mut acc = C64::zero();
            let row = &self.data[r * dim..(r + 1) * dim];
            for c in 0..dim {
                acc += row[c] * v[c];
            }
            out[r] = acc;
        }
        out
    }

    /// Kronecker (tensor) product `self ⊗ other`.
    pub fn kron(&self, other: &Matrix) -> Matrix {
        let dim = self.dim * other.dim;
        let mut data = vec![C64::zero(); dim * dim];
        kron_rows(&mut data, self, other, dim);
        Matrix { dim, data }
    }

    /// Conjugate transpose.
    pub fn dagger(&self) -> Matrix {
        let dim = self.dim;
        let mut data = vec![C64::zero(); dim * dim];
        for r in 0..dim {
            for c in 0..dim {
                data[c * dim + r] = self.data[r * dim + c].conj();
            }
        }
        Matrix { dim, data }
    }

    /// Trace.
    pub fn trace(&self) -> C64 {
        (0..self.dim).map(|i| self.data[i * self.dim + i]).sum()
    }

    /// Entry-wise sum `self + other`.
    pub fn add(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.dim, other.dim, "dimension mismatch in matrix sum");
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Matrix {
            dim: self.dim,
            data,
        }
    }

    /// Entry-wise scaling by a complex factor.
    pub fn scaled(&self, factor: C64) -> Matrix {
        Matrix {
            dim: self.dim,
            data: self.data.iter().map(|a| a * factor).collect(),
        }
    }

    /// Scale every entry in place by a real factor.
    pub fn scale_mut(&mut self, factor: f64) {
        for a in &mut self.data {
            *a *= factor;
        }
    }
}

#[cfg(feature = "parallel")]
fn mul_rows(out: &mut [C64], a: &[C64], b: &[C64], dim: usize) {
    use rayon::prelude::*;
    out.par_chunks_mut(dim).enumerate().for_each(|(r, row)| {
        for c in 0..dim {
            let mut acc = C64::zero();
            for k in 0..dim {
                acc += a[r * dim + k] * b[k * dim + c];
            }
            row[c] = acc;
        }
    });
}

#[cfg(not(feature = "parallel"))]
fn mul_rows(out: &mut [C64], a: &[C64], b: &[C64], dim: usize) {
    for (r, row) in out.chunks_mut(dim).enumerate() {
        for c in 0..dim {
            let mut acc = C64::zero();
            for k in 0..dim {
                acc += a[r * dim + k] * b[k * dim + c];
            }
            row[c] = acc;
        }
    }
}

#[cfg(feature = "parallel")]
fn kron_rows(out: &mut [C64], a: &Matrix, b: &Matrix, dim: usize) {
    use rayon::prelude::*;
    let bd = b.dim;
    out.par_chunks_mut(dim).enumerate().for_each(|(r, row)| {
        for c in 0..dim {
            row[c] = a.get(r / bd, c / bd) * b.get(r % bd, c % bd);
        }
    });
}

#[cfg(not(feature = "parallel"))]
fn kron_rows(out: &mut [C64], a: &Matrix, b: &Matrix, dim: usize) {
    let bd = b.dim;
    for (r, row) in out.chunks_mut(dim).enumerate() {
        for c in 0..dim {
            row[c] = a.get(r / bd, c / bd) * b.get(r % bd, c % bd);
        }
    }
}

/// Kronecker product of two amplitude vectors.
pub fn kron_vec(a: &[C64], b: &[C64]) -> Vec<C64> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for &x in a {
        for &y in b {
            out.push(x * y);
        }
    }
    out
}

/// Σ|aᵢ|² over an amplitude vector.
pub fn norm_sqr(v: &[C64]) -> f64 {
    v.iter().map(|a| a.norm_sqr()).sum()
}

/// `d^n` as usize.
pub fn dim_pow(d: usize, n: usize) -> usize {
    d.pow(n as u32)
}

/// Base-`d` digit of `index` at subsystem position `pos` (0 = most
/// significant of `n` subsystems).
#[inline]
pub fn digit(index: usize, pos: usize, d: usize, n: usize) -> usize {
    (index / dim_pow(d, n - 1 - pos)) % d
}

/// `index` with the digits at positions `a` and `b` exchanged.
#[inline]
pub fn swap_digits(index: usize, a: usize, b: usize, d: usize, n: usize) -> usize {
    let da = digit(index, a, d, n);
    let db = digit(index, b, d, n);
    let wa = dim_pow(d, n - 1 - a);
    let wb = dim_pow(d, n - 1 - b);
    index - da * wa - db * wb + db * wa + da * wb
}

/// Exchange the tensor factors at positions `a` and `b` of an amplitude
/// vector over `n` subsystems of local dimension `d`. This applies the swap
/// operator without materializing its matrix.
pub fn swap_factors_vec(state: &mut [C64], d: usize, n: usize, a: usize, b: usize) {
    if a == b {
        return;
    }
    debug_assert_eq!(state.len(), dim_pow(d, n));
    for i in 0..state.len() {
        let j = swap_digits(i, a, b, d, n);
        if j > i {
            state.swap(i, j);
        }
    }
}

/// Exchange the tensor factors at positions `a` and `b` of a density matrix:
/// the swap operator applied on both sides, `S ρ S†`.
pub fn swap_factors_mat(m: &mut Matrix, d: usize, n: usize, a: usize, b: usize) {
    if a == b {
        return;
    }
    let dim = m.dim();
    debug_assert_eq!(dim, dim_pow(d, n));
    let mut data = vec![C64::zero(); dim * dim];
    for r in 0..dim {
        let sr = swap_digits(r, a, b, d, n);
        for c in 0..dim {
            let sc = swap_digits(c, a, b, d, n);
            data[sr * dim + sc] = m.get(r, c);
        }
    }
    *m = Matrix::from_flat(dim, data);
}

/// Embed local operators at chosen subsystem positions, identity elsewhere:
/// the `n`-subsystem operator `f₀ ⊗ f₁ ⊗ … ` with `fᵢ` taken from `factors`
/// where given and `I_d` otherwise.
pub fn embed(n: usize, d: usize, factors: &[(usize, &Matrix)]) -> Matrix {
    let ident = Matrix::identity(d);
    let mut out = Matrix::identity(1);
    for pos in 0..n {
        let factor = factors
            .iter()
            .find(|(p, _)| *p == pos)
            .map(|(_, m)| *m)
            .unwrap_or(&ident);
        out = out.kron(factor);
    }
    out
}

/// Partial trace: sum out the subsystems at `remove` positions, returning the
/// reduced density matrix over the remaining subsystems (original order
/// preserved).
pub fn partial_trace(rho: &Matrix, d: usize, n: usize, remove: &[usize]) -> Matrix {
    debug_assert_eq!(rho.dim(), dim_pow(d, n));
    let keep: Vec<usize> = (0..n).filter(|p| !remove.contains(p)).collect();
    let keep_dim = dim_pow(d, keep.len());
    let rem_dim = dim_pow(d, remove.len());
    let mut out = Matrix::zeros(keep_dim);

    // Recompose a full index from kept digits and traced digits.
    let compose = |kept: usize, traced: usize| -> usize {
        let mut idx = 0;
        for (slot, &pos) in keep.iter().enumerate() {
            let dig = digit(kept, slot, d, keep.len());
            idx += dig * dim_pow(d, n - 1 - pos);
        }
        for (slot, &pos) in remove.iter().enumerate() {
            let dig = digit(traced, slot, d, remove.len());
            idx += dig * dim_pow(d, n - 1 - pos);
        }
        idx
    };

    for i in 0..keep_dim {
        for j in 0..keep_dim {
            let mut acc = C64::zero();
            for t in 0..rem_dim {
                acc += rho.get(compose(i, t), compose(j, t));
            }
            out.set(i, j, acc);
        }
    }
    out
}
