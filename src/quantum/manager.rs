//! Key-indexed quantum state store with entangling merge, circuit
//! application, measurement with collapse, and partial trace.
//!
//! The manager holds an explicit indirection table from integer keys to
//! shared state objects (`Rc`). Replacing the object for a set of keys is a
//! single pass of table inserts cloning one new `Rc`, so entangled partners
//! can never observe a partial update. Keys are allocated monotonically and
//! never reused.
//!
//! Sampling operations (measurement, stochastic loss) take the caller's
//! generator, keeping the draw sequence and with it the whole simulation
//! reproducible.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};
use rand::rngs::StdRng;

use crate::error::QuantumError;
use crate::quantum::bell;
use crate::quantum::circuit::Circuit;
use crate::quantum::density;
use crate::quantum::fock;
use crate::quantum::ket;
use crate::quantum::linalg::{
    dim_pow, embed, kron_vec, swap_factors_mat, swap_factors_vec, C64, Matrix,
};

/// Opaque handle identifying one subsystem's slot in the manager.
pub type Key = u64;

/// The mathematical representation used for every state of one timeline.
/// Chosen once at construction; the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formalism {
    /// Exact pure-state amplitude vectors.
    Ket,
    /// General density matrices (supports mixed states).
    Density,
    /// Density matrices over truncated Fock spaces (bounded occupation).
    Fock,
    /// Compressed 4-parameter representation for two-qubit states diagonal
    /// in the Bell basis.
    BellDiagonal,
}

impl fmt::Display for Formalism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formalism::Ket => write!(f, "ket"),
            Formalism::Density => write!(f, "density"),
            Formalism::Fock => write!(f, "fock"),
            Formalism::BellDiagonal => write!(f, "bell-diagonal"),
        }
    }
}

/// Formalism-specific payload of a state object.
#[derive(Debug, Clone, PartialEq)]
pub enum StateRepr {
    /// Normalized amplitude vector.
    Ket(Vec<C64>),
    /// Density matrix over qubit subsystems.
    Density(Matrix),
    /// Density matrix over truncated Fock modes.
    Fock(Matrix),
    /// Bell-basis populations (Φ⁺, Φ⁻, Ψ⁺, Ψ⁻) of a two-key pair.
    BellDiagonal([f64; 4]),
}

/// One quantum state and the ordered keys that jointly own it. `keys[0]` is
/// the most significant tensor factor of the representation.
#[derive(Debug, Clone, PartialEq)]
pub struct StateObject {
    pub keys: Vec<Key>,
    pub repr: StateRepr,
}

/// Key-indexed store of quantum states under one selected formalism.
pub struct QuantumManager {
    formalism: Formalism,
    truncation: usize,
    states: HashMap<Key, Rc<StateObject>>,
    next_key: Key,
}

impl QuantumManager {
    /// A manager under the given formalism. `truncation` is the maximum
    /// occupation number per Fock mode and is ignored by the other
    /// formalisms.
    pub fn new(formalism: Formalism, truncation: usize) -> Self {
        Self {
            formalism,
            truncation,
            states: HashMap::new(),
            next_key: 0,
        }
    }

    pub fn formalism(&self) -> Formalism {
        self.formalism
    }

    /// Maximum occupation number per Fock mode.
    pub fn truncation(&self) -> usize {
        self.truncation
    }

    /// Local dimension of one subsystem under the selected formalism.
    pub fn subsystem_dim(&self) -> usize {
        match self.formalism {
            Formalism::Fock => self.truncation + 1,
            _ => 2,
        }
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.states.len()
    }

    /// Allocate a fresh key holding an unentangled state with the given
    /// amplitudes (length = the subsystem dimension). Keys are monotonic and
    /// never reused while the manager is alive.
    pub fn new_state(&mut self, amplitudes: &[C64]) -> Result<Key, QuantumError> {
        let d = self.subsystem_dim();
        if amplitudes.len() != d {
            return Err(QuantumError::DimensionMismatch {
                expected: d,
                got: amplitudes.len(),
            });
        }
        ket::validate_amplitudes(amplitudes)?;

        let repr = match self.formalism {
            Formalism::Ket | Formalism::BellDiagonal => StateRepr::Ket(amplitudes.to_vec()),
            Formalism::Density => StateRepr::Density(Matrix::outer(amplitudes)),
            Formalism::Fock => StateRepr::Fock(Matrix::outer(amplitudes)),
        };

        let key = self.next_key;
        self.next_key += 1;
        self.write_back(vec![key], repr);
        trace!("allocated quantum state key {key}");
        Ok(key)
    }

    /// The state object currently owned by `key`, shared with every other
    /// key in its `keys` list. `None` after `remove`.
    pub fn get(&self, key: Key) -> Option<Rc<StateObject>> {
        self.states.get(&key).cloned()
    }

    /// Replace the object owned by all `keys` at once. The new object's key
    /// list is exactly `keys`, in the given order. Keys that previously
    /// shared an object with bystanders leave those bystanders' object
    /// untouched (see `remove` for the matching caller obligation).
    pub fn set(&mut self, keys: &[Key], repr: StateRepr) -> Result<(), QuantumError> {
        check_distinct(keys)?;
        let d = self.subsystem_dim();
        let expected = dim_pow(d, keys.len());

        match (&self.formalism, &repr) {
            (Formalism::Ket, StateRepr::Ket(v)) => {
                if v.len() != expected {
                    return Err(QuantumError::DimensionMismatch {
                        expected,
                        got: v.len(),
                    });
                }
                ket::validate_amplitudes(v)?;
            }
            (Formalism::Density, StateRepr::Density(m)) => {
                if m.dim() != expected {
                    return Err(QuantumError::DimensionMismatch {
                        expected,
                        got: m.dim(),
                    });
                }
                density::validate_density(m)?;
            }
            (Formalism::Fock, StateRepr::Fock(m)) => {
                if m.dim() != expected {
                    return Err(QuantumError::DimensionMismatch {
                        expected,
                        got: m.dim(),
                    });
                }
                density::validate_density(m)?;
            }
            (Formalism::BellDiagonal, StateRepr::BellDiagonal(diag)) => {
                if keys.len() != 2 {
                    return Err(QuantumError::DimensionMismatch {
                        expected: 2,
                        got: keys.len(),
                    });
                }
                bell::validate_diag(diag)?;
            }
            // A lone key under the Bell-diagonal formalism holds a plain
            // qubit ket (before entangling or after measurement splits it).
            (Formalism::BellDiagonal, StateRepr::Ket(v)) if keys.len() == 1 => {
                if v.len() != 2 {
                    return Err(QuantumError::DimensionMismatch {
                        expected: 2,
                        got: v.len(),
                    });
                }
                ket::validate_amplitudes(v)?;
            }
            _ => {
                return Err(QuantumError::Unsupported {
                    formalism: self.formalism,
                    operation: "set with a mismatched representation",
                })
            }
        }

        debug!("entangling set over keys {keys:?}");
        self.write_back(keys.to_vec(), repr);
        Ok(())
    }

    /// Apply a circuit to the subsystems owned by `keys` (circuit qubit `i`
    /// acts on `keys[i]`). Distinct underlying objects are first merged into
    /// a tensor product, factors are permuted by explicit pairwise swaps so
    /// the requested keys occupy the circuit's qubit positions, and the
    /// circuit unitary (identity-padded if the joint space is larger) is
    /// applied. If the circuit marks qubits for measurement, the sampled
    /// outcomes are returned per measured key.
    pub fn run_circuit(
        &mut self,
        circuit: &Circuit,
        keys: &[Key],
        rng: &mut StdRng,
    ) -> Result<Option<BTreeMap<Key, u32>>, QuantumError> {
        if !matches!(self.formalism, Formalism::Ket | Formalism::Density) {
            return Err(QuantumError::Unsupported {
                formalism: self.formalism,
                operation: "run_circuit",
            });
        }
        check_distinct(keys)?;
        if circuit.size() != keys.len() {
            return Err(QuantumError::CircuitSizeMismatch {
                circuit: circuit.size(),
                keys: keys.len(),
            });
        }

        let (mut all_keys, mut joint) = self.prepare_joint(keys)?;
        let n = all_keys.len();
        let m = keys.len();

        // Bring keys[i] to tensor position i via pairwise factor swaps.
        for (target, &k) in keys.iter().enumerate() {
            let cur = all_keys
                .iter()
                .position(|&x| x == k)
                .expect("requested key is in its own joint space");
            if cur != target {
                match &mut joint {
                    StateRepr::Ket(v) => swap_factors_vec(v, 2, n, target, cur),
                    StateRepr::Density(rho) => swap_factors_mat(rho, 2, n, target, cur),
                    _ => unreachable!("formalism checked above"),
                }
                all_keys.swap(target, cur);
            }
        }

        let mut u = circuit.unitary();
        if n > m {
            u = u.kron(&Matrix::identity(dim_pow(2, n - m)));
        }
        match &mut joint {
            StateRepr::Ket(v) => *v = u.mul_vec(v),
            StateRepr::Density(rho) => *rho = u.mul(rho).mul(&u.dagger()),
            _ => unreachable!("formalism checked above"),
        }

        debug!(
            "circuit over {m} of {n} joint subsystems (keys {keys:?})",
        );
        self.write_back(all_keys, joint);

        if circuit.measured().is_empty() {
            return Ok(None);
        }
        let measured_keys: Vec<Key> = circuit.measured().iter().map(|&q| keys[q]).collect();
        self.measure(&measured_keys, rng).map(Some)
    }

    /// Measure the subsystems owned by `keys`, collapsing the entire joint
    /// object(s) they belong to and writing the post-measurement state back
    /// for every joint key. Keys spanning separate objects are merged first.
    /// Returns the sampled outcome per requested key (an outcome bit, or an
    /// occupation number under the Fock formalism).
    pub fn measure(
        &mut self,
        keys: &[Key],
        rng: &mut StdRng,
    ) -> Result<BTreeMap<Key, u32>, QuantumError> {
        check_distinct(keys)?;
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        if self.formalism == Formalism::BellDiagonal {
            return self.measure_bell_diagonal(keys, rng);
        }

        let (all_keys, mut joint) = self.prepare_joint(keys)?;
        let n = all_keys.len();
        let d = self.subsystem_dim();
        let positions: Vec<usize> = keys
            .iter()
            .map(|&k| {
                all_keys
                    .iter()
                    .position(|&x| x == k)
                    .expect("measured key is in its own joint space")
            })
            .collect();

        let outcomes: Vec<u32> = match &mut joint {
            StateRepr::Ket(psi) => {
                if positions.len() == 1 {
                    vec![ket::measure_single(psi, n, positions[0], rng)]
                } else {
                    ket::measure_multi(psi, n, &positions, rng)
                }
            }
            StateRepr::Density(rho) | StateRepr::Fock(rho) => {
                if positions.len() == 1 {
                    vec![density::measure_single(rho, d, n, positions[0], rng)]
                } else {
                    density::measure_multi(rho, d, n, &positions, rng)
                }
            }
            StateRepr::BellDiagonal(_) => unreachable!("handled above"),
        };

        debug!("measured keys {keys:?} -> {outcomes:?}");
        self.write_back(all_keys, joint);
        Ok(keys.iter().copied().zip(outcomes).collect())
    }

    fn measure_bell_diagonal(
        &mut self,
        keys: &[Key],
        rng: &mut StdRng,
    ) -> Result<BTreeMap<Key, u32>, QuantumError> {
        let mut outcomes = BTreeMap::new();
        for &k in keys {
            if outcomes.contains_key(&k) {
                continue; // partner already collapsed within this call
            }
            let obj = self.fetch(k)?.clone();
            match &obj.repr {
                StateRepr::BellDiagonal(diag) => {
                    let (first, second) = bell::measure_pair(diag, rng);
                    let (k0, k1) = (obj.keys[0], obj.keys[1]);
                    // The pair representation cannot describe the collapsed
                    // state, so measurement splits it into two product kets.
                    self.write_back(vec![k0], StateRepr::Ket(basis_ket(first)));
                    self.write_back(vec![k1], StateRepr::Ket(basis_ket(second)));
                    outcomes.insert(k, if k == k0 { first } else { second });
                    let partner = if k == k0 { k1 } else { k0 };
                    if keys.contains(&partner) {
                        outcomes.insert(partner, if partner == k0 { first } else { second });
                    }
                }
                StateRepr::Ket(v) => {
                    let mut psi = v.clone();
                    let bit = ket::measure_single(&mut psi, 1, 0, rng);
                    self.write_back(vec![k], StateRepr::Ket(psi));
                    outcomes.insert(k, bit);
                }
                _ => {
                    return Err(QuantumError::Unsupported {
                        formalism: self.formalism,
                        operation: "measure on a non-Bell representation",
                    })
                }
            }
        }
        Ok(outcomes)
    }

    /// Apply an arbitrary operator to the Fock modes owned by `keys`
    /// (operator subspace `i` acts on `keys[i]`), renormalizing by the
    /// resulting trace so conditional (non-unitary) operators such as ladder
    /// operators yield valid post-selection states.
    pub fn apply_operator(
        &mut self,
        keys: &[Key],
        operator: &Matrix,
    ) -> Result<(), QuantumError> {
        if self.formalism != Formalism::Fock {
            return Err(QuantumError::Unsupported {
                formalism: self.formalism,
                operation: "apply_operator",
            });
        }
        check_distinct(keys)?;
        let d = self.subsystem_dim();
        let expected = dim_pow(d, keys.len());
        if operator.dim() != expected {
            return Err(QuantumError::DimensionMismatch {
                expected,
                got: operator.dim(),
            });
        }

        let (mut all_keys, mut joint) = self.prepare_joint(keys)?;
        let n = all_keys.len();
        let m = keys.len();
        let StateRepr::Fock(rho) = &mut joint else {
            unreachable!("formalism checked above")
        };

        for (target, &k) in keys.iter().enumerate() {
            let cur = all_keys
                .iter()
                .position(|&x| x == k)
                .expect("requested key is in its own joint space");
            if cur != target {
                swap_factors_mat(rho, d, n, target, cur);
                all_keys.swap(target, cur);
            }
        }

        let mut op = operator.clone();
        if n > m {
            op = op.kron(&Matrix::identity(dim_pow(d, n - m)));
        }
        let mut out = op.mul(rho).mul(&op.dagger());
        let tr = out.trace().re;
        if tr.abs() < 1e-12 {
            return Err(QuantumError::VanishingTrace);
        }
        out.scale_mut(1.0 / tr);
        *rho = out;

        self.write_back(all_keys, joint);
        Ok(())
    }

    /// Apply a lossy channel to the subsystem owned by `key`, in place: the
    /// object is updated without changing its key membership. Under the ket
    /// formalism the channel is realized by Monte Carlo Kraus sampling;
    /// under the density formalisms it is the exact Kraus sum.
    pub fn add_loss(
        &mut self,
        key: Key,
        probability: f64,
        rng: &mut StdRng,
    ) -> Result<(), QuantumError> {
        let obj = self.fetch(key)?.clone();
        let pos = obj
            .keys
            .iter()
            .position(|&x| x == key)
            .expect("object lists every owning key");
        let n = obj.keys.len();
        let d = self.subsystem_dim();

        let repr = match &obj.repr {
            StateRepr::Ket(v) => {
                let mut psi = v.clone();
                ket::apply_loss(&mut psi, n, pos, probability, rng);
                StateRepr::Ket(psi)
            }
            StateRepr::Density(rho) => {
                let mut rho = rho.clone();
                density::apply_amplitude_damping(&mut rho, n, pos, probability);
                StateRepr::Density(rho)
            }
            StateRepr::Fock(rho) => {
                let mut out = Matrix::zeros(rho.dim());
                for e in fock::loss_kraus(d, probability) {
                    let k = embed(n, d, &[(pos, &e)]);
                    out = out.add(&k.mul(rho).mul(&k.dagger()));
                }
                StateRepr::Fock(out)
            }
            StateRepr::BellDiagonal(_) => {
                return Err(QuantumError::Unsupported {
                    formalism: self.formalism,
                    operation: "add_loss",
                })
            }
        };

        debug!("loss channel p={probability} on key {key}");
        self.write_back(obj.keys.clone(), repr);
        Ok(())
    }

    /// Reduced density matrix over the remaining subsystems after summing
    /// out `keys_to_remove`. Read-only: the stored state is not touched.
    /// All named keys must belong to one object; pure representations are
    /// lifted to density matrices first.
    pub fn partial_trace(&self, keys_to_remove: &[Key]) -> Result<Matrix, QuantumError> {
        check_distinct(keys_to_remove)?;
        let first = *keys_to_remove
            .first()
            .ok_or(QuantumError::DimensionMismatch { expected: 1, got: 0 })?;
        let obj = self.fetch(first)?;
        for &k in keys_to_remove {
            if !obj.keys.contains(&k) {
                return Err(QuantumError::UnknownKey(k));
            }
        }

        let d = match obj.repr {
            StateRepr::BellDiagonal(_) => 2,
            _ => self.subsystem_dim(),
        };
        let n = obj.keys.len();
        let rho = match &obj.repr {
            StateRepr::Ket(v) => Matrix::outer(v),
            StateRepr::Density(m) | StateRepr::Fock(m) => m.clone(),
            StateRepr::BellDiagonal(diag) => bell::to_density(diag),
        };
        let positions: Vec<usize> = keys_to_remove
            .iter()
            .map(|&k| {
                obj.keys
                    .iter()
                    .position(|&x| x == k)
                    .expect("membership checked above")
            })
            .collect();
        Ok(crate::quantum::linalg::partial_trace(&rho, d, n, &positions))
    }

    /// Delete the table entry for `key` only. Other keys sharing the object
    /// keep referencing it unchanged; the departing key's physical
    /// contribution is *not* traced out. Callers that need the reduced
    /// description must take it (`partial_trace`, then `set`) before
    /// removing the key.
    pub fn remove(&mut self, key: Key) -> Option<Rc<StateObject>> {
        trace!("removing quantum state key {key}");
        self.states.remove(&key)
    }

    fn fetch(&self, key: Key) -> Result<&Rc<StateObject>, QuantumError> {
        self.states.get(&key).ok_or(QuantumError::UnknownKey(key))
    }

    /// Collect the distinct objects behind `keys` (order of first
    /// appearance) and tensor them into one joint representation.
    fn prepare_joint(&self, keys: &[Key]) -> Result<(Vec<Key>, StateRepr), QuantumError> {
        let mut objs: Vec<Rc<StateObject>> = Vec::new();
        for &k in keys {
            let obj = self.fetch(k)?;
            if !objs.iter().any(|o| Rc::ptr_eq(o, obj)) {
                objs.push(obj.clone());
            }
        }
        let mut all_keys = Vec::new();
        for o in &objs {
            all_keys.extend_from_slice(&o.keys);
        }

        let repr = match self.formalism {
            Formalism::Ket => {
                let mut joint = vec![C64::new(1.0, 0.0)];
                for o in &objs {
                    match &o.repr {
                        StateRepr::Ket(v) => joint = kron_vec(&joint, v),
                        _ => {
                            return Err(QuantumError::Unsupported {
                                formalism: self.formalism,
                                operation: "merge of a non-ket representation",
                            })
                        }
                    }
                }
                StateRepr::Ket(joint)
            }
            Formalism::Density | Formalism::Fock => {
                let mut joint = Matrix::identity(1);
                for o in &objs {
                    match &o.repr {
                        StateRepr::Density(m) | StateRepr::Fock(m) => joint = joint.kron(m),
                        _ => {
                            return Err(QuantumError::Unsupported {
                                formalism: self.formalism,
                                operation: "merge of a non-density representation",
                            })
                        }
                    }
                }
                if self.formalism == Formalism::Density {
                    StateRepr::Density(joint)
                } else {
                    StateRepr::Fock(joint)
                }
            }
            Formalism::BellDiagonal => {
                return Err(QuantumError::Unsupported {
                    formalism: self.formalism,
                    operation: "tensor-product merge",
                })
            }
        };

        if objs.len() > 1 {
            debug!("merged {} objects into a joint space over {all_keys:?}", objs.len());
        }
        Ok((all_keys, repr))
    }

    /// Atomically point every key in `keys` at one new shared object.
    fn write_back(&mut self, keys: Vec<Key>, repr: StateRepr) -> Rc<StateObject> {
        let obj = Rc::new(StateObject {
            keys: keys.clone(),
            repr,
        });
        for k in &keys {
            self.states.insert(*k, obj.clone());
        }
        obj
    }
}

fn basis_ket(bit: u32) -> Vec<C64> {
    if bit == 0 {
        vec![C64::new(1.0, 0.0), C64::new(0.0, 0.0)]
    } else {
        vec![C64::new(0.0, 0.0), C64::new(1.0, 0.0)]
    }
}

fn check_distinct(keys: &[Key]) -> Result<(), QuantumError> {
    for (i, &k) in keys.iter().enumerate() {
        if keys[..i].contains(&k) {
            return Err(QuantumError::DuplicateKey(k));
        }
    }
    Ok(())
}
