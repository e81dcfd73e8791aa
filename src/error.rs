//! Error taxonomy for the scheduling kernel and the quantum state manager.
//!
//! Both components raise immediately and never attempt local recovery: the
//! correctness of a physics simulation depends on never silently continuing
//! past a broken invariant. Everything here is fatal to the run that produced
//! it.

use thiserror::Error;

use crate::quantum::manager::Formalism;

/// Fatal scheduler-side failures.
#[derive(Debug, Error)]
pub enum KernelError {
    /// An event was popped whose time precedes the current clock. Time must
    /// never move backward during a run.
    #[error("event at t={event_time} ps precedes the current clock t={now} ps")]
    ClockRegression { event_time: u64, now: u64 },

    /// A second entity was registered under an already-taken name.
    #[error("entity name {0:?} is already registered on this timeline")]
    DuplicateEntity(String),

    /// A named owner could not be resolved against the entity registry.
    #[error("no entity named {0:?} is registered on this timeline")]
    UnknownEntity(String),

    /// An entity was asked to handle a method it does not implement.
    #[error("entity {entity:?} has no method {method:?}")]
    UnknownMethod { entity: String, method: String },

    /// A deferred call carried arguments its target could not interpret.
    #[error("bad arguments for method {method:?}: {detail}")]
    InvalidArgument { method: String, detail: String },

    /// An event reached execution with its owner still unresolved. Owners are
    /// resolved at schedule time, so this indicates an event that bypassed
    /// `Timeline::schedule`.
    #[error("event owner {0:?} was never resolved against the registry")]
    UnresolvedOwner(String),

    /// A state-manager failure surfaced during event execution.
    #[error(transparent)]
    Quantum(#[from] QuantumError),
}

/// Fatal state-manager failures.
#[derive(Debug, Error)]
pub enum QuantumError {
    /// Amplitudes whose implied probabilities do not sum to 1.
    #[error("state amplitudes are not normalized (Σ|a|² = {total})")]
    NotNormalized { total: f64 },

    /// A representation sized differently from the space it was written to.
    #[error("representation dimension {got} does not match expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A circuit sized differently from the number of supplied keys.
    #[error("circuit acts on {circuit} qubits but {keys} keys were supplied")]
    CircuitSizeMismatch { circuit: usize, keys: usize },

    /// No state is registered under the given key.
    #[error("no state is registered under key {0}")]
    UnknownKey(u64),

    /// The same key appeared more than once in a single request.
    #[error("key {0} appears more than once in the request")]
    DuplicateKey(u64),

    /// A gate or measurement referenced a qubit outside the circuit.
    #[error("qubit {index} is out of range for a {size}-qubit circuit")]
    QubitOutOfRange { index: usize, size: usize },

    /// A qubit was marked for measurement twice.
    #[error("qubit {0} is already marked for measurement")]
    AlreadyMeasured(usize),

    /// The requested operation does not exist under the selected formalism.
    #[error("{operation} is not supported under the {formalism} formalism")]
    Unsupported {
        formalism: Formalism,
        operation: &'static str,
    },

    /// An operator application left nothing to renormalize.
    #[error("operator application produced a state with vanishing trace")]
    VanishingTrace,

    /// A Bell-diagonal element set that is not a probability distribution.
    #[error("Bell-diagonal elements must be non-negative and sum to 1 (got Σ = {total})")]
    BadBellDiagonal { total: f64 },
}
