//! # quantum-network-sim
//!
//! Execution substrate for a physics-oriented quantum network simulator: a
//! discrete-event scheduling kernel coupled to an entanglement-aware quantum
//! state manager.
//!
//! Hardware and protocol models are passive collaborators. They register
//! themselves with a [`kernel::timeline::Timeline`], schedule future callbacks
//! through it, and read or mutate quantum state through the
//! [`quantum::manager::QuantumManager`] the timeline owns. The kernel and the
//! state manager carry all the ordering guarantees and invariants; everything
//! else is physics formulas layered on top.
//!
//! ## Usage
//!
//! ```no_run
//! use quantum_network_sim::prelude::*;
//!
//! let config = TimelineConfig {
//!     stop_time: 1_000_000, // picoseconds
//!     formalism: Formalism::Ket,
//!     ..TimelineConfig::default()
//! };
//! let mut timeline = Timeline::new(config);
//! // ... construct and register entities ...
//! timeline.init().unwrap();
//! timeline.run().unwrap();
//! ```

pub mod error;
pub mod kernel;
pub mod quantum;

pub mod prelude {
    pub use crate::error::{KernelError, QuantumError};
    pub use crate::kernel::entity::{Entity, EntityBase};
    pub use crate::kernel::event::{EventId, TimedEvent, DEFAULT_PRIORITY};
    pub use crate::kernel::process::{ArgValue, CallArgs, DeferredCall, Owner};
    pub use crate::kernel::queue::EventQueue;
    pub use crate::kernel::timeline::{Timeline, TimelineConfig};
    pub use crate::quantum::circuit::Circuit;
    pub use crate::quantum::linalg::{C64, Matrix};
    pub use crate::quantum::manager::{
        Formalism, Key, QuantumManager, StateObject, StateRepr,
    };
}
