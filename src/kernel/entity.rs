//! Lifecycle-managed participants of a timeline.
//!
//! Concrete entities embed an [`EntityBase`] and implement [`Entity`]. By
//! convention a constructor registers the freshly built entity with its
//! timeline immediately (registration fails on a duplicate name), so that
//! every entity exists in exactly one registry before `Timeline::init` runs.
//!
//! The observer and receiver lists are mechanism for collaborators'
//! push-style notification and physical send/receive chains; the kernel only
//! stores them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::KernelError;
use crate::kernel::process::CallArgs;
use crate::kernel::timeline::Timeline;

/// Shared handle to a registered entity.
pub type EntityRef = Rc<RefCell<dyn Entity>>;

/// State common to every entity: its unique name, an optional back-reference
/// to an aggregating entity, and the observer/receiver name lists.
#[derive(Debug, Clone, Default)]
pub struct EntityBase {
    pub name: String,
    pub owner: Option<String>,
    observers: Vec<String>,
    receivers: Vec<String>,
}

impl EntityBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            observers: Vec::new(),
            receivers: Vec::new(),
        }
    }

    /// Add an observer. Idempotent: a name already present is not added
    /// again.
    pub fn attach(&mut self, observer: impl Into<String>) {
        let observer = observer.into();
        if !self.observers.contains(&observer) {
            self.observers.push(observer);
        }
    }

    /// Remove an observer. Idempotent: an absent name is ignored.
    pub fn detach(&mut self, observer: &str) {
        self.observers.retain(|o| o != observer);
    }

    pub fn observers(&self) -> &[String] {
        &self.observers
    }

    /// Append to the receiver chain used by physical send/receive wiring.
    pub fn add_receiver(&mut self, receiver: impl Into<String>) {
        self.receivers.push(receiver.into());
    }

    pub fn receivers(&self) -> &[String] {
        &self.receivers
    }
}

/// A registered, lifecycle-managed participant in a timeline.
pub trait Entity {
    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    /// Called exactly once by `Timeline::init`, in registration order,
    /// before any scheduled event involving this entity executes. Commonly
    /// schedules the entity's first events.
    fn init(&mut self, timeline: &mut Timeline) -> Result<(), KernelError>;

    /// Execute a deferred call addressed to this entity. Unknown method
    /// names are a fatal [`KernelError::UnknownMethod`].
    fn handle(
        &mut self,
        timeline: &mut Timeline,
        method: &str,
        args: &CallArgs,
    ) -> Result<(), KernelError>;

    fn name(&self) -> &str {
        &self.base().name
    }
}
