//! Timed events: a deferred call bound to a simulated time and a tie-break
//! priority.

use crate::kernel::process::DeferredCall;

/// Handle identifying one event within the queue that accepted it. Ids are
/// allocated monotonically per queue and never reused.
pub type EventId = u64;

/// Lowest-precedence priority. Explicit priorities preempt default-priority
/// events at equal time because smaller values sort first.
pub const DEFAULT_PRIORITY: u64 = u64::MAX;

/// A deferred call scheduled for a specific simulated time (picoseconds).
/// Total order on the queue is `(time, priority, insertion order)`.
#[derive(Debug)]
pub struct TimedEvent {
    pub time: u64,
    pub priority: u64,
    pub call: DeferredCall,
}

impl TimedEvent {
    /// Event at `time` with the default (lowest-precedence) priority.
    pub fn new(time: u64, call: DeferredCall) -> Self {
        Self {
            time,
            priority: DEFAULT_PRIORITY,
            call,
        }
    }

    /// Event at `time` with an explicit priority; smaller runs first.
    pub fn with_priority(time: u64, priority: u64, call: DeferredCall) -> Self {
        Self {
            time,
            priority,
            call,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::process::CallArgs;

    #[test]
    fn default_priority_is_lowest_precedence() {
        let call = DeferredCall::new("node", "tick", CallArgs::new());
        let event = TimedEvent::new(10, call);
        assert_eq!(event.priority, DEFAULT_PRIORITY);
        let call = DeferredCall::new("node", "tick", CallArgs::new());
        let urgent = TimedEvent::with_priority(10, 0, call);
        assert!(urgent.priority < event.priority);
    }
}
