//! Lazy-deletion priority queue over timed events.
//!
//! A hand-rolled binary heap ordered by `(time, priority, sequence)` with an
//! id→slot index, so that
//! - `push`/`pop` are O(log n),
//! - `remove` is O(1) (the entry is only flagged invalid; consumers skip it
//!   at pop time),
//! - `update_time` restores heap order by sifting the entry up or down in
//!   place, without a rebuild.
//!
//! The sequence stamp makes ties stable: events with equal `(time,
//! priority)` pop in push order. Because removal is lazy, `len()` counts
//! stale entries too: queue length is *not* the active event count.

use std::collections::HashMap;

use log::trace;

use crate::kernel::event::{EventId, TimedEvent};
use crate::kernel::process::DeferredCall;

#[derive(Debug)]
struct Entry {
    time: u64,
    priority: u64,
    seq: u64,
    invalid: bool,
    pos: usize,
    call: DeferredCall,
}

/// An event returned by [`EventQueue::pop`]. Carries the soft-delete flag so
/// the consumer can skip cancelled work, and enough bookkeeping to be pushed
/// back via [`EventQueue::reinsert`] without losing its identity or its
/// tie-break position.
#[derive(Debug)]
pub struct PoppedEvent {
    pub id: EventId,
    pub time: u64,
    pub priority: u64,
    pub invalid: bool,
    pub call: DeferredCall,
    seq: u64,
}

/// Priority queue yielding events in `(time, priority)` order with stable
/// FIFO ties, lazy cancellation, and in-place time update.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: Vec<EventId>,
    entries: HashMap<EventId, Entry>,
    next_id: EventId,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including invalidated ones awaiting pop.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert an event. No precondition on its time relative to existing
    /// contents. Returns the id used to address it later.
    pub fn push(&mut self, event: TimedEvent) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        let pos = self.heap.len();
        self.entries.insert(
            id,
            Entry {
                time: event.time,
                priority: event.priority,
                seq,
                invalid: false,
                pos,
                call: event.call,
            },
        );
        self.heap.push(id);
        self.sift_up(pos);
        trace!("queued event {id} at t={} (queue length {})", event.time, self.heap.len());
        id
    }

    /// Remove and return the minimum `(time, priority, seq)` event, valid or
    /// not. The consumer is responsible for skipping invalid entries.
    pub fn pop(&mut self) -> Option<PoppedEvent> {
        if self.heap.is_empty() {
            return None;
        }
        let id = self.heap[0];
        let last = self.heap.len() - 1;
        self.heap_swap(0, last);
        self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        let entry = self
            .entries
            .remove(&id)
            .expect("heap ids always have entries");
        Some(PoppedEvent {
            id,
            time: entry.time,
            priority: entry.priority,
            invalid: entry.invalid,
            call: entry.call,
            seq: entry.seq,
        })
    }

    /// Read the minimum event without removing it: `(id, time, priority)`.
    pub fn peek(&self) -> Option<(EventId, u64, u64)> {
        let id = *self.heap.first()?;
        let entry = &self.entries[&id];
        Some((id, entry.time, entry.priority))
    }

    /// Mark an event invalid without touching queue structure. Returns false
    /// when the id is not currently held (already popped, or never pushed
    /// here); that case is a no-op, since ids are never reused.
    pub fn remove(&mut self, id: EventId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.invalid = true;
                true
            }
            None => false,
        }
    }

    /// Change an event's time in place and restore heap order by sifting the
    /// entry up (earlier) or down (later). No-op when the time is unchanged
    /// or the id is not currently held.
    pub fn update_time(&mut self, id: EventId, new_time: u64) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if entry.time == new_time {
            return true;
        }
        let earlier = new_time < entry.time;
        let pos = entry.pos;
        entry.time = new_time;
        if earlier {
            self.sift_up(pos);
        } else {
            self.sift_down(pos);
        }
        true
    }

    /// Push a popped event back, preserving its id, sequence stamp, and
    /// invalid flag. Used by the timeline to keep a past-stop-time event for
    /// a later run.
    pub fn reinsert(&mut self, event: PoppedEvent) {
        let pos = self.heap.len();
        self.entries.insert(
            event.id,
            Entry {
                time: event.time,
                priority: event.priority,
                seq: event.seq,
                invalid: event.invalid,
                pos,
                call: event.call,
            },
        );
        self.heap.push(event.id);
        self.sift_up(pos);
    }

    fn key(&self, id: EventId) -> (u64, u64, u64) {
        let entry = &self.entries[&id];
        (entry.time, entry.priority, entry.seq)
    }

    fn heap_swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        let id_a = self.heap[a];
        let id_b = self.heap[b];
        self.entries.get_mut(&id_a).expect("indexed id").pos = a;
        self.entries.get_mut(&id_b).expect("indexed id").pos = b;
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.key(self.heap[pos]) < self.key(self.heap[parent]) {
                self.heap_swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.heap.len() && self.key(self.heap[left]) < self.key(self.heap[smallest]) {
                smallest = left;
            }
            if right < self.heap.len() && self.key(self.heap[right]) < self.key(self.heap[smallest])
            {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.heap_swap(pos, smallest);
            pos = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::process::CallArgs;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn event(time: u64) -> TimedEvent {
        TimedEvent::new(time, DeferredCall::new("node", "tick", CallArgs::new()))
    }

    fn event_with_priority(time: u64, priority: u64) -> TimedEvent {
        TimedEvent::with_priority(time, priority, DeferredCall::new("node", "tick", CallArgs::new()))
    }

    fn drain(queue: &mut EventQueue) -> Vec<PoppedEvent> {
        let mut out = Vec::new();
        while let Some(e) = queue.pop() {
            out.push(e);
        }
        out
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        for &t in &[50, 10, 40, 20, 30] {
            q.push(event(t));
        }
        let times: Vec<u64> = drain(&mut q).iter().map(|e| e.time).collect();
        assert_eq!(times, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn random_pushes_pop_sorted() {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut q = EventQueue::new();
        for _ in 0..500 {
            q.push(event(rng.gen_range(0..10_000)));
        }
        let popped = drain(&mut q);
        assert_eq!(popped.len(), 500);
        for pair in popped.windows(2) {
            assert!(
                (pair[0].time, pair[0].priority) <= (pair[1].time, pair[1].priority),
                "heap order violated: {} after {}",
                pair[1].time,
                pair[0].time
            );
        }
    }

    #[test]
    fn priority_breaks_time_ties() {
        let mut q = EventQueue::new();
        q.push(event(10)); // default priority, lowest precedence
        let urgent = q.push(event_with_priority(10, 0));
        q.push(event_with_priority(10, 5));

        let popped = drain(&mut q);
        assert_eq!(popped[0].id, urgent);
        assert_eq!(popped[0].priority, 0);
        assert_eq!(popped[1].priority, 5);
        assert_eq!(popped[2].priority, crate::kernel::event::DEFAULT_PRIORITY);
    }

    #[test]
    fn equal_keys_pop_in_push_order() {
        let mut q = EventQueue::new();
        let ids: Vec<EventId> = (0..10).map(|_| q.push(event_with_priority(7, 3))).collect();
        let popped: Vec<EventId> = drain(&mut q).iter().map(|e| e.id).collect();
        assert_eq!(popped, ids, "ties must be FIFO");
    }

    #[test]
    fn removed_events_still_pop_marked_invalid() {
        let mut q = EventQueue::new();
        q.push(event(1));
        let cancelled = q.push(event(2));
        q.push(event(3));
        assert!(q.remove(cancelled));
        assert_eq!(q.len(), 3, "lazy removal keeps the entry in the queue");

        let popped = drain(&mut q);
        assert_eq!(popped.len(), 3);
        assert!(!popped[0].invalid);
        assert!(popped[1].invalid);
        assert!(!popped[2].invalid);
        // Skipping invalid entries yields the same sequence as if the event
        // had never been pushed.
        let valid_times: Vec<u64> = popped.iter().filter(|e| !e.invalid).map(|e| e.time).collect();
        assert_eq!(valid_times, vec![1, 3]);
    }

    #[test]
    fn remove_of_unknown_id_is_a_noop() {
        let mut q = EventQueue::new();
        let id = q.push(event(1));
        q.pop();
        assert!(!q.remove(id));
        assert!(!q.update_time(id, 5));
    }

    #[test]
    fn update_time_matches_rebuilt_heap() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let times: Vec<u64> = (0..20).map(|_| rng.gen_range(0..1000)).collect();
            let mut q = EventQueue::new();
            let ids: Vec<EventId> = times.iter().map(|&t| q.push(event(t))).collect();

            // Retime one random event in place.
            let victim = rng.gen_range(0..ids.len());
            let new_time = rng.gen_range(0..1000);
            assert!(q.update_time(ids[victim], new_time));

            // Rebuild from scratch with the changed time.
            let mut rebuilt = EventQueue::new();
            for (i, &t) in times.iter().enumerate() {
                rebuilt.push(event(if i == victim { new_time } else { t }));
            }

            let updated: Vec<u64> = drain(&mut q).iter().map(|e| e.time).collect();
            let fresh: Vec<u64> = drain(&mut rebuilt).iter().map(|e| e.time).collect();
            assert_eq!(updated, fresh);
        }
    }

    #[test]
    fn update_to_same_time_is_a_noop() {
        let mut q = EventQueue::new();
        let id = q.push(event(42));
        assert!(q.update_time(id, 42));
        let popped = q.pop().unwrap();
        assert_eq!(popped.time, 42);
    }

    #[test]
    fn reinsert_preserves_identity_and_ties() {
        let mut q = EventQueue::new();
        let a = q.push(event_with_priority(10, 1));
        let b = q.push(event_with_priority(10, 1));

        // Pop the head and push it back: it must come out first again
        // because its sequence stamp predates b's.
        let popped = q.pop().unwrap();
        assert_eq!(popped.id, a);
        q.reinsert(popped);

        let first = q.pop().unwrap();
        assert_eq!(first.id, a);
        assert_eq!(q.pop().unwrap().id, b);
    }
}
