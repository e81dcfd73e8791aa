//! Scheduler churn: push, cancel, and retime thousands of events, then run
//! and print the lazy queue's bookkeeping.

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;

use quantum_network_sim::prelude::*;

struct Sink {
    base: EntityBase,
    hits: u64,
}

impl Entity for Sink {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }

    fn init(&mut self, _timeline: &mut Timeline) -> Result<(), KernelError> {
        Ok(())
    }

    fn handle(
        &mut self,
        _timeline: &mut Timeline,
        method: &str,
        _args: &CallArgs,
    ) -> Result<(), KernelError> {
        match method {
            "tick" => {
                self.hits += 1;
                Ok(())
            }
            other => Err(KernelError::UnknownMethod {
                entity: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}

fn main() {
    env_logger::init();

    let mut timeline = Timeline::new(TimelineConfig {
        stop_time: 1_000_001,
        seed: 7,
        ..TimelineConfig::default()
    });
    let sink = Rc::new(RefCell::new(Sink {
        base: EntityBase::new("sink"),
        hits: 0,
    }));
    timeline.add_entity(sink.clone()).expect("fresh registry");

    let total = 50_000;
    let mut ids = Vec::with_capacity(total);
    for _ in 0..total {
        let t = timeline.rng().gen_range(0..1_000_000);
        let call = DeferredCall::new("sink", "tick", CallArgs::new());
        ids.push(timeline.schedule(TimedEvent::new(t, call)).expect("sink exists"));
    }

    // Cancel a third, retime a third.
    let mut cancelled = 0;
    for (i, &id) in ids.iter().enumerate() {
        match i % 3 {
            0 => {
                timeline.remove_event(id);
                cancelled += 1;
            }
            1 => {
                let t = timeline.rng().gen_range(0..1_000_000);
                timeline.update_event_time(id, t);
            }
            _ => {}
        }
    }

    println!("scheduled:     {}", timeline.scheduled_events());
    println!("cancelled:     {cancelled}");
    println!("queue entries: {}", timeline.queue_len());

    timeline.init().expect("init");
    timeline.run().expect("run");

    println!("executed:      {}", timeline.executed_events());
    println!("sink hits:     {}", sink.borrow().hits);
    assert_eq!(sink.borrow().hits as usize, total - cancelled);
}
