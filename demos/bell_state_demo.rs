//! Two nodes on one timeline sharing Bell pairs.
//!
//! A pair source entity schedules entanglement generation trials; a
//! measurement station measures both halves when they arrive and tallies
//! the correlation. Run with `RUST_LOG=debug` to watch the scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use quantum_network_sim::prelude::*;

const TRIALS: u64 = 1_000;
const PERIOD_PS: u64 = 1_000; // one trial per simulated nanosecond
const FLIGHT_PS: u64 = 250;

/// Emits one Bell pair per period and hands the keys to the station.
struct PairSource {
    base: EntityBase,
}

impl Entity for PairSource {
    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }

    fn init(&mut self, timeline: &mut Timeline) -> Result<(), KernelError> {
        for trial in 0..TRIALS {
            let call = DeferredCall::new(self.name(), "emit", CallArgs::new());
            timeline.schedule(TimedEvent::new(trial * PERIOD_PS, call))?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        timeline: &mut Timeline,
        method: &str,
        _args: &CallArgs,
    ) -> Result<(), KernelError> {
        match method {
            "emit" => {
                let s = std::f64::consts::FRAC_1_SQRT_2;
                let ground = [C64::new(1.0, 0.0), C64::new(0.0, 0.0)];
                let k1 = timeline.quantum_mut().new_state(&ground)?;
                let k2 = timeline.quantum_mut().new_state(&ground)?;
                timeline.quantum_mut().set(
                    &[k1, k2],
                    StateRepr::Ket(vec![
                        C64::new(s, 0.0),
                        C64::new(0.0, 0.0),
                        C64::new(0.0, 0.0),
                        C64::new(s, 0.0),
                    ]),
                )?;

                // Photons arrive at the station after their flight time.
                let args = CallArgs::new().arg(k1).arg(k2);
                let call = DeferredCall::new("station", "measure_pair", args);
                timeline.schedule(TimedEvent::new(timeline.now() + FLIGHT_PS, call))?;
                Ok(())
            }
            other => Err(KernelError::UnknownMethod {
                entity: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}

/// Measures both halves of each delivered pair and tallies agreement.
struct Station {
    base: EntityBase,
    trials: u64,
    agreements: u64,
    ones: u64,
}

impl Entity for Station {
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
        timeline: &mut Timeline,
        method: &str,
        args: &CallArgs,
    ) -> Result<(), KernelError> {
        match method {
            "measure_pair" => {
                let bad_args = |detail: &str| KernelError::InvalidArgument {
                    method: method.to_string(),
                    detail: detail.to_string(),
                };
                let k1 = args
                    .get(0)
                    .and_then(ArgValue::as_key)
                    .ok_or_else(|| bad_args("missing first key"))?;
                let k2 = args
                    .get(1)
                    .and_then(ArgValue::as_key)
                    .ok_or_else(|| bad_args("missing second key"))?;

                let outcomes = timeline.measure(&[k1, k2])?;
                self.trials += 1;
                if outcomes[&k1] == outcomes[&k2] {
                    self.agreements += 1;
                }
                self.ones += u64::from(outcomes[&k1]);

                timeline.quantum_mut().remove(k1);
                timeline.quantum_mut().remove(k2);
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

    let config = TimelineConfig {
        stop_time: TRIALS * PERIOD_PS + FLIGHT_PS + 1,
        formalism: Formalism::Ket,
        seed: 42,
        ..TimelineConfig::default()
    };
    let mut timeline = Timeline::new(config);

    let source = Rc::new(RefCell::new(PairSource {
        base: EntityBase::new("source"),
    }));
    let station = Rc::new(RefCell::new(Station {
        base: EntityBase::new("station"),
        trials: 0,
        agreements: 0,
        ones: 0,
    }));
    timeline.add_entity(source).expect("fresh registry");
    timeline.add_entity(station.clone()).expect("fresh registry");

    timeline.init().expect("init");
    timeline.run().expect("run");

    let station = station.borrow();
    println!("trials:           {}", station.trials);
    println!("agreements:       {}", station.agreements);
    println!(
        "P(same outcome):  {:.4}",
        station.agreements as f64 / station.trials as f64
    );
    println!(
        "P(outcome = 1):   {:.4}",
        station.ones as f64 / station.trials as f64
    );
    println!("events executed:  {}", timeline.executed_events());
}
