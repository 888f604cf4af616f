//! Minimal discrete-event simulation kernel: a binary-heap event queue, named
//! components with [`EventHandler`] implementations, and a [`SimulationContext`]
//! used by components to emit events and read the virtual clock.
//!
//! This is the engine layer shared by every simulated subsystem in the workspace.
//! It knows nothing about hosts, VMs or cloudlets — see the `dc_sim` crate for that.

pub mod component;
pub mod context;
pub mod event;
pub mod handler;
pub mod log;
pub mod simulation;
mod state;

pub use colored;
pub use component::Id;
pub use context::SimulationContext;
pub use event::Event;
pub use handler::EventHandler;
pub use simulation::Simulation;
pub use state::EPSILON;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde::Serialize;

    use crate::cast;
    use crate::handler::EventHandler;
    use crate::simulation::Simulation;
    use crate::Event;

    #[derive(Serialize, Clone)]
    struct Ping {
        value: u32,
    }

    #[derive(Serialize, Clone)]
    struct Pong {
        value: u32,
    }

    struct Pinger {
        other: Option<crate::component::Id>,
        ctx: crate::context::SimulationContext,
        pongs_received: u32,
    }

    impl EventHandler for Pinger {
        fn on(&mut self, event: Event) {
            cast!(match event.data {
                Pong { value } => {
                    self.pongs_received += 1;
                    if value < 3 {
                        self.ctx.emit(Ping { value: value + 1 }, self.other.unwrap(), 1.0);
                    }
                }
            })
        }
    }

    struct Ponger {
        ctx: crate::context::SimulationContext,
    }

    impl EventHandler for Ponger {
        fn on(&mut self, event: Event) {
            cast!(match event.data {
                Ping { value } => {
                    self.ctx.emit(Pong { value }, event.src, 1.0);
                }
            })
        }
    }

    #[test]
    fn ping_pong_advances_clock_by_the_sum_of_delays() {
        let mut sim = Simulation::new(42);
        let ponger_ctx = sim.create_context("ponger");
        let ponger = Rc::new(RefCell::new(Ponger { ctx: ponger_ctx }));
        let ponger_id = sim.add_handler("ponger", ponger);

        let pinger_ctx = sim.create_context("pinger");
        let pinger = Rc::new(RefCell::new(Pinger {
            other: Some(ponger_id),
            ctx: pinger_ctx,
            pongs_received: 0,
        }));
        sim.add_handler("pinger", pinger.clone());

        pinger.borrow().ctx.emit(Ping { value: 0 }, ponger_id, 0.5);
        sim.step_until_no_events();

        assert_eq!(pinger.borrow().pongs_received, 4);
        // 0.5 for the first ping, then 4 ping/pong round trips of 1.0 + 1.0 each.
        assert!((sim.time() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn run_for_duration_advances_clock_exactly_even_with_no_events() {
        let mut sim = Simulation::new(1);
        sim.run_for_duration(5.0);
        assert!((sim.time() - 5.0).abs() < 1e-9);

        sim.run_for_duration(2.5);
        assert!((sim.time() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn run_for_duration_still_processes_events_inside_the_window() {
        struct Counter {
            hits: Rc<RefCell<u32>>,
        }
        impl EventHandler for Counter {
            fn on(&mut self, event: Event) {
                cast!(match event.data {
                    Ping { .. } => {
                        *self.hits.borrow_mut() += 1;
                    }
                })
            }
        }

        let mut sim = Simulation::new(7);
        let hits = Rc::new(RefCell::new(0u32));
        let ctx = sim.create_context("counter");
        let id = sim.add_handler("counter", Rc::new(RefCell::new(Counter { hits: hits.clone() })));
        ctx.emit(Ping { value: 1 }, id, 0.2);
        ctx.emit(Ping { value: 2 }, id, 0.8);
        // Event at t=1.5 falls outside this timestep and must not be processed yet.
        ctx.emit(Ping { value: 3 }, id, 1.5);

        sim.run_for_duration(1.0);

        assert_eq!(*hits.borrow(), 2);
        assert!((sim.time() - 1.0).abs() < 1e-9);
    }
}
