//! Drives any [`Clocked`] design tick by tick.

use log::trace;
use std::fmt::Debug;
use thiserror::Error;

/// A synchronous design advanced by a single clock.
pub trait Clocked: Debug {
    /// Advance the design by one clock cycle. This operation must be deterministic: the state after
    /// calling `tick` only depends on the state before, and on inputs set through the design's own
    /// methods.
    fn tick(&mut self);
}

/// Owns a [`Clocked`] design and counts the ticks it has run.
#[derive(Debug)]
pub struct Simulator<S: Clocked> {
    simulatable: S,
    ticks: u64,
}

impl<S: Clocked> Simulator<S> {
    pub fn new(simulatable: S) -> Self {
        Self {
            simulatable,
            ticks: 0,
        }
    }

    /// Provides immutable access to the simulated design.
    pub fn simulatable(&self) -> &S {
        &self.simulatable
    }

    /// Provides mutable access to the simulated design, e.g. to drive its inputs between ticks.
    pub fn simulatable_mut(&mut self) -> &mut S {
        &mut self.simulatable
    }

    pub fn into_inner(self) -> S {
        self.simulatable
    }

    /// Number of ticks since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the simulation forward by one tick.
    pub fn step(&mut self) {
        self.simulatable.tick();
        self.ticks += 1;
    }

    pub fn step_n(&mut self, n: u64) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Steps until `pred` holds, checking it before every tick. Returns the number of ticks taken.
    ///
    /// Gives up after `max_ticks` ticks.
    pub fn run_until<F>(&mut self, mut pred: F, max_ticks: u64) -> Result<u64, Timeout>
    where
        F: FnMut(&S) -> bool,
    {
        for taken in 0..=max_ticks {
            if pred(&self.simulatable) {
                trace!("condition met after {taken} ticks");
                return Ok(taken);
            }
            if taken < max_ticks {
                self.step();
            }
        }
        Err(Timeout { ticks: max_ticks })
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("condition not met within {ticks} ticks")]
pub struct Timeout {
    pub ticks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter(u32);

    impl Clocked for Counter {
        fn tick(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_step() {
        let mut simulator = Simulator::new(Counter::default());
        simulator.step();
        simulator.step_n(4);
        assert_eq!(5, simulator.simulatable().0);
        assert_eq!(5, simulator.ticks());
    }

    #[test]
    fn test_run_until() {
        let mut simulator = Simulator::new(Counter::default());
        assert_eq!(Ok(3), simulator.run_until(|counter| counter.0 == 3, 10));
        assert_eq!(Ok(0), simulator.run_until(|counter| counter.0 == 3, 10));
        assert_eq!(
            Err(Timeout { ticks: 5 }),
            simulator.run_until(|counter| counter.0 == 100, 5)
        );
        assert_eq!(8, simulator.simulatable().0);
    }
}
