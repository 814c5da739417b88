//! Fixed-step accumulator.
//!
//! Frame time goes in through [`Accumulator::add`], fixed steps come out of
//! [`Accumulator::drain`]. The same drain runs on the scheduling thread and
//! inside the offload worker, so both paths consume time identically.

use std::time::Duration;

use log::warn;

use crate::core::time::{as_ms, rescale};

/// A single frame may add at most this many timesteps.
pub const MAX_DELTA_STEPS: u32 = 5;

/// What a step asks the drain loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    Halt,
}

/// Why a drain stopped before running out of whole steps or hitting `max_updates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainHalt {
    /// The wall-clock budget ran out; the remainder waits for the next frame.
    Budget,
    /// A step asked to stop (callback failure or a stop request).
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    pub updates: u32,
    pub halt: Option<DrainHalt>,
}

/// Unconsumed simulation time plus the simulated clock it feeds.
#[derive(Debug, Clone)]
pub struct Accumulator {
    timestep: Duration,
    pending: Duration,
    sim_time: Duration,
}

impl Accumulator {
    pub fn new(timestep: Duration) -> Self {
        Self {
            timestep,
            pending: Duration::ZERO,
            sim_time: Duration::ZERO,
        }
    }

    /// Rebuild an accumulator from transported state (offload worker side).
    pub fn restore(timestep: Duration, pending: Duration, sim_time: Duration) -> Self {
        Self {
            timestep,
            pending,
            sim_time,
        }
    }

    /// Add frame time, clamped to `MAX_DELTA_STEPS` timesteps. Returns the
    /// amount actually added.
    pub fn add(&mut self, delta: Duration) -> Duration {
        let cap = self.timestep.checked_mul(MAX_DELTA_STEPS).unwrap_or(Duration::MAX);
        let added = delta.min(cap);
        self.pending = self.pending.saturating_add(added);
        added
    }

    /// Run whole steps while time remains, up to `max_updates`, stopping
    /// early once `now()` reports more than `budget` spent since the drain
    /// began. The budget is checked between steps, so one slow step can
    /// still overrun it.
    pub fn drain<N, S>(&mut self, max_updates: u32, budget: Duration, mut now: N, mut step: S) -> DrainOutcome
    where
        N: FnMut() -> Duration,
        S: FnMut(Duration, Duration) -> StepControl,
    {
        let started = now();
        let mut updates = 0;

        while self.pending >= self.timestep && updates < max_updates {
            let control = step(self.timestep, self.sim_time);
            self.pending -= self.timestep;
            self.sim_time += self.timestep;
            updates += 1;

            if control == StepControl::Halt {
                return DrainOutcome {
                    updates,
                    halt: Some(DrainHalt::Halted),
                };
            }

            let spent = now().saturating_sub(started);
            if spent > budget && self.pending >= self.timestep && updates < max_updates {
                warn!(
                    "update budget exceeded ({:.2}ms after {} updates), deferring {:.2}ms",
                    as_ms(spent),
                    updates,
                    as_ms(self.pending)
                );
                return DrainOutcome {
                    updates,
                    halt: Some(DrainHalt::Budget),
                };
            }
        }

        DrainOutcome { updates, halt: None }
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Change the step size, rescaling outstanding time so the fraction of
    /// a step already accumulated is preserved.
    pub fn set_timestep(&mut self, timestep: Duration) {
        self.pending = rescale(self.pending, timestep, self.timestep);
        self.timestep = timestep;
    }

    pub fn pending(&self) -> Duration {
        self.pending
    }

    pub fn set_pending(&mut self, pending: Duration) {
        self.pending = pending;
    }

    /// Total simulated time advanced so far.
    pub fn sim_time(&self) -> Duration {
        self.sim_time
    }

    pub fn set_sim_time(&mut self, sim_time: Duration) {
        self.sim_time = sim_time;
    }
}
