//! Fixed-step bookkeeping for the simulation clock.
//!
//! `advance(elapsed)` runs exactly `floor(elapsed / dt)` sub-steps and drops
//! the remainder. The real-time loop recomputes `wall_time − simul_time` on
//! every iteration, so simulated time never runs ahead of the wall clock and
//! the dropped remainder is picked up on the next call.

use crate::core::types::SimulContext;

/// Simulation clock advancing in fixed sub-steps
#[derive(Debug, Clone)]
pub struct StepScheduler {
    dt: f64,
    step_count: u64,
}

impl StepScheduler {
    pub fn new(dt: f64) -> Self {
        Self { dt, step_count: 0 }
    }

    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Sub-steps completed so far
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated time (seconds)
    #[inline]
    pub fn simul_time(&self) -> f64 {
        self.step_count as f64 * self.dt
    }

    /// Largest `n` with `n·dt <= elapsed`; zero for negative or NaN
    pub fn substeps_for(&self, elapsed: f64) -> u64 {
        if !(elapsed >= self.dt) || !elapsed.is_finite() {
            return 0;
        }
        let mut n = (elapsed / self.dt).floor() as u64;
        // The quotient may round across an integer in either direction
        if (n + 1) as f64 * self.dt <= elapsed {
            n += 1;
        } else if n as f64 * self.dt > elapsed {
            n -= 1;
        }
        n
    }

    /// Context for the callbacks run before the next physics step
    pub fn pre_context(&self) -> SimulContext {
        SimulContext {
            simul_time: self.simul_time(),
            dt: self.dt,
            step_count: self.step_count,
        }
    }

    /// Count one sub-step and return the context for its post-step callbacks
    pub fn complete_step(&mut self) -> SimulContext {
        self.step_count += 1;
        SimulContext {
            simul_time: self.simul_time(),
            dt: self.dt,
            step_count: self.step_count,
        }
    }
}
