// src/core/backoff.rs

//! Exponential backoff with full jitter for the minion's reconnection loop.
//!
//! The policy is a small state machine with one observable, `next_delay`.
//! Delays grow geometrically up to a cap; with jitter enabled the returned
//! delay is drawn uniformly from `[0, current)` and floored so retries never
//! become a hot loop. `reset` must be called on every successful connection
//! so the next outage starts from the initial delay again.

use crate::config::ReconnectConfig;
use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;

/// The minimum delay handed out when jitter is enabled.
const JITTER_FLOOR: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct BackoffState {
    current_delay: Duration,
    attempt_count: u32,
}

/// Thread-safe reconnection backoff policy.
#[derive(Debug)]
pub struct ReconnectionPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    state: Mutex<BackoffState>,
}

impl ReconnectionPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            jitter: config.jitter,
            state: Mutex::new(BackoffState {
                current_delay: config.initial_delay,
                attempt_count: 0,
            }),
        }
    }

    /// Computes the delay to sleep before the next connection attempt.
    ///
    /// The first call after `new` or `reset` yields the initial delay;
    /// every later call multiplies the previous one, capped at the maximum.
    pub fn next_delay(&self) -> Duration {
        let mut state = self.state.lock();
        let base = if state.attempt_count == 0 {
            self.initial_delay
        } else {
            let grown = state.current_delay.as_secs_f64() * self.multiplier;
            Duration::from_secs_f64(grown).min(self.max_delay)
        };
        state.current_delay = base;
        state.attempt_count += 1;

        if !self.jitter {
            return base;
        }

        // Full jitter: uniform over [0, base), floored so a tiny draw does
        // not turn the retry loop into a busy spin.
        let base_nanos = base.as_nanos().max(1) as u64;
        let drawn = rand::thread_rng().gen_range(0..base_nanos);
        Duration::from_nanos(drawn).max(JITTER_FLOOR).min(base.max(JITTER_FLOOR))
    }

    /// Returns the policy to its initial state. Called on every successful
    /// connection and reconnection.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.current_delay = self.initial_delay;
        state.attempt_count = 0;
    }

    /// Number of `next_delay` calls since the last reset.
    pub fn attempt_count(&self) -> u32 {
        self.state.lock().attempt_count
    }
}
