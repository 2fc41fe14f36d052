//! Learning cadence and exploration decay

use serde::{Deserialize, Serialize};

use crate::config::EpsilonSettings;

/// Counts recorded steps and fires every `update_every` of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSchedule {
    update_every: usize,
    counter: usize,
}

impl LearningSchedule {
    /// Fire every `update_every` ticks; zero is treated as one
    pub fn new(update_every: usize) -> Self {
        Self {
            update_every: update_every.max(1),
            counter: 0,
        }
    }

    /// Advance by one step; true when the counter wraps to zero
    pub fn tick(&mut self) -> bool {
        self.counter = (self.counter + 1) % self.update_every;
        self.counter == 0
    }

    /// Steps since the last wrap
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Steps per learning pass
    pub fn update_every(&self) -> usize {
        self.update_every
    }
}

/// Multiplicative epsilon decay with a floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    current: f64,
    start: f64,
    end: f64,
    decay: f64,
}

impl EpsilonSchedule {
    /// Start at `start` and decay towards `end`
    pub fn new(start: f64, end: f64, decay: f64) -> Self {
        Self {
            current: start,
            start,
            end,
            decay,
        }
    }

    /// Current exploration rate
    pub fn value(&self) -> f64 {
        self.current
    }

    /// Apply one decay step and return the new value
    pub fn decay(&mut self) -> f64 {
        self.current = (self.current * self.decay).max(self.end);
        self.current
    }

    /// Go back to the starting rate
    pub fn reset(&mut self) {
        self.current = self.start;
    }
}

impl From<&EpsilonSettings> for EpsilonSchedule {
    fn from(settings: &EpsilonSettings) -> Self {
        Self::new(settings.start, settings.end, settings.decay)
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self::from(&EpsilonSettings::default())
    }
}
