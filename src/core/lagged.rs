//! Ring buffer of recent total parasite densities.

use serde::{Deserialize, Serialize};

use super::time::{Clock, Step};

/// Holds 20 days of total density history, one slot per step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LaggedDensity {
    slots: Vec<f64>,
    steps_per_five_days: usize,
}

impl LaggedDensity {
    pub fn new(clock: &Clock) -> Self {
        let steps_per_five_days = clock.steps_per_five_days();
        Self {
            slots: vec![0.0; steps_per_five_days * 4],
            steps_per_five_days,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn index(&self, step: i64) -> usize {
        step.rem_euclid(self.slots.len() as i64) as usize
    }

    /// Store the density reached at the end of the previous step.
    pub fn record(&mut self, now: Step, total_density: f64) {
        let index = self.index(now.0);
        self.slots[index] = total_density;
    }

    /// Densities 10, 15 and 20 days before `now`, most recent first.
    pub fn lookback(&self, now: Step) -> [f64; 3] {
        let k = self.steps_per_five_days as i64;
        let first = now.0 - 2 * k + 1;
        [
            self.slots[self.index(first)],
            self.slots[self.index(first - k)],
            self.slots[self.index(first - 2 * k)],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths() {
        assert_eq!(LaggedDensity::new(&Clock::new(5).unwrap()).len(), 4);
        assert_eq!(LaggedDensity::new(&Clock::new(1).unwrap()).len(), 20);
    }

    #[test]
    fn lookback_five_day() {
        let mut lagged = LaggedDensity::new(&Clock::new(5).unwrap());
        for step in 0..10 {
            lagged.record(Step(step), step as f64 * 10.0);
        }
        // slot t holds the density recorded at step t
        assert_eq!(lagged.lookback(Step(10)), [90.0, 80.0, 70.0]);
    }

    #[test]
    fn lookback_daily() {
        let mut lagged = LaggedDensity::new(&Clock::new(1).unwrap());
        for step in 0..40 {
            lagged.record(Step(step), step as f64);
        }
        assert_eq!(lagged.lookback(Step(40)), [31.0, 26.0, 21.0]);
    }

    #[test]
    fn negative_steps_wrap() {
        let lagged = LaggedDensity::new(&Clock::new(5).unwrap());
        assert_eq!(lagged.lookback(Step(0)), [0.0; 3]);
    }
}
