//! Discrete simulation time.

use derive_more::{Add, AddAssign, Display, From, Sub, SubAssign};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SimulationError};

/// A point or span of simulated time, counted in whole steps.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Add,
    Sub,
    AddAssign,
    SubAssign,
    From,
    Display,
)]
#[serde(transparent)]
pub struct Step(pub i64);

/// Length of a step in days and the conversions that depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    interval: u32,
}

impl Clock {
    /// Only 1-day and 5-day steps are supported: the lag buffer samples every 5 days.
    pub fn new(interval: u32) -> Result<Self> {
        match interval {
            1 | 5 => Ok(Self { interval }),
            _ => Err(SimulationError::ConfigurationError(format!(
                "step length of {interval} days is not supported (use 1 or 5)"
            ))),
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn interval_days(&self) -> f64 {
        self.interval as f64
    }

    pub fn steps_per_five_days(&self) -> usize {
        (5 / self.interval) as usize
    }

    pub fn steps_per_year(&self) -> f64 {
        365.0 / self.interval as f64
    }

    pub fn years_per_interval(&self) -> f64 {
        self.interval as f64 / 365.0
    }

    pub fn days(&self, steps: Step) -> f64 {
        steps.0 as f64 * self.interval as f64
    }

    pub fn years(&self, steps: Step) -> f64 {
        self.days(steps) / 365.0
    }

    /// Whole steps contained in `days`, rounding down.
    pub fn from_days(&self, days: f64) -> Step {
        Step((days / self.interval as f64).floor() as i64)
    }

    pub fn from_days_nearest(&self, days: f64) -> Step {
        Step((days / self.interval as f64).round() as i64)
    }

    pub fn from_years(&self, years: f64) -> Step {
        self.from_days(years * 365.0)
    }
}
