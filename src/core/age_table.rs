//! Age-dependent values interpolated linearly between tabulated ages.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SimulationError};

/// Points `(age in years, value)` sorted by age. Outside the tabulated range the nearest end
/// value applies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct AgeTable {
    points: Vec<(f64, f64)>,
}

impl AgeTable {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(SimulationError::ConfigurationError(
                "age table without entries".to_string(),
            ));
        }
        if points.windows(2).any(|pair| !(pair[0].0 < pair[1].0)) {
            return Err(SimulationError::ConfigurationError(
                "age table ages must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![(0.0, value)],
        }
    }

    pub fn eval(&self, age_years: f64) -> f64 {
        let index = self.points.partition_point(|(age, _)| *age <= age_years);
        if index == 0 {
            return self.points[0].1;
        }
        if index == self.points.len() {
            return self.points[index - 1].1;
        }
        let (a0, v0) = self.points[index - 1];
        let (a1, v1) = self.points[index];
        v0 + (v1 - v0) * (age_years - a0) / (a1 - a0)
    }
}

impl TryFrom<Vec<(f64, f64)>> for AgeTable {
    type Error = SimulationError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<AgeTable> for Vec<(f64, f64)> {
    fn from(table: AgeTable) -> Self {
        table.points
    }
}
