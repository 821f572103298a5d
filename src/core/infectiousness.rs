//! Probability that a mosquito biting the host becomes infected.

use statrs::function::erf::erf;

use super::lagged::LaggedDensity;
use super::time::{Clock, Step};

/// Regression weights of the densities 10, 15 and 20 days back.
pub const LAG_WEIGHTS: [f64; 3] = [1.0, 0.46, 0.17];
pub const MU: f64 = -8.1;
pub const TAU: f64 = 0.066;
/// Below this weighted density the host is not infectious.
pub const MIN_WEIGHTED_DENSITY: f64 = 0.001;
/// Days of history (host age and simulated time) needed before the lag buffer is read.
pub const MIN_HISTORY_DAYS: f64 = 20.0;

fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Probit transform of the weighted lagged density.
pub fn transmission_probability(weighted_density: f64) -> f64 {
    if weighted_density < MIN_WEIGHTED_DENSITY {
        return 0.0;
    }
    let z = (weighted_density.ln() + MU) / (1.0 / TAU).sqrt();
    let p = standard_normal_cdf(z);
    (p * p).clamp(0.0, 1.0)
}

pub fn weighted_density(lookback: [f64; 3]) -> f64 {
    LAG_WEIGHTS
        .iter()
        .zip(lookback.iter())
        .map(|(weight, density)| weight * density)
        .sum()
}

/// Infectiousness of a host at `now`, reduced by transmission-blocking vaccination.
pub fn infectiousness(
    lagged: &LaggedDensity,
    clock: &Clock,
    now: Step,
    age: Step,
    tbv_efficacy: f64,
) -> f64 {
    if clock.days(age) <= MIN_HISTORY_DAYS || clock.days(now) <= MIN_HISTORY_DAYS {
        return 0.0;
    }
    transmission_probability(weighted_density(lagged.lookback(now))) * (1.0 - tbv_efficacy)
}
