//! Random draws consumed by the per-host update.
//!
//! The order of draws within one host step is observable: changing it changes trajectories.
//! Every draw therefore goes through a [`RandomStream`] owned by exactly one host.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

pub trait RandomStream {
    /// Uniform draw from `[0, 1)`.
    fn uniform01(&mut self) -> f64;

    /// Poisson draw. A non-positive mean yields zero.
    fn poisson(&mut self, mean: f64) -> u32;

    /// Gaussian draw. A zero standard deviation yields the mean.
    fn gaussian(&mut self, mean: f64, sd: f64) -> f64;

    fn log_normal(&mut self, mean_log: f64, sd_log: f64) -> f64 {
        self.gaussian(mean_log, sd_log).exp()
    }
}

const CREATION_SALT: u64 = 0xA076_1D64_78BD_642F;

/// Deterministic stream backed by `StdRng`.
#[derive(Clone, Debug)]
pub struct SeededStream {
    rng: StdRng,
}

impl SeededStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Stream for one host during one step.
    ///
    /// Depends only on the run seed, the host id and the step, so hosts can be updated in any
    /// order (or concurrently) and a resumed run draws the same numbers as an unbroken one.
    pub fn for_host_step(seed: u64, host_id: u64, step: i64) -> Self {
        let mixed = seed
            ^ host_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (step as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        Self::new(mixed)
    }

    /// Stream for creating a host born at `birth`; never one of its step streams.
    pub fn for_host_creation(seed: u64, host_id: u64, birth: i64) -> Self {
        Self::for_host_step(seed ^ CREATION_SALT, host_id, birth)
    }
}

impl RandomStream for SeededStream {
    fn uniform01(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn poisson(&mut self, mean: f64) -> u32 {
        match Poisson::new(mean) {
            Ok(distribution) => distribution.sample(&mut self.rng) as u32,
            Err(_) => 0,
        }
    }

    fn gaussian(&mut self, mean: f64, sd: f64) -> f64 {
        if sd <= 0.0 {
            return mean;
        }
        match Normal::new(mean, sd) {
            Ok(distribution) => distribution.sample(&mut self.rng),
            Err(_) => mean,
        }
    }
}

/// Stream replaying prepared values, used to pin decision paths in tests.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct ScriptedStream {
    uniforms: std::collections::VecDeque<f64>,
    poissons: std::collections::VecDeque<u32>,
    gaussians: std::collections::VecDeque<f64>,
}

#[cfg(test)]
impl ScriptedStream {
    pub fn uniforms(values: &[f64]) -> Self {
        Self {
            uniforms: values.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_poissons(mut self, values: &[u32]) -> Self {
        self.poissons = values.iter().copied().collect();
        self
    }

    pub fn with_gaussians(mut self, values: &[f64]) -> Self {
        self.gaussians = values.iter().copied().collect();
        self
    }

    pub fn remaining_uniforms(&self) -> usize {
        self.uniforms.len()
    }
}

#[cfg(test)]
impl RandomStream for ScriptedStream {
    fn uniform01(&mut self) -> f64 {
        self.uniforms
            .pop_front()
            .expect("uniform draw was not scripted")
    }

    fn poisson(&mut self, _mean: f64) -> u32 {
        self.poissons.pop_front().unwrap_or(0)
    }

    fn gaussian(&mut self, mean: f64, _sd: f64) -> f64 {
        self.gaussians.pop_front().unwrap_or(mean)
    }
}
