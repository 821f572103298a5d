//! Blood-stage infections and their density trajectories.
//!
//! The trajectory of a single infection is delegated to a [`DensityModel`]. The within-host
//! state only decides which infections exist and which survival factors apply to them.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;
use std::fmt;
use std::fs::File;
use std::io::BufReader;

use super::immunity::ImmunityConstants;
use super::time::{Clock, Step};
use crate::errors::{Result, SimulationError};
use crate::random::RandomStream;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InfectionParameters {
    /// Table of mean log densities (csv with columns `i, j, meanlogdens`).
    #[serde(default)]
    pub densities: Option<String>,

    /// Days from inoculation until parasites appear in the blood.
    #[serde(default = "default_latent_period")]
    pub latent_period_days: f64,

    /// Mean and standard deviation of the log infection duration in days.
    #[serde(default = "default_duration")]
    pub duration_log_normal: (f64, f64),

    /// Variance of the log density perturbation in a naive host.
    pub sigma0_sq: f64,

    /// Critical infection count reducing the density variance.
    pub x_nu_star: f64,

    /// Upper bound on the density of a single infection.
    #[serde(default = "default_max_density")]
    pub max_density: f64,

    /// Blood-stage infections below this density are cleared.
    #[serde(default = "default_density_floor")]
    pub density_floor: f64,

    /// Density above which an infection counts as patent.
    #[serde(default = "default_detection_limit")]
    pub detection_limit: f64,

    /// Relative frequency of each parasite genotype among new infections.
    #[serde(default = "default_genotype_frequencies")]
    pub genotype_frequencies: Vec<f64>,
}

fn default_latent_period() -> f64 {
    15.0
}

fn default_duration() -> (f64, f64) {
    (5.13, 0.8)
}

fn default_max_density() -> f64 {
    2e6
}

fn default_density_floor() -> f64 {
    1e-3
}

fn default_detection_limit() -> f64 {
    40.0
}

fn default_genotype_frequencies() -> Vec<f64> {
    vec![1.0]
}

impl InfectionParameters {
    /// Draw the genotype of a new infection. Only consumes a draw with several genotypes.
    pub fn draw_genotype(&self, rng: &mut dyn RandomStream) -> u32 {
        if self.genotype_frequencies.len() <= 1 {
            return 0;
        }
        let total: f64 = self.genotype_frequencies.iter().sum();
        let mut target = rng.uniform01() * total;
        for (genotype, frequency) in self.genotype_frequencies.iter().enumerate() {
            if target < *frequency {
                return genotype as u32;
            }
            target -= frequency;
        }
        (self.genotype_frequencies.len() - 1) as u32
    }
}

/// One blood-stage parasite clone.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Infection {
    start: Step,
    duration: Step,
    genotype: u32,
    density: f64,
    step_max_density: f64,
    exposure_j: f64,
}

impl Infection {
    pub fn new(start: Step, duration: Step, genotype: u32) -> Self {
        Self {
            start,
            duration,
            genotype,
            density: 0.0,
            step_max_density: 0.0,
            exposure_j: 0.0,
        }
    }

    pub fn start(&self) -> Step {
        self.start
    }

    pub fn duration(&self) -> Step {
        self.duration
    }

    pub fn end(&self) -> Step {
        self.start + self.duration
    }

    pub fn genotype(&self) -> u32 {
        self.genotype
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn step_max_density(&self) -> f64 {
        self.step_max_density
    }

    pub fn exposure_j(&self) -> f64 {
        self.exposure_j
    }

    pub fn set_density(&mut self, density: f64, step_max_density: f64) {
        self.density = density;
        self.step_max_density = step_max_density;
    }

    pub fn add_exposure(&mut self, density_days: f64) {
        self.exposure_j += density_days;
    }
}

/// Immunity of the host as seen by its infections during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImmuneContext {
    pub age_years: f64,
    pub cumulative_h: f64,
    pub cumulative_y: f64,
}

pub trait DensityModel: Send + Sync + fmt::Debug {
    /// Create an infection inoculated at `now`.
    fn start(&self, now: Step, genotype: u32, rng: &mut dyn RandomStream) -> Infection;

    /// Whether the infection has passed its latent period at `now`.
    fn in_blood_stage(&self, infection: &Infection, now: Step) -> bool;

    /// Advance one infection by one step. `survival` multiplies the resulting density.
    ///
    /// Returns `true` once the infection has run its course and should be removed.
    fn advance(
        &self,
        infection: &mut Infection,
        now: Step,
        immune: &ImmuneContext,
        survival: f64,
        rng: &mut dyn RandomStream,
    ) -> bool;
}

/// Read a table of mean log densities indexed by infection age and duration (both 1-based).
pub fn read_density_table(filename: &str) -> Result<Array2<f64>> {
    let mut reader = BufReader::new(File::open(filename)?);
    density_table_from_reader(&mut reader)
}

pub fn density_table_from_reader(reader: &mut dyn std::io::Read) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let rows: Vec<(usize, usize, f64)> = reader
        .deserialize()
        .collect::<std::result::Result<Vec<(usize, usize, f64)>, csv::Error>>()?;

    let size = rows
        .iter()
        .map(|(i, j, _)| *i.max(j))
        .max()
        .ok_or_else(|| SimulationError::ConfigurationError("empty density table".to_string()))?;
    if rows.iter().any(|(i, j, _)| *i == 0 || *j == 0) {
        return Err(SimulationError::ConfigurationError(
            "density table indices start at 1".to_string(),
        ));
    }

    let mut table = Array2::zeros((size, size));
    for (i, j, mean_log_density) in rows {
        table[[i - 1, j - 1]] = mean_log_density;
    }
    Ok(table)
}

/// Empirical description of single infections in naive hosts, on 5-day steps.
///
/// Densities follow a table of mean log densities by infection age and total duration,
/// scaled down by acquired immunity and perturbed log-normally.
#[derive(Debug, Clone)]
pub struct DescriptiveModel {
    mean_log_density: Array2<f64>,
    clock: Clock,
    latent_period: Step,
    duration_log_normal: (f64, f64),
    sigma0_sq: f64,
    x_nu_star: f64,
    max_density: f64,
    immunity: ImmunityConstants,
}

impl DescriptiveModel {
    pub fn new(
        parameters: &InfectionParameters,
        mean_log_density: Array2<f64>,
        clock: Clock,
        immunity: ImmunityConstants,
    ) -> Result<Self> {
        if clock.interval() != 5 {
            return Err(SimulationError::ConfigurationError(
                "the descriptive infection model requires 5-day steps".to_string(),
            ));
        }
        if mean_log_density.is_empty() {
            return Err(SimulationError::ConfigurationError(
                "empty density table".to_string(),
            ));
        }
        Ok(Self {
            mean_log_density,
            clock,
            latent_period: clock.from_days(parameters.latent_period_days),
            duration_log_normal: parameters.duration_log_normal,
            sigma0_sq: parameters.sigma0_sq,
            x_nu_star: parameters.x_nu_star,
            max_density: parameters.max_density,
            immunity,
        })
    }

    fn expected_density(&self, infection: &Infection, age: Step, immune: &ImmuneContext) -> f64 {
        let (rows, cols) = self.mean_log_density.dim();
        let i = (age.0 as usize).min(rows - 1);
        let j = (infection.duration.0.max(0) as usize).min(cols - 1);
        let density = self.mean_log_density[[i, j]].exp().max(1.0);
        density.powf(self.immunity.survival_factor(
            immune.age_years,
            immune.cumulative_h,
            immune.cumulative_y,
            infection.exposure_j,
        ))
    }
}

/// Quantile `p` of a log-normal distribution.
fn log_normal_quantile(p: f64, mean_log: f64, sd_log: f64) -> f64 {
    let z = std::f64::consts::SQRT_2 * erf_inv(2.0 * p - 1.0);
    (mean_log + sd_log * z).exp()
}

impl DensityModel for DescriptiveModel {
    fn start(&self, now: Step, genotype: u32, rng: &mut dyn RandomStream) -> Infection {
        let (mean_log, sd_log) = self.duration_log_normal;
        let days = rng.log_normal(mean_log, sd_log);
        let duration = self.clock.from_days(1.0 + days) - Step(1);
        Infection::new(now, duration, genotype)
    }

    fn in_blood_stage(&self, infection: &Infection, now: Step) -> bool {
        now - infection.start >= self.latent_period
    }

    fn advance(
        &self,
        infection: &mut Infection,
        now: Step,
        immune: &ImmuneContext,
        survival: f64,
        rng: &mut dyn RandomStream,
    ) -> bool {
        if now > infection.end() {
            return true;
        }

        let age = now - infection.start - self.latent_period;
        let (mut density, mut step_max) = (0.0, 0.0);
        if age >= Step(0) {
            density = self.expected_density(infection, age, immune);
            step_max = density;

            let var_log = self.sigma0_sq / (1.0 + immune.cumulative_h / self.x_nu_star);
            let sd_log = var_log.sqrt();
            let mean_log = density.ln() - sd_log * sd_log / 2.0;
            if sd_log > 1e-7 {
                density = rng.log_normal(mean_log, sd_log);
                step_max = 0.0;
                let interval = self.clock.interval();
                if interval > 1 {
                    // maximum of the remaining days of the step, drawn from its quantile
                    let p = rng.uniform01().powf(1.0 / (interval - 1) as f64);
                    step_max = log_normal_quantile(p, mean_log, sd_log);
                }
                step_max = step_max.max(density);
            }
            if step_max > self.max_density {
                log::debug!("step maximum density {step_max} capped at {}", self.max_density);
            }
            density = density.min(self.max_density);
            step_max = step_max.min(self.max_density);
        }

        infection.set_density(density * survival, step_max * survival);
        infection.add_exposure(self.clock.interval_days() * infection.density);
        false
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::immunity::ImmunityParameters;
    use crate::random::{ScriptedStream, SeededStream};

    pub(crate) fn immunity_parameters() -> ImmunityParameters {
        ImmunityParameters {
            immune_effector_decay: 0.0,
            asexual_immunity_decay: 0.0,
            immunity_penalty: 1.0,
            cumulative_h_star: 71.676733,
            cumulative_y_star: 68564384.7102,
            alpha_m: 2.411434,
            decay_m: 2.717773,
            sigma_i_sq: 10.2,
        }
    }

    pub(crate) fn infection_parameters() -> InfectionParameters {
        InfectionParameters {
            densities: None,
            latent_period_days: 15.0,
            duration_log_normal: default_duration(),
            sigma0_sq: 0.66,
            x_nu_star: 0.92,
            max_density: 2e6,
            density_floor: 1e-3,
            detection_limit: 40.0,
            genotype_frequencies: vec![1.0],
        }
    }

    /// Densities peak early and fade over roughly a year of 5-day steps.
    pub(crate) fn density_table() -> Array2<f64> {
        Array2::from_shape_fn((84, 84), |(i, j)| {
            if i > j {
                0.0
            } else {
                (10.0 - 0.1 * i as f64).max(1.0)
            }
        })
    }

    pub(crate) fn model() -> DescriptiveModel {
        let clock = Clock::new(5).unwrap();
        DescriptiveModel::new(
            &infection_parameters(),
            density_table(),
            clock,
            ImmunityConstants::from(&immunity_parameters()),
        )
        .unwrap()
    }

    fn naive() -> ImmuneContext {
        ImmuneContext {
            age_years: 20.0,
            cumulative_h: 0.0,
            cumulative_y: 0.0,
        }
    }

    #[test]
    fn read_table() {
        let content = "i,j,meanlogdens\n1,1,2.5\n1,2,3.0\n2,2,4.0\n";
        let table = density_table_from_reader(&mut content.as_bytes()).unwrap();
        assert_eq!(table.dim(), (2, 2));
        assert_eq!(table[[0, 1]], 3.0);
        assert_eq!(table[[1, 0]], 0.0);
        assert_eq!(table[[1, 1]], 4.0);

        assert!(density_table_from_reader(&mut "i,j,meanlogdens\n".as_bytes()).is_err());
        assert!(density_table_from_reader(&mut "i,j,meanlogdens\n0,1,1.0\n".as_bytes()).is_err());
    }

    #[test]
    fn requires_five_day_steps() {
        let result = DescriptiveModel::new(
            &infection_parameters(),
            density_table(),
            Clock::new(1).unwrap(),
            ImmunityConstants::from(&immunity_parameters()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn duration_from_log_normal() {
        let model = model();
        // 97 days => floor(98 / 5) - 1 = 18 steps
        let mut rng = ScriptedStream::default().with_gaussians(&[97f64.ln()]);
        let infection = model.start(Step(7), 0, &mut rng);
        assert_eq!(infection.start(), Step(7));
        assert_eq!(infection.duration(), Step(18));
        assert_eq!(infection.end(), Step(25));
    }

    #[test]
    fn duration_rounds_down_at_step_boundary() {
        let model = model();
        // 99 days lands exactly on a step boundary: just below stays in the shorter bucket
        let mut rng =
            ScriptedStream::default().with_gaussians(&[(99.0 - 1e-9f64).ln(), (99.0 + 1e-9f64).ln()]);
        assert_eq!(model.start(Step(0), 0, &mut rng).duration(), Step(18));
        assert_eq!(model.start(Step(0), 0, &mut rng).duration(), Step(19));
    }

    #[test]
    fn latent_period_has_no_density() {
        let model = model();
        let mut infection = Infection::new(Step(0), Step(40), 0);
        let mut rng = ScriptedStream::default();
        for now in 0..3 {
            assert!(!model.in_blood_stage(&infection, Step(now)));
            let expired = model.advance(&mut infection, Step(now), &naive(), 1.0, &mut rng);
            assert!(!expired);
            assert_eq!(infection.density(), 0.0);
        }
        assert!(model.in_blood_stage(&infection, Step(3)));
    }

    #[test]
    fn blood_stage_density() {
        let model = model();
        let mut infection = Infection::new(Step(0), Step(40), 0);
        let mut rng = SeededStream::new(3);
        let expired = model.advance(&mut infection, Step(3), &naive(), 0.5, &mut rng);
        assert!(!expired);
        assert!(infection.density() > 0.0);
        assert!(infection.step_max_density() >= infection.density());
        assert!(infection.density() <= 0.5 * 2e6);
        assert_eq!(infection.exposure_j(), 5.0 * infection.density());
    }

    #[test]
    fn expires_after_duration() {
        let model = model();
        let mut infection = Infection::new(Step(0), Step(10), 0);
        let mut rng = SeededStream::new(3);
        assert!(!model.advance(&mut infection, Step(10), &naive(), 1.0, &mut rng));
        assert!(model.advance(&mut infection, Step(11), &naive(), 1.0, &mut rng));
    }

    #[test]
    fn genotype_draws() {
        let mut parameters = infection_parameters();
        let mut rng = ScriptedStream::default();
        assert_eq!(parameters.draw_genotype(&mut rng), 0);

        parameters.genotype_frequencies = vec![0.25, 0.75];
        let mut rng = ScriptedStream::uniforms(&[0.1, 0.3, 0.99]);
        assert_eq!(parameters.draw_genotype(&mut rng), 0);
        assert_eq!(parameters.draw_genotype(&mut rng), 1);
        assert_eq!(parameters.draw_genotype(&mut rng), 1);
    }

    #[test]
    fn quantile_matches_median() {
        assert!((log_normal_quantile(0.5, 2.0, 0.7) - 2f64.exp()).abs() < 1e-9);
    }
}
