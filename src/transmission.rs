//! Exposure of hosts to infectious bites.
//!
//! The transmission model is an outside collaborator: the host only needs the entomological
//! inoculation rate (EIR) it experiences and the expected number of infections that rate causes.
//! [`NonVectorTransmission`] drives hosts with a forced EIR from a daily table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::age_table::AgeTable;
use crate::core::time::{Clock, Step};
use crate::errors::{Result, SimulationError};

/// Transmission state carried by each host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct HostExposure {
    availability: f64,
    cumulative_eir_a: f64,
    p_infected: f64,
}

impl HostExposure {
    pub fn new(availability: f64) -> Self {
        Self {
            availability,
            cumulative_eir_a: 0.0,
            p_infected: 0.0,
        }
    }

    /// Relative availability to mosquitoes, fixed at birth.
    pub fn availability(&self) -> f64 {
        self.availability
    }

    /// EIR experienced over the host's life.
    pub fn cumulative_eir_a(&self) -> f64 {
        self.cumulative_eir_a
    }

    /// Probability of having been infected, accumulated over the host's life.
    pub fn p_infected(&self) -> f64 {
        self.p_infected
    }

    /// Expose the host for one step and return the expected number of new infections, reduced
    /// by pre-erythrocytic vaccine efficacy.
    pub fn expose(
        &mut self,
        model: &dyn TransmissionModel,
        now: Step,
        age_years: f64,
        pev_efficacy: f64,
    ) -> Result<f64> {
        let eir = model.eir(now, age_years, self);
        if !eir.is_finite() {
            return Err(SimulationError::ConfigurationError(format!(
                "EIR at step {now} is not finite: {eir}"
            )));
        }
        let expected = model.expected_infections(self, eir) * (1.0 - pev_efficacy);
        if expected.is_nan() {
            return Err(SimulationError::ConfigurationError(format!(
                "expected infections at step {now} is NaN"
            )));
        }
        self.cumulative_eir_a += eir;
        self.p_infected = (1.0 - (-expected).exp() * (1.0 - self.p_infected)).clamp(0.0, 1.0);
        Ok(expected)
    }
}

pub trait TransmissionModel: Send + Sync + fmt::Debug {
    /// EIR a host receives during the step starting at `now`.
    fn eir(&self, now: Step, age_years: f64, exposure: &HostExposure) -> f64;

    /// Expected infections caused by `eir` given the host's exposure history.
    fn expected_infections(&self, exposure: &HostExposure, eir: f64) -> f64;

    /// Availability to mosquitoes of a host of this age relative to an adult.
    fn relative_availability(&self, age_years: f64) -> f64;

    /// Population infectiousness at the end of a step.
    fn observe_infectiousness(&mut self, _now: Step, _kappa: f64) {}
}

fn default_neg_log_one_minus_s_inf() -> f64 {
    0.050736
}

fn default_e_star() -> f64 {
    0.032
}

fn default_s_imm() -> f64 {
    0.138161
}

fn default_x_star_p() -> f64 {
    1514.385
}

fn default_gamma_p() -> f64 {
    2.03692
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NonVectorParameters {
    /// Inoculations per person per day; at least one year, cycled afterwards.
    pub eir_daily: Vec<f64>,
    /// Availability by age relative to adults; constant when omitted.
    #[serde(default)]
    pub relative_availability: Option<AgeTable>,
    /// Scales availability by the host heterogeneity factor.
    #[serde(default)]
    pub heterogeneous_availability: bool,
    #[serde(default = "default_neg_log_one_minus_s_inf")]
    pub neg_log_one_minus_s_inf: f64,
    #[serde(default = "default_e_star")]
    pub e_star: f64,
    #[serde(default = "default_s_imm")]
    pub s_imm: f64,
    #[serde(default = "default_x_star_p")]
    pub x_star_p: f64,
    #[serde(default = "default_gamma_p")]
    pub gamma_p: f64,
}

/// Smallest EIR of a step as a fraction of the mean daily EIR.
const MIN_EIR_MULTIPLIER: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct NonVectorTransmission {
    clock: Clock,
    eir_per_step: Vec<f64>,
    annual_eir: f64,
    relative_availability: AgeTable,
    heterogeneous: bool,
    s_inf: f64,
    e_star_inv: f64,
    s_imm: f64,
    x_star_p_inv: f64,
    gamma_p: f64,
    kappa: f64,
}

impl NonVectorTransmission {
    pub fn new(parameters: &NonVectorParameters, clock: Clock) -> Result<Self> {
        let daily = &parameters.eir_daily;
        if daily.len() < 365 {
            return Err(SimulationError::ConfigurationError(format!(
                "daily EIR covers {} days, a year is needed",
                daily.len()
            )));
        }
        if daily.iter().any(|eir| !(*eir >= 0.0)) {
            return Err(SimulationError::ConfigurationError(
                "daily EIR values must be non-negative".to_string(),
            ));
        }
        let mean = daily.iter().sum::<f64>() / daily.len() as f64;
        let min_eir = MIN_EIR_MULTIPLIER * mean;

        let steps_per_year = clock.steps_per_year().round() as usize;
        let mut eir_per_step = vec![0.0; steps_per_year];
        let mut days = vec![0usize; steps_per_year];
        for (day, eir) in daily.iter().enumerate() {
            let slot = (day / clock.interval() as usize) % steps_per_year;
            eir_per_step[slot] += eir.max(min_eir);
            days[slot] += 1;
        }
        for (eir, count) in eir_per_step.iter_mut().zip(&days) {
            *eir *= clock.interval_days() / *count as f64;
        }
        let annual_eir = eir_per_step.iter().sum();
        log::debug!("forced transmission with annual EIR {annual_eir:.2}");

        Ok(Self {
            clock,
            eir_per_step,
            annual_eir,
            relative_availability: parameters
                .relative_availability
                .clone()
                .unwrap_or_else(|| AgeTable::constant(1.0)),
            heterogeneous: parameters.heterogeneous_availability,
            s_inf: 1.0 - (-parameters.neg_log_one_minus_s_inf).exp(),
            e_star_inv: 1.0 / parameters.e_star,
            s_imm: parameters.s_imm,
            x_star_p_inv: 1.0 / parameters.x_star_p,
            gamma_p: parameters.gamma_p,
            kappa: 0.0,
        })
    }

    pub fn annual_eir(&self) -> f64 {
        self.annual_eir
    }

    /// Latest population infectiousness.
    pub fn kappa(&self) -> f64 {
        self.kappa
    }
}

impl TransmissionModel for NonVectorTransmission {
    fn eir(&self, now: Step, age_years: f64, exposure: &HostExposure) -> f64 {
        let slot = now.0.rem_euclid(self.eir_per_step.len() as i64) as usize;
        self.eir_per_step[slot] * self.relative_availability(age_years) * exposure.availability
    }

    fn expected_infections(&self, exposure: &HostExposure, eir: f64) -> f64 {
        let mut per_day = eir / self.clock.interval_days();
        if self.heterogeneous {
            per_day /= exposure.availability;
        }
        let s1 = self.s_inf + (1.0 - self.s_inf) / (1.0 + per_day * self.e_star_inv);
        let s2 = self.s_imm
            + (1.0 - self.s_imm)
                / (1.0 + (exposure.cumulative_eir_a * self.x_star_p_inv).powf(self.gamma_p));
        s1 * s2 * eir
    }

    fn relative_availability(&self, age_years: f64) -> f64 {
        self.relative_availability.eval(age_years)
    }

    fn observe_infectiousness(&mut self, _now: Step, kappa: f64) {
        self.kappa = kappa;
    }
}
