//! Infections, immunity and drugs of one host.
//!
//! The step recurrence runs in a fixed order: record the lagged density, decay immunity,
//! start new infections, apply the day-by-day drug action and finally advance every infection.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::immunity::{ImmunityConstants, ImmunityTracker};
use super::infection::{DensityModel, ImmuneContext, Infection, InfectionParameters};
use super::lagged::LaggedDensity;
use super::time::{Clock, Step};
use crate::errors::Result;
use crate::pkpd::{DrugTable, Medication, PkPdModel};
use crate::random::RandomStream;

/// Concurrent infections a host can carry; further inoculations are dropped.
pub const MAX_INFECTIONS: usize = 21;

/// Expected inoculations below this are treated as none, without a Poisson draw.
pub const MIN_EXPECTED_INFECTIONS: f64 = 1e-7;

/// Scenario-wide collaborators of the within-host update.
#[derive(Clone, Copy)]
pub struct WithinHostModel<'a> {
    pub clock: Clock,
    pub density: &'a dyn DensityModel,
    pub infection: &'a InfectionParameters,
    pub immunity: &'a ImmunityConstants,
    pub drugs: &'a DrugTable,
}

/// Host-specific inputs of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepExposure {
    pub now: Step,
    pub age_years: f64,
    /// Expected inoculations, already reduced by pre-erythrocytic vaccination.
    pub expected_infections: f64,
    /// Chemoprophylaxis prevents new infections this step.
    pub protected: bool,
    pub bsv_efficacy: f64,
    pub body_mass: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WithinHostState {
    infections: Vec<Infection>,
    immunity: ImmunityTracker,
    lagged: LaggedDensity,
    pkpd: PkPdModel,
    innate_survival: f64,
    total_density: f64,
    step_max_density: f64,
}

impl WithinHostState {
    pub fn new(clock: &Clock, innate_survival: f64) -> Self {
        Self {
            infections: Vec::new(),
            immunity: ImmunityTracker::new(),
            lagged: LaggedDensity::new(clock),
            pkpd: PkPdModel::new(),
            innate_survival,
            total_density: 0.0,
            step_max_density: 0.0,
        }
    }

    pub fn infections(&self) -> &[Infection] {
        &self.infections
    }

    pub fn immunity(&self) -> &ImmunityTracker {
        &self.immunity
    }

    pub fn lagged(&self) -> &LaggedDensity {
        &self.lagged
    }

    pub fn pkpd(&self) -> &PkPdModel {
        &self.pkpd
    }

    pub fn innate_survival(&self) -> f64 {
        self.innate_survival
    }

    pub fn total_density(&self) -> f64 {
        self.total_density
    }

    pub fn step_max_density(&self) -> f64 {
        self.step_max_density
    }

    /// Infections whose density exceeds `detection_limit`.
    pub fn patent_infections(&self, detection_limit: f64) -> usize {
        self.infections
            .iter()
            .filter(|infection| infection.density() > detection_limit)
            .count()
    }

    /// Advance the host by one step. Returns the number of new infections.
    pub fn update(
        &mut self,
        model: &WithinHostModel,
        exposure: &StepExposure,
        rng: &mut dyn RandomStream,
    ) -> Result<u32> {
        self.lagged.record(exposure.now, self.total_density);
        self.immunity.decay(model.immunity);

        let immune = ImmuneContext {
            age_years: exposure.age_years,
            cumulative_h: self.immunity.cumulative_h(),
            cumulative_y: self.immunity.cumulative_y(),
        };
        let new_infections = self.inoculate(model, exposure, rng);

        let mut drug_factors = self.drug_factors(model, exposure.body_mass)?;

        let survival = self.innate_survival * (1.0 - exposure.bsv_efficacy);
        let floor = model.infection.density_floor;
        let interval = model.clock.interval_days();
        self.total_density = 0.0;
        self.step_max_density = 0.0;

        let mut index = 0;
        while index < self.infections.len() {
            let infection = &mut self.infections[index];
            let expired = model.density.advance(
                infection,
                exposure.now,
                &immune,
                survival * drug_factors[index],
                rng,
            );
            let cleared = !expired
                && model.density.in_blood_stage(infection, exposure.now)
                && infection.density() < floor;
            if expired || cleared {
                log::trace!(
                    "infection started at {} {} at {}",
                    infection.start(),
                    if expired { "expired" } else { "cleared" },
                    exposure.now
                );
                self.infections.remove(index);
                drug_factors.remove(index);
                continue;
            }
            self.total_density += infection.density();
            self.step_max_density = self.step_max_density.max(infection.step_max_density());
            self.immunity.add_exposure(interval * infection.density());
            index += 1;
        }

        Ok(new_infections)
    }

    fn inoculate(
        &mut self,
        model: &WithinHostModel,
        exposure: &StepExposure,
        rng: &mut dyn RandomStream,
    ) -> u32 {
        if !(exposure.expected_infections > MIN_EXPECTED_INFECTIONS) {
            return 0;
        }
        let drawn = rng.poisson(exposure.expected_infections) as usize;
        if drawn == 0 {
            return 0;
        }
        if exposure.protected {
            log::trace!("{drawn} inoculations prevented by chemoprophylaxis");
            return 0;
        }
        let room = MAX_INFECTIONS - self.infections.len().min(MAX_INFECTIONS);
        if drawn > room {
            log::warn!(
                "{} new infections dropped at {}: host already carries {}",
                drawn - room,
                exposure.now,
                self.infections.len()
            );
        }
        let count = drawn.min(room);
        for _ in 0..count {
            let genotype = model.infection.draw_genotype(rng);
            let infection = model.density.start(exposure.now, genotype, rng);
            self.infections.push(infection);
        }
        self.immunity.add_infections(count as u32);
        count as u32
    }

    /// Release medications and accumulate the drug survival factor of each infection over the
    /// days of the step.
    fn drug_factors(
        &mut self,
        model: &WithinHostModel,
        body_mass: f64,
    ) -> Result<SmallVec<[f64; MAX_INFECTIONS]>> {
        let mut factors: SmallVec<[f64; MAX_INFECTIONS]> =
            SmallVec::from_elem(1.0, self.infections.len());
        if self.pkpd.is_empty() {
            return Ok(factors);
        }
        for _ in 0..model.clock.interval() {
            self.pkpd.medicate(model.drugs, body_mass)?;
            for (factor, infection) in factors.iter_mut().zip(&self.infections) {
                *factor *= self.pkpd.drug_factor(model.drugs, infection.genotype());
            }
            self.pkpd.decay(model.drugs);
        }
        Ok(factors)
    }

    pub fn clear_infections(&mut self) {
        self.infections.clear();
    }

    pub fn prescribe(&mut self, medications: impl IntoIterator<Item = Medication>) {
        self.pkpd.prescribe(medications);
    }

    /// Blunt the density exposure gained this step after a clinical episode.
    pub fn penalise_immunity(&mut self, constants: &ImmunityConstants) {
        self.immunity.penalise(constants.penalty);
    }
}
