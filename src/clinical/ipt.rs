//! Intermittent preventive treatment trial arms.
//!
//! Hosts in an IPT scenario receive sulfadoxine-pyrimethamine (SP) or a placebo at target ages.
//! The arm decides how later clinical treatments interact with those doses.

use serde::{Deserialize, Serialize};

use crate::core::time::{Clock, Step};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(tag = "arm", rename_all = "snake_case")]
pub enum IptArm {
    /// Treatment clears infections and is followed by an SP dose.
    #[default]
    Standard,
    /// Treatment clears infections and adds post-treatment SP prophylaxis.
    SpWithPostTreatmentProphylaxis,
    /// Fevers are treated with quinine: clearance without SP.
    Quinine,
    /// Seasonal deployment. Doses are only given between `first_step` (inclusive) and
    /// `last_step` (exclusive) of the year, counted in steps.
    Seasonal { first_step: u32, last_step: u32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct IptDose {
    pub target_age_days: f64,
    pub coverage: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IptParameters {
    #[serde(flatten)]
    pub arm: IptArm,
    /// Whether the trial doses contain SP; placebo doses only.
    pub active: bool,
    pub doses: Vec<IptDose>,
    /// Days after an SP dose during which new infections are prevented.
    #[serde(default = "default_prophylactic_days")]
    pub prophylactic_days: f64,
}

fn default_prophylactic_days() -> f64 {
    30.0
}

impl IptParameters {
    /// Whether the arm allows dosing at `now`.
    pub fn in_season(&self, now: Step, clock: &Clock) -> bool {
        match self.arm {
            IptArm::Seasonal {
                first_step,
                last_step,
            } => {
                let steps_per_year = clock.steps_per_year().round() as i64;
                let step_of_year = (now.0 - 1).rem_euclid(steps_per_year);
                step_of_year >= first_step as i64 && step_of_year < last_step as i64
            }
            _ => true,
        }
    }
}

/// Trial doses received by a host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct IptState {
    last_dose: Option<Step>,
    last_sp_dose: Option<Step>,
}

impl IptState {
    pub fn last_dose(&self) -> Option<Step> {
        self.last_dose
    }

    pub fn last_sp_dose(&self) -> Option<Step> {
        self.last_sp_dose
    }

    /// Record a trial dose (SP or placebo) given at `now`.
    pub fn dose(&mut self, now: Step, parameters: &IptParameters) {
        self.last_dose = Some(now);
        if parameters.active {
            self.last_sp_dose = Some(now);
        }
    }

    /// Whether SP given recently prevents a new infection at `now`.
    pub fn protects(&self, now: Step, parameters: &IptParameters, clock: &Clock) -> bool {
        self.last_sp_dose
            .is_some_and(|dose| now >= dose && now - dose < clock.from_days(parameters.prophylactic_days))
    }

    /// Bookkeeping of a treatment that clears all infections at `now`.
    ///
    /// Infections are always cleared; only whether SP follows depends on the arm and history.
    pub fn on_clearing_treatment(
        &mut self,
        now: Step,
        severe: bool,
        parameters: &IptParameters,
        clock: &Clock,
    ) {
        let fortnight = clock.from_days_nearest(14.0);
        let within = |dose: Option<Step>| dose.is_some_and(|dose| now - dose <= fortnight);
        if severe || within(self.last_dose) || within(self.last_sp_dose) {
            return;
        }
        match parameters.arm {
            IptArm::Quinine | IptArm::Seasonal { .. } => {}
            IptArm::Standard | IptArm::SpWithPostTreatmentProphylaxis => {
                self.last_sp_dose = Some(now + Step(1));
            }
        }
    }
}
