//! Vaccine efficacy carried by a host.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::time::Clock;

#[derive(Serialize, Deserialize, Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaccineKind {
    #[serde(rename = "pev")]
    #[display("pev")]
    PreErythrocytic,
    #[serde(rename = "bsv")]
    #[display("bsv")]
    BloodStage,
    #[serde(rename = "tbv")]
    #[display("tbv")]
    TransmissionBlocking,
}

/// Efficacy profile of one vaccine type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VaccineDescriptor {
    /// Mean efficacy directly after each dose; the last entry applies to all later doses.
    pub initial_mean_efficacy: Vec<f64>,
    pub half_life_years: f64,
}

impl VaccineDescriptor {
    pub fn decay_per_step(&self, clock: &Clock) -> f64 {
        (-std::f64::consts::LN_2 / (self.half_life_years * clock.steps_per_year())).exp()
    }

    fn efficacy_after_dose(&self, doses_given: u32) -> f64 {
        match self.initial_mean_efficacy.len() {
            0 => 0.0,
            n => self.initial_mean_efficacy[(doses_given as usize).min(n - 1)].clamp(0.0, 1.0),
        }
    }
}

/// Routine (EPI) dose given to hosts reaching the target age.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EpiDose {
    pub target_age_days: f64,
    pub coverage: f64,
}

/// Vaccine types deployed in a scenario.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct VaccineDescriptors {
    #[serde(default)]
    pub pev: Option<VaccineDescriptor>,
    #[serde(default)]
    pub bsv: Option<VaccineDescriptor>,
    #[serde(default)]
    pub tbv: Option<VaccineDescriptor>,
    /// Routine schedule; each dose vaccinates with every deployed type.
    #[serde(default)]
    pub epi: Vec<EpiDose>,
}

impl VaccineDescriptors {
    pub fn get(&self, kind: VaccineKind) -> Option<&VaccineDescriptor> {
        match kind {
            VaccineKind::PreErythrocytic => self.pev.as_ref(),
            VaccineKind::BloodStage => self.bsv.as_ref(),
            VaccineKind::TransmissionBlocking => self.tbv.as_ref(),
        }
    }

    pub fn deployed(&self) -> impl Iterator<Item = VaccineKind> + '_ {
        [
            VaccineKind::PreErythrocytic,
            VaccineKind::BloodStage,
            VaccineKind::TransmissionBlocking,
        ]
        .into_iter()
        .filter(|kind| self.get(*kind).is_some())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct VaccineEfficacy {
    efficacy: f64,
    doses: u32,
}

impl VaccineEfficacy {
    pub fn efficacy(&self) -> f64 {
        self.efficacy
    }

    pub fn doses(&self) -> u32 {
        self.doses
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct VaccineState {
    pev: VaccineEfficacy,
    bsv: VaccineEfficacy,
    tbv: VaccineEfficacy,
}

impl VaccineState {
    fn slot(&mut self, kind: VaccineKind) -> &mut VaccineEfficacy {
        match kind {
            VaccineKind::PreErythrocytic => &mut self.pev,
            VaccineKind::BloodStage => &mut self.bsv,
            VaccineKind::TransmissionBlocking => &mut self.tbv,
        }
    }

    pub fn get(&self, kind: VaccineKind) -> &VaccineEfficacy {
        match kind {
            VaccineKind::PreErythrocytic => &self.pev,
            VaccineKind::BloodStage => &self.bsv,
            VaccineKind::TransmissionBlocking => &self.tbv,
        }
    }

    pub fn efficacy(&self, kind: VaccineKind) -> f64 {
        self.get(kind).efficacy
    }

    pub fn vaccinate(&mut self, kind: VaccineKind, descriptor: &VaccineDescriptor) {
        let slot = self.slot(kind);
        slot.efficacy = descriptor.efficacy_after_dose(slot.doses);
        slot.doses += 1;
    }

    /// Give one dose of every deployed vaccine type.
    pub fn vaccinate_all(&mut self, descriptors: &VaccineDescriptors) {
        for kind in descriptors.deployed() {
            if let Some(descriptor) = descriptors.get(kind) {
                self.vaccinate(kind, descriptor);
            }
        }
    }

    /// Geometric decay of every vaccine that has been given at least once.
    pub fn decay(&mut self, descriptors: &VaccineDescriptors, clock: &Clock) {
        for kind in descriptors.deployed() {
            if let Some(descriptor) = descriptors.get(kind) {
                let slot = self.slot(kind);
                if slot.doses > 0 {
                    slot.efficacy *= descriptor.decay_per_step(clock);
                }
            }
        }
    }
}
