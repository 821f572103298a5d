//! The clinical decision for one host and one step.
//!
//! The engine only decides. Clearing infections, prescribing drugs and penalising immunity are
//! returned as [`ClinicalAction`]s for the host to execute, and everything worth reporting is
//! returned as [`ClinicalEvent`]s. Mortality and treatment history live in [`ClinicalState`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::case_management::{CaseManagement, Regimen, TreatmentOptions};
use super::outcome::{DeathCause, Diagnosis, Doom, EpisodeRecord, LatestEpisode, Outcome};
use super::pathogenesis::{Morbidity, MorbidityInput, MorbidityModel, PathogenesisState};
use crate::core::time::{Clock, Step};
use crate::errors::{Result, SimulationError};
use crate::pkpd::Medication;
use crate::random::RandomStream;

/// Days after the triggering event at which an indirect death happens.
pub const INDIRECT_DEATH_DELAY_DAYS: i32 = 35;

const PROBABILITY_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicalOptions {
    /// Treatment prescribes drugs instead of clearing infections.
    #[serde(default)]
    pub pkpd: bool,
    /// Malaria episodes blunt recently gained density exposure.
    #[serde(default)]
    pub penalise_episodes: bool,
    /// Severe outcome probabilities not summing to one abort the run.
    #[serde(default = "default_true")]
    pub strict_probability_sums: bool,
    /// Uncomplicated events with indirect risk are still treated.
    #[serde(default = "default_true")]
    pub indirect_mortality_fix: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ClinicalOptions {
    fn default() -> Self {
        Self {
            pkpd: false,
            penalise_episodes: false,
            strict_probability_sums: true,
            indirect_mortality_fix: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClinicalState {
    doom: Doom,
    last_treatment: Option<Step>,
    latest_regimen: Option<Regimen>,
    latest_episode: LatestEpisode,
}

impl ClinicalState {
    pub fn doom(&self) -> Doom {
        self.doom
    }

    pub fn set_doom(&mut self, doom: Doom) {
        self.doom = doom;
    }

    pub fn last_treatment(&self) -> Option<Step> {
        self.last_treatment
    }

    pub fn latest_regimen(&self) -> Option<Regimen> {
        self.latest_regimen
    }

    pub fn latest_episode(&self) -> &LatestEpisode {
        &self.latest_episode
    }

    /// Close the open episode, e.g. when the host leaves the population.
    pub fn flush_episode(&mut self) -> Option<EpisodeRecord> {
        self.latest_episode.flush()
    }

    fn treated(&mut self, now: Step, regimen: Regimen) {
        self.last_treatment = Some(now);
        self.latest_regimen = Some(regimen);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClinicalAction {
    ClearInfections,
    Prescribe(Vec<Medication>),
    PenaliseImmunity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClinicalEvent {
    Outcome {
        diagnosis: Diagnosis,
        outcome: Outcome,
    },
    Treatment(Regimen),
    EpisodeClosed(EpisodeRecord),
    IndirectDeath,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalDecision {
    pub events: SmallVec<[ClinicalEvent; 4]>,
    pub actions: SmallVec<[ClinicalAction; 2]>,
}

/// The host as seen by the clinical decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Patient {
    pub now: Step,
    pub age_years: f64,
    pub treatment_seeking_factor: f64,
    pub morbidity: MorbidityInput,
}

/// Cumulative probabilities of the nine severe-malaria outcomes.
///
/// Bands in order: community death, sequelae and survival; treated but not cured death,
/// sequelae and survival; cured death, sequelae and survival.
pub fn severe_bands(p2: f64, p3: f64, p4: f64, p5: f64, p6: f64, p7: f64) -> [f64; 9] {
    let mut q = [0.0; 9];
    q[0] = (1.0 - p2) * p5;
    q[1] = q[0] + (1.0 - p2) * (1.0 - p5) * p7;
    q[2] = q[1] + (1.0 - p2) * (1.0 - p5) * (1.0 - p7);
    q[3] = q[2] + p2 * (1.0 - p3) * p5;
    q[4] = q[3] + p2 * (1.0 - p3) * (1.0 - p5) * p7;
    q[5] = q[4] + p2 * (1.0 - p3) * (1.0 - p5) * (1.0 - p7);
    q[6] = q[5] + p2 * p3 * p4;
    q[7] = q[6] + p2 * p3 * (1.0 - p4) * p6;
    q[8] = q[7] + p2 * p3 * (1.0 - p4) * (1.0 - p6);
    q
}

const SEVERE_OUTCOMES: [Outcome; 9] = [
    Outcome::DiesNonTreated,
    Outcome::SequelaeNonTreated,
    Outcome::NoChangeNonTreated,
    Outcome::DiesInpatientNotCleared,
    Outcome::SequelaeInpatientNotCleared,
    Outcome::NoChangeInpatient,
    Outcome::DiesInpatientCleared,
    Outcome::SequelaeInpatientCleared,
    Outcome::RecoversInpatient,
];

pub struct ClinicalEngine<'a> {
    pub clock: Clock,
    pub options: &'a ClinicalOptions,
    pub case_management: &'a dyn CaseManagement,
    pub morbidity: &'a dyn MorbidityModel,
}

impl ClinicalEngine<'_> {
    /// Run the clinical update of a living host.
    pub fn update(
        &self,
        state: &mut ClinicalState,
        pathogenesis: &mut PathogenesisState,
        patient: &Patient,
        rng: &mut dyn RandomStream,
    ) -> Result<ClinicalDecision> {
        let mut decision = ClinicalDecision::default();
        let interval = self.clock.interval() as i32;

        if let Doom::Countdown(days) = state.doom {
            let days = days - interval;
            if days <= -INDIRECT_DEATH_DELAY_DAYS {
                state.doom = Doom::Dead(DeathCause::Indirect);
                decision.events.push(ClinicalEvent::IndirectDeath);
                return Ok(decision);
            }
            state.doom = Doom::Countdown(days);
        }

        let event = self
            .morbidity
            .classify(pathogenesis, &patient.morbidity, rng);

        match event.state {
            Morbidity::None => {}
            Morbidity::Severe | Morbidity::Coinfection => {
                self.severe_malaria(state, patient, event.state, rng, &mut decision)?;
            }
            Morbidity::Uncomplicated => {
                if self.options.indirect_mortality_fix || !event.indirect {
                    self.uncomplicated_event(state, patient, event.state, rng, &mut decision)?;
                }
            }
            Morbidity::NonMalariaFever => {
                self.uncomplicated_event(state, patient, event.state, rng, &mut decision)?;
            }
        }

        if event.indirect && state.doom == Doom::NotDoomed {
            state.doom = Doom::Countdown(-interval);
        }

        if self.options.penalise_episodes && event.state.is_malaria() {
            decision.actions.push(ClinicalAction::PenaliseImmunity);
        }

        Ok(decision)
    }

    fn uncomplicated_event(
        &self,
        state: &mut ClinicalState,
        patient: &Patient,
        morbidity: Morbidity,
        rng: &mut dyn RandomStream,
        decision: &mut ClinicalDecision,
    ) -> Result<()> {
        let days_since_treatment = state
            .last_treatment
            .map(|last| self.clock.days(patient.now - last));
        let regimen = self.case_management.next_regimen(days_since_treatment);
        let options = self.case_management.lookup(patient.age_years, regimen)?;

        let outcome = if rng.uniform01() < options.treatment_seeking * patient.treatment_seeking_factor
        {
            state.treated(patient.now, regimen);
            decision.events.push(ClinicalEvent::Treatment(regimen));
            if self.options.pkpd {
                decision
                    .actions
                    .push(ClinicalAction::Prescribe(options.medications.to_vec()));
                Outcome::PkPdDependentOutpatient
            } else {
                let draw = rng.uniform01();
                let p_clear = options.parasite_clearance;
                if p_clear.is_nan() {
                    log::warn!(
                        "parasite clearance for {regimen} at age {:.2} is NaN: clearing",
                        patient.age_years
                    );
                }
                if p_clear > draw || p_clear.is_nan() {
                    decision.actions.push(ClinicalAction::ClearInfections);
                    Outcome::ClearedOutpatient
                } else {
                    Outcome::NoChangeOutpatient
                }
            }
        } else {
            Outcome::NoChangeNonTreated
        };

        self.record(state, patient, morbidity, outcome, decision);
        Ok(())
    }

    fn severe_malaria(
        &self,
        state: &mut ClinicalState,
        patient: &Patient,
        morbidity: Morbidity,
        rng: &mut dyn RandomStream,
        decision: &mut ClinicalDecision,
    ) -> Result<()> {
        let draw = rng.uniform01();
        let options: TreatmentOptions = self
            .case_management
            .lookup(patient.age_years, Regimen::Inpatient)?;

        let p2 = options.treatment_seeking * patient.treatment_seeking_factor;
        let p3 = options.cure_rate;
        let p4 = options.case_fatality;
        let p5 = self.case_management.community_case_fatality(p4);
        let p6 = options.sequelae_treated;
        let p7 = options.sequelae_untreated;
        let q = severe_bands(p2, p3, p4, p5, p6, p7);

        if !(q[8] >= 1.0 - PROBABILITY_SUM_TOLERANCE) {
            if self.options.strict_probability_sums {
                return Err(SimulationError::ProbabilitySum(q[8]));
            }
            log::warn!(
                "severe outcome probabilities at age {:.2} sum to {}",
                patient.age_years,
                q[8]
            );
        }

        let band = match q.iter().position(|cumulative| *cumulative > draw) {
            Some(band) => band,
            None if q[8].is_nan() => {
                return Err(SimulationError::UnresolvedDecision(format!(
                    "severe outcome at age {:.2} with draw {draw}",
                    patient.age_years
                )));
            }
            None => SEVERE_OUTCOMES.len() - 1,
        };
        let outcome = SEVERE_OUTCOMES[band];
        log::trace!("severe band {band} ({outcome}) with draw {draw}");

        if band >= 3 {
            state.treated(patient.now, Regimen::Inpatient);
            decision
                .events
                .push(ClinicalEvent::Treatment(Regimen::Inpatient));
        }
        if band >= 6 {
            if self.options.pkpd {
                decision
                    .actions
                    .push(ClinicalAction::Prescribe(options.medications.to_vec()));
            } else {
                decision.actions.push(ClinicalAction::ClearInfections);
            }
        }
        if outcome.is_death() {
            state.doom = Doom::Dead(DeathCause::Complicated);
        }

        self.record(state, patient, morbidity, outcome, decision);
        Ok(())
    }

    fn record(
        &self,
        state: &mut ClinicalState,
        patient: &Patient,
        morbidity: Morbidity,
        outcome: Outcome,
        decision: &mut ClinicalDecision,
    ) {
        let Some(diagnosis) = morbidity.diagnosis() else {
            return;
        };
        decision
            .events
            .push(ClinicalEvent::Outcome { diagnosis, outcome });
        let memory = self
            .clock
            .from_days(self.case_management.health_system_memory_days());
        if let Some(closed) =
            state
                .latest_episode
                .update(patient.now, memory, patient.age_years, diagnosis, outcome)
        {
            decision.events.push(ClinicalEvent::EpisodeClosed(closed));
        }
    }
}
