//! Clinical outcome tags and the episode record.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::time::Step;

/// What made the host sick during a step.
#[derive(
    Serialize, Deserialize, Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Diagnosis {
    #[display("non_malaria_fever")]
    NonMalariaFever,
    #[display("uncomplicated")]
    Uncomplicated,
    #[display("severe")]
    Severe,
    #[display("coinfection")]
    Coinfection,
}

impl Diagnosis {
    pub fn is_malaria(&self) -> bool {
        !matches!(self, Diagnosis::NonMalariaFever)
    }

    pub fn is_severe(&self) -> bool {
        matches!(self, Diagnosis::Severe | Diagnosis::Coinfection)
    }
}

/// Result of one clinical event.
#[derive(Serialize, Deserialize, Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    #[display("no_change_non_treated")]
    NoChangeNonTreated,
    #[display("no_change_outpatient")]
    NoChangeOutpatient,
    #[display("cleared_outpatient")]
    ClearedOutpatient,
    #[display("pkpd_dependent_outpatient")]
    PkPdDependentOutpatient,
    #[display("dies_non_treated")]
    DiesNonTreated,
    #[display("sequelae_non_treated")]
    SequelaeNonTreated,
    #[display("dies_inpatient_not_cleared")]
    DiesInpatientNotCleared,
    #[display("sequelae_inpatient_not_cleared")]
    SequelaeInpatientNotCleared,
    #[display("no_change_inpatient")]
    NoChangeInpatient,
    #[display("dies_inpatient_cleared")]
    DiesInpatientCleared,
    #[display("sequelae_inpatient_cleared")]
    SequelaeInpatientCleared,
    #[display("recovers_inpatient")]
    RecoversInpatient,
}

impl Outcome {
    pub fn is_inpatient(&self) -> bool {
        matches!(
            self,
            Outcome::DiesInpatientNotCleared
                | Outcome::SequelaeInpatientNotCleared
                | Outcome::NoChangeInpatient
                | Outcome::DiesInpatientCleared
                | Outcome::SequelaeInpatientCleared
                | Outcome::RecoversInpatient
        )
    }

    pub fn is_death(&self) -> bool {
        matches!(
            self,
            Outcome::DiesNonTreated | Outcome::DiesInpatientNotCleared | Outcome::DiesInpatientCleared
        )
    }

    pub fn is_sequelae(&self) -> bool {
        matches!(
            self,
            Outcome::SequelaeNonTreated
                | Outcome::SequelaeInpatientNotCleared
                | Outcome::SequelaeInpatientCleared
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeathCause {
    #[display("complicated")]
    Complicated,
    #[display("indirect")]
    Indirect,
    #[display("too_old")]
    TooOld,
}

/// Mortality state of a host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Doom {
    #[default]
    NotDoomed,
    /// Days elapsed (negative) since the event that will cause an indirect death.
    Countdown(i32),
    Dead(DeathCause),
}

impl Doom {
    pub fn is_dead(&self) -> bool {
        matches!(self, Doom::Dead(_))
    }
}

/// Clinical events of one host merged over the health-system memory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EpisodeRecord {
    pub start: Step,
    pub age_years: f64,
    pub diagnosis: Diagnosis,
    pub in_hospital: bool,
    pub direct_death: bool,
    pub sequelae: bool,
    pub recovered: bool,
}

impl EpisodeRecord {
    fn new(start: Step, age_years: f64, diagnosis: Diagnosis, outcome: Outcome) -> Self {
        let mut record = Self {
            start,
            age_years,
            diagnosis,
            in_hospital: false,
            direct_death: false,
            sequelae: false,
            recovered: false,
        };
        record.merge(diagnosis, outcome);
        record
    }

    fn merge(&mut self, diagnosis: Diagnosis, outcome: Outcome) {
        self.diagnosis = self.diagnosis.max(diagnosis);
        self.in_hospital |= outcome.is_inpatient();
        self.direct_death |= outcome.is_death();
        self.sequelae |= outcome.is_sequelae();
        self.recovered |= outcome == Outcome::RecoversInpatient;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct LatestEpisode {
    current: Option<EpisodeRecord>,
}

impl LatestEpisode {
    pub fn current(&self) -> Option<&EpisodeRecord> {
        self.current.as_ref()
    }

    /// Add an event. Events within `memory` of the episode start are merged into it; a later
    /// event closes the episode, which is returned for reporting.
    pub fn update(
        &mut self,
        now: Step,
        memory: Step,
        age_years: f64,
        diagnosis: Diagnosis,
        outcome: Outcome,
    ) -> Option<EpisodeRecord> {
        match self.current.as_mut() {
            Some(record) if record.start + memory >= now => {
                record.merge(diagnosis, outcome);
                None
            }
            _ => self
                .current
                .replace(EpisodeRecord::new(now, age_years, diagnosis, outcome)),
        }
    }

    /// Close the current episode, if any.
    pub fn flush(&mut self) -> Option<EpisodeRecord> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_merge_within_memory() {
        let mut latest = LatestEpisode::default();
        let memory = Step(6);
        assert!(latest
            .update(Step(10), memory, 2.0, Diagnosis::Uncomplicated, Outcome::NoChangeOutpatient)
            .is_none());
        assert!(latest
            .update(Step(16), memory, 2.0, Diagnosis::Severe, Outcome::SequelaeInpatientCleared)
            .is_none());

        let closed = latest
            .update(Step(17), memory, 2.1, Diagnosis::NonMalariaFever, Outcome::NoChangeNonTreated)
            .unwrap();
        assert_eq!(closed.start, Step(10));
        assert_eq!(closed.diagnosis, Diagnosis::Severe);
        assert!(closed.in_hospital && closed.sequelae);
        assert!(!closed.direct_death && !closed.recovered);

        let open = latest.flush().unwrap();
        assert_eq!(open.start, Step(17));
        assert_eq!(open.diagnosis, Diagnosis::NonMalariaFever);
        assert!(latest.flush().is_none());
    }

    #[test]
    fn outcome_classes() {
        assert!(Outcome::DiesInpatientCleared.is_death());
        assert!(Outcome::DiesInpatientCleared.is_inpatient());
        assert!(!Outcome::DiesNonTreated.is_inpatient());
        assert!(Outcome::SequelaeNonTreated.is_sequelae());
        assert!(!Outcome::PkPdDependentOutpatient.is_inpatient());
        assert!(Diagnosis::Coinfection.is_severe());
        assert!(!Diagnosis::NonMalariaFever.is_malaria());
        assert!(!Doom::Countdown(-5).is_dead());
        assert!(Doom::Dead(DeathCause::Indirect).is_dead());
    }
}
