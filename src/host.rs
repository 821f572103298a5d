//! One human host and its step update.
//!
//! A step runs in a fixed order: age checks, vaccine decay and routine deployments, exposure,
//! the within-host update, the clinical decision and its actions, and finally infectiousness.
//! Every random draw of a step comes from the stream passed to [`Host::update`].

use serde::{Deserialize, Serialize};

use crate::clinical::pathogenesis::MorbidityInput;
use crate::clinical::{
    ClinicalAction, ClinicalEvent, ClinicalState, DeathCause, Doom, IptState, Patient,
    PathogenesisState,
};
use crate::core::heterogeneity::HostFactors;
use crate::core::infectiousness::infectiousness;
use crate::core::time::Step;
use crate::core::vaccine::{VaccineKind, VaccineState};
use crate::core::within_host::{StepExposure, WithinHostState};
use crate::errors::{Result, SimulationError};
use crate::random::RandomStream;
use crate::reporting::{HostSummary, Report, ReportKind, Reporter};
use crate::scenario::Scenario;
use crate::transmission::{HostExposure, TransmissionModel};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Host {
    id: u64,
    birth: Step,
    factors: HostFactors,
    exposure: HostExposure,
    within_host: WithinHostState,
    pathogenesis: PathogenesisState,
    clinical: ClinicalState,
    vaccines: VaccineState,
    ipt: IptState,
    infectiousness: f64,
}

impl Host {
    /// Create a host born at `birth`. Draws the innate survival factor, then the heterogeneity
    /// factors.
    pub fn new(
        id: u64,
        birth: Step,
        now: Step,
        scenario: &Scenario,
        rng: &mut dyn RandomStream,
    ) -> Result<Self> {
        if birth > now {
            return Err(SimulationError::BirthAfterCurrentTime {
                birth: birth.0,
                now: now.0,
            });
        }
        let innate_survival = (-rng.gaussian(0.0, scenario.immunity.sigma_i)).exp();
        let factors = scenario.parameters.heterogeneity.draw(rng);
        log::trace!("host {id} born at {birth} with innate survival {innate_survival:.4}");

        Ok(Self {
            id,
            birth,
            factors,
            exposure: HostExposure::new(factors.availability),
            within_host: WithinHostState::new(&scenario.clock, innate_survival),
            pathogenesis: scenario.morbidity.initial_state(),
            clinical: ClinicalState::default(),
            vaccines: VaccineState::default(),
            ipt: IptState::default(),
            infectiousness: 0.0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn birth(&self) -> Step {
        self.birth
    }

    pub fn factors(&self) -> &HostFactors {
        &self.factors
    }

    pub fn exposure(&self) -> &HostExposure {
        &self.exposure
    }

    pub fn within_host(&self) -> &WithinHostState {
        &self.within_host
    }

    pub fn clinical(&self) -> &ClinicalState {
        &self.clinical
    }

    pub fn vaccines(&self) -> &VaccineState {
        &self.vaccines
    }

    pub fn ipt(&self) -> &IptState {
        &self.ipt
    }

    /// Probability of infecting a biting mosquito, as of the last update.
    pub fn infectiousness(&self) -> f64 {
        self.infectiousness
    }

    pub fn is_dead(&self) -> bool {
        self.clinical.doom().is_dead()
    }

    pub fn age(&self, now: Step) -> Step {
        now - self.birth
    }

    pub fn age_years(&self, scenario: &Scenario, now: Step) -> f64 {
        scenario.clock.years(self.age(now))
    }

    fn report(&self, reporter: &mut dyn Reporter, now: Step, age_years: f64, kind: ReportKind) {
        reporter.report(Report {
            step: now,
            host: self.id,
            age_years,
            kind,
        });
    }

    /// Advance the host to the end of step `now`.
    pub fn update(
        &mut self,
        scenario: &Scenario,
        transmission: &dyn TransmissionModel,
        now: Step,
        rng: &mut dyn RandomStream,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        if self.is_dead() {
            return Ok(());
        }
        let age = self.age(now);
        if age <= Step(0) {
            return Ok(());
        }
        let clock = scenario.clock;
        let parameters = &scenario.parameters;
        let age_years = clock.years(age);
        if age_years >= parameters.max_age_years {
            self.die(DeathCause::TooOld, now, age_years, reporter);
            return Ok(());
        }

        self.vaccines.decay(&parameters.vaccines, &clock);
        self.deploy_by_age(scenario, now, age, age_years, rng, reporter);

        let expected_infections = self.exposure.expose(
            transmission,
            now,
            age_years,
            self.vaccines.efficacy(VaccineKind::PreErythrocytic),
        )?;
        let protected = parameters
            .ipt
            .as_ref()
            .is_some_and(|ipt| self.ipt.protects(now, ipt, &clock));
        let step_exposure = StepExposure {
            now,
            age_years,
            expected_infections,
            protected,
            bsv_efficacy: self.vaccines.efficacy(VaccineKind::BloodStage),
            body_mass: parameters.body_mass.eval(age_years),
        };
        let new_infections =
            self.within_host
                .update(&scenario.within_host_model(), &step_exposure, rng)?;
        if new_infections > 0 {
            self.report(
                reporter,
                now,
                age_years,
                ReportKind::NewInfections(new_infections),
            );
        }

        let patient = Patient {
            now,
            age_years,
            treatment_seeking_factor: self.factors.treatment_seeking,
            morbidity: MorbidityInput {
                age_years,
                total_density: self.within_host.total_density(),
                step_max_density: self.within_host.step_max_density(),
                comorbidity_factor: self.factors.comorbidity,
            },
        };
        let decision = scenario.clinical_engine().update(
            &mut self.clinical,
            &mut self.pathogenesis,
            &patient,
            rng,
        )?;

        let severe = decision.events.iter().any(|event| {
            matches!(event, ClinicalEvent::Outcome { diagnosis, .. } if diagnosis.is_severe())
        });
        for action in decision.actions {
            self.apply(scenario, action, now, severe);
        }

        for event in decision.events {
            let kind = match event {
                ClinicalEvent::Outcome { diagnosis, outcome } => {
                    ReportKind::Event { diagnosis, outcome }
                }
                ClinicalEvent::Treatment(regimen) => ReportKind::Treatment(regimen),
                ClinicalEvent::EpisodeClosed(record) => ReportKind::Episode(record),
                ClinicalEvent::IndirectDeath => ReportKind::IndirectDeath,
            };
            self.report(reporter, now, age_years, kind);
        }

        if let Doom::Dead(cause) = self.clinical.doom() {
            self.die(cause, now, age_years, reporter);
            return Ok(());
        }

        self.infectiousness = infectiousness(
            self.within_host.lagged(),
            &clock,
            now,
            age,
            self.vaccines.efficacy(VaccineKind::TransmissionBlocking),
        );
        Ok(())
    }

    /// Execute a clinical action. Under an IPT trial every effective treatment clears all
    /// infections, prescriptions included.
    fn apply(&mut self, scenario: &Scenario, action: ClinicalAction, now: Step, severe: bool) {
        match action {
            ClinicalAction::ClearInfections => self.clear_for_treatment(scenario, now, severe),
            ClinicalAction::Prescribe(medications) => {
                self.within_host.prescribe(medications);
                if scenario.parameters.ipt.is_some() {
                    self.clear_for_treatment(scenario, now, severe);
                }
            }
            ClinicalAction::PenaliseImmunity => {
                self.within_host.penalise_immunity(&scenario.immunity)
            }
        }
    }

    fn clear_for_treatment(&mut self, scenario: &Scenario, now: Step, severe: bool) {
        self.within_host.clear_infections();
        if let Some(ipt) = &scenario.parameters.ipt {
            self.ipt.on_clearing_treatment(now, severe, ipt, &scenario.clock);
        }
    }

    fn die(&mut self, cause: DeathCause, now: Step, age_years: f64, reporter: &mut dyn Reporter) {
        log::trace!("host {} died at {now}: {cause}", self.id);
        self.clinical.set_doom(Doom::Dead(cause));
        self.infectiousness = 0.0;
        if cause == DeathCause::Complicated {
            self.report(reporter, now, age_years, ReportKind::DirectDeath);
        }
        if let Some(record) = self.clinical.flush_episode() {
            self.report(reporter, now, age_years, ReportKind::Episode(record));
        }
    }

    /// Routine vaccination and IPT doses due at the host's current age.
    fn deploy_by_age(
        &mut self,
        scenario: &Scenario,
        now: Step,
        age: Step,
        age_years: f64,
        rng: &mut dyn RandomStream,
        reporter: &mut dyn Reporter,
    ) {
        let clock = scenario.clock;
        let parameters = &scenario.parameters;
        for dose in &parameters.vaccines.epi {
            if age == clock.from_days_nearest(dose.target_age_days)
                && rng.uniform01() < dose.coverage
            {
                self.vaccinate(scenario, now, age_years, reporter);
            }
        }
        if let Some(ipt) = &parameters.ipt {
            for dose in &ipt.doses {
                if age == clock.from_days_nearest(dose.target_age_days)
                    && ipt.in_season(now, &clock)
                    && rng.uniform01() < dose.coverage
                {
                    self.give_ipt(scenario, now, age_years, reporter);
                }
            }
        }
    }

    fn vaccinate(
        &mut self,
        scenario: &Scenario,
        now: Step,
        age_years: f64,
        reporter: &mut dyn Reporter,
    ) {
        let descriptors = &scenario.parameters.vaccines;
        self.vaccines.vaccinate_all(descriptors);
        for kind in descriptors.deployed() {
            self.report(reporter, now, age_years, ReportKind::Vaccination(kind));
        }
    }

    fn give_ipt(
        &mut self,
        scenario: &Scenario,
        now: Step,
        age_years: f64,
        reporter: &mut dyn Reporter,
    ) {
        if let Some(ipt) = &scenario.parameters.ipt {
            self.ipt.dose(now, ipt);
            self.report(
                reporter,
                now,
                age_years,
                ReportKind::IptDose { sp: ipt.active },
            );
        }
    }

    /// Vaccinate with probability `coverage` during a mass campaign.
    pub fn mass_vaccinate(
        &mut self,
        scenario: &Scenario,
        now: Step,
        coverage: f64,
        rng: &mut dyn RandomStream,
        reporter: &mut dyn Reporter,
    ) {
        if self.is_dead() || self.age(now) < Step(0) {
            return;
        }
        if rng.uniform01() < coverage {
            let age_years = self.age_years(scenario, now);
            self.vaccinate(scenario, now, age_years, reporter);
        }
    }

    /// Give an IPT dose with probability `coverage` during a mass campaign.
    pub fn mass_ipt(
        &mut self,
        scenario: &Scenario,
        now: Step,
        coverage: f64,
        rng: &mut dyn RandomStream,
        reporter: &mut dyn Reporter,
    ) {
        if self.is_dead() || self.age(now) < Step(0) || scenario.parameters.ipt.is_none() {
            return;
        }
        if rng.uniform01() < coverage {
            let age_years = self.age_years(scenario, now);
            self.give_ipt(scenario, now, age_years, reporter);
        }
    }

    pub fn summarize(&self, scenario: &Scenario) -> HostSummary {
        let immunity = self.within_host.immunity();
        HostSummary {
            total_density: self.within_host.total_density(),
            patent_infections: self
                .within_host
                .patent_infections(scenario.parameters.infection.detection_limit),
            p_infected: self.exposure.p_infected(),
            pyrogenic_threshold: self.pathogenesis.pyrogenic_threshold(),
            infectiousness: self.infectiousness,
            cumulative_h: immunity.cumulative_h(),
            cumulative_y: immunity.cumulative_y(),
        }
    }

    pub fn write_checkpoint(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        serde_yaml::to_writer(writer, self)
            .map_err(|e| SimulationError::CheckpointError(format!("host {}: {e}", self.id)))
    }

    pub fn read_checkpoint(reader: &mut dyn std::io::Read) -> Result<Host> {
        serde_yaml::from_reader(reader).map_err(|e| SimulationError::CheckpointError(e.to_string()))
    }
}
