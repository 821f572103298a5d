//! Step-synchronous driver of a host population.
//!
//! Each host draws from its own stream, seeded by run seed, host id and step, and is created
//! from a separately salted stream. Updates are therefore independent of host order and
//! thread count, and reports are buffered per host and flushed in host order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::config::{Schedule, ScheduleEvent};
use crate::core::time::Step;
use crate::errors::{Result, SimulationError};
use crate::host::Host;
use crate::random::SeededStream;
use crate::reporting::{Report, ReportKind, Reporter};
use crate::scenario::Scenario;
use crate::transmission::TransmissionModel;

/// What happened during one population step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepSummary {
    pub step: Step,
    pub survey: bool,
    pub deaths: usize,
    pub births: usize,
    pub kappa: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Population {
    hosts: Vec<Host>,
    size: usize,
    next_id: u64,
    seed: u64,
    now: Step,
}

impl Population {
    /// Create `size` hosts with ages spread evenly over the maximum age.
    pub fn new(size: usize, seed: u64, scenario: &Scenario) -> Result<Self> {
        let now = Step(0);
        let max_age = scenario
            .clock
            .from_years(scenario.parameters.max_age_years)
            .0;
        let mut population = Self {
            hosts: Vec::with_capacity(size),
            size,
            next_id: 0,
            seed,
            now,
        };
        for index in 0..size as i64 {
            let age = Step(index * max_age / size as i64);
            population.add_host(now - age, scenario)?;
        }
        log::info!("created {size} hosts with ages up to {max_age} steps");
        Ok(population)
    }

    fn add_host(&mut self, birth: Step, scenario: &Scenario) -> Result<()> {
        let id = self.next_id;
        let mut rng = SeededStream::for_host_creation(self.seed, id, birth.0);
        self.hosts
            .push(Host::new(id, birth, self.now, scenario, &mut rng)?);
        self.next_id += 1;
        Ok(())
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// The step the next call to [`Population::step`] simulates.
    pub fn now(&self) -> Step {
        self.now
    }

    /// Simulate one step: scheduled campaigns, host updates, surveys, infectiousness, and
    /// replacement of the dead by newborns.
    pub fn step(
        &mut self,
        scenario: &Scenario,
        transmission: &mut dyn TransmissionModel,
        schedule: &Schedule,
        reporter: &mut dyn Reporter,
    ) -> Result<StepSummary> {
        let now = self.now;
        let seed = self.seed;
        let events = schedule.events(now)?;
        if scenario.parameters.ipt.is_none()
            && events
                .iter()
                .any(|event| matches!(event, ScheduleEvent::Ipti(_)))
        {
            log::warn!("IPT campaign at step {now} ignored: the scenario has no IPT arm");
        }

        let model: &dyn TransmissionModel = &*transmission;
        let update = |host: &mut Host| -> Result<Vec<Report>> {
            let mut rng = SeededStream::for_host_step(seed, host.id(), now.0);
            let mut reports = Vec::new();
            for event in &events {
                match event {
                    ScheduleEvent::Vaccinate(coverage) => {
                        host.mass_vaccinate(scenario, now, *coverage, &mut rng, &mut reports)
                    }
                    ScheduleEvent::Ipti(coverage) => {
                        host.mass_ipt(scenario, now, *coverage, &mut rng, &mut reports)
                    }
                    ScheduleEvent::Survey => {}
                }
            }
            host.update(scenario, model, now, &mut rng, &mut reports)?;
            Ok(reports)
        };

        #[cfg(feature = "parallel")]
        let buffers: Vec<Result<Vec<Report>>> = self.hosts.par_iter_mut().map(update).collect();
        #[cfg(not(feature = "parallel"))]
        let buffers: Vec<Result<Vec<Report>>> = self.hosts.iter_mut().map(update).collect();

        for buffer in buffers {
            for report in buffer? {
                reporter.report(report);
            }
        }

        let survey = events.contains(&ScheduleEvent::Survey);
        if survey {
            for host in self.hosts.iter().filter(|host| !host.is_dead()) {
                reporter.report(Report {
                    step: now,
                    host: host.id(),
                    age_years: host.age_years(scenario, now),
                    kind: ReportKind::Summary(host.summarize(scenario)),
                });
            }
        }

        let kappa = self.kappa(scenario, &*transmission, now);
        transmission.observe_infectiousness(now, kappa);

        let before = self.hosts.len();
        self.hosts.retain(|host| !host.is_dead());
        let deaths = before - self.hosts.len();
        let births = self.size.saturating_sub(self.hosts.len());
        for _ in 0..births {
            self.add_host(now, scenario)?;
        }

        log::debug!("step {now}: kappa {kappa:.5}, {deaths} deaths, {births} births");
        self.now = now + Step(1);
        Ok(StepSummary {
            step: now,
            survey,
            deaths,
            births,
            kappa,
        })
    }

    /// Mean infectiousness of living hosts, weighted by availability to mosquitoes.
    fn kappa(&self, scenario: &Scenario, transmission: &dyn TransmissionModel, now: Step) -> f64 {
        let (weighted, total) = self
            .hosts
            .iter()
            .filter(|host| !host.is_dead())
            .map(|host| {
                let availability = host.exposure().availability()
                    * transmission.relative_availability(host.age_years(scenario, now));
                (availability * host.infectiousness(), availability)
            })
            .fold((0.0, 0.0), |(weighted, total), (x, a)| (weighted + x, total + a));
        if total > 0.0 { weighted / total } else { 0.0 }
    }

    pub fn write_checkpoint(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        serde_yaml::to_writer(writer, self)
            .map_err(|e| SimulationError::CheckpointError(e.to_string()))
    }

    pub fn read_checkpoint(reader: &mut dyn std::io::Read) -> Result<Population> {
        serde_yaml::from_reader(reader).map_err(|e| SimulationError::CheckpointError(e.to_string()))
    }

    pub fn write_checkpoint_file(&self, filename: &str) -> Result<()> {
        let file = fs::File::create(filename)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write_checkpoint(&mut writer)
    }

    pub fn read_checkpoint_file(filename: &str) -> Result<Population> {
        let file = fs::File::open(filename)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read_checkpoint(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::parameters;
    use crate::random::RandomStream;
    use crate::config::ScheduleRecord;
    use crate::scenario::tests::{scenario, scenario_with};
    use crate::transmission::tests::parameters as transmission_parameters;
    use crate::transmission::NonVectorTransmission;
    use serial_test::serial;

    fn transmission(scenario: &Scenario, eir: f64) -> NonVectorTransmission {
        NonVectorTransmission::new(&transmission_parameters(eir), scenario.clock).unwrap()
    }

    fn run(
        population: &mut Population,
        scenario: &Scenario,
        transmission: &mut NonVectorTransmission,
        schedule: &Schedule,
        steps: usize,
    ) -> Vec<Report> {
        let mut reports = Vec::new();
        for _ in 0..steps {
            population
                .step(scenario, transmission, schedule, &mut reports)
                .unwrap();
        }
        reports
    }

    #[test]
    fn ages_are_spread() {
        let scenario = scenario();
        let population = Population::new(10, 1, &scenario).unwrap();
        assert_eq!(population.len(), 10);
        let births: Vec<i64> = population.hosts().iter().map(|host| host.birth().0).collect();
        assert_eq!(births[0], 0);
        assert!(births.windows(2).all(|pair| pair[1] < pair[0]));
        let ids: Vec<u64> = population.hosts().iter().map(|host| host.id()).collect();
        assert_eq!(ids, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn creation_has_its_own_stream() {
        let scenario = scenario();
        let population = Population::new(1, 4, &scenario).unwrap();
        let host = &population.hosts()[0];
        assert_eq!(host.birth(), Step(0));

        let sigma = scenario.immunity.sigma_i;
        let mut creation = SeededStream::for_host_creation(4, 0, 0);
        let mut update = SeededStream::for_host_step(4, 0, 0);
        let created = (-creation.gaussian(0.0, sigma)).exp();
        assert_eq!(host.within_host().innate_survival(), created);
        assert_ne!(host.within_host().innate_survival(), (-update.gaussian(0.0, sigma)).exp());
    }

    #[test]
    fn runs_repeat() {
        let scenario = scenario();
        let schedule = Schedule::default();
        let mut first = Population::new(20, 5, &scenario).unwrap();
        let mut second = Population::new(20, 5, &scenario).unwrap();
        let mut model = transmission(&scenario, 0.1);
        let first_reports = run(&mut first, &scenario, &mut model, &schedule, 40);
        let mut model = transmission(&scenario, 0.1);
        let second_reports = run(&mut second, &scenario, &mut model, &schedule, 40);
        assert_eq!(first, second);
        assert_eq!(first_reports, second_reports);
        assert_eq!(first.now(), Step(40));
    }

    #[test]
    fn the_old_are_replaced() {
        let mut parameters = parameters();
        parameters.max_age_years = 0.5;
        let scenario = scenario_with(parameters);
        let schedule = Schedule::default();
        let mut population = Population::new(12, 3, &scenario).unwrap();
        let mut model = transmission(&scenario, 0.0);
        let mut births = 0;
        for _ in 0..40 {
            let mut reports = Vec::new();
            let summary = population
                .step(&scenario, &mut model, &schedule, &mut reports)
                .unwrap();
            assert_eq!(summary.deaths, summary.births);
            births += summary.births;
            assert_eq!(population.len(), 12);
        }
        assert!(births >= 12);
        assert!(population.hosts().iter().all(|host| host.id() >= 12));
    }

    #[test]
    fn surveys_and_campaigns() {
        let mut parameters = parameters();
        parameters.vaccines.tbv = Some(crate::core::vaccine::VaccineDescriptor {
            initial_mean_efficacy: vec![0.9],
            half_life_years: 2.0,
        });
        let scenario = scenario_with(parameters);
        let schedule = Schedule::from_vec(vec![
            ScheduleRecord::new("2", "vaccinate", "1.0"),
            ScheduleRecord::new("{} % 3", "survey", ""),
        ])
        .unwrap();
        let mut population = Population::new(8, 9, &scenario).unwrap();
        let mut model = transmission(&scenario, 0.0);
        let reports = run(&mut population, &scenario, &mut model, &schedule, 4);

        let summaries = |step: i64| {
            reports
                .iter()
                .filter(|report| {
                    report.step == Step(step) && matches!(report.kind, ReportKind::Summary(_))
                })
                .count()
        };
        assert_eq!(summaries(0), 8);
        assert_eq!(summaries(1), 0);
        assert_eq!(summaries(3), 8);
        let vaccinations = reports
            .iter()
            .filter(|report| matches!(report.kind, ReportKind::Vaccination(_)))
            .count();
        assert_eq!(vaccinations, 8);
        assert_eq!(model.kappa(), 0.0);
    }

    #[test]
    #[serial]
    fn resume_from_checkpoint() {
        let scenario = scenario();
        let schedule = Schedule::default();
        let mut population = Population::new(10, 2, &scenario).unwrap();
        let mut model = transmission(&scenario, 0.1);
        run(&mut population, &scenario, &mut model, &schedule, 20);

        let path = std::env::temp_dir().join("plasmosim_population.yaml");
        let filename = path.to_str().unwrap();
        population.write_checkpoint_file(filename).unwrap();
        let mut resumed = Population::read_checkpoint_file(filename).unwrap();
        fs::remove_file(filename).unwrap();
        assert_eq!(resumed, population);

        let mut resumed_model = model.clone();
        let original = run(&mut population, &scenario, &mut model, &schedule, 20);
        let continued = run(&mut resumed, &scenario, &mut resumed_model, &schedule, 20);
        assert_eq!(resumed, population);
        assert_eq!(continued, original);
    }
}
