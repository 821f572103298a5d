//! Reports emitted by hosts and the sinks collecting them.
//!
//! Hosts never wait on reporting: every [`Reporter`] accepts a [`Report`] and returns nothing.
//! The [`SurveyCollector`] aggregates reports into per-age-group survey measures, the
//! [`CsvReporter`] writes the event log, usually on its own thread behind a channel.

use derive_more::Display;
use itertools::Itertools;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use std::io;
use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};

use crate::clinical::{Diagnosis, EpisodeRecord, Outcome, Regimen};
use crate::core::time::Step;
use crate::core::vaccine::VaccineKind;
use crate::errors::Result;

/// State of one host at a survey.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct HostSummary {
    pub total_density: f64,
    pub patent_infections: usize,
    pub p_infected: f64,
    pub pyrogenic_threshold: f64,
    pub infectiousness: f64,
    pub cumulative_h: f64,
    pub cumulative_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReportKind {
    NewInfections(u32),
    /// One clinical event and its outcome.
    Event {
        diagnosis: Diagnosis,
        outcome: Outcome,
    },
    Treatment(Regimen),
    /// A closed episode.
    Episode(EpisodeRecord),
    DirectDeath,
    IndirectDeath,
    Vaccination(VaccineKind),
    IptDose {
        sp: bool,
    },
    Summary(HostSummary),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub step: Step,
    pub host: u64,
    pub age_years: f64,
    pub kind: ReportKind,
}

pub trait Reporter {
    fn report(&mut self, report: Report);
}

impl Reporter for Vec<Report> {
    fn report(&mut self, report: Report) {
        self.push(report);
    }
}

impl Reporter for Sender<Report> {
    fn report(&mut self, report: Report) {
        if self.send(report).is_err() {
            log::warn!("report of host {} dropped: receiver is gone", report.host);
        }
    }
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, report: Report) {
        (**self).report(report);
    }
}

impl<A: Reporter, B: Reporter> Reporter for (A, B) {
    fn report(&mut self, report: Report) {
        self.0.report(report);
        self.1.report(report);
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Measure {
    #[display("hosts")]
    Hosts,
    #[display("patent_hosts")]
    PatentHosts,
    #[display("sum_density")]
    SumDensity,
    #[display("sum_infectiousness")]
    SumInfectiousness,
    #[display("sum_p_infected")]
    SumPInfected,
    #[display("new_infections")]
    NewInfections,
    #[display("uncomplicated_episodes")]
    UncomplicatedEpisodes,
    #[display("severe_episodes")]
    SevereEpisodes,
    #[display("non_malaria_fevers")]
    NonMalariaFevers,
    #[display("hospital_episodes")]
    HospitalEpisodes,
    #[display("hospital_recoveries")]
    HospitalRecoveries,
    #[display("sequelae")]
    Sequelae,
    #[display("treatments_first_line")]
    TreatmentsFirstLine,
    #[display("treatments_second_line")]
    TreatmentsSecondLine,
    #[display("treatments_inpatient")]
    TreatmentsInpatient,
    #[display("direct_deaths")]
    DirectDeaths,
    #[display("indirect_deaths")]
    IndirectDeaths,
    #[display("vaccinations")]
    Vaccinations,
    #[display("ipt_doses")]
    IptDoses,
}

impl ReportKind {
    fn measures(&self) -> SmallVec<[(Measure, f64); 4]> {
        match self {
            ReportKind::NewInfections(count) => smallvec![(Measure::NewInfections, *count as f64)],
            ReportKind::Event { .. } => smallvec![],
            ReportKind::Treatment(regimen) => {
                let measure = match regimen {
                    Regimen::FirstLine => Measure::TreatmentsFirstLine,
                    Regimen::SecondLine => Measure::TreatmentsSecondLine,
                    Regimen::Inpatient => Measure::TreatmentsInpatient,
                };
                smallvec![(measure, 1.0)]
            }
            ReportKind::Episode(record) => {
                let mut measures: SmallVec<[(Measure, f64); 4]> = smallvec![];
                measures.push(match record.diagnosis {
                    Diagnosis::NonMalariaFever => (Measure::NonMalariaFevers, 1.0),
                    Diagnosis::Uncomplicated => (Measure::UncomplicatedEpisodes, 1.0),
                    Diagnosis::Severe | Diagnosis::Coinfection => (Measure::SevereEpisodes, 1.0),
                });
                if record.in_hospital {
                    measures.push((Measure::HospitalEpisodes, 1.0));
                }
                if record.recovered {
                    measures.push((Measure::HospitalRecoveries, 1.0));
                }
                if record.sequelae {
                    measures.push((Measure::Sequelae, 1.0));
                }
                measures
            }
            ReportKind::DirectDeath => smallvec![(Measure::DirectDeaths, 1.0)],
            ReportKind::IndirectDeath => smallvec![(Measure::IndirectDeaths, 1.0)],
            ReportKind::Vaccination(_) => smallvec![(Measure::Vaccinations, 1.0)],
            ReportKind::IptDose { .. } => smallvec![(Measure::IptDoses, 1.0)],
            ReportKind::Summary(summary) => {
                let patent = if summary.patent_infections > 0 { 1.0 } else { 0.0 };
                smallvec![
                    (Measure::Hosts, 1.0),
                    (Measure::PatentHosts, patent),
                    (Measure::SumDensity, summary.total_density),
                    (Measure::SumInfectiousness, summary.infectiousness),
                ]
            }
        }
    }

    fn p_infected(&self) -> Option<f64> {
        match self {
            ReportKind::Summary(summary) => Some(summary.p_infected),
            _ => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SurveyRow {
    pub survey: usize,
    pub step: i64,
    pub measure: String,
    pub age_group: String,
    pub value: f64,
}

/// Aggregates reports by age group until a survey closes.
#[derive(Debug, Clone, Default)]
pub struct SurveyCollector {
    /// Exclusive upper bounds of the age groups in years; older hosts form a last group.
    age_bounds: Vec<f64>,
    pending: Vec<(Measure, usize, f64)>,
    surveys: usize,
    rows: Vec<SurveyRow>,
}

impl SurveyCollector {
    pub fn new(age_bounds: Vec<f64>) -> Self {
        Self {
            age_bounds,
            ..Default::default()
        }
    }

    fn age_group(&self, age_years: f64) -> usize {
        self.age_bounds.partition_point(|bound| *bound <= age_years)
    }

    fn label(&self, group: usize) -> String {
        let lower = match group {
            0 => 0.0,
            _ => self.age_bounds[group - 1],
        };
        match self.age_bounds.get(group) {
            Some(upper) => format!("{lower}-{upper}"),
            None => format!("{lower}+"),
        }
    }

    /// Aggregate everything reported since the previous survey.
    pub fn close_survey(&mut self, step: Step) {
        self.surveys += 1;
        let totals = self
            .pending
            .drain(..)
            .map(|(measure, group, value)| ((measure, group), value))
            .into_grouping_map()
            .sum();
        for ((measure, group), value) in totals.into_iter().sorted_by_key(|(key, _)| *key) {
            self.rows.push(SurveyRow {
                survey: self.surveys,
                step: step.0,
                measure: measure.to_string(),
                age_group: self.label(group),
                value,
            });
        }
        log::debug!("survey {} closed at step {}", self.surveys, step);
    }

    pub fn rows(&self) -> &[SurveyRow] {
        &self.rows
    }

    pub fn write_csv(&self, writer: impl io::Write) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Reporter for SurveyCollector {
    fn report(&mut self, report: Report) {
        let group = self.age_group(report.age_years);
        for (measure, value) in report.kind.measures() {
            self.pending.push((measure, group, value));
        }
        if let Some(p_infected) = report.kind.p_infected() {
            self.pending.push((Measure::SumPInfected, group, p_infected));
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct EventRow {
    step: i64,
    host: u64,
    age_years: f64,
    event: &'static str,
    detail: String,
    value: f64,
}

/// Writes one csv row per event. Survey summaries are left to the [`SurveyCollector`].
pub struct CsvReporter<W: io::Write> {
    writer: csv::Writer<W>,
    error: Option<csv::Error>,
}

impl<W: io::Write> CsvReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            error: None,
        }
    }

    /// Flush the log and hand back the writer, returning the first write error, if any.
    pub fn finish(mut self) -> Result<W> {
        if let Some(error) = self.error.take() {
            return Err(error.into());
        }
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|error| error.into_error().into())
    }

    /// Move the log to a writer thread. Reports sent through the returned channel are written
    /// in arrival order; the thread finishes once every sender is dropped.
    pub fn spawn(self) -> (Sender<Report>, JoinHandle<Result<W>>)
    where
        W: Send + 'static,
    {
        let (sender, receiver) = channel::<Report>();
        let handle = thread::spawn(move || {
            let mut reporter = self;
            for report in receiver {
                reporter.report(report);
            }
            reporter.finish()
        });
        (sender, handle)
    }

    fn row(report: &Report) -> Option<EventRow> {
        let (event, detail, value) = match report.kind {
            ReportKind::NewInfections(count) => ("new_infections", String::new(), count as f64),
            ReportKind::Event { diagnosis, outcome } => {
                ("event", format!("{diagnosis}:{outcome}"), 1.0)
            }
            ReportKind::Treatment(regimen) => ("treatment", regimen.to_string(), 1.0),
            ReportKind::Episode(record) => {
                let flags = [
                    (record.in_hospital, "hospital"),
                    (record.direct_death, "death"),
                    (record.sequelae, "sequelae"),
                    (record.recovered, "recovered"),
                ]
                .into_iter()
                .filter_map(|(set, flag)| set.then_some(flag))
                .join("|");
                (
                    "episode",
                    format!("{}:{flags}", record.diagnosis),
                    record.start.0 as f64,
                )
            }
            ReportKind::DirectDeath => ("direct_death", String::new(), 1.0),
            ReportKind::IndirectDeath => ("indirect_death", String::new(), 1.0),
            ReportKind::Vaccination(kind) => ("vaccination", kind.to_string(), 1.0),
            ReportKind::IptDose { sp } => ("ipt_dose", if sp { "sp" } else { "placebo" }.to_string(), 1.0),
            ReportKind::Summary(_) => return None,
        };
        Some(EventRow {
            step: report.step.0,
            host: report.host,
            age_years: report.age_years,
            event,
            detail,
            value,
        })
    }
}

impl<W: io::Write> Reporter for CsvReporter<W> {
    fn report(&mut self, report: Report) {
        if self.error.is_some() {
            return;
        }
        if let Some(row) = Self::row(&report) {
            if let Err(error) = self.writer.serialize(row) {
                log::error!("writing event of host {} failed: {error}", report.host);
                self.error = Some(error);
            }
        }
    }
}
