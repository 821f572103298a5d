use evalexpr::{context_map, DefaultNumericTypes, HashMapContext, Value};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fs::File;
use std::io::BufReader;

use crate::core::time::Step;
use crate::errors::{Result, SimulationError};

/// Population-level intervention triggered by the schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScheduleEvent {
    /// Mass vaccination with every deployed vaccine type, at the given coverage.
    Vaccinate(f64),
    /// Mass intermittent preventive treatment at the given coverage.
    Ipti(f64),
    /// Close a survey period and write its measures.
    Survey,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schedule {
    table: Vec<ScheduleRecord>,
    events: Vec<ScheduleEvent>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ScheduleRecord {
    step: String,
    event: String,
    #[serde(default)]
    value: String,
}

impl Serialize for Schedule {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.table.len()))?;
        for record in &self.table {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let table: Vec<ScheduleRecord> = Vec::<ScheduleRecord>::deserialize(deserializer)?;
        Self::from_vec(table).map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}

impl Schedule {
    pub fn read(filename: &str) -> Result<Self> {
        let mut reader = BufReader::new(File::open(filename)?);
        Schedule::from_reader(&mut reader)
    }

    pub fn from_reader(reader: &mut dyn std::io::Read) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_reader(reader);

        let table: Vec<ScheduleRecord> = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ScheduleRecord>, csv::Error>>()?;

        Self::from_vec(table)
    }

    pub fn from_vec(table: Vec<ScheduleRecord>) -> Result<Self> {
        let events = table
            .iter()
            .map(|record| {
                // reject malformed step expressions before the run starts
                match_step(record, Step(0))?;
                record.parse_event()
            })
            .collect::<Result<Vec<ScheduleEvent>>>()?;
        Ok(Self { table, events })
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Events due at `step`, in file order.
    pub fn events(&self, step: Step) -> Result<SmallVec<[ScheduleEvent; 2]>> {
        let mut due = SmallVec::new();
        for (record, event) in self.table.iter().zip(&self.events) {
            if match_step(record, step)? {
                due.push(*event);
            }
        }
        Ok(due)
    }
}

impl ScheduleRecord {
    pub fn new(step: &str, event: &str, value: &str) -> Self {
        Self {
            step: step.to_string(),
            event: event.to_string(),
            value: value.to_string(),
        }
    }

    fn coverage(&self) -> Result<f64> {
        let coverage: f64 = self.value.trim().parse().map_err(|_| {
            SimulationError::ConfigurationError(format!(
                "invalid coverage `{}` for {}",
                self.value, self.event
            ))
        })?;
        if !(0.0..=1.0).contains(&coverage) {
            return Err(SimulationError::ConfigurationError(format!(
                "coverage {coverage} for {} outside [0, 1]",
                self.event
            )));
        }
        Ok(coverage)
    }

    fn parse_event(&self) -> Result<ScheduleEvent> {
        match self.event.as_str() {
            "vaccinate" => Ok(ScheduleEvent::Vaccinate(self.coverage()?)),
            "ipti" => Ok(ScheduleEvent::Ipti(self.coverage()?)),
            "survey" => Ok(ScheduleEvent::Survey),
            event => Err(SimulationError::ConfigurationError(format!(
                "unknown schedule event `{event}`"
            ))),
        }
    }
}

fn match_step(record: &ScheduleRecord, step: Step) -> Result<bool> {
    match record.step.trim().parse::<i64>() {
        Ok(record_step) => Ok(record_step == step.0),
        Err(_) => {
            let value = Value::<DefaultNumericTypes>::from_int(step.0);
            let context: HashMapContext<DefaultNumericTypes> = context_map! {
                "x" => value.clone(),
                "step" => value.clone(),
                "{}" => value,
            }
            .map_err(|e| SimulationError::ConfigurationError(e.to_string()))?;
            match evalexpr::eval_int_with_context(record.step.as_str(), &context) {
                Ok(result) => Ok(result == 0),
                Err(e) => Err(SimulationError::ConfigurationError(format!(
                    "invalid step expression `{}`: {e}",
                    record.step
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_steps() {
        let content = r#"step;event;value
10;vaccinate;0.8
10;survey;
20;ipti;0.5"#;

        let schedule = Schedule::from_reader(&mut content.as_bytes()).unwrap();

        assert!(schedule.events(Step(0)).unwrap().is_empty());
        assert_eq!(
            schedule.events(Step(10)).unwrap().as_slice(),
            &[ScheduleEvent::Vaccinate(0.8), ScheduleEvent::Survey]
        );
        assert_eq!(
            schedule.events(Step(20)).unwrap().as_slice(),
            &[ScheduleEvent::Ipti(0.5)]
        );
    }

    #[test]
    fn expressions() {
        let content = r#"step;event;value
{} % 73;survey;
(5 + {}) % 10;vaccinate;0.9"#;

        let schedule = Schedule::from_reader(&mut content.as_bytes()).unwrap();

        for i in 0..=1000 {
            let events = schedule.events(Step(i)).unwrap();
            assert_eq!(events.contains(&ScheduleEvent::Survey), i % 73 == 0);
            assert_eq!(
                events.contains(&ScheduleEvent::Vaccinate(0.9)),
                (5 + i) % 10 == 0
            );
        }
    }

    #[test]
    fn step_variable_names() {
        for step in ["x", "step", "{}"] {
            let record = ScheduleRecord::new(&format!("({step} - 3) * {step}"), "survey", "");
            assert!(match_step(&record, Step(3)).unwrap());
            assert!(match_step(&record, Step(0)).unwrap());
            assert!(!match_step(&record, Step(4)).unwrap());
        }
    }

    #[test]
    fn invalid_records() {
        let unknown = "step;event;value\n1;migrate;0.5";
        assert!(Schedule::from_reader(&mut unknown.as_bytes()).is_err());

        let coverage = "step;event;value\n1;vaccinate;1.5";
        assert!(Schedule::from_reader(&mut coverage.as_bytes()).is_err());

        let expression = "step;event;value\ny % 2;survey;";
        assert!(Schedule::from_reader(&mut expression.as_bytes()).is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let schedule = Schedule::from_vec(vec![
            ScheduleRecord::new("{} % 73", "survey", ""),
            ScheduleRecord::new("100", "ipti", "0.85"),
        ])
        .unwrap();
        let text = serde_yaml::to_string(&schedule).unwrap();
        let read: Schedule = serde_yaml::from_str(&text).unwrap();
        assert_eq!(read, schedule);
    }
}
