//! Settings module.

use super::parameters::Parameters;
use super::schedule::Schedule;

use serde::{Deserialize, Serialize};
use std::fs;

use crate::clinical::CaseManagementTable;
use crate::errors::Result;
use crate::pkpd::DrugSpec;
use crate::transmission::NonVectorParameters;

/// Everything needed to run a scenario.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub parameters: Parameters,
    /// Drugs available to case management, as preset names or full descriptions.
    #[serde(default)]
    pub drugs: Vec<DrugSpec>,
    pub case_management: CaseManagementTable,
    pub transmission: NonVectorParameters,
    #[serde(default)]
    pub schedule: Schedule,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = vec![];
        self.write(&mut output).map_err(|_| std::fmt::Error)?;
        write!(
            formatter,
            "{}",
            String::from_utf8(output).map_err(|_| std::fmt::Error)?
        )
    }
}

impl Settings {
    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Settings> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<()> {
        let file = fs::File::create(filename)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Settings> {
        let file = fs::File::open(filename)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::clinical::case_management::tests::case_management;
    use crate::config::parameters::tests::parameters;
    use crate::config::schedule::ScheduleRecord;
    use crate::transmission::tests::parameters as transmission;

    pub(crate) fn settings() -> Settings {
        Settings {
            parameters: parameters(),
            drugs: vec![
                DrugSpec::Preset("MQ".to_string()),
                DrugSpec::Preset("AS".to_string()),
            ],
            case_management: case_management(),
            transmission: transmission(0.05),
            schedule: Schedule::from_vec(vec![
                ScheduleRecord::new("{} % 73", "survey", ""),
                ScheduleRecord::new("146", "vaccinate", "0.8"),
            ])
            .unwrap(),
        }
    }

    #[test]
    fn read_write() {
        let settings = settings();
        let mut output = vec![];
        settings.write(&mut output).unwrap();
        let settings2 = Settings::read(&mut &output[..]).unwrap();
        assert_eq!(settings, settings2);
    }

    #[test]
    fn schedule_is_optional() {
        let mut output = vec![];
        settings().write(&mut output).unwrap();
        let mut yaml: serde_yaml::Value = serde_yaml::from_slice(&output).unwrap();
        yaml.as_mapping_mut().unwrap().remove("schedule");
        let text = serde_yaml::to_string(&yaml).unwrap();
        let read = Settings::read(&mut text.as_bytes()).unwrap();
        assert!(read.schedule.is_empty());
    }
}
