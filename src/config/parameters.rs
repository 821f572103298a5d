use serde::{Deserialize, Serialize};
use std::fs;

use crate::clinical::{ClinicalOptions, IptParameters, PathogenesisParameters};
use crate::core::age_table::AgeTable;
use crate::core::heterogeneity::Heterogeneity;
use crate::core::immunity::ImmunityParameters;
use crate::core::infection::InfectionParameters;
use crate::core::time::Clock;
use crate::core::vaccine::VaccineDescriptors;
use crate::errors::{Result, SimulationError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Length of a time step in days (1 or 5).
    pub interval_days: u32,

    /// Hosts are removed from the population at this age.
    #[serde(default = "default_max_age_years")]
    pub max_age_years: f64,

    pub immunity: ImmunityParameters,

    pub infection: InfectionParameters,

    pub pathogenesis: PathogenesisParameters,

    /// Host factors varying between hosts.
    #[serde(default)]
    pub heterogeneity: Heterogeneity,

    #[serde(default)]
    pub options: ClinicalOptions,

    #[serde(default)]
    pub vaccines: VaccineDescriptors,

    /// Intermittent preventive treatment trial, if any.
    #[serde(default)]
    pub ipt: Option<IptParameters>,

    /// Body mass in kg by age in years, used for oral doses.
    pub body_mass: AgeTable,
}

fn default_max_age_years() -> f64 {
    90.0
}

impl Parameters {
    pub fn clock(&self) -> Result<Clock> {
        Clock::new(self.interval_days)
    }

    pub fn validate(&self) -> Result<()> {
        self.clock()?;
        if !(self.max_age_years > 0.0) {
            return Err(SimulationError::ConfigurationError(format!(
                "maximum age must be positive, got {}",
                self.max_age_years
            )));
        }
        if let Some(ipt) = &self.ipt {
            if ipt.doses.iter().any(|dose| !(0.0..=1.0).contains(&dose.coverage)) {
                return Err(SimulationError::ConfigurationError(
                    "IPT coverage outside [0, 1]".to_string(),
                ));
            }
        }
        if self
            .vaccines
            .epi
            .iter()
            .any(|dose| !(0.0..=1.0).contains(&dose.coverage))
        {
            return Err(SimulationError::ConfigurationError(
                "vaccine coverage outside [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Parameters> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<()> {
        let file = fs::File::create(filename)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Parameters> {
        let file = fs::File::open(filename)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}

impl std::fmt::Display for Parameters {
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clinical::pathogenesis::tests::parameters as pathogenesis_parameters;
    use crate::core::infection::tests::{immunity_parameters, infection_parameters};
    use serial_test::serial;

    pub(crate) fn parameters() -> Parameters {
        Parameters {
            interval_days: 5,
            max_age_years: 90.0,
            immunity: immunity_parameters(),
            infection: infection_parameters(),
            pathogenesis: pathogenesis_parameters(),
            heterogeneity: Heterogeneity::None,
            options: ClinicalOptions::default(),
            vaccines: VaccineDescriptors::default(),
            ipt: None,
            body_mass: AgeTable::new(vec![(0.0, 3.5), (5.0, 18.0), (20.0, 60.0)]).unwrap(),
        }
    }

    #[test]
    fn validation() {
        assert!(parameters().validate().is_ok());

        let mut parameters = parameters();
        parameters.interval_days = 7;
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn defaults_from_yaml() {
        let mut output = vec![];
        parameters().write(&mut output).unwrap();
        let mut yaml: serde_yaml::Value = serde_yaml::from_slice(&output).unwrap();
        let mapping = yaml.as_mapping_mut().unwrap();
        for key in ["max_age_years", "heterogeneity", "options", "vaccines", "ipt"] {
            mapping.remove(key);
        }
        let text = serde_yaml::to_string(&yaml).unwrap();
        let read = Parameters::read(&mut text.as_bytes()).unwrap();
        assert_eq!(read, parameters());
    }

    #[test]
    #[serial]
    fn read_write_file() {
        let path = std::env::temp_dir().join("plasmosim_parameters.yaml");
        let filename = path.to_str().unwrap();
        parameters().write_to_file(filename).unwrap();
        assert_eq!(Parameters::read_from_file(filename).unwrap(), parameters());
        fs::remove_file(filename).unwrap();
    }
}
