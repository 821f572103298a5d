//! All errors that can occur in the plasmosim library.
//!
//! Every variant is fatal for a run: they signal a malformed scenario or a broken input file.
//! Numeric edge cases inside the update are recovered locally and never surface here.

use std::fmt;

#[derive(Debug)]
pub enum SimulationError {
    ConfigurationError(String),
    MissingCaseManagement(f64),
    InvalidEntryPoint(String),
    UnresolvedDecision(String),
    ProbabilitySum(f64),
    BirthAfterCurrentTime { birth: i64, now: i64 },
    InvalidDose(String),
    CheckpointError(String),
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
    CsvError(csv::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimulationError::ConfigurationError(message) => {
                write!(f, "ConfigurationError: {}", message)
            }
            SimulationError::MissingCaseManagement(age) => {
                write!(f, "MissingCaseManagement: no entry for age {} years", age)
            }
            SimulationError::InvalidEntryPoint(entry_point) => {
                write!(f, "InvalidEntryPoint: {}", entry_point)
            }
            SimulationError::UnresolvedDecision(message) => {
                write!(f, "UnresolvedDecision: {}", message)
            }
            SimulationError::ProbabilitySum(sum) => {
                write!(f, "ProbabilitySum: outcome probabilities sum to {} < 1", sum)
            }
            SimulationError::BirthAfterCurrentTime { birth, now } => {
                write!(
                    f,
                    "BirthAfterCurrentTime: birth at step {} is after step {}",
                    birth, now
                )
            }
            SimulationError::InvalidDose(message) => write!(f, "InvalidDose: {}", message),
            SimulationError::CheckpointError(message) => {
                write!(f, "CheckpointError: {}", message)
            }
            SimulationError::IoError(error) => write!(f, "IO error: {}", error),
            SimulationError::YamlError(error) => write!(f, "YAML error: {}", error),
            SimulationError::CsvError(error) => write!(f, "CSV error: {}", error),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<std::io::Error> for SimulationError {
    fn from(error: std::io::Error) -> Self {
        SimulationError::IoError(error)
    }
}

impl From<serde_yaml::Error> for SimulationError {
    fn from(error: serde_yaml::Error) -> Self {
        SimulationError::YamlError(error)
    }
}

impl From<csv::Error> for SimulationError {
    fn from(error: csv::Error) -> Self {
        SimulationError::CsvError(error)
    }
}
