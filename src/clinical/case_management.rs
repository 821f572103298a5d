//! Read-only case-management tables: who seeks treatment, and what it achieves.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SimulationError};
use crate::pkpd::{DrugTable, Medication};

#[derive(Serialize, Deserialize, Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Regimen {
    #[display("first_line")]
    FirstLine,
    #[display("second_line")]
    SecondLine,
    #[display("inpatient")]
    Inpatient,
}

impl FromStr for Regimen {
    type Err = SimulationError;

    fn from_str(entry_point: &str) -> Result<Self> {
        match entry_point {
            "first_line" => Ok(Regimen::FirstLine),
            "second_line" => Ok(Regimen::SecondLine),
            "inpatient" => Ok(Regimen::Inpatient),
            _ => Err(SimulationError::InvalidEntryPoint(entry_point.to_string())),
        }
    }
}

/// Everything the clinical decision needs to know for one age and entry point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreatmentOptions<'a> {
    pub treatment_seeking: f64,
    /// May be NaN in legacy tables.
    pub parasite_clearance: f64,
    pub cure_rate: f64,
    pub case_fatality: f64,
    pub sequelae_treated: f64,
    pub sequelae_untreated: f64,
    pub medications: &'a [Medication],
}

pub trait CaseManagement: Send + Sync + fmt::Debug {
    /// Regimen of an uncomplicated case, given the days since the last treatment.
    fn next_regimen(&self, days_since_last_treatment: Option<f64>) -> Regimen;

    fn lookup(&self, age_years: f64, entry_point: Regimen) -> Result<TreatmentOptions<'_>>;

    /// Case fatality outside hospital, derived from the hospital case fatality.
    fn community_case_fatality(&self, hospital_cfr: f64) -> f64;

    /// Events closer together than this many days belong to the same episode.
    fn health_system_memory_days(&self) -> f64;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegimenEntry {
    pub treatment_seeking: f64,
    #[serde(default)]
    pub parasite_clearance: f64,
    #[serde(default)]
    pub medications: Vec<Medication>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgeGroupEntry {
    /// Exclusive upper bound of the age group in years.
    pub max_age_years: f64,
    /// Keyed by entry point: `first_line`, `second_line` or `inpatient`.
    pub regimens: BTreeMap<String, RegimenEntry>,
    pub cure_rate: f64,
    pub case_fatality: f64,
    pub sequelae_treated: f64,
    #[serde(default)]
    pub sequelae_untreated: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CaseManagementTable {
    pub health_system_memory_days: f64,
    pub log_odds_ratio_cf_community: f64,
    pub age_groups: Vec<AgeGroupEntry>,
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

impl CaseManagementTable {
    /// Check the table against the drugs of the scenario.
    pub fn validate(&self, drugs: &DrugTable) -> Result<()> {
        if self
            .age_groups
            .windows(2)
            .any(|pair| !(pair[0].max_age_years < pair[1].max_age_years))
        {
            return Err(SimulationError::ConfigurationError(
                "case management age groups must be sorted by age".to_string(),
            ));
        }
        for group in &self.age_groups {
            let mut probabilities = vec![group.cure_rate, group.case_fatality, group.sequelae_treated];
            probabilities.extend(group.sequelae_untreated);
            for (entry_point, entry) in &group.regimens {
                entry_point.parse::<Regimen>()?;
                probabilities.push(entry.treatment_seeking);
                if entry.parasite_clearance.is_nan() {
                    log::warn!(
                        "parasite clearance of {entry_point} below age {} is NaN: such cases always clear",
                        group.max_age_years
                    );
                } else {
                    probabilities.push(entry.parasite_clearance);
                }
                for medication in &entry.medications {
                    drugs.index_of(&medication.drug)?;
                }
            }
            if let Some(p) = probabilities.into_iter().find(|p| !is_probability(*p)) {
                return Err(SimulationError::ConfigurationError(format!(
                    "case management probability {p} below age {} is outside [0, 1]",
                    group.max_age_years
                )));
            }
        }
        Ok(())
    }

    fn group(&self, age_years: f64) -> Result<&AgeGroupEntry> {
        self.age_groups
            .iter()
            .find(|group| age_years < group.max_age_years)
            .ok_or(SimulationError::MissingCaseManagement(age_years))
    }
}

impl CaseManagement for CaseManagementTable {
    fn next_regimen(&self, days_since_last_treatment: Option<f64>) -> Regimen {
        match days_since_last_treatment {
            Some(days) if days < self.health_system_memory_days => Regimen::SecondLine,
            _ => Regimen::FirstLine,
        }
    }

    fn lookup(&self, age_years: f64, entry_point: Regimen) -> Result<TreatmentOptions<'_>> {
        let group = self.group(age_years)?;
        let entry = group
            .regimens
            .get(&entry_point.to_string())
            .ok_or_else(|| {
                SimulationError::InvalidEntryPoint(format!(
                    "{entry_point} not configured below age {}",
                    group.max_age_years
                ))
            })?;
        Ok(TreatmentOptions {
            treatment_seeking: entry.treatment_seeking,
            parasite_clearance: entry.parasite_clearance,
            cure_rate: group.cure_rate,
            case_fatality: group.case_fatality,
            sequelae_treated: group.sequelae_treated,
            sequelae_untreated: group.sequelae_untreated.unwrap_or(group.sequelae_treated),
            medications: &entry.medications,
        })
    }

    fn community_case_fatality(&self, hospital_cfr: f64) -> f64 {
        let x = hospital_cfr * self.log_odds_ratio_cf_community.exp();
        x / (1.0 - hospital_cfr + x)
    }

    fn health_system_memory_days(&self) -> f64 {
        self.health_system_memory_days
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pkpd::model::tests::{table, three_days_of_mefloquine};

    pub(crate) fn regimen(treatment_seeking: f64, parasite_clearance: f64) -> RegimenEntry {
        RegimenEntry {
            treatment_seeking,
            parasite_clearance,
            medications: three_days_of_mefloquine(),
        }
    }

    /// One age group covering everyone.
    pub(crate) fn case_management() -> CaseManagementTable {
        CaseManagementTable {
            health_system_memory_days: 30.0,
            log_odds_ratio_cf_community: 0.736,
            age_groups: vec![AgeGroupEntry {
                max_age_years: 100.0,
                regimens: BTreeMap::from([
                    ("first_line".to_string(), regimen(0.8, 0.9)),
                    ("second_line".to_string(), regimen(0.5, 0.95)),
                    ("inpatient".to_string(), regimen(0.48, 0.0)),
                ]),
                cure_rate: 0.99,
                case_fatality: 0.09,
                sequelae_treated: 0.0132,
                sequelae_untreated: None,
            }],
        }
    }

    #[test]
    fn lookup_by_age() {
        let mut table = case_management();
        let adults = table.age_groups[0].clone();
        table.age_groups.insert(
            0,
            AgeGroupEntry {
                max_age_years: 5.0,
                case_fatality: 0.2,
                ..adults
            },
        );
        assert_eq!(table.lookup(1.0, Regimen::FirstLine).unwrap().case_fatality, 0.2);
        assert_eq!(table.lookup(5.0, Regimen::FirstLine).unwrap().case_fatality, 0.09);
        assert!(matches!(
            table.lookup(100.0, Regimen::FirstLine),
            Err(SimulationError::MissingCaseManagement(_))
        ));

        table.age_groups[0].regimens.remove("inpatient");
        assert!(matches!(
            table.lookup(1.0, Regimen::Inpatient),
            Err(SimulationError::InvalidEntryPoint(_))
        ));
    }

    #[test]
    fn second_line_within_memory() {
        let table = case_management();
        assert_eq!(table.next_regimen(None), Regimen::FirstLine);
        assert_eq!(table.next_regimen(Some(25.0)), Regimen::SecondLine);
        assert_eq!(table.next_regimen(Some(30.0)), Regimen::FirstLine);
    }

    #[test]
    fn community_case_fatality() {
        let mut table = case_management();
        table.log_odds_ratio_cf_community = 0.0;
        assert!((table.community_case_fatality(0.09) - 0.09).abs() < 1e-12);
        table.log_odds_ratio_cf_community = 0.736;
        let community = table.community_case_fatality(0.09);
        assert!(community > 0.09 && community < 1.0);
    }

    #[test]
    fn validation() {
        let drugs = table();
        let mut table = case_management();
        assert!(table.validate(&drugs).is_ok());

        table.age_groups[0]
            .regimens
            .get_mut("first_line")
            .unwrap()
            .parasite_clearance = f64::NAN;
        assert!(table.validate(&drugs).is_ok());

        table.age_groups[0]
            .regimens
            .insert("outpatient".to_string(), regimen(0.5, 0.5));
        assert!(matches!(
            table.validate(&drugs),
            Err(SimulationError::InvalidEntryPoint(_))
        ));

        let mut table = case_management();
        table.age_groups[0].cure_rate = 1.5;
        assert!(table.validate(&drugs).is_err());

        let mut table = case_management();
        table.age_groups[0]
            .regimens
            .get_mut("first_line")
            .unwrap()
            .medications[0]
            .drug = "XX".to_string();
        assert!(table.validate(&drugs).is_err());
    }

    #[test]
    fn from_yaml() {
        let table: CaseManagementTable = serde_yaml::from_str(
            r#"
health_system_memory_days: 30
log_odds_ratio_cf_community: 0.736
age_groups:
  - max_age_years: 90
    cure_rate: 0.99
    case_fatality: 0.09
    sequelae_treated: 0.0132
    regimens:
      first_line:
        treatment_seeking: 0.64
        parasite_clearance: .nan
        medications:
          - { drug: MQ, qty: 500, time: 0 }
      inpatient:
        treatment_seeking: 0.48
"#,
        )
        .unwrap();
        let options = table.lookup(3.0, Regimen::FirstLine).unwrap();
        assert!(options.parasite_clearance.is_nan());
        assert_eq!(options.medications.len(), 1);
        assert_eq!(options.sequelae_untreated, 0.0132);
    }
}
