//! All drugs carried by one host, plus medications waiting to be taken.

use serde::{Deserialize, Serialize};

use super::concentration::DrugConcentration;
use super::drug::DrugParameters;
use crate::errors::{Result, SimulationError};

/// Drug types known to a scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrugTable {
    drugs: Vec<DrugParameters>,
}

impl DrugTable {
    pub fn new(drugs: Vec<DrugParameters>) -> Result<Self> {
        for (index, drug) in drugs.iter().enumerate() {
            drug.validate()?;
            if drugs[..index]
                .iter()
                .any(|other| other.abbreviation == drug.abbreviation)
            {
                return Err(SimulationError::ConfigurationError(format!(
                    "drug {} defined twice",
                    drug.abbreviation
                )));
            }
        }
        Ok(Self { drugs })
    }

    pub fn index_of(&self, abbreviation: &str) -> Result<usize> {
        self.drugs
            .iter()
            .position(|drug| drug.abbreviation == abbreviation)
            .ok_or_else(|| {
                SimulationError::ConfigurationError(format!("unknown drug `{abbreviation}`"))
            })
    }

    pub fn get(&self, index: usize) -> &DrugParameters {
        &self.drugs[index]
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }
}

/// A prescribed dose.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Medication {
    pub drug: String,
    /// mg for oral doses, mg/kg for intravenous doses.
    pub qty: f64,
    /// Days from the prescription until the dose is taken.
    pub time: f64,
    /// Intravenous infusion length in days; zero for an oral dose.
    #[serde(default)]
    pub duration: f64,
}

impl Medication {
    pub fn is_oral(&self) -> bool {
        self.duration == 0.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PkPdModel {
    drugs: Vec<DrugConcentration>,
    queue: Vec<Medication>,
}

impl PkPdModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty() && self.queue.is_empty()
    }

    pub fn drugs(&self) -> &[DrugConcentration] {
        &self.drugs
    }

    pub fn queue(&self) -> &[Medication] {
        &self.queue
    }

    pub fn prescribe(&mut self, medications: impl IntoIterator<Item = Medication>) {
        self.queue.extend(medications);
    }

    /// Take every queued medication due today; the rest move one day closer.
    pub fn medicate(&mut self, table: &DrugTable, body_mass: f64) -> Result<()> {
        let mut waiting = Vec::with_capacity(self.queue.len());
        for mut medication in std::mem::take(&mut self.queue) {
            if medication.time < 1.0 {
                self.take(table, &medication, body_mass)?;
            } else {
                medication.time -= 1.0;
                waiting.push(medication);
            }
        }
        self.queue = waiting;
        Ok(())
    }

    fn take(&mut self, table: &DrugTable, medication: &Medication, body_mass: f64) -> Result<()> {
        let index = table.index_of(&medication.drug)?;
        let drug = table.get(index);
        let position = match self.drugs.iter().position(|conc| conc.drug() == index) {
            Some(position) => position,
            None => {
                self.drugs.push(DrugConcentration::new(index));
                self.drugs.len() - 1
            }
        };
        let conc = &mut self.drugs[position];
        if medication.is_oral() {
            conc.medicate(drug, medication.time, medication.qty, body_mass)
        } else {
            conc.medicate_iv(drug, medication.time, medication.duration, medication.qty)
        }
    }

    /// Survival factor of `genotype` against all drugs present today.
    pub fn drug_factor(&self, table: &DrugTable, genotype: u32) -> f64 {
        self.drugs
            .iter()
            .map(|conc| conc.drug_factor(table.get(conc.drug()), genotype))
            .product()
    }

    /// End of day: update concentrations and drop drugs that no longer matter.
    pub fn decay(&mut self, table: &DrugTable) {
        self.drugs.retain_mut(|conc| {
            let negligible = conc.update_concentration(table.get(conc.drug()));
            if negligible {
                log::trace!("{} eliminated", table.get(conc.drug()).abbreviation);
            }
            !negligible
        });
    }

    pub fn concentration(&self, table: &DrugTable, abbreviation: &str) -> f64 {
        table
            .index_of(abbreviation)
            .ok()
            .and_then(|index| self.drugs.iter().find(|conc| conc.drug() == index))
            .map_or(0.0, |conc| conc.concentration())
    }
}
