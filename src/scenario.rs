//! Read-only collaborators shared by every host of a run.

use derivative::Derivative;
use ndarray::Array2;
use std::path::Path;

use crate::clinical::{
    CaseManagement, CaseManagementTable, ClinicalEngine, MorbidityModel, Pathogenesis,
};
use crate::config::{Parameters, Settings};
use crate::core::immunity::ImmunityConstants;
use crate::core::infection::{read_density_table, DensityModel, DescriptiveModel};
use crate::core::time::Clock;
use crate::core::within_host::WithinHostModel;
use crate::errors::{Result, SimulationError};
use crate::pkpd::{DrugSpec, DrugTable};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Scenario {
    pub clock: Clock,
    pub parameters: Parameters,
    pub immunity: ImmunityConstants,
    pub drugs: DrugTable,
    #[derivative(Debug = "ignore")]
    pub density: Box<dyn DensityModel>,
    pub morbidity: Box<dyn MorbidityModel>,
    pub case_management: Box<dyn CaseManagement>,
}

impl Scenario {
    pub fn new(
        parameters: Parameters,
        drugs: &[DrugSpec],
        case_management: CaseManagementTable,
        mean_log_density: Array2<f64>,
    ) -> Result<Self> {
        parameters.validate()?;
        let clock = parameters.clock()?;
        let immunity = ImmunityConstants::from(&parameters.immunity);

        let drugs = DrugTable::new(
            drugs
                .iter()
                .map(DrugSpec::resolve)
                .collect::<Result<Vec<_>>>()?,
        )?;
        case_management.validate(&drugs)?;
        if parameters.options.pkpd && drugs.is_empty() {
            log::warn!("drug action is enabled but no drugs are configured");
        }

        let density =
            DescriptiveModel::new(&parameters.infection, mean_log_density, clock, immunity)?;
        let morbidity = Pathogenesis::new(&parameters.pathogenesis, clock);

        Ok(Self {
            clock,
            immunity,
            drugs,
            density: Box::new(density),
            morbidity: Box::new(morbidity),
            case_management: Box::new(case_management),
            parameters,
        })
    }

    /// Build the scenario of a settings file. Relative table paths are resolved against
    /// `base_dir`.
    pub fn from_settings(settings: &Settings, base_dir: &Path) -> Result<Self> {
        let densities = settings.parameters.infection.densities.as_ref().ok_or_else(|| {
            SimulationError::ConfigurationError(
                "infection parameters name no density table".to_string(),
            )
        })?;
        let path = base_dir.join(densities);
        let filename = path.to_str().ok_or_else(|| {
            SimulationError::ConfigurationError(format!("invalid path {}", path.display()))
        })?;
        log::debug!("reading density table from {filename}");

        Self::new(
            settings.parameters.clone(),
            &settings.drugs,
            settings.case_management.clone(),
            read_density_table(filename)?,
        )
    }

    pub fn within_host_model(&self) -> WithinHostModel<'_> {
        WithinHostModel {
            clock: self.clock,
            density: self.density.as_ref(),
            infection: &self.parameters.infection,
            immunity: &self.immunity,
            drugs: &self.drugs,
        }
    }

    pub fn clinical_engine(&self) -> ClinicalEngine<'_> {
        ClinicalEngine {
            clock: self.clock,
            options: &self.parameters.options,
            case_management: self.case_management.as_ref(),
            morbidity: self.morbidity.as_ref(),
        }
    }
}
