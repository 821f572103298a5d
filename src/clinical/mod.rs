pub mod case_management;
pub mod decision;
pub mod ipt;
pub mod outcome;
pub mod pathogenesis;

pub use case_management::{CaseManagement, CaseManagementTable, Regimen};
pub use decision::{
    ClinicalAction, ClinicalDecision, ClinicalEngine, ClinicalEvent, ClinicalOptions,
    ClinicalState, Patient,
};
pub use ipt::{IptArm, IptParameters, IptState};
pub use outcome::{DeathCause, Diagnosis, Doom, EpisodeRecord, Outcome};
pub use pathogenesis::{
    MorbidityModel, Pathogenesis, PathogenesisParameters, PathogenesisState,
};
