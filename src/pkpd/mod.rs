//! One-compartment pharmacokinetics and Hill-function pharmacodynamics.

pub mod concentration;
pub mod doses;
pub mod drug;
pub mod model;
pub mod presets;

pub use concentration::DrugConcentration;
pub use doses::{Dose, DoseSchedule};
pub use drug::{DrugParameters, PdParameters};
pub use model::{DrugTable, Medication, PkPdModel};
pub use presets::DrugSpec;
