//! Standard drug parameterisations, addressable by abbreviation.

use phf::phf_map;
use serde::{Deserialize, Serialize};

use super::drug::{DrugParameters, PdParameters};
use crate::errors::{Result, SimulationError};

pub struct DrugPreset {
    pub max_killing_rate: f64,
    pub ic50: f64,
    pub slope: f64,
    pub negligible_concentration: f64,
    pub half_life: f64,
    pub vol_dist: f64,
}

pub static DRUGS: phf::Map<&'static str, DrugPreset> = phf_map! {
    "AR" => DrugPreset {
        max_killing_rate: 27.6,
        ic50: 0.0023,
        slope: 4.0,
        negligible_concentration: 1e-17,
        half_life: 0.1750372,
        vol_dist: 17.4,
    },
    "AS" => DrugPreset {
        max_killing_rate: 27.6,
        ic50: 0.0016,
        slope: 4.0,
        negligible_concentration: 1e-17,
        half_life: 0.04175585,
        vol_dist: 2.75,
    },
    "CQ" => DrugPreset {
        max_killing_rate: 3.45,
        ic50: 0.02,
        slope: 1.6,
        negligible_concentration: 0.00036,
        half_life: 30.006,
        vol_dist: 300.0,
    },
    "DHA" => DrugPreset {
        max_killing_rate: 27.6,
        ic50: 0.009,
        slope: 4.0,
        negligible_concentration: 1e-17,
        half_life: 0.03500743,
        vol_dist: 1.49,
    },
    "LF" => DrugPreset {
        max_killing_rate: 3.45,
        ic50: 0.032,
        slope: 4.0,
        negligible_concentration: 0.00032,
        half_life: 4.332,
        vol_dist: 21.0,
    },
    "MQ" => DrugPreset {
        max_killing_rate: 3.45,
        ic50: 0.027,
        slope: 5.0,
        negligible_concentration: 0.005,
        half_life: 13.078,
        vol_dist: 20.8,
    },
    "PPQ" => DrugPreset {
        max_killing_rate: 3.45,
        ic50: 0.088,
        slope: 6.0,
        negligible_concentration: 0.005,
        half_life: 23.105,
        vol_dist: 150.0,
    },
};

impl DrugParameters {
    pub fn preset(abbreviation: &str) -> Option<DrugParameters> {
        DRUGS.get(abbreviation).map(|preset| DrugParameters {
            abbreviation: abbreviation.to_string(),
            negligible_concentration: preset.negligible_concentration,
            half_life: preset.half_life,
            vol_dist: preset.vol_dist,
            phenotypes: vec![PdParameters {
                max_killing_rate: preset.max_killing_rate,
                ic50: preset.ic50,
                slope: preset.slope,
            }],
        })
    }
}

/// A drug in the settings: either a preset abbreviation or a full description.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum DrugSpec {
    Preset(String),
    Custom(DrugParameters),
}

impl DrugSpec {
    pub fn resolve(&self) -> Result<DrugParameters> {
        match self {
            DrugSpec::Preset(abbreviation) => DrugParameters::preset(abbreviation).ok_or_else(
                || SimulationError::ConfigurationError(format!("unknown drug `{abbreviation}`")),
            ),
            DrugSpec::Custom(parameters) => Ok(parameters.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for abbreviation in DRUGS.keys() {
            let drug = DrugParameters::preset(abbreviation).unwrap();
            assert!(drug.validate().is_ok(), "{abbreviation}");
        }
        assert!(DrugParameters::preset("XYZ").is_none());
    }

    #[test]
    fn specs_from_yaml() {
        let specs: Vec<DrugSpec> = serde_yaml::from_str(
            r#"
- MQ
- abbreviation: QN
  negligible_concentration: 0.01
  half_life: 0.5
  vol_dist: 1.5
  phenotypes:
    - max_killing_rate: 3.0
      ic50: 0.1
      slope: 2.0
"#,
        )
        .unwrap();
        assert_eq!(specs[0].resolve().unwrap().vol_dist, 20.8);
        assert_eq!(specs[1].resolve().unwrap().abbreviation, "QN");
        assert!(DrugSpec::Preset("XYZ".to_string()).resolve().is_err());
    }
}
