//! Fixed per-host factors drawn at birth.

use serde::{Deserialize, Serialize};

use crate::random::RandomStream;

const LOW: f64 = 0.2;
const HIGH: f64 = 1.8;

/// Which host factors vary between hosts. Combined modes share one draw, so the factors are
/// correlated (or anti-correlated for treatment seeking).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Heterogeneity {
    #[default]
    None,
    Transmission,
    Comorbidity,
    TreatmentSeeking,
    TransmissionTreatment,
    ComorbidityTreatment,
    ComorbidityTransmission,
    Triple,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct HostFactors {
    pub availability: f64,
    pub comorbidity: f64,
    pub treatment_seeking: f64,
}

impl Default for HostFactors {
    fn default() -> Self {
        Self {
            availability: 1.0,
            comorbidity: 1.0,
            treatment_seeking: 1.0,
        }
    }
}

impl Heterogeneity {
    /// Whether availability to mosquitoes varies between hosts.
    pub fn affects_transmission(&self) -> bool {
        matches!(
            self,
            Heterogeneity::Transmission
                | Heterogeneity::TransmissionTreatment
                | Heterogeneity::ComorbidityTransmission
                | Heterogeneity::Triple
        )
    }

    /// Draw the factors of a new host. Consumes one uniform unless heterogeneity is off.
    pub fn draw(&self, rng: &mut dyn RandomStream) -> HostFactors {
        let mut factors = HostFactors::default();
        if *self == Heterogeneity::None {
            return factors;
        }
        let (first, second) = if rng.uniform01() < 0.5 {
            (HIGH, LOW)
        } else {
            (LOW, HIGH)
        };
        match self {
            Heterogeneity::None => {}
            Heterogeneity::Transmission => factors.availability = first,
            Heterogeneity::Comorbidity => factors.comorbidity = first,
            Heterogeneity::TreatmentSeeking => factors.treatment_seeking = first,
            Heterogeneity::TransmissionTreatment => {
                factors.treatment_seeking = first;
                factors.availability = second;
            }
            Heterogeneity::ComorbidityTreatment => {
                factors.comorbidity = first;
                factors.treatment_seeking = second;
            }
            Heterogeneity::ComorbidityTransmission => {
                factors.availability = second;
                factors.comorbidity = second;
            }
            Heterogeneity::Triple => {
                factors.availability = second;
                factors.comorbidity = second;
                factors.treatment_seeking = first;
            }
        }
        factors
    }
}
