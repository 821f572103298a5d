//! Pharmacokinetic and pharmacodynamic parameters of a drug.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SimulationError};

/// Killing effect of a drug on one parasite genotype.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PdParameters {
    /// Maximal killing rate per day.
    pub max_killing_rate: f64,
    /// Concentration (mg/l) at which half the maximal killing rate is reached.
    pub ic50: f64,
    /// Hill coefficient.
    pub slope: f64,
}

const SIMPSON_TOLERANCE: f64 = 1e-12;
const SIMPSON_MAX_DEPTH: u32 = 40;

impl PdParameters {
    fn kn(&self) -> f64 {
        self.ic50.powf(self.slope)
    }

    pub fn kill_rate(&self, concentration: f64) -> f64 {
        let cn = concentration.powf(self.slope);
        self.max_killing_rate * cn / (cn + self.kn())
    }

    /// Survival factor over `duration` days of first-order elimination at rate `k`.
    ///
    /// `concentration` is advanced to its value at the end of the interval.
    pub fn decay_factor(&self, concentration: &mut f64, k: f64, duration: f64) -> f64 {
        let c0 = *concentration;
        let c1 = c0 * (-k * duration).exp();
        *concentration = c1;

        let kn = self.kn();
        let numerator = kn + c1.powf(self.slope);
        let denominator = kn + c0.powf(self.slope);
        let power = self.max_killing_rate / (k * self.slope);
        (numerator / denominator).powf(power)
    }

    /// Survival factor over `duration` days of an infusion adding `rate` mg/l per day.
    pub fn infusion_factor(
        &self,
        concentration: &mut f64,
        k: f64,
        rate: f64,
        duration: f64,
    ) -> f64 {
        let c0 = *concentration;
        let kill = |t: f64| self.kill_rate(infusion_concentration(c0, k, rate, t));
        let integral = adaptive_simpson(&kill, 0.0, duration);
        *concentration = infusion_concentration(c0, k, rate, duration);
        (-integral).exp()
    }
}

/// Concentration `t` days into an infusion starting from `c0`.
pub fn infusion_concentration(c0: f64, k: f64, rate: f64, t: f64) -> f64 {
    let plateau = rate / k;
    (plateau + (c0 - plateau) * (-k * t).exp()).max(0.0)
}

fn adaptive_simpson(f: &dyn Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    if b <= a {
        return 0.0;
    }
    let (fa, fb) = (f(a), f(b));
    let m = 0.5 * (a + b);
    let fm = f(m);
    let whole = (b - a) / 6.0 * (fa + 4.0 * fm + fb);
    simpson_step(f, a, b, fa, fm, fb, whole, SIMPSON_TOLERANCE, SIMPSON_MAX_DEPTH)
}

#[allow(clippy::too_many_arguments)]
fn simpson_step(
    f: &dyn Fn(f64) -> f64,
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    tolerance: f64,
    depth: u32,
) -> f64 {
    let m = 0.5 * (a + b);
    let (lm, rm) = (0.5 * (a + m), 0.5 * (m + b));
    let (flm, frm) = (f(lm), f(rm));
    let left = (m - a) / 6.0 * (fa + 4.0 * flm + fm);
    let right = (b - m) / 6.0 * (fm + 4.0 * frm + fb);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= 15.0 * tolerance {
        return left + right + delta / 15.0;
    }
    simpson_step(f, a, m, fa, flm, fm, left, tolerance / 2.0, depth - 1)
        + simpson_step(f, m, b, fm, frm, fb, right, tolerance / 2.0, depth - 1)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DrugParameters {
    pub abbreviation: String,
    /// Concentration (mg/l) below which the drug is dropped from a host.
    pub negligible_concentration: f64,
    /// Elimination half-life in days.
    pub half_life: f64,
    /// Volume of distribution in l/kg.
    pub vol_dist: f64,
    /// Pharmacodynamics per parasite genotype; the last entry covers any further genotype.
    pub phenotypes: Vec<PdParameters>,
}

impl DrugParameters {
    pub fn elimination_rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life
    }

    pub fn pd(&self, genotype: u32) -> &PdParameters {
        let index = (genotype as usize).min(self.phenotypes.len() - 1);
        &self.phenotypes[index]
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(SimulationError::ConfigurationError(format!(
                "drug {}: {message}",
                self.abbreviation
            )))
        };
        if self.phenotypes.is_empty() {
            return invalid("no phenotypes");
        }
        if !(self.half_life > 0.0) {
            return invalid("half life must be positive");
        }
        if !(self.vol_dist > 0.0) {
            return invalid("volume of distribution must be positive");
        }
        if self
            .phenotypes
            .iter()
            .any(|pd| !(pd.ic50 > 0.0) || !(pd.slope > 0.0) || pd.max_killing_rate < 0.0)
        {
            return invalid("invalid phenotype");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mefloquine() -> PdParameters {
        PdParameters {
            max_killing_rate: 3.45,
            ic50: 0.027,
            slope: 5.0,
        }
    }

    #[test]
    fn kill_rate_at_ic50() {
        let pd = mefloquine();
        assert!((pd.kill_rate(0.027) - 3.45 / 2.0).abs() < 1e-12);
        assert_eq!(pd.kill_rate(0.0), 0.0);
    }

    #[test]
    fn decay_factor_matches_integral() {
        let pd = mefloquine();
        let k = std::f64::consts::LN_2 / 13.078;
        let c0 = 0.05;
        let mut concentration = c0;
        let closed = pd.decay_factor(&mut concentration, k, 1.0);
        assert!((concentration - c0 * (-k).exp()).abs() < 1e-15);

        // an infusion with zero rate is plain elimination
        let mut concentration = c0;
        let integrated = pd.infusion_factor(&mut concentration, k, 0.0, 1.0);
        assert!((closed - integrated).abs() < 1e-9);
    }

    #[test]
    fn zero_concentration_has_no_effect() {
        let pd = mefloquine();
        let mut concentration = 0.0;
        assert_eq!(pd.decay_factor(&mut concentration, 0.05, 1.0), 1.0);
        assert_eq!(concentration, 0.0);
    }

    #[test]
    fn simpson_integrates_polynomials() {
        let integral = adaptive_simpson(&|x| 3.0 * x * x, 0.0, 2.0);
        assert!((integral - 8.0).abs() < 1e-12);
        assert_eq!(adaptive_simpson(&|x| x, 1.0, 1.0), 0.0);
    }

    #[test]
    fn validation() {
        let mut drug = DrugParameters {
            abbreviation: "MQ".to_string(),
            negligible_concentration: 0.005,
            half_life: 13.078,
            vol_dist: 20.8,
            phenotypes: vec![mefloquine()],
        };
        assert!(drug.validate().is_ok());
        assert_eq!(drug.pd(3), &mefloquine());

        drug.half_life = 0.0;
        assert!(drug.validate().is_err());
        drug.half_life = 13.078;
        drug.phenotypes.clear();
        assert!(drug.validate().is_err());
    }
}
