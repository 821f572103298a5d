//! Concentration of one drug in one host.

use serde::{Deserialize, Serialize};

use super::doses::{DoseSchedule, Segment};
use super::drug::DrugParameters;
use crate::errors::{Result, SimulationError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DrugConcentration {
    /// Index into the drug table.
    drug: usize,
    /// Concentration (mg/l) at the start of today.
    concentration: f64,
    doses: DoseSchedule,
}

fn check_dose(drug: &DrugParameters, time: f64, qty: f64) -> Result<()> {
    if !(0.0..1.0).contains(&time) || !qty.is_finite() || qty < 0.0 {
        return Err(SimulationError::InvalidDose(format!(
            "{}: time {time}, quantity {qty}",
            drug.abbreviation
        )));
    }
    Ok(())
}

impl DrugConcentration {
    pub fn new(drug: usize) -> Self {
        Self {
            drug,
            concentration: 0.0,
            doses: DoseSchedule::new(),
        }
    }

    pub fn drug(&self) -> usize {
        self.drug
    }

    pub fn concentration(&self) -> f64 {
        self.concentration
    }

    pub fn doses(&self) -> &DoseSchedule {
        &self.doses
    }

    /// Oral dose of `qty` mg at `time` days into today.
    pub fn medicate(
        &mut self,
        drug: &DrugParameters,
        time: f64,
        qty: f64,
        body_mass: f64,
    ) -> Result<()> {
        check_dose(drug, time, qty)?;
        if !(body_mass > 0.0) {
            return Err(SimulationError::InvalidDose(format!(
                "{}: body mass {body_mass}",
                drug.abbreviation
            )));
        }
        self.doses
            .insert_bolus(time, qty / (drug.vol_dist * body_mass));
        Ok(())
    }

    /// Intravenous dose of `qty` mg/kg spread evenly over `duration` days.
    pub fn medicate_iv(
        &mut self,
        drug: &DrugParameters,
        time: f64,
        duration: f64,
        qty: f64,
    ) -> Result<()> {
        check_dose(drug, time, qty)?;
        if !(duration >= 0.0) || !duration.is_finite() {
            return Err(SimulationError::InvalidDose(format!(
                "{}: duration {duration}",
                drug.abbreviation
            )));
        }
        if duration == 0.0 {
            self.doses.insert_bolus(time, qty / drug.vol_dist);
        } else {
            self.doses.insert_infusion(time, duration, qty / duration);
        }
        Ok(())
    }

    /// Fraction of parasites of `genotype` surviving today's exposure to this drug.
    ///
    /// Does not change the stored concentration.
    pub fn drug_factor(&self, drug: &DrugParameters, genotype: u32) -> f64 {
        if self.concentration == 0.0 && self.doses.is_empty() {
            return 1.0;
        }
        let pd = drug.pd(genotype);
        let k = drug.elimination_rate();
        let mut concentration = self.concentration;
        let mut factor = 1.0;
        for segment in self.doses.today() {
            match segment {
                Segment::Decay(duration) => {
                    factor *= pd.decay_factor(&mut concentration, k, duration);
                }
                Segment::Bolus(increment) => concentration += increment,
                Segment::Infusion { duration, rate } => {
                    factor *= pd.infusion_factor(
                        &mut concentration,
                        k,
                        rate / drug.vol_dist,
                        duration,
                    );
                }
            }
        }
        factor.clamp(0.0, 1.0)
    }

    /// Apply today's doses and elimination, then move to tomorrow.
    ///
    /// Returns true once the drug no longer matters: its concentration is negligible and no
    /// doses remain.
    pub fn update_concentration(&mut self, drug: &DrugParameters) -> bool {
        let k = drug.elimination_rate();
        for segment in self.doses.today() {
            match segment {
                Segment::Decay(duration) => self.concentration *= (-k * duration).exp(),
                Segment::Bolus(increment) => self.concentration += increment,
                Segment::Infusion { duration, rate } => {
                    self.concentration = super::drug::infusion_concentration(
                        self.concentration,
                        k,
                        rate / drug.vol_dist,
                        duration,
                    );
                }
            }
        }
        self.doses.advance_day();
        self.concentration < drug.negligible_concentration && self.doses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkpd::drug::PdParameters;

    const MASS_AT_21: f64 = 55.4993;

    fn mefloquine() -> DrugParameters {
        DrugParameters::preset("MQ").unwrap()
    }

    fn assert_approx(actual: f64, expected: f64) {
        let relative = ((actual - expected) / expected).abs();
        assert!(relative < 1e-6, "{actual} != {expected}");
    }

    #[test]
    fn untouched_drug_has_no_effect() {
        let drug = mefloquine();
        let conc = DrugConcentration::new(0);
        assert_eq!(conc.drug_factor(&drug, 0), 1.0);
    }

    #[test]
    fn oral_dose() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        conc.medicate(&drug, 0.0, 3000.0, MASS_AT_21).unwrap();
        assert_approx(conc.drug_factor(&drug, 0), 0.03174563638523168);
        // factor computation is repeatable
        assert_approx(conc.drug_factor(&drug, 0), 0.03174563638523168);
    }

    #[test]
    fn infusion_over_whole_day() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        conc.medicate_iv(&drug, 0.0, 1.0, 50.0).unwrap();
        assert_approx(conc.drug_factor(&drug, 0), 0.03308874286174752);
    }

    #[test]
    fn infusion_split_in_halves() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        conc.medicate_iv(&drug, 0.0, 0.5, 25.0).unwrap();
        conc.medicate_iv(&drug, 0.5, 0.5, 25.0).unwrap();
        assert_approx(conc.drug_factor(&drug, 0), 0.03308874286174752);
    }

    #[test]
    fn infusion_then_oral() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        conc.medicate_iv(&drug, 0.0, 0.5, 50.0).unwrap();
        conc.medicate(&drug, 0.5, 1500.0, MASS_AT_21).unwrap();
        assert_approx(conc.drug_factor(&drug, 0), 0.03241010934374807);
    }

    #[test]
    fn simultaneous_doses_in_any_order() {
        let drug = mefloquine();
        let mut a = DrugConcentration::new(0);
        a.medicate(&drug, 0.0, 1500.0, MASS_AT_21).unwrap();
        a.medicate_iv(&drug, 0.0, 0.5, 50.0).unwrap();
        let mut b = DrugConcentration::new(0);
        b.medicate_iv(&drug, 0.0, 0.5, 50.0).unwrap();
        b.medicate(&drug, 0.0, 1500.0, MASS_AT_21).unwrap();
        assert_eq!(a.drug_factor(&drug, 0), b.drug_factor(&drug, 0));
    }

    #[test]
    fn overlapping_infusions_match_manual_partition() {
        let drug = mefloquine();
        let pd = drug.pd(0);
        let k = drug.elimination_rate();
        let (qty_a, qty_b) = (10.0, 4.0);

        let mut conc = DrugConcentration::new(0);
        conc.medicate_iv(&drug, 0.1, 0.5, qty_a).unwrap();
        conc.medicate_iv(&drug, 0.3, 0.2, qty_b).unwrap();
        let factor = conc.drug_factor(&drug, 0);

        let rate_a = qty_a / 0.5 / drug.vol_dist;
        let rate_b = qty_b / 0.2 / drug.vol_dist;
        let mut c = 0.0;
        let mut manual = pd.decay_factor(&mut c, k, 0.1);
        manual *= pd.infusion_factor(&mut c, k, rate_a, 0.2);
        manual *= pd.infusion_factor(&mut c, k, rate_a + rate_b, 0.2);
        manual *= pd.infusion_factor(&mut c, k, rate_a, 0.1);
        manual *= pd.decay_factor(&mut c, k, 0.4);

        assert!((factor - manual).abs() < 1e-9);
    }

    #[test]
    fn infusion_spills_into_tomorrow() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        conc.medicate_iv(&drug, 0.5, 1.0, 50.0).unwrap();
        assert!(!conc.update_concentration(&drug));
        let after_first_day = conc.concentration();
        assert!(after_first_day > 0.0);
        assert_eq!(conc.doses().len(), 1);
        assert!(!conc.update_concentration(&drug));
        assert!(conc.concentration() > after_first_day);
        assert!(conc.doses().is_empty());
    }

    #[test]
    fn concentration_decays_until_negligible() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        conc.medicate(&drug, 0.25, 1000.0, MASS_AT_21).unwrap();
        let mut days = 0;
        while !conc.update_concentration(&drug) {
            assert!(conc.concentration() >= 0.0);
            let factor = conc.drug_factor(&drug, 0);
            assert!((0.0..=1.0).contains(&factor));
            days += 1;
            assert!(days < 1000);
        }
        assert!(conc.concentration() < drug.negligible_concentration);
        assert!(days > 10);
    }

    #[test]
    fn invalid_doses_are_rejected() {
        let drug = mefloquine();
        let mut conc = DrugConcentration::new(0);
        assert!(conc.medicate(&drug, 1.0, 100.0, MASS_AT_21).is_err());
        assert!(conc.medicate(&drug, -0.1, 100.0, MASS_AT_21).is_err());
        assert!(conc.medicate(&drug, 0.0, f64::NAN, MASS_AT_21).is_err());
        assert!(conc.medicate(&drug, 0.0, 100.0, 0.0).is_err());
        assert!(conc.medicate_iv(&drug, 0.0, -1.0, 10.0).is_err());
        assert!(conc.doses().is_empty());
    }

    #[test]
    fn resistant_genotype_survives_better() {
        let mut drug = mefloquine();
        let sensitive = drug.phenotypes[0];
        drug.phenotypes.push(PdParameters {
            ic50: 0.27,
            ..sensitive
        });
        let mut conc = DrugConcentration::new(0);
        conc.medicate(&drug, 0.0, 500.0, MASS_AT_21).unwrap();
        assert!(conc.drug_factor(&drug, 1) > conc.drug_factor(&drug, 0));
    }
}
