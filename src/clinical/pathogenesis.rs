//! Classification of a host's step into clinical events.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::outcome::Diagnosis;
use crate::core::age_table::AgeTable;
use crate::core::time::Clock;
use crate::random::RandomStream;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Morbidity {
    None,
    NonMalariaFever,
    Uncomplicated,
    Severe,
    Coinfection,
}

impl Morbidity {
    pub fn diagnosis(&self) -> Option<Diagnosis> {
        match self {
            Morbidity::None => None,
            Morbidity::NonMalariaFever => Some(Diagnosis::NonMalariaFever),
            Morbidity::Uncomplicated => Some(Diagnosis::Uncomplicated),
            Morbidity::Severe => Some(Diagnosis::Severe),
            Morbidity::Coinfection => Some(Diagnosis::Coinfection),
        }
    }

    pub fn is_malaria(&self) -> bool {
        matches!(
            self,
            Morbidity::Uncomplicated | Morbidity::Severe | Morbidity::Coinfection
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorbidityEvent {
    pub state: Morbidity,
    /// The event puts the host at risk of an indirect malaria death.
    pub indirect: bool,
}

impl MorbidityEvent {
    pub fn none() -> Self {
        Self {
            state: Morbidity::None,
            indirect: false,
        }
    }
}

/// What the classification sees of a host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorbidityInput {
    pub age_years: f64,
    pub total_density: f64,
    pub step_max_density: f64,
    pub comorbidity_factor: f64,
}

/// Per-host state of the classification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PathogenesisState {
    pyrogenic_threshold: f64,
}

impl PathogenesisState {
    pub fn pyrogenic_threshold(&self) -> f64 {
        self.pyrogenic_threshold
    }
}

pub trait MorbidityModel: Send + Sync + fmt::Debug {
    fn initial_state(&self) -> PathogenesisState;

    fn classify(
        &self,
        state: &mut PathogenesisState,
        input: &MorbidityInput,
        rng: &mut dyn RandomStream,
    ) -> MorbidityEvent;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum EpisodeModel {
    /// Episode probability rises with the step maximum density relative to the threshold.
    #[default]
    Pyrogenic,
    /// An episode happens exactly when the step maximum exceeds the threshold.
    Predetermined,
    /// Episode incidence as a power of total density.
    Mueller {
        rate_multiplier: f64,
        density_exponent: f64,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathogenesisParameters {
    #[serde(default)]
    pub episodes: EpisodeModel,
    /// Pyrogenic threshold of a newborn.
    pub y_star_0: f64,
    /// Half-life in years of the pyrogenic threshold.
    pub y_star_half_life: f64,
    pub y_star_1: f64,
    pub y_star_sq: f64,
    pub alpha: f64,
    pub severe_malaria_threshold: f64,
    pub comorbidity_intercept: f64,
    pub indirect_risk_cofactor: f64,
    pub critical_age_comorbidity: f64,
    /// Probability of a non-malaria fever per step, by age.
    #[serde(default)]
    pub nmf_incidence: Option<AgeTable>,
}

const PYROGENIC_SUBSTEPS: u32 = 11;

/// Pyrogenic-threshold classification with severe, co-infection and indirect-risk draws.
#[derive(Debug, Clone)]
pub struct Pathogenesis {
    episodes: EpisodeModel,
    clock: Clock,
    initial_threshold: f64,
    smu_y: f64,
    y_star_1: f64,
    y_star_sq: f64,
    alpha: f64,
    severe_threshold: f64,
    comorbidity_intercept: f64,
    indirect_risk: f64,
    critical_age: f64,
    nmf_incidence: Option<AgeTable>,
}

impl Pathogenesis {
    pub fn new(parameters: &PathogenesisParameters, clock: Clock) -> Self {
        Self {
            episodes: parameters.episodes,
            clock,
            initial_threshold: parameters.y_star_0,
            smu_y: -(0.5f64.ln()) / (clock.steps_per_year() * parameters.y_star_half_life),
            y_star_1: parameters.y_star_1,
            y_star_sq: parameters.y_star_sq,
            alpha: parameters.alpha,
            severe_threshold: parameters.severe_malaria_threshold + 1.0,
            comorbidity_intercept: 1.0 - (-parameters.comorbidity_intercept).exp(),
            indirect_risk: 1.0 - (-parameters.indirect_risk_cofactor).exp(),
            critical_age: parameters.critical_age_comorbidity,
            nmf_incidence: parameters.nmf_incidence.clone(),
        }
    }

    fn update_threshold(&self, state: &mut PathogenesisState, total_density: f64) {
        let delta = 1.0 / PYROGENIC_SUBSTEPS as f64;
        let interval = self.clock.interval_days();
        for _ in 0..PYROGENIC_SUBSTEPS {
            let threshold = state.pyrogenic_threshold;
            state.pyrogenic_threshold += total_density * self.alpha * interval * delta
                / ((self.y_star_1 + total_density) * (self.y_star_sq + threshold))
                - self.smu_y * threshold * delta;
        }
    }

    fn episode_probability(&self, state: &mut PathogenesisState, input: &MorbidityInput) -> f64 {
        match self.episodes {
            EpisodeModel::Pyrogenic => {
                self.update_threshold(state, input.total_density);
                1.0 - 1.0 / (1.0 + input.step_max_density / state.pyrogenic_threshold)
            }
            EpisodeModel::Predetermined => {
                self.update_threshold(state, input.total_density);
                if input.step_max_density > state.pyrogenic_threshold {
                    1.0
                } else {
                    0.0
                }
            }
            EpisodeModel::Mueller {
                rate_multiplier,
                density_exponent,
            } => {
                let incidence = rate_multiplier
                    * input.total_density.powf(density_exponent)
                    * self.clock.years_per_interval();
                1.0 - (-incidence).exp()
            }
        }
    }

    fn age_factor(&self, age_years: f64) -> f64 {
        1.0 / (1.0 + age_years / self.critical_age)
    }
}

impl MorbidityModel for Pathogenesis {
    fn initial_state(&self) -> PathogenesisState {
        PathogenesisState {
            pyrogenic_threshold: self.initial_threshold,
        }
    }

    fn classify(
        &self,
        state: &mut PathogenesisState,
        input: &MorbidityInput,
        rng: &mut dyn RandomStream,
    ) -> MorbidityEvent {
        let p_episode = self.episode_probability(state, input);
        let mut event = MorbidityEvent::none();

        if rng.uniform01() < p_episode {
            let p_severe = 1.0 - 1.0 / (1.0 + input.step_max_density / self.severe_threshold);
            event.state = if rng.uniform01() < p_severe {
                Morbidity::Severe
            } else {
                let p_coinfection = self.comorbidity_intercept
                    * self.age_factor(input.age_years)
                    * input.comorbidity_factor;
                if rng.uniform01() < p_coinfection {
                    Morbidity::Coinfection
                } else {
                    Morbidity::Uncomplicated
                }
            };

            let p_indirect =
                self.indirect_risk * self.age_factor(input.age_years) * input.comorbidity_factor;
            event.indirect = rng.uniform01() < p_indirect;
        } else if let Some(incidence) = &self.nmf_incidence {
            if rng.uniform01() < incidence.eval(input.age_years) {
                event.state = Morbidity::NonMalariaFever;
            }
        }
        event
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::random::ScriptedStream;

    pub(crate) fn parameters() -> PathogenesisParameters {
        PathogenesisParameters {
            episodes: EpisodeModel::Pyrogenic,
            y_star_0: 296.3,
            y_star_half_life: 0.275,
            y_star_1: 0.596,
            y_star_sq: 0.9,
            alpha: 142_601.9,
            severe_malaria_threshold: 784_455.6,
            comorbidity_intercept: 0.0968,
            indirect_risk_cofactor: 0.0180,
            critical_age_comorbidity: 0.117,
            nmf_incidence: None,
        }
    }

    fn input(density: f64) -> MorbidityInput {
        MorbidityInput {
            age_years: 5.0,
            total_density: density,
            step_max_density: density,
            comorbidity_factor: 1.0,
        }
    }

    #[test]
    fn no_density_no_episode() {
        let model = Pathogenesis::new(&parameters(), Clock::new(5).unwrap());
        let mut state = model.initial_state();
        let mut rng = ScriptedStream::uniforms(&[0.0]);
        let event = model.classify(&mut state, &input(0.0), &mut rng);
        assert_eq!(event, MorbidityEvent::none());
        assert_eq!(rng.remaining_uniforms(), 0);
        // the threshold decays without density
        assert!(state.pyrogenic_threshold() < 296.3);
    }

    #[test]
    fn threshold_rises_with_density() {
        let model = Pathogenesis::new(&parameters(), Clock::new(5).unwrap());
        let mut state = model.initial_state();
        let mut rng = ScriptedStream::uniforms(&[0.999_999, 0.999_999]);
        model.classify(&mut state, &input(1e4), &mut rng);
        assert!(state.pyrogenic_threshold() > 296.3);
    }

    #[test]
    fn draw_order() {
        let model = Pathogenesis::new(&parameters(), Clock::new(5).unwrap());
        let mut state = model.initial_state();
        // episode, not severe, not co-infected, indirect
        let mut rng = ScriptedStream::uniforms(&[0.0, 0.99, 0.99, 0.0]);
        let event = model.classify(&mut state, &input(1e5), &mut rng);
        assert_eq!(event.state, Morbidity::Uncomplicated);
        assert!(event.indirect);
        assert_eq!(rng.remaining_uniforms(), 0);

        // episode, severe, no indirect risk
        let mut rng = ScriptedStream::uniforms(&[0.0, 0.0, 0.99]);
        let event = model.classify(&mut state, &input(1e5), &mut rng);
        assert_eq!(event.state, Morbidity::Severe);
        assert!(!event.indirect);
        assert_eq!(rng.remaining_uniforms(), 0);
    }

    #[test]
    fn non_malaria_fevers() {
        let mut parameters = parameters();
        parameters.nmf_incidence = Some(AgeTable::constant(0.5));
        let model = Pathogenesis::new(&parameters, Clock::new(5).unwrap());
        let mut state = model.initial_state();
        let mut rng = ScriptedStream::uniforms(&[0.5, 0.4]);
        let event = model.classify(&mut state, &input(0.0), &mut rng);
        assert_eq!(event.state, Morbidity::NonMalariaFever);
        assert!(!event.indirect);
    }

    #[test]
    fn predetermined_episodes() {
        let mut parameters = parameters();
        parameters.episodes = EpisodeModel::Predetermined;
        let model = Pathogenesis::new(&parameters, Clock::new(5).unwrap());
        let mut state = model.initial_state();
        let mut rng = ScriptedStream::uniforms(&[0.999, 0.999, 0.999, 0.999]);
        let event = model.classify(&mut state, &input(1e6), &mut rng);
        assert_eq!(event.state, Morbidity::Uncomplicated);
    }

    #[test]
    fn mueller_episodes() {
        let mut parameters = parameters();
        parameters.episodes = EpisodeModel::Mueller {
            rate_multiplier: 0.0,
            density_exponent: 1.0,
        };
        let model = Pathogenesis::new(&parameters, Clock::new(5).unwrap());
        let mut state = model.initial_state();
        let mut rng = ScriptedStream::uniforms(&[0.0]);
        let event = model.classify(&mut state, &input(1e6), &mut rng);
        assert_eq!(event.state, Morbidity::None);
        assert_eq!(state.pyrogenic_threshold(), 296.3);
    }
}
