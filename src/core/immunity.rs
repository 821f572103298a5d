//! Acquired blood-stage immunity.
//!
//! Immunity is tracked through two cumulative exposure measures: the number of infections
//! experienced (`h`) and the integrated parasite density (`Y`). Both decay every step and grow
//! only through infection.

use serde::{Deserialize, Serialize};

/// Immunity parameters as written in a scenario.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ImmunityParameters {
    /// Decay rate of immune effectors per step; zero disables effector decay.
    #[serde(default)]
    pub immune_effector_decay: f64,

    /// Decay rate of asexual immunity per step; zero disables asexual decay.
    #[serde(default)]
    pub asexual_immunity_decay: f64,

    /// Log-scale penalty applied to density exposure after a clinical episode.
    #[serde(default)]
    pub immunity_penalty: f64,

    /// Critical value of cumulative infection count.
    pub cumulative_h_star: f64,

    /// Critical value of cumulative density exposure.
    pub cumulative_y_star: f64,

    /// Maternal protection at birth (log scale).
    pub alpha_m: f64,

    /// Decay rate of maternal protection per year.
    pub decay_m: f64,

    /// Variance of the log innate survival factor.
    pub sigma_i_sq: f64,
}

/// Constants derived once from [`ImmunityParameters`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImmunityConstants {
    pub effector_remain: f64,
    pub asex_remain: f64,
    pub penalty: f64,
    pub h_star: f64,
    pub y_star: f64,
    pub alpha_m: f64,
    pub decay_m: f64,
    pub sigma_i: f64,
}

impl From<&ImmunityParameters> for ImmunityConstants {
    fn from(parameters: &ImmunityParameters) -> Self {
        Self {
            effector_remain: (-parameters.immune_effector_decay).exp(),
            asex_remain: (-parameters.asexual_immunity_decay).exp(),
            penalty: 1.0 - parameters.immunity_penalty.exp(),
            h_star: parameters.cumulative_h_star,
            y_star: parameters.cumulative_y_star,
            alpha_m: 1.0 - (-parameters.alpha_m).exp(),
            decay_m: parameters.decay_m,
            sigma_i: parameters.sigma_i_sq.sqrt(),
        }
    }
}

impl ImmunityConstants {
    /// Exponent applied to an infection's expected density.
    ///
    /// `exposure_j` is the density exposure caused by the infection itself, which does not count
    /// towards immunity against it.
    pub fn survival_factor(
        &self,
        age_years: f64,
        cumulative_h: f64,
        cumulative_y: f64,
        exposure_j: f64,
    ) -> f64 {
        let (d_y, d_h) = if cumulative_h <= 1.0 {
            (1.0, 1.0)
        } else {
            (
                1.0 / (1.0 + (cumulative_y - exposure_j) / self.y_star),
                1.0 / (1.0 + (cumulative_h - 1.0) / self.h_star),
            )
        };
        let d_a = 1.0 - self.alpha_m * (-self.decay_m * age_years).exp();
        (d_y * d_h * d_a).min(1.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ImmunityTracker {
    cumulative_h: f64,
    cumulative_y: f64,
    cumulative_y_lag: f64,
}

impl ImmunityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cumulative_h(&self) -> f64 {
        self.cumulative_h
    }

    pub fn cumulative_y(&self) -> f64 {
        self.cumulative_y
    }

    pub fn cumulative_y_lag(&self) -> f64 {
        self.cumulative_y_lag
    }

    /// Apply one step of decay and take the lag snapshot.
    pub fn decay(&mut self, constants: &ImmunityConstants) {
        if constants.effector_remain < 1.0 {
            self.cumulative_h *= constants.effector_remain;
            self.cumulative_y *= constants.effector_remain;
        }
        if constants.asex_remain < 1.0 {
            let remain = constants.asex_remain;
            self.cumulative_h *=
                remain / (1.0 + (self.cumulative_h * (1.0 - remain) / constants.h_star));
            self.cumulative_y *=
                remain / (1.0 + (self.cumulative_y * (1.0 - remain) / constants.y_star));
        }
        self.cumulative_y_lag = self.cumulative_y;
    }

    pub fn add_infections(&mut self, count: u32) {
        self.cumulative_h += count as f64;
    }

    pub fn add_exposure(&mut self, density_days: f64) {
        self.cumulative_y += density_days;
    }

    /// Blunt density exposure gained since the last snapshot after a clinical episode.
    pub fn penalise(&mut self, penalty: f64) {
        self.cumulative_y =
            self.cumulative_y_lag - penalty * (self.cumulative_y - self.cumulative_y_lag);
        if self.cumulative_y < 0.0 {
            self.cumulative_y = 0.0;
        }
    }
}
