//! Within-host state and the numerical building blocks it is made of.

pub mod age_table;
pub mod heterogeneity;
pub mod immunity;
pub mod infection;
pub mod infectiousness;
pub mod lagged;
pub mod time;
pub mod vaccine;
pub mod within_host;
