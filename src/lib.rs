pub mod args;
pub mod clinical;
pub mod config;
pub mod core;
pub mod errors;
pub mod host;
pub mod pkpd;
pub mod population;
pub mod random;
pub mod reporting;
pub mod runner;
pub mod scenario;
pub mod transmission;
