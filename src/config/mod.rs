//! Configuration data structures for scenario setups.

mod parameters;
mod schedule;
mod settings;

pub use parameters::Parameters;
pub use schedule::{Schedule, ScheduleEvent, ScheduleRecord};
pub use settings::Settings;

#[cfg(test)]
pub(crate) mod tests {
    pub(crate) use super::parameters::tests::parameters;
    pub(crate) use super::settings::tests::settings;
}
