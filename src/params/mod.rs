//! Simulation parameters and JSON loading

mod data;
pub mod loader;

pub use data::{Frequency, LoanType, SimulationParameters, MAX_LOAN_DURATION_YEARS};
pub use loader::{load_parameter_batch, load_parameters, load_parameters_from_reader};

#[cfg(test)]
pub(crate) use data::fixtures;
