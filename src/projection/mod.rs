//! Projection engine for single-loan amortization runs

mod accounts;
mod cashflows;
mod engine;
mod hedging;
mod irr;
mod state;
mod terms;

pub use accounts::{AccountsSummary, ResultAggregator, SimulationOutput};
pub use cashflows::{PathFrame, PeriodRow};
pub use engine::{AmortizationEngine, AmortizationRun, EngineConfig};
pub use hedging::HedgingOverlay;
pub use irr::annualized_irr;
pub use state::{EngineState, LoanStatus, Transition};
pub use terms::LoanTerms;
