//! EPM Engine - cash-flow simulation for equity-preservation mortgages
//!
//! This library provides:
//! - Historical short-rate and index series, loaded once and shared
//! - Price paths from historical replay or Monte Carlo simulation
//! - Loan-term normalization and a per-period amortization state machine
//!   with payment holidays, interest deficits and unit liquidation
//! - Optional hedging overlay on portfolio returns
//! - Batch and ensemble runners with a fingerprint-keyed cache
//! - Streaming per-period statistics over large ensembles
//! - Cross-implementation accuracy checks

pub mod cache;
pub mod ensemble;
pub mod error;
pub mod history;
pub mod params;
pub mod pricing;
pub mod projection;
pub mod scenario;
pub mod verify;

// Re-export commonly used types
pub use ensemble::EnsembleSummary;
pub use error::{EngineError, EngineResult};
pub use history::HistoricalSeries;
pub use params::{Frequency, LoanType, SimulationParameters};
pub use pricing::{MarketScenario, PricePath, PricePathMode};
pub use projection::{EngineConfig, PathFrame, PeriodRow, SimulationOutput};
pub use scenario::{RunRequest, ScenarioRunner};
