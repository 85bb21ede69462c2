//! Price and rate paths consumed by the amortization engine

mod generator;
mod rates;

pub use generator::{
    MarketScenario, MonteCarloEnsemble, PricePath, PricePathGenerator, PricePathMode,
    DEFAULT_MONTE_CARLO_VOLATILITY,
};
pub use rates::{geometric_mean_rate, running_product_rate};
