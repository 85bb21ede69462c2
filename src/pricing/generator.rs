//! Price-path generation from historical replay or Monte Carlo simulation

use std::sync::Arc;

use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use super::rates::geometric_mean_rate;
use crate::error::{EngineError, EngineResult};
use crate::history::HistoricalSeries;
use crate::params::{Frequency, SimulationParameters};

/// Default annual volatility of simulated index returns
pub const DEFAULT_MONTE_CARLO_VOLATILITY: f64 = 0.15;

/// Source of the equity price path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePathMode {
    /// Replay the historical index from `start_year`
    Historical,
    /// Simulate the index; the short rate is still replayed from history
    MonteCarlo { seed: u64 },
}

/// Index levels at origination and at the end of each period
///
/// A loan of `n` periods has `n + 1` levels. `levels[0]` is the origination
/// level and period `t` (1-based) ends at `levels[t]`, so its return is
/// `levels[t] / levels[t - 1] - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePath {
    pub path_id: u32,
    pub levels: Vec<f64>,
}

impl PricePath {
    /// Return realized over period `t`; zero at origination
    pub fn period_return(&self, t: usize) -> f64 {
        if t == 0 {
            0.0
        } else {
            self.levels[t] / self.levels[t - 1] - 1.0
        }
    }

    /// Number of periods the path covers
    pub fn periods(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Everything the engine needs from the market for one run
///
/// The rate window and diagnostics are shared between the paths of an
/// ensemble.
#[derive(Debug, Clone)]
pub struct MarketScenario {
    pub price_path: PricePath,
    /// Annualized benchmark short rate per period
    pub rates: Arc<[f64]>,
    /// Geometric mean of the rate window
    pub avg_cash_rate: f64,
    /// Offset of the window into the period-resampled history
    pub start_offset: usize,
    /// Periods whose closing level was filled with the last observation
    pub padded_periods: usize,
    /// Non-fatal anomalies met while building the window
    pub debug_msgs: Arc<[String]>,
}

/// A sliced rate/index window
#[derive(Debug, Clone)]
struct HistoricalWindow {
    rates: Vec<f64>,
    levels: Vec<f64>,
    start_offset: usize,
    padded_periods: usize,
    debug_msgs: Vec<String>,
}

/// Shared inputs of a Monte Carlo ensemble
///
/// Paths are drawn on demand from `(seed, path_id)`, so a caller can build
/// each scenario inside its own task and drop it after the run.
#[derive(Debug, Clone)]
pub struct MonteCarloEnsemble {
    rates: Arc<[f64]>,
    avg_cash_rate: f64,
    start_offset: usize,
    padded_periods: usize,
    debug_msgs: Arc<[String]>,
    seed: u64,
    drift: f64,
    diffusion: f64,
}

impl MonteCarloEnsemble {
    /// Periods per path
    pub fn periods(&self) -> usize {
        self.rates.len()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Build the scenario of one path
    pub fn scenario(&self, path_id: u32) -> MarketScenario {
        MarketScenario {
            price_path: PricePath {
                path_id,
                levels: self.simulate_levels(path_id),
            },
            rates: Arc::clone(&self.rates),
            avg_cash_rate: self.avg_cash_rate,
            start_offset: self.start_offset,
            padded_periods: self.padded_periods,
            debug_msgs: Arc::clone(&self.debug_msgs),
        }
    }

    /// Geometric Brownian motion normalized to 1.0 at origination
    ///
    /// One increment per period follows the origination level.
    fn simulate_levels(&self, path_id: u32) -> Vec<f64> {
        let mut rng = path_rng(self.seed, path_id);
        let periods = self.periods();

        let mut levels = Vec::with_capacity(periods + 1);
        let mut level = 1.0_f64;
        levels.push(level);
        for _ in 0..periods {
            let z: f64 = StandardNormal.sample(&mut rng);
            level *= (self.drift + self.diffusion * z).exp();
            levels.push(level);
        }
        levels
    }
}

/// Builds market scenarios for runs against one shared history
pub struct PricePathGenerator<'a> {
    series: &'a HistoricalSeries,
    frequency: Frequency,
    volatility: f64,
}

impl<'a> PricePathGenerator<'a> {
    pub fn new(series: &'a HistoricalSeries, frequency: Frequency, volatility: f64) -> Self {
        Self {
            series,
            frequency,
            volatility,
        }
    }

    /// Generate the scenario for a single run
    pub fn generate(
        &self,
        params: &SimulationParameters,
        mode: PricePathMode,
    ) -> EngineResult<MarketScenario> {
        match mode {
            PricePathMode::Historical => {
                let window = self.historical_window(params)?;
                let avg_cash_rate = geometric_mean_rate(&window.rates)?;
                Ok(MarketScenario {
                    price_path: PricePath {
                        path_id: 0,
                        levels: window.levels,
                    },
                    rates: window.rates.into(),
                    avg_cash_rate,
                    start_offset: window.start_offset,
                    padded_periods: window.padded_periods,
                    debug_msgs: window.debug_msgs.into(),
                })
            }
            PricePathMode::MonteCarlo { seed } => {
                Ok(self.monte_carlo_ensemble(params, seed)?.scenario(0))
            }
        }
    }

    /// Prepare a Monte Carlo ensemble sharing one historical rate window
    ///
    /// The continuous drift is `ln(1 + appreciation)` so the expected annual
    /// growth equals the configured appreciation.
    pub fn monte_carlo_ensemble(
        &self,
        params: &SimulationParameters,
        seed: u64,
    ) -> EngineResult<MonteCarloEnsemble> {
        let window = self.historical_window(params)?;
        let avg_cash_rate = geometric_mean_rate(&window.rates)?;

        let dt = 1.0 / self.frequency.periods_per_year() as f64;
        let mu = (1.0 + params.annual_house_price_appreciation).ln();
        let sigma = self.volatility;

        Ok(MonteCarloEnsemble {
            rates: window.rates.into(),
            avg_cash_rate,
            start_offset: window.start_offset,
            padded_periods: window.padded_periods,
            debug_msgs: window.debug_msgs.into(),
            seed,
            drift: (mu - 0.5 * sigma * sigma) * dt,
            diffusion: sigma * dt.sqrt(),
        })
    }

    /// Generate `paths` Monte Carlo scenarios sharing one historical rate window
    ///
    /// Path `i` is seeded from `(seed, i)` only, so any single path can be
    /// reproduced without regenerating the ensemble.
    pub fn generate_ensemble(
        &self,
        params: &SimulationParameters,
        seed: u64,
        paths: u32,
    ) -> EngineResult<Vec<MarketScenario>> {
        let ensemble = self.monte_carlo_ensemble(params, seed)?;
        Ok((0..paths).map(|path_id| ensemble.scenario(path_id)).collect())
    }

    /// Slice the rate and index series for the loan's window
    ///
    /// A loan of `n` periods takes `n` rates and `n + 1` index levels, the
    /// first level being the origination observation. Out-of-range start
    /// years are clamped; a series shorter than that is padded with its last
    /// observation. Both are recorded, never fatal.
    fn historical_window(&self, params: &SimulationParameters) -> EngineResult<HistoricalWindow> {
        let required = params.required_periods(self.frequency);
        let observations = required + 1;
        let available = self.series.period_len(self.frequency);
        let mut debug_msgs = Vec::new();

        if available == 0 {
            return Err(EngineError::InsufficientHistory {
                required,
                available,
            });
        }

        let raw_offset = self
            .series
            .period_offset_for_year(self.frequency, params.start_year);

        let (start_offset, taken) = if available < observations {
            let msg = format!(
                "history has {} observations but {} are required; using offset 0 and padding {} periods with the last observation",
                available,
                observations,
                observations - available
            );
            log::warn!("{}", msg);
            debug_msgs.push(msg);
            (0usize, available)
        } else {
            let max_offset = (available - observations) as i64;
            let clamped = raw_offset.clamp(0, max_offset);
            if clamped != raw_offset {
                let msg = format!(
                    "start year {} maps to offset {} outside [0, {}]; clamped to {}",
                    params.start_year, raw_offset, max_offset, clamped
                );
                log::warn!("{}", msg);
                debug_msgs.push(msg);
            }
            (clamped as usize, observations)
        };

        let levels_end = start_offset + taken;
        let rates_end = start_offset + taken.min(required);
        let mut levels: Vec<f64> = (start_offset..levels_end)
            .map(|period| self.series.level_at(self.frequency, period))
            .collect();
        let mut rates: Vec<f64> = (start_offset..rates_end)
            .map(|period| self.series.rate_at(self.frequency, period))
            .collect();

        let padded_periods = observations - taken;
        if padded_periods > 0 {
            let last_rate = rates.last().copied().unwrap_or(0.0);
            let last_level = levels.last().copied().unwrap_or(1.0);
            rates.resize(required, last_rate);
            levels.resize(observations, last_level);
        }

        Ok(HistoricalWindow {
            rates,
            levels,
            start_offset,
            padded_periods,
            debug_msgs,
        })
    }
}

/// Independent PCG stream per (seed, path)
fn path_rng(seed: u64, path_id: u32) -> Pcg64Mcg {
    let derived = seed ^ (path_id as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    Pcg64Mcg::seed_from_u64(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::fixtures::synthetic_history;
    use crate::params::fixtures::healthy_params;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_historical_slice_at_start_year() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let params = healthy_params(); // 1990 start, 10 years

        let scenario = generator.generate(&params, PricePathMode::Historical).unwrap();
        assert_eq!(scenario.start_offset, 0);
        assert_eq!(scenario.price_path.len(), 121);
        assert_eq!(scenario.price_path.periods(), 120);
        assert_eq!(scenario.rates.len(), 120);
        assert_eq!(scenario.padded_periods, 0);
        assert!(scenario.debug_msgs.is_empty());
        assert_eq!(scenario.price_path.levels[0], series.monthly_levels()[0]);
        assert_eq!(scenario.price_path.levels[120], series.monthly_levels()[120]);
        assert_eq!(scenario.rates[119], series.monthly_rates()[119]);
    }

    #[test]
    fn test_offset_follows_start_year() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let mut params = healthy_params();
        params.start_year = 1995;

        let scenario = generator.generate(&params, PricePathMode::Historical).unwrap();
        assert_eq!(scenario.start_offset, 60);
        assert_eq!(scenario.rates[0], series.monthly_rates()[60]);
    }

    #[test]
    fn test_late_start_year_is_clamped() {
        let series = synthetic_history(180);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let mut params = healthy_params();
        params.start_year = 2010;

        // 180 observations leave room for offsets up to 180 - 121
        let scenario = generator.generate(&params, PricePathMode::Historical).unwrap();
        assert_eq!(scenario.start_offset, 59);
        assert_eq!(scenario.price_path.levels[120], series.monthly_levels()[179]);
        assert_eq!(scenario.debug_msgs.len(), 1);
        assert!(scenario.debug_msgs[0].contains("clamped"));
    }

    #[test]
    fn test_short_history_is_padded() {
        let series = synthetic_history(100);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let params = healthy_params();

        let scenario = generator.generate(&params, PricePathMode::Historical).unwrap();
        assert_eq!(scenario.start_offset, 0);
        assert_eq!(scenario.padded_periods, 21);
        assert_eq!(scenario.price_path.len(), 121);
        assert_eq!(scenario.price_path.levels[99], series.monthly_levels()[99]);
        assert_eq!(scenario.price_path.levels[120], series.monthly_levels()[99]);
        assert_eq!(scenario.rates.len(), 120);
        assert_eq!(scenario.rates[119], series.monthly_rates()[99]);
        assert_eq!(scenario.debug_msgs.len(), 1);
        assert!(scenario.debug_msgs[0].contains("padding 21 periods"));
    }

    #[test]
    fn test_quarterly_window() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Quarterly, 0.15);
        let scenario = generator
            .generate(&healthy_params(), PricePathMode::Historical)
            .unwrap();
        assert_eq!(scenario.price_path.len(), 41);
        assert_eq!(scenario.rates.len(), 40);
        assert_eq!(scenario.price_path.levels[1], series.monthly_levels()[3]);
    }

    #[test]
    fn test_monte_carlo_reproducible() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let params = healthy_params();

        let a = generator.generate(&params, PricePathMode::MonteCarlo { seed: 42 }).unwrap();
        let b = generator.generate(&params, PricePathMode::MonteCarlo { seed: 42 }).unwrap();
        let c = generator.generate(&params, PricePathMode::MonteCarlo { seed: 43 }).unwrap();

        assert_eq!(a.price_path, b.price_path);
        assert_ne!(a.price_path, c.price_path);
        assert_eq!(a.price_path.levels[0], 1.0);
        assert_eq!(a.rates, b.rates);
    }

    #[test]
    fn test_monte_carlo_first_period_moves() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let params = healthy_params();

        let scenario = generator.generate(&params, PricePathMode::MonteCarlo { seed: 11 }).unwrap();
        let path = &scenario.price_path;
        assert_eq!(path.len(), params.required_periods(Frequency::Monthly) + 1);
        assert_eq!(path.levels[0], 1.0);
        assert_ne!(path.levels[1], 1.0);
        assert_ne!(path.period_return(1), 0.0);
    }

    #[test]
    fn test_ensemble_shares_rate_window() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let ensemble = generator.monte_carlo_ensemble(&healthy_params(), 5).unwrap();

        let a = ensemble.scenario(0);
        let b = ensemble.scenario(1);
        assert!(Arc::ptr_eq(&a.rates, &b.rates));
        assert_eq!(ensemble.periods(), 120);
        assert_eq!(a.price_path.path_id, 0);
        assert_eq!(b.price_path.path_id, 1);
        assert_eq!(ensemble.scenario(1).price_path, b.price_path);
    }

    #[test]
    fn test_ensemble_paths_are_independent_and_reproducible() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let params = healthy_params();

        let ensemble = generator.generate_ensemble(&params, 7, 4).unwrap();
        assert_eq!(ensemble.len(), 4);
        assert_ne!(ensemble[0].price_path.levels, ensemble[1].price_path.levels);

        let again = generator.generate_ensemble(&params, 7, 2).unwrap();
        assert_eq!(again[1].price_path, ensemble[1].price_path);
    }

    #[test]
    fn test_monte_carlo_drift_matches_appreciation() {
        let series = synthetic_history(480);
        let generator = PricePathGenerator::new(&series, Frequency::Monthly, 0.15);
        let mut params = healthy_params();
        params.annual_house_price_appreciation = 0.04;

        let ensemble = generator.generate_ensemble(&params, 2024, 4000).unwrap();
        let mean_terminal: f64 = ensemble
            .iter()
            .map(|s| *s.price_path.levels.last().unwrap())
            .sum::<f64>()
            / ensemble.len() as f64;

        // 120 monthly steps of expected growth 4% a year
        let expected = 1.04_f64.powf(10.0);
        assert!(
            (mean_terminal / expected - 1.0).abs() < 0.05,
            "mean terminal {} vs expected {}",
            mean_terminal,
            expected
        );
    }

    #[test]
    fn test_period_return() {
        let path = PricePath {
            path_id: 0,
            levels: vec![100.0, 110.0, 99.0],
        };
        assert_eq!(path.period_return(0), 0.0);
        assert_abs_diff_eq!(path.period_return(1), 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(path.period_return(2), -0.10, epsilon = 1e-12);
    }
}
