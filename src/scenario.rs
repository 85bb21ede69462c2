//! Scenario runner for single runs, batches and Monte Carlo ensembles
//!
//! Loads the history once, then runs any number of simulations against the
//! shared series without re-reading CSV files.

use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{fingerprint, RunCache};
use crate::ensemble::EnsembleSummary;
use crate::error::EngineResult;
use crate::history::{
    load_history, shared_history, HistoricalSeries, RateUnit, DEFAULT_HISTORY_PATH,
    DEFAULT_INDEX_FILE, DEFAULT_RATE_FILE,
};
use crate::params::SimulationParameters;
use crate::pricing::{MarketScenario, PricePathGenerator, PricePathMode};
use crate::projection::{
    AmortizationEngine, EngineConfig, LoanTerms, ResultAggregator, SimulationOutput,
};

/// One run in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub params: SimulationParameters,
    pub mode: PricePathMode,
}

/// Pre-loaded runner sharing one history across runs
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::from_config(EngineConfig::default())?;
/// let output = runner.run(&params, PricePathMode::Historical)?;
/// ```
#[derive(Debug)]
pub struct ScenarioRunner {
    config: EngineConfig,
    history: Arc<HistoricalSeries>,
    cache: Option<Mutex<RunCache>>,
}

impl ScenarioRunner {
    /// Create a runner over an already loaded history
    pub fn new(history: Arc<HistoricalSeries>, config: EngineConfig) -> Self {
        Self {
            config,
            history,
            cache: None,
        }
    }

    /// Create a runner, loading the history the config points at
    ///
    /// The default files go through the process-wide store so every runner
    /// in the process shares one copy.
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        let default_files = config.rate_file == DEFAULT_RATE_FILE
            && config.index_file == DEFAULT_INDEX_FILE
            && config.rate_unit == RateUnit::Fraction;
        if default_files && config.history_dir.as_path() == std::path::Path::new(DEFAULT_HISTORY_PATH) {
            log::info!("using the bundled illustrative history in {}", DEFAULT_HISTORY_PATH);
        }
        let history = if default_files {
            shared_history(&config.history_dir)?
        } else {
            Arc::new(load_history(
                &config.history_dir,
                &config.rate_file,
                &config.index_file,
                config.rate_unit,
            )?)
        };
        Ok(Self::new(history, config))
    }

    /// Remember finished runs by fingerprint, up to the default capacity
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(RunCache::new()));
        self
    }

    /// Remember at most `capacity` finished runs
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Some(Mutex::new(RunCache::with_capacity(capacity)));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<HistoricalSeries> {
        &self.history
    }

    fn generator(&self) -> PricePathGenerator<'_> {
        PricePathGenerator::new(
            &self.history,
            self.config.frequency,
            self.config.monte_carlo_volatility,
        )
    }

    /// Build the market scenario for a run
    pub fn scenario(
        &self,
        params: &SimulationParameters,
        mode: PricePathMode,
    ) -> EngineResult<MarketScenario> {
        params.validate()?;
        self.generator().generate(params, mode)
    }

    /// Run one simulation end to end
    pub fn run(
        &self,
        params: &SimulationParameters,
        mode: PricePathMode,
    ) -> EngineResult<SimulationOutput> {
        log::debug!(
            "run start: start_year={} duration={} mode={:?}",
            params.start_year,
            params.loan_duration,
            mode
        );
        let scenario = self.scenario(params, mode)?;
        self.run_scenario(params, &scenario)
    }

    /// Run the engine over a prebuilt market scenario
    pub fn run_scenario(
        &self,
        params: &SimulationParameters,
        scenario: &MarketScenario,
    ) -> EngineResult<SimulationOutput> {
        params.validate()?;
        self.simulate(params, scenario)
    }

    /// Engine and aggregation for parameters already validated
    fn simulate(
        &self,
        params: &SimulationParameters,
        scenario: &MarketScenario,
    ) -> EngineResult<SimulationOutput> {
        let frequency = self.config.frequency;
        let terms = LoanTerms::normalize(params, scenario.avg_cash_rate, frequency)?;
        let run = AmortizationEngine::new(params, &terms, frequency).run(scenario)?;
        Ok(ResultAggregator::new(params, &terms, frequency).assemble(scenario, &run))
    }

    /// Run through the cache when one is enabled
    pub fn run_cached(
        &self,
        params: &SimulationParameters,
        mode: PricePathMode,
    ) -> EngineResult<Arc<SimulationOutput>> {
        let Some(cache) = &self.cache else {
            return self.run(params, mode).map(Arc::new);
        };

        let key = fingerprint(params, mode, &self.config)?;
        if let Some(hit) = lock(cache).lookup(key) {
            return Ok(hit);
        }
        let output = Arc::new(self.run(params, mode)?);
        lock(cache).insert(key, Arc::clone(&output));
        Ok(output)
    }

    /// Run many independent requests in parallel
    ///
    /// Each result stands alone; one failed run does not affect the others.
    pub fn run_batch(&self, requests: &[RunRequest]) -> Vec<EngineResult<Arc<SimulationOutput>>> {
        let results: Vec<_> = requests
            .par_iter()
            .map(|request| self.run_cached(&request.params, request.mode))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        log::info!(
            "batch finished: {} runs, {} failed",
            results.len(),
            failed
        );
        results
    }

    /// Run `paths` Monte Carlo paths sharing one historical rate window
    ///
    /// Every output is kept; use [`Self::summarize_ensemble`] for large
    /// ensembles. Window errors fail the whole ensemble; per-path divergence
    /// is reported per path.
    pub fn run_ensemble(
        &self,
        params: &SimulationParameters,
        seed: u64,
        paths: u32,
    ) -> EngineResult<Vec<EngineResult<SimulationOutput>>> {
        params.validate()?;
        let ensemble = self.generator().monte_carlo_ensemble(params, seed)?;
        Ok((0..paths)
            .into_par_iter()
            .map(|path_id| self.simulate(params, &ensemble.scenario(path_id)))
            .collect())
    }

    /// Run `paths` Monte Carlo paths and fold them into per-period totals
    ///
    /// Each path is generated, run and dropped inside its own task, so memory
    /// stays flat in the number of paths.
    pub fn summarize_ensemble(
        &self,
        params: &SimulationParameters,
        seed: u64,
        paths: u32,
    ) -> EngineResult<EnsembleSummary> {
        params.validate()?;
        let ensemble = self.generator().monte_carlo_ensemble(params, seed)?;
        let periods = ensemble.periods();

        let summary = (0..paths)
            .into_par_iter()
            .fold(
                || EnsembleSummary::new(periods),
                |acc, path_id| acc.record(self.simulate(params, &ensemble.scenario(path_id))),
            )
            .reduce(|| EnsembleSummary::new(periods), EnsembleSummary::merge);

        log::info!(
            "ensemble finished: {} runs, {} diverged, {} other failures",
            summary.runs(),
            summary.diverged,
            summary.failed
        );
        Ok(summary)
    }

    /// Hits, misses and hit rate of the run cache, when enabled
    pub fn cache_stats(&self) -> Option<(u64, u64, f64)> {
        self.cache.as_ref().map(|cache| {
            let cache = lock(cache);
            (cache.cache_hits, cache.cache_misses, cache.hit_rate())
        })
    }
}

/// A poisoned lock only means another run panicked; the map is still valid
fn lock(cache: &Mutex<RunCache>) -> std::sync::MutexGuard<'_, RunCache> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
