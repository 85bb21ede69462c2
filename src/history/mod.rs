//! Historical short-rate and index series, loaded once and shared

mod series;
pub mod loader;

pub use series::{HistoricalSeries, MonthlySeries};
pub use loader::{
    load_default_history, load_history, RateUnit, DEFAULT_HISTORY_PATH, DEFAULT_INDEX_FILE,
    DEFAULT_RATE_FILE,
};

#[cfg(test)]
pub(crate) use series::fixtures;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::error::EngineResult;

static SHARED_HISTORY: OnceLock<Arc<HistoricalSeries>> = OnceLock::new();

/// Process-wide history, loaded from `dir` on first use
///
/// Later calls return the already-installed series and ignore `dir`.
pub fn shared_history(dir: &Path) -> EngineResult<Arc<HistoricalSeries>> {
    if let Some(series) = SHARED_HISTORY.get() {
        return Ok(Arc::clone(series));
    }
    let loaded = Arc::new(load_history(
        dir,
        loader::DEFAULT_RATE_FILE,
        loader::DEFAULT_INDEX_FILE,
        RateUnit::Fraction,
    )?);
    // A concurrent loader may have won the race; both loads are identical
    Ok(Arc::clone(SHARED_HISTORY.get_or_init(|| loaded)))
}

/// Install a series as the process-wide history
///
/// Returns the series that ends up installed, which is the existing one if
/// another caller got there first.
pub fn install_shared_history(series: HistoricalSeries) -> Arc<HistoricalSeries> {
    Arc::clone(SHARED_HISTORY.get_or_init(|| Arc::new(series)))
}
