//! Hedging overlay on portfolio returns

use crate::params::{Frequency, SimulationParameters};
use crate::pricing::PricePath;

/// Collar plus running fee applied to each period's return
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgingOverlay {
    /// Largest loss passed through, as a positive fraction
    pub max_loss: f64,
    /// Largest gain passed through
    pub cap: f64,
    /// Fee charged per period
    pub period_cost: f64,
}

impl HedgingOverlay {
    /// The overlay for a run, or `None` when the loan is unhedged
    pub fn from_params(params: &SimulationParameters, frequency: Frequency) -> Option<Self> {
        if !params.hedged {
            return None;
        }
        Some(Self {
            max_loss: params.hedging_max_loss,
            cap: params.hedging_cap,
            period_cost: params.hedging_cost_pa / frequency.periods_per_year() as f64,
        })
    }

    /// Clip a period return to `[-max_loss, cap]` and deduct the fee
    pub fn apply(&self, period_return: f64) -> f64 {
        period_return.max(-self.max_loss).min(self.cap) - self.period_cost
    }

    /// Rebuild a level path from hedged returns; the origination level is kept
    pub fn apply_to_path(&self, path: &PricePath) -> PricePath {
        let mut levels = Vec::with_capacity(path.len());
        for t in 0..path.len() {
            let level = match levels.last() {
                None => path.levels[0],
                Some(prev) => prev * (1.0 + self.apply(path.period_return(t))),
            };
            levels.push(level);
        }
        PricePath {
            path_id: path.path_id,
            levels,
        }
    }
}
