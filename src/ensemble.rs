//! Streaming statistics over Monte Carlo ensembles
//!
//! Runs are folded into per-period totals as they finish, so an ensemble of
//! any size holds one accumulator per worker instead of every output.

use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::projection::SimulationOutput;

/// Totals for one period across the successful runs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub portfolio_value: f64,
    pub interest_deficit: f64,
    pub net_equity: f64,
    pub insured_shortfall: f64,
    pub runs_in_holiday: u64,
}

impl PeriodTotals {
    fn add(&mut self, other: &PeriodTotals) {
        self.portfolio_value += other.portfolio_value;
        self.interest_deficit += other.interest_deficit;
        self.net_equity += other.net_equity;
        self.insured_shortfall += other.insured_shortfall;
        self.runs_in_holiday += other.runs_in_holiday;
    }
}

/// Per-period totals plus outcome counts for an ensemble
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub periods: Vec<PeriodTotals>,
    pub succeeded: u64,
    pub diverged: u64,
    pub failed: u64,
    pub subperforming: u64,
    pub insurer_claims: u64,
}

impl EnsembleSummary {
    pub fn new(periods: usize) -> Self {
        Self {
            periods: vec![PeriodTotals::default(); periods],
            ..Self::default()
        }
    }

    /// Fold one run's result into the totals
    pub fn record(mut self, result: EngineResult<SimulationOutput>) -> Self {
        match result {
            Ok(output) => self.add_output(&output),
            Err(EngineError::SimulationDiverged { .. }) => self.diverged += 1,
            Err(err) => {
                log::warn!("run failed: {}", err);
                self.failed += 1;
            }
        }
        self
    }

    fn add_output(&mut self, output: &SimulationOutput) {
        let frame = &output.pathdf;
        self.succeeded += 1;
        for (i, totals) in self.periods.iter_mut().enumerate().take(frame.len()) {
            totals.portfolio_value += frame.portfolio_value[i];
            totals.interest_deficit += frame.interest_deficit[i];
            totals.net_equity += frame.net_equity[i];
            totals.insured_shortfall += frame.insured_shortfall[i];
            if frame.in_holiday[i] {
                totals.runs_in_holiday += 1;
            }
        }
        if output.account("subperforming") == Some(1.0) {
            self.subperforming += 1;
        }
        if output.account("insurer_claim").unwrap_or(0.0) > 0.0 {
            self.insurer_claims += 1;
        }
    }

    /// Combine two partial summaries
    pub fn merge(mut self, other: Self) -> Self {
        if self.periods.len() < other.periods.len() {
            self.periods.resize(other.periods.len(), PeriodTotals::default());
        }
        for (mine, theirs) in self.periods.iter_mut().zip(&other.periods) {
            mine.add(theirs);
        }
        self.succeeded += other.succeeded;
        self.diverged += other.diverged;
        self.failed += other.failed;
        self.subperforming += other.subperforming;
        self.insurer_claims += other.insurer_claims;
        self
    }

    /// Every run recorded, failed or not
    pub fn runs(&self) -> u64 {
        self.succeeded + self.diverged + self.failed
    }

    /// `count` as a fraction of the successful runs
    pub fn share(&self, count: u64) -> f64 {
        count as f64 / self.succeeded.max(1) as f64
    }

    /// Mean of a total over the successful runs
    pub fn mean(&self, total: f64) -> f64 {
        total / self.succeeded.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::PathFrame;
    use std::collections::BTreeMap;

    fn output(portfolio: &[f64], holiday: &[bool], claim: f64) -> SimulationOutput {
        let n = portfolio.len();
        let pathdf = PathFrame {
            period: (1..=n as u32).collect(),
            portfolio_value: portfolio.to_vec(),
            interest_deficit: vec![1.0; n],
            net_equity: vec![2.0; n],
            insured_shortfall: vec![0.0; n],
            in_holiday: holiday.to_vec(),
            ..PathFrame::default()
        };
        let mut accounts_table = BTreeMap::new();
        accounts_table.insert("insurer_claim".to_string(), claim);
        accounts_table.insert("subperforming".to_string(), 0.0);
        SimulationOutput {
            price_paths: Vec::new(),
            pathdf,
            accounts_table,
            debug_msgs: Vec::new(),
        }
    }

    #[test]
    fn test_record_accumulates_by_period() {
        let summary = EnsembleSummary::new(2)
            .record(Ok(output(&[10.0, 20.0], &[false, true], 0.0)))
            .record(Ok(output(&[30.0, 40.0], &[false, false], 5.0)));

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.periods[0].portfolio_value, 40.0);
        assert_eq!(summary.periods[1].runs_in_holiday, 1);
        assert_eq!(summary.mean(summary.periods[1].portfolio_value), 30.0);
        assert_eq!(summary.insurer_claims, 1);
        assert_eq!(summary.share(summary.insurer_claims), 0.5);
    }

    #[test]
    fn test_failures_are_counted_by_kind() {
        let diverged = EngineError::SimulationDiverged {
            period: 3,
            field: "equity_price",
            value: f64::NAN,
        };
        let summary = EnsembleSummary::new(2)
            .record(Err(diverged))
            .record(Err(EngineError::Series("bad".to_string())));

        assert_eq!((summary.succeeded, summary.diverged, summary.failed), (0, 1, 1));
        assert_eq!(summary.runs(), 2);
        assert_eq!(summary.mean(0.0), 0.0);
    }

    #[test]
    fn test_merge_matches_single_fold() {
        let a = output(&[10.0, 20.0], &[true, true], 0.0);
        let b = output(&[5.0, 6.0], &[false, true], 1.0);

        let whole = EnsembleSummary::new(2)
            .record(Ok(a.clone()))
            .record(Ok(b.clone()));
        let split = EnsembleSummary::new(2)
            .record(Ok(a))
            .merge(EnsembleSummary::new(2).record(Ok(b)));

        assert_eq!(whole, split);
    }
}
