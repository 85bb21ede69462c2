//! Core amortization engine for per-period loan and portfolio projections

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::cashflows::PeriodRow;
use super::hedging::HedgingOverlay;
use super::state::{EngineState, Transition};
use super::terms::LoanTerms;
use crate::error::{EngineError, EngineResult};
use crate::history::{RateUnit, DEFAULT_HISTORY_PATH, DEFAULT_INDEX_FILE, DEFAULT_RATE_FILE};
use crate::params::{Frequency, LoanType, SimulationParameters};
use crate::pricing::{MarketScenario, DEFAULT_MONTE_CARLO_VOLATILITY};

/// Configuration shared by every run of a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Simulation step size
    pub frequency: Frequency,

    /// Annual volatility of Monte Carlo index paths
    pub monte_carlo_volatility: f64,

    /// Directory holding the history files
    pub history_dir: PathBuf,

    pub rate_file: String,
    pub index_file: String,

    /// How the rate file quotes its values
    pub rate_unit: RateUnit,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frequency: Frequency::Monthly,
            monte_carlo_volatility: DEFAULT_MONTE_CARLO_VOLATILITY,
            history_dir: PathBuf::from(DEFAULT_HISTORY_PATH),
            rate_file: DEFAULT_RATE_FILE.to_string(),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            rate_unit: RateUnit::Fraction,
        }
    }
}

/// Rows and run-level flags produced by one pass of the engine
#[derive(Debug, Clone)]
pub struct AmortizationRun {
    pub rows: Vec<PeriodRow>,
    pub ever_subperforming: bool,
    pub holiday_episodes: u32,
    pub total_holiday_periods: u32,
}

/// Per-period state machine over one market scenario
pub struct AmortizationEngine<'a> {
    params: &'a SimulationParameters,
    terms: &'a LoanTerms,
    frequency: Frequency,
}

impl<'a> AmortizationEngine<'a> {
    pub fn new(params: &'a SimulationParameters, terms: &'a LoanTerms, frequency: Frequency) -> Self {
        Self {
            params,
            terms,
            frequency,
        }
    }

    /// Run every period of the loan
    ///
    /// Period `t` is valued at the path level closing it, `levels[t]`, with
    /// `levels[0]` fixing the units bought at origination. Any non-finite
    /// value aborts the run; no partial rows are returned.
    pub fn run(&self, scenario: &MarketScenario) -> EngineResult<AmortizationRun> {
        let required = self.params.required_periods(self.frequency);
        let available = scenario.price_path.periods().min(scenario.rates.len());
        if available < required {
            return Err(EngineError::InsufficientHistory {
                required,
                available,
            });
        }

        let effective_path = match HedgingOverlay::from_params(self.params, self.frequency) {
            Some(hedge) => hedge.apply_to_path(&scenario.price_path),
            None => scenario.price_path.clone(),
        };

        let origination_price = effective_path.levels[0];
        check_price(0, origination_price)?;

        let ppy = self.frequency.periods_per_year();
        let mut state = EngineState::from_terms(self.terms, origination_price);
        let mut rows = Vec::with_capacity(required);

        for t in 0..required {
            let price = effective_path.levels[t + 1];
            check_price(t as u32 + 1, price)?;
            state.advance_period(ppy, price);

            let row = self.calculate_period(&mut state, t, scenario.rates[t]);

            if let Some((field, value)) = row
                .numeric_fields()
                .into_iter()
                .find(|(_, value)| !value.is_finite())
            {
                return Err(EngineError::SimulationDiverged {
                    period: row.period,
                    field,
                    value,
                });
            }

            rows.push(row);

            if let Some(transition) = state.update_holiday(self.terms) {
                log_transition(state.period, transition, state.reinvestment_balance());
            }
        }

        Ok(AmortizationRun {
            rows,
            ever_subperforming: state.ever_subperforming,
            holiday_episodes: state.holiday_episodes,
            total_holiday_periods: state.total_holiday_periods,
        })
    }

    /// Calculate cashflows for a single period
    fn calculate_period(&self, state: &mut EngineState, t: usize, benchmark_rate: f64) -> PeriodRow {
        let ppy = self.frequency.periods_per_year() as f64;
        let price = state.equity_price;

        if let Some(transition) = state.check_subperforming(
            self.params.subperform_loan_threshold_quarters,
            self.frequency.periods_per_year(),
        ) {
            log_transition(state.period, transition, state.reinvestment_balance());
        }
        let in_holiday = state.status.in_holiday();

        // Interest on the outstanding principal
        let loan_rate = benchmark_rate + self.terms.loan_rate_margin;
        let interest_accrued = state.loan_balance * loan_rate / ppy;

        // Annuity due this period plus any arrears from earlier holidays
        let annuity_due = if t < self.params.annuity_periods(self.frequency) {
            self.params.annual_income / ppy
        } else {
            0.0
        };

        let mut deferred_amount = 0.0;
        let mut annuity_income = 0.0;
        let mut units_sold = 0.0;
        let mut interest_paid = 0.0;
        let mut principal_paid = 0.0;

        if in_holiday {
            // Obligations suspended: annuity becomes arrears, interest a deficit
            state.annuity_arrears += annuity_due;
            state.interest_deficit += interest_accrued;
            deferred_amount = annuity_due + interest_accrued;
        } else {
            let annuity_owed = annuity_due + state.annuity_arrears;
            let from_reserve = annuity_owed.min(state.annuity_reserve);
            state.annuity_reserve -= from_reserve;
            let annuity_gap = annuity_owed - from_reserve;

            let principal_due = match self.params.loan_type {
                LoanType::InterestOnly => 0.0,
                LoanType::PrincipalAndInterest => (self.terms.scheduled_payment - interest_accrued)
                    .max(0.0)
                    .min(state.loan_balance),
            };

            // Sell units for whatever the reserve cannot cover
            let cash_needed = annuity_gap + interest_accrued + principal_due;
            let sale_value = cash_needed.min(state.portfolio_value()).max(0.0);
            if sale_value > 0.0 {
                units_sold = (sale_value / price).min(state.units_held);
                state.units_held -= units_sold;
            }

            let mut proceeds = sale_value;
            let gap_paid = annuity_gap.min(proceeds);
            proceeds -= gap_paid;
            interest_paid = interest_accrued.min(proceeds);
            proceeds -= interest_paid;
            principal_paid = principal_due.min(proceeds);

            annuity_income = from_reserve + gap_paid;
            state.annuity_arrears = annuity_gap - gap_paid;
            state.interest_deficit += interest_accrued - interest_paid;
            state.loan_balance -= principal_paid;
        }

        state.cumulative_units_sold += units_sold;
        state.cumulative_annuity_income += annuity_income;
        state.cumulative_interest_paid += interest_paid;
        state.cumulative_principal_paid += principal_paid;

        let portfolio_value = state.portfolio_value();
        let house_value = self.params.house_value
            * (1.0 + self.params.annual_house_price_appreciation).powf((t + 1) as f64 / ppy);

        let raw_equity =
            portfolio_value + state.annuity_reserve - state.interest_deficit - state.loan_balance;
        let (net_equity, insured_shortfall) = if raw_equity >= 0.0 {
            (raw_equity, 0.0)
        } else {
            let at_risk = self.params.at_risk_capital_fraction;
            (raw_equity * at_risk, -raw_equity * (1.0 - at_risk))
        };

        PeriodRow {
            period: state.period,
            year: state.year,
            equity_price: price,
            benchmark_rate,
            house_value,
            portfolio_value,
            reinvestment_balance: state.reinvestment_balance(),
            units_held: state.units_held,
            units_sold,
            cumulative_units_sold: state.cumulative_units_sold,
            annuity_reserve: state.annuity_reserve,
            loan_balance: state.loan_balance,
            interest_accrued,
            interest_paid,
            principal_paid,
            interest_deficit: state.interest_deficit,
            cumulative_interest_paid: state.cumulative_interest_paid,
            annuity_income,
            cumulative_annuity_income: state.cumulative_annuity_income,
            net_equity,
            insured_shortfall,
            in_holiday,
            status: state.status,
            holiday_quarters_counter: state.holiday_quarters(self.frequency.periods_per_year()),
            deferred_amount,
        }
    }
}

fn check_price(period: u32, price: f64) -> EngineResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::SimulationDiverged {
            period,
            field: "equity_price",
            value: price,
        });
    }
    Ok(())
}

fn log_transition(period: u32, transition: Transition, balance: f64) {
    log::debug!(
        "period={} {:?} (reinvestment balance {:.2})",
        period,
        transition,
        balance
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::fixtures::{boundary_params, healthy_params};
    use crate::pricing::PricePath;
    use crate::projection::state::LoanStatus;
    use approx::assert_relative_eq;

    /// Flat 4% rates on an explicit path including the origination level
    fn market(levels: Vec<f64>) -> MarketScenario {
        let n = levels.len().saturating_sub(1);
        MarketScenario {
            price_path: PricePath { path_id: 0, levels },
            rates: vec![0.04; n].into(),
            avg_cash_rate: 0.04,
            start_offset: 0,
            padded_periods: 0,
            debug_msgs: Vec::<String>::new().into(),
        }
    }

    /// Per-period closing levels; origination is at the first period's level
    fn scenario(closing: Vec<f64>) -> MarketScenario {
        let mut levels = Vec::with_capacity(closing.len() + 1);
        levels.extend(closing.first().copied());
        levels.extend(closing);
        market(levels)
    }

    fn run(params: &SimulationParameters, levels: Vec<f64>) -> EngineResult<AmortizationRun> {
        let terms = LoanTerms::normalize(params, 0.04, Frequency::Monthly)?;
        AmortizationEngine::new(params, &terms, Frequency::Monthly).run(&scenario(levels))
    }

    fn run_market(params: &SimulationParameters, levels: Vec<f64>) -> EngineResult<AmortizationRun> {
        let terms = LoanTerms::normalize(params, 0.04, Frequency::Monthly)?;
        AmortizationEngine::new(params, &terms, Frequency::Monthly).run(&market(levels))
    }

    fn growing(n: usize, monthly: f64) -> Vec<f64> {
        (0..n).map(|t| 100.0 * (1.0 + monthly).powi(t as i32)).collect()
    }

    #[test]
    fn test_projection_runs() {
        let params = healthy_params();
        let result = run(&params, growing(120, 0.006)).unwrap();

        assert_eq!(result.rows.len(), 120);
        assert_eq!(result.rows[0].period, 1);
        assert_eq!(result.rows[119].year, 10);
        assert!(result.rows.iter().all(|r| !r.in_holiday));
        assert_eq!(result.holiday_episodes, 0);
    }

    #[test]
    fn test_first_period_interest_and_annuity() {
        let params = healthy_params();
        let result = run(&params, growing(120, 0.006)).unwrap();
        let row = &result.rows[0];

        let expected_interest = 500_000.0 * (0.04 + 0.015) / 12.0;
        assert_relative_eq!(row.interest_accrued, expected_interest, max_relative = 1e-12);
        assert_relative_eq!(row.interest_paid, expected_interest, max_relative = 1e-12);
        assert_relative_eq!(row.annuity_income, 10_000.0 / 12.0, max_relative = 1e-12);
        assert_relative_eq!(row.units_sold, expected_interest / 100.0, max_relative = 1e-12);
        assert_eq!(row.interest_deficit, 0.0);
        assert_eq!(row.loan_balance, 500_000.0);
    }

    #[test]
    fn test_annuity_stops_after_annuity_duration() {
        let params = healthy_params();
        let result = run(&params, growing(120, 0.006)).unwrap();

        assert!(result.rows[59].annuity_income > 0.0);
        assert_eq!(result.rows[60].annuity_income, 0.0);
        assert_relative_eq!(
            result.rows[119].cumulative_annuity_income,
            50_000.0,
            max_relative = 1e-9
        );
        assert!(result.rows[119].annuity_reserve.abs() < 1e-6);
    }

    #[test]
    fn test_cumulative_columns_non_decreasing() {
        let mut params = boundary_params();
        params.start_year = 1990;
        let levels: Vec<f64> = (0..360)
            .map(|t| 100.0 * (1.0 + 0.3 * ((t as f64) / 20.0).sin()))
            .collect();
        let result = run(&params, levels).unwrap();

        for pair in result.rows.windows(2) {
            assert!(pair[1].cumulative_units_sold >= pair[0].cumulative_units_sold);
            assert!(pair[1].cumulative_annuity_income >= pair[0].cumulative_annuity_income);
            assert!(pair[1].cumulative_interest_paid >= pair[0].cumulative_interest_paid);
        }
    }

    #[test]
    fn test_crash_triggers_holiday_and_defers_obligations() {
        let params = healthy_params();
        // Index loses 60% in month 12 and never recovers
        let levels: Vec<f64> = (0..120).map(|t| if t < 12 { 100.0 } else { 40.0 }).collect();
        let result = run(&params, levels).unwrap();

        assert!(!result.rows[11].in_holiday);
        let first_holiday = &result.rows[12];
        assert!(!first_holiday.in_holiday, "status flips at the end of the crash period");
        let holiday = &result.rows[13];
        assert!(holiday.in_holiday);
        assert_eq!(holiday.interest_paid, 0.0);
        assert_eq!(holiday.annuity_income, 0.0);
        assert_eq!(holiday.units_sold, 0.0);
        assert_relative_eq!(
            holiday.deferred_amount,
            holiday.interest_accrued + 10_000.0 / 12.0,
            max_relative = 1e-12
        );
        assert!(holiday.interest_deficit > first_holiday.interest_deficit);
        assert_eq!(result.holiday_episodes, 1);
    }

    #[test]
    fn test_long_holiday_becomes_subperforming() {
        let mut params = healthy_params();
        params.subperform_loan_threshold_quarters = 4;
        let levels: Vec<f64> = (0..120).map(|t| if t < 12 { 100.0 } else { 40.0 }).collect();
        let result = run(&params, levels).unwrap();

        assert!(result.ever_subperforming);
        let first_sub = result
            .rows
            .iter()
            .position(|r| r.status == LoanStatus::Subperforming)
            .unwrap();
        // Holiday starts in row 13; the fifth full quarter completes 15 months later
        assert_eq!(first_sub, 13 + 14);
        assert_eq!(result.rows[first_sub].holiday_quarters_counter, 5);
        assert!(result.rows[first_sub].in_holiday);
    }

    #[test]
    fn test_recovery_exits_holiday_and_pays_arrears() {
        let params = healthy_params();
        let levels: Vec<f64> = (0..120)
            .map(|t| match t {
                0..=11 => 100.0,
                12..=23 => 40.0,
                _ => 200.0,
            })
            .collect();
        let result = run(&params, levels).unwrap();

        assert!(result.rows[20].in_holiday);
        assert!(!result.rows[25].in_holiday);

        // The first normal period pays the arrears built up during the holiday
        let resumed = result.rows.iter().skip(13).find(|r| !r.in_holiday).unwrap();
        assert!(resumed.annuity_income > 10_000.0 / 12.0 * 5.0);
        assert!(!result.ever_subperforming);
    }

    #[test]
    fn test_principal_and_interest_amortizes() {
        let mut params = healthy_params();
        params.loan_type = LoanType::PrincipalAndInterest;
        let result = run(&params, growing(120, 0.012)).unwrap();

        assert!(result.rows.iter().all(|r| !r.in_holiday));
        let last = result.rows.last().unwrap();
        assert!(last.loan_balance < 1.0, "residual balance {}", last.loan_balance);
        for pair in result.rows.windows(2) {
            assert!(pair[1].loan_balance <= pair[0].loan_balance);
        }
    }

    #[test]
    fn test_negative_reinvestment_runs_in_deficit() {
        let params = boundary_params();
        let terms = LoanTerms::normalize(&params, 0.0001, Frequency::Monthly).unwrap();
        assert!(terms.initial_reinvestment < 0.0);

        let result = AmortizationEngine::new(&params, &terms, Frequency::Monthly)
            .run(&scenario(growing(360, 0.005)))
            .unwrap();
        assert_eq!(result.rows[0].units_held, 0.0);
        assert!(result.rows[0].interest_deficit > 0.0);
        assert_eq!(result.rows.len(), 360);
    }

    #[test]
    fn test_hedged_run_values_portfolio_on_hedged_path() {
        let mut params = healthy_params();
        params.hedged = true;
        params.hedging_max_loss = 0.05;
        params.hedging_cap = 0.03;
        params.hedging_cost_pa = 0.0;
        let levels: Vec<f64> = (0..120).map(|t| if t < 12 { 100.0 } else { 40.0 }).collect();
        let result = run(&params, levels).unwrap();

        assert_relative_eq!(result.rows[12].equity_price, 95.0, max_relative = 1e-12);
        assert_relative_eq!(result.rows[30].equity_price, 95.0, max_relative = 1e-12);
        assert!(result.rows[..24].iter().all(|r| !r.in_holiday));
    }

    #[test]
    fn test_negative_price_diverges() {
        let mut params = healthy_params();
        params.hedged = true;
        params.hedging_max_loss = 1.0;
        params.hedging_cap = 0.0;
        params.hedging_cost_pa = 24.0;
        let result = run(&params, growing(120, 0.0));

        // The fee is charged from the first period on
        assert!(matches!(
            result,
            Err(EngineError::SimulationDiverged { period: 1, field: "equity_price", .. })
        ));
    }

    #[test]
    fn test_first_period_earns_first_increment() {
        let params = healthy_params();
        let terms = LoanTerms::normalize(&params, 0.04, Frequency::Monthly).unwrap();
        let mut levels = vec![100.0, 110.0];
        levels.extend((2..=120).map(|t| 110.0 * 1.006_f64.powi(t - 1)));
        let result = AmortizationEngine::new(&params, &terms, Frequency::Monthly)
            .run(&market(levels))
            .unwrap();

        let row = &result.rows[0];
        let bought = terms.initial_reinvestment / 100.0;
        let sold = row.interest_paid / 110.0;
        assert_relative_eq!(row.equity_price, 110.0, max_relative = 1e-12);
        assert_relative_eq!(row.units_sold, sold, max_relative = 1e-12);
        assert_relative_eq!(row.portfolio_value, (bought - sold) * 110.0, max_relative = 1e-9);
        assert!(row.portfolio_value > terms.initial_reinvestment - row.interest_paid);
    }

    #[test]
    fn test_hedge_applies_to_first_period() {
        let mut params = healthy_params();
        params.hedged = true;
        params.hedging_max_loss = 0.05;
        params.hedging_cap = 0.03;
        params.hedging_cost_pa = 0.0;
        let mut levels = vec![100.0, 120.0];
        levels.extend(std::iter::repeat(120.0).take(119));
        let result = run_market(&params, levels).unwrap();

        assert_relative_eq!(result.rows[0].equity_price, 103.0, max_relative = 1e-12);
    }

    #[test]
    fn test_nan_rate_diverges() {
        let params = healthy_params();
        let terms = LoanTerms::normalize(&params, 0.04, Frequency::Monthly).unwrap();
        let mut rates = vec![0.04; 120];
        rates[5] = f64::NAN;
        let mut market = scenario(growing(120, 0.005));
        market.rates = rates.into();

        let result = AmortizationEngine::new(&params, &terms, Frequency::Monthly).run(&market);
        assert!(matches!(
            result,
            Err(EngineError::SimulationDiverged { period: 6, .. })
        ));
    }

    #[test]
    fn test_short_scenario_rejected() {
        let result = run(&healthy_params(), growing(50, 0.0));
        assert!(matches!(result, Err(EngineError::InsufficientHistory { .. })));
    }
}
