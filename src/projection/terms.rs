//! Loan-level constants derived once per run

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::params::{Frequency, LoanType, SimulationParameters};

/// Derived, immutable loan terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub total_loan: f64,

    /// Share of the loan invested in the index after funding the annuity
    pub reinvest_fraction: f64,

    /// `1 + insurer_profit_margin`
    pub insurance_profit_margin: f64,

    /// Undiscounted insurance cost over the loan term
    pub insurance_cost: f64,

    /// Annual geometric-mean short rate over the window
    pub avg_cash_rate: f64,

    /// Discounted starting reinvestment position; may be negative
    pub initial_reinvestment: f64,

    pub holiday_enter_threshold: f64,
    pub holiday_exit_threshold: f64,

    /// Cash set aside for the borrower's annuity
    pub annuity_reserve: f64,

    /// Discounted insurance premium charged against the reinvestment
    pub insurance_premium: f64,

    /// Level payment per period for amortizing loans, 0 for interest-only
    pub scheduled_payment: f64,

    /// Wholesale plus additional margins over the benchmark rate
    pub loan_rate_margin: f64,
}

impl LoanTerms {
    /// Derive the loan constants from the parameters and average cash rate
    pub fn normalize(
        params: &SimulationParameters,
        avg_cash_rate: f64,
        frequency: Frequency,
    ) -> EngineResult<Self> {
        if params.holiday_exit_fraction <= params.holiday_enter_fraction {
            return Err(EngineError::invalid(
                "holiday_exit_fraction",
                format!(
                    "must exceed holiday_enter_fraction ({} <= {})",
                    params.holiday_exit_fraction, params.holiday_enter_fraction
                ),
            ));
        }

        let total_loan = params.house_value * params.loan_to_value;
        if total_loan == 0.0 {
            return Err(EngineError::InvalidTerms("total loan is zero".to_string()));
        }

        let annuity_total = params.annuity_duration as f64 * params.annual_income;
        let reinvest_fraction = 1.0 - annuity_total / total_loan;
        let insurance_profit_margin = 1.0 + params.insurer_profit_margin;
        let insurance_cost = params.insurance_cost_pa * total_loan * params.loan_duration as f64;

        let discount = (1.0 + avg_cash_rate).powi(params.loan_duration as i32);
        if discount <= 0.0 || !discount.is_finite() {
            return Err(EngineError::InvalidTerms(format!(
                "average cash rate {} gives a non-positive discount factor",
                avg_cash_rate
            )));
        }
        let insurance_premium = insurance_profit_margin * insurance_cost / discount;
        let initial_reinvestment = total_loan * reinvest_fraction - insurance_premium;

        let loan_rate_margin = params.loan_rate_margin();
        let scheduled_payment = match params.loan_type {
            LoanType::InterestOnly => 0.0,
            LoanType::PrincipalAndInterest => level_payment(
                total_loan,
                (avg_cash_rate + loan_rate_margin) / frequency.periods_per_year() as f64,
                params.required_periods(frequency) as u32,
            ),
        };

        Ok(Self {
            total_loan,
            reinvest_fraction,
            insurance_profit_margin,
            insurance_cost,
            avg_cash_rate,
            initial_reinvestment,
            holiday_enter_threshold: initial_reinvestment * params.holiday_enter_fraction,
            holiday_exit_threshold: initial_reinvestment * params.holiday_exit_fraction,
            annuity_reserve: total_loan * (1.0 - reinvest_fraction),
            insurance_premium,
            scheduled_payment,
            loan_rate_margin,
        })
    }

    /// Non-fatal anomalies in the derived terms
    pub fn diagnostics(&self) -> Vec<String> {
        let mut msgs = Vec::new();
        if self.reinvest_fraction < 0.0 {
            msgs.push(format!(
                "annuity commitments exceed the loan: reinvest fraction is {:.6}",
                self.reinvest_fraction
            ));
        }
        if self.initial_reinvestment <= 0.0 {
            msgs.push(format!(
                "initial reinvestment is {:.2}; holiday thresholds ({:.2} enter, {:.2} exit) are inverted or collapsed",
                self.initial_reinvestment, self.holiday_enter_threshold, self.holiday_exit_threshold
            ));
        }
        msgs
    }
}

/// Level payment repaying `principal` over `periods` at `rate` per period
fn level_payment(principal: f64, rate: f64, periods: u32) -> f64 {
    if periods == 0 {
        return principal;
    }
    if rate.abs() < 1e-12 {
        return principal / periods as f64;
    }
    let v = 1.0 / (1.0 + rate);
    let annuity_factor = (1.0 - v.powi(periods as i32)) / rate;
    principal / annuity_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::fixtures::{boundary_params, healthy_params};
    use approx::assert_relative_eq;

    #[test]
    fn test_boundary_scenario_constants() {
        let params = boundary_params();
        let terms = LoanTerms::normalize(&params, 0.0, Frequency::Monthly).unwrap();

        assert_relative_eq!(terms.total_loan, 1_200_000.0, max_relative = 1e-12);
        assert_relative_eq!(terms.reinvest_fraction, 0.625, max_relative = 1e-12);
        assert_relative_eq!(terms.insurance_cost, 720_000.0, max_relative = 1e-12);
        assert_relative_eq!(terms.annuity_reserve, 450_000.0, max_relative = 1e-12);
        assert_relative_eq!(terms.insurance_profit_margin, 1.1, max_relative = 1e-12);
    }

    #[test]
    fn test_boundary_initial_reinvestment_at_zero_rate() {
        // 1.2M loan, 450k annuity reserve and an undiscounted premium of
        // 1.1 * 0.02 * 1.2M * 30 = 792,000
        let params = boundary_params();
        let terms = LoanTerms::normalize(&params, 0.0, Frequency::Monthly).unwrap();

        assert_relative_eq!(terms.insurance_premium, 792_000.0, max_relative = 1e-12);
        assert_relative_eq!(terms.initial_reinvestment, -42_000.0, max_relative = 1e-12);
        assert_relative_eq!(terms.holiday_enter_threshold, -21_000.0, max_relative = 1e-12);
        assert_relative_eq!(terms.holiday_exit_threshold, -33_600.0, max_relative = 1e-12);
        assert!(terms.holiday_enter_threshold > terms.holiday_exit_threshold);
        assert_eq!(terms.diagnostics().len(), 1);
    }

    #[test]
    fn test_boundary_reinvestment_turns_positive_with_rates() {
        let params = boundary_params();
        let at = |rate: f64| {
            LoanTerms::normalize(&params, rate, Frequency::Monthly)
                .unwrap()
                .initial_reinvestment
        };

        // 750,000 - 792,000 / (1 + r)^30, worked by hand
        assert_relative_eq!(at(0.01), 162_397.049_112_6, max_relative = 1e-9);
        assert_relative_eq!(at(0.03), 423_706.486_463_4, max_relative = 1e-9);
        assert!(at(0.0001) < 0.0);
        assert!(at(0.0001) > at(0.0));
    }

    #[test]
    fn test_initial_reinvestment_formula() {
        let params = healthy_params();
        let terms = LoanTerms::normalize(&params, 0.04, Frequency::Monthly).unwrap();

        let expected = 500_000.0 * 0.9 - 1.1 * (0.002 * 500_000.0 * 10.0) / 1.04_f64.powi(10);
        assert_relative_eq!(terms.initial_reinvestment, expected, max_relative = 1e-12);
        assert_relative_eq!(terms.holiday_enter_threshold, expected * 0.5, max_relative = 1e-12);
        assert_relative_eq!(terms.holiday_exit_threshold, expected * 0.8, max_relative = 1e-12);
        assert!(terms.holiday_exit_threshold > terms.holiday_enter_threshold);
        assert!(terms.diagnostics().is_empty());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut params = healthy_params();
        params.holiday_enter_fraction = 0.9;
        params.holiday_exit_fraction = 0.6;
        let result = LoanTerms::normalize(&params, 0.03, Frequency::Monthly);
        assert!(matches!(result, Err(EngineError::InvalidParameter { .. })));
    }

    #[test]
    fn test_zero_loan_rejected() {
        let mut params = healthy_params();
        params.house_value = 0.0;
        let result = LoanTerms::normalize(&params, 0.03, Frequency::Monthly);
        assert!(matches!(result, Err(EngineError::InvalidTerms(_))));
    }

    #[test]
    fn test_level_payment_amortizes() {
        let mut params = healthy_params();
        params.loan_type = LoanType::PrincipalAndInterest;
        let terms = LoanTerms::normalize(&params, 0.045, Frequency::Monthly).unwrap();

        // Roll the balance forward at the scheduling rate: it must reach zero
        let rate = (0.045 + terms.loan_rate_margin) / 12.0;
        let mut balance = terms.total_loan;
        for _ in 0..120 {
            balance = balance * (1.0 + rate) - terms.scheduled_payment;
        }
        assert!(balance.abs() < 1e-4, "residual balance {}", balance);
    }

    #[test]
    fn test_interest_only_has_no_scheduled_payment() {
        let terms = LoanTerms::normalize(&healthy_params(), 0.03, Frequency::Quarterly).unwrap();
        assert_eq!(terms.scheduled_payment, 0.0);
    }
}
