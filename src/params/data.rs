//! Simulation parameter record and its validation rules

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Longest supported loan term in years
pub const MAX_LOAN_DURATION_YEARS: u32 = 30;

/// Repayment structure of the loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    /// Principal stays outstanding until maturity
    InterestOnly,
    /// Level payment amortizes the principal over the loan term
    PrincipalAndInterest,
}

/// Simulation step size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Monthly,
    Quarterly,
}

impl Frequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            Frequency::Monthly => 12,
            Frequency::Quarterly => 4,
        }
    }

    /// Number of monthly observations that make up one period
    pub fn months_per_period(&self) -> usize {
        match self {
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::Monthly
    }
}

/// Loan and market inputs for one simulation run
///
/// Built once per run and never mutated. Hedging fields may be omitted from
/// the JSON payload, in which case the loan is unhedged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Appraised value of the property at origination
    pub house_value: f64,

    /// Loan term in years
    pub loan_duration: u32,

    /// Years over which the borrower receives annuity income
    pub annuity_duration: u32,

    pub loan_type: LoanType,

    /// Loan amount as a fraction of house value, in (0, 1]
    pub loan_to_value: f64,

    /// Annuity paid to the borrower per year
    pub annual_income: f64,

    /// Fraction of a terminal shortfall borne by the borrower
    pub at_risk_capital_fraction: f64,

    /// Expected annual appreciation (drift for Monte Carlo paths)
    pub annual_house_price_appreciation: f64,

    pub insurer_profit_margin: f64,
    pub wholesale_lending_margin: f64,
    pub additional_loan_margins: f64,

    /// Holiday entry threshold as a fraction of the initial reinvestment
    pub holiday_enter_fraction: f64,

    /// Holiday exit threshold as a fraction of the initial reinvestment
    pub holiday_exit_fraction: f64,

    /// Consecutive holiday quarters after which the loan is subperforming
    pub subperform_loan_threshold_quarters: u32,

    /// Annual insurance cost as a fraction of the loan
    pub insurance_cost_pa: f64,

    /// Calendar year the historical window starts in
    pub start_year: i32,

    #[serde(default)]
    pub hedged: bool,

    #[serde(default)]
    pub hedging_max_loss: f64,

    #[serde(default)]
    pub hedging_cap: f64,

    #[serde(default)]
    pub hedging_cost_pa: f64,
}

impl SimulationParameters {
    /// Number of simulated periods for the given frequency
    pub fn required_periods(&self, frequency: Frequency) -> usize {
        (self.loan_duration * frequency.periods_per_year()) as usize
    }

    /// Number of periods during which annuity income is due
    pub fn annuity_periods(&self, frequency: Frequency) -> usize {
        (self.annuity_duration * frequency.periods_per_year()) as usize
    }

    /// Combined spread charged over the benchmark rate
    pub fn loan_rate_margin(&self) -> f64 {
        self.wholesale_lending_margin + self.additional_loan_margins
    }

    /// Check every field before any period loop runs
    pub fn validate(&self) -> EngineResult<()> {
        let finite_fields = [
            ("house_value", self.house_value),
            ("loan_to_value", self.loan_to_value),
            ("annual_income", self.annual_income),
            ("at_risk_capital_fraction", self.at_risk_capital_fraction),
            ("annual_house_price_appreciation", self.annual_house_price_appreciation),
            ("insurer_profit_margin", self.insurer_profit_margin),
            ("wholesale_lending_margin", self.wholesale_lending_margin),
            ("additional_loan_margins", self.additional_loan_margins),
            ("holiday_enter_fraction", self.holiday_enter_fraction),
            ("holiday_exit_fraction", self.holiday_exit_fraction),
            ("insurance_cost_pa", self.insurance_cost_pa),
            ("hedging_max_loss", self.hedging_max_loss),
            ("hedging_cap", self.hedging_cap),
            ("hedging_cost_pa", self.hedging_cost_pa),
        ];
        for (field, value) in finite_fields {
            if !value.is_finite() {
                return Err(EngineError::invalid(field, format!("must be finite, got {}", value)));
            }
        }

        if self.house_value <= 0.0 {
            return Err(EngineError::invalid("house_value", "must be positive"));
        }
        if self.loan_to_value <= 0.0 || self.loan_to_value > 1.0 {
            return Err(EngineError::invalid(
                "loan_to_value",
                format!("must lie in (0, 1], got {}", self.loan_to_value),
            ));
        }
        if self.loan_duration == 0 || self.loan_duration > MAX_LOAN_DURATION_YEARS {
            return Err(EngineError::invalid(
                "loan_duration",
                format!("must lie in [1, {}], got {}", MAX_LOAN_DURATION_YEARS, self.loan_duration),
            ));
        }
        if self.annuity_duration > self.loan_duration {
            return Err(EngineError::invalid(
                "annuity_duration",
                format!(
                    "{} years exceeds loan duration of {} years",
                    self.annuity_duration, self.loan_duration
                ),
            ));
        }
        if self.annual_income < 0.0 {
            return Err(EngineError::invalid("annual_income", "must be non-negative"));
        }

        let non_negative = [
            ("at_risk_capital_fraction", self.at_risk_capital_fraction),
            ("insurer_profit_margin", self.insurer_profit_margin),
            ("wholesale_lending_margin", self.wholesale_lending_margin),
            ("additional_loan_margins", self.additional_loan_margins),
            ("holiday_enter_fraction", self.holiday_enter_fraction),
            ("holiday_exit_fraction", self.holiday_exit_fraction),
            ("insurance_cost_pa", self.insurance_cost_pa),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(EngineError::invalid(field, format!("must be >= 0, got {}", value)));
            }
        }
        if self.at_risk_capital_fraction > 1.0 {
            return Err(EngineError::invalid(
                "at_risk_capital_fraction",
                format!("must be <= 1, got {}", self.at_risk_capital_fraction),
            ));
        }

        if self.holiday_exit_fraction <= self.holiday_enter_fraction {
            return Err(EngineError::invalid(
                "holiday_exit_fraction",
                format!(
                    "must exceed holiday_enter_fraction ({} <= {})",
                    self.holiday_exit_fraction, self.holiday_enter_fraction
                ),
            ));
        }

        if self.hedged {
            let hedging = [
                ("hedging_max_loss", self.hedging_max_loss),
                ("hedging_cap", self.hedging_cap),
                ("hedging_cost_pa", self.hedging_cost_pa),
            ];
            for (field, value) in hedging {
                if value < 0.0 {
                    return Err(EngineError::invalid(field, format!("must be >= 0, got {}", value)));
                }
            }
        }

        Ok(())
    }
}
