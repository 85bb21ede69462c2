//! Per-loan state carried from one period to the next

use serde::{Deserialize, Serialize};

use super::terms::LoanTerms;

/// Holiday state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Normal,
    InHoliday,
    /// Still in holiday, past the consecutive-quarter threshold
    Subperforming,
}

impl LoanStatus {
    pub fn in_holiday(&self) -> bool {
        !matches!(self, LoanStatus::Normal)
    }
}

/// Status change produced at the end of a period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    EnteredHoliday,
    BecameSubperforming,
    ExitedHoliday,
}

/// State of a loan during simulation
#[derive(Debug, Clone)]
pub struct EngineState {
    /// Current period (1-indexed, 0 before the first period)
    pub period: u32,

    /// Loan year (1-indexed)
    pub year: u32,

    pub equity_price: f64,
    pub units_held: f64,

    /// Cash held for annuity payments
    pub annuity_reserve: f64,

    pub loan_balance: f64,

    /// Interest due but not paid, carried to maturity
    pub interest_deficit: f64,

    /// Annuity payments owed to the borrower from holiday periods
    pub annuity_arrears: f64,

    pub status: LoanStatus,

    /// Consecutive periods spent in holiday
    pub holiday_periods: u32,

    pub cumulative_units_sold: f64,
    pub cumulative_annuity_income: f64,
    pub cumulative_interest_paid: f64,
    pub cumulative_principal_paid: f64,

    /// Latched once the loan is subperforming
    pub ever_subperforming: bool,

    /// Number of distinct holiday episodes
    pub holiday_episodes: u32,

    /// Total periods spent in holiday
    pub total_holiday_periods: u32,
}

impl EngineState {
    /// Open the account at origination
    ///
    /// A positive reinvestment buys units at the origination price; a
    /// negative one starts the loan with that amount as deficit.
    pub fn from_terms(terms: &LoanTerms, origination_price: f64) -> Self {
        let invested = terms.initial_reinvestment.max(0.0);
        Self {
            period: 0,
            year: 1,
            equity_price: origination_price,
            units_held: invested / origination_price,
            annuity_reserve: terms.annuity_reserve.max(0.0),
            loan_balance: terms.total_loan,
            interest_deficit: (-terms.initial_reinvestment).max(0.0),
            annuity_arrears: 0.0,
            status: LoanStatus::Normal,
            holiday_periods: 0,
            cumulative_units_sold: 0.0,
            cumulative_annuity_income: 0.0,
            cumulative_interest_paid: 0.0,
            cumulative_principal_paid: 0.0,
            ever_subperforming: false,
            holiday_episodes: 0,
            total_holiday_periods: 0,
        }
    }

    /// Advance to the next period and revalue the units
    pub fn advance_period(&mut self, periods_per_year: u32, equity_price: f64) {
        self.period += 1;
        self.year = (self.period - 1) / periods_per_year + 1;
        self.equity_price = equity_price;

        if self.status.in_holiday() {
            self.holiday_periods += 1;
            self.total_holiday_periods += 1;
        }
    }

    pub fn portfolio_value(&self) -> f64 {
        self.units_held * self.equity_price
    }

    /// Invested position net of the carried interest deficit
    pub fn reinvestment_balance(&self) -> f64 {
        self.portfolio_value() - self.interest_deficit
    }

    /// Whole quarters spent in the current holiday
    pub fn holiday_quarters(&self, periods_per_year: u32) -> u32 {
        self.holiday_periods * 4 / periods_per_year
    }

    /// Flag the loan as subperforming once the holiday has run too long
    pub fn check_subperforming(
        &mut self,
        threshold_quarters: u32,
        periods_per_year: u32,
    ) -> Option<Transition> {
        if self.status == LoanStatus::InHoliday
            && self.holiday_quarters(periods_per_year) > threshold_quarters
        {
            self.status = LoanStatus::Subperforming;
            self.ever_subperforming = true;
            return Some(Transition::BecameSubperforming);
        }
        None
    }

    /// Apply the hysteresis rule to the end-of-period balance
    ///
    /// Entry requires the balance strictly below the enter threshold, exit
    /// requires it strictly above the exit threshold.
    pub fn update_holiday(&mut self, terms: &LoanTerms) -> Option<Transition> {
        let balance = self.reinvestment_balance();
        match self.status {
            LoanStatus::Normal if balance < terms.holiday_enter_threshold => {
                self.status = LoanStatus::InHoliday;
                self.holiday_episodes += 1;
                Some(Transition::EnteredHoliday)
            }
            LoanStatus::InHoliday | LoanStatus::Subperforming
                if balance > terms.holiday_exit_threshold =>
            {
                self.status = LoanStatus::Normal;
                self.holiday_periods = 0;
                Some(Transition::ExitedHoliday)
            }
            _ => None,
        }
    }
}
