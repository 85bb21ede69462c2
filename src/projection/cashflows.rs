//! Period rows and the columnar period table

use std::io::Write;

use serde::{Deserialize, Serialize};

use super::state::LoanStatus;
use crate::error::EngineResult;

/// A single row of simulation output for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    // Timing
    pub period: u32,
    pub year: u32,

    // Market
    pub equity_price: f64,
    pub benchmark_rate: f64,
    pub house_value: f64,

    // Reinvestment account
    pub portfolio_value: f64,
    pub reinvestment_balance: f64,
    pub units_held: f64,
    pub units_sold: f64,
    pub cumulative_units_sold: f64,
    pub annuity_reserve: f64,

    // Loan
    pub loan_balance: f64,
    pub interest_accrued: f64,
    pub interest_paid: f64,
    pub principal_paid: f64,
    pub interest_deficit: f64,
    pub cumulative_interest_paid: f64,

    // Borrower
    pub annuity_income: f64,
    pub cumulative_annuity_income: f64,
    pub net_equity: f64,
    pub insured_shortfall: f64,

    // Holiday
    pub in_holiday: bool,
    pub status: LoanStatus,
    pub holiday_quarters_counter: u32,
    /// Annuity and interest deferred by a holiday in this period
    pub deferred_amount: f64,
}

impl PeriodRow {
    /// Float fields checked for divergence, by name
    pub fn numeric_fields(&self) -> [(&'static str, f64); 20] {
        [
            ("equity_price", self.equity_price),
            ("benchmark_rate", self.benchmark_rate),
            ("house_value", self.house_value),
            ("portfolio_value", self.portfolio_value),
            ("reinvestment_balance", self.reinvestment_balance),
            ("units_held", self.units_held),
            ("units_sold", self.units_sold),
            ("cumulative_units_sold", self.cumulative_units_sold),
            ("annuity_reserve", self.annuity_reserve),
            ("loan_balance", self.loan_balance),
            ("interest_accrued", self.interest_accrued),
            ("interest_paid", self.interest_paid),
            ("principal_paid", self.principal_paid),
            ("interest_deficit", self.interest_deficit),
            ("cumulative_interest_paid", self.cumulative_interest_paid),
            ("annuity_income", self.annuity_income),
            ("cumulative_annuity_income", self.cumulative_annuity_income),
            ("net_equity", self.net_equity),
            ("insured_shortfall", self.insured_shortfall),
            ("deferred_amount", self.deferred_amount),
        ]
    }
}

/// Struct-of-arrays view of the period rows, aligned by period index
///
/// Serializes as a mapping from column name to array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathFrame {
    pub period: Vec<u32>,
    pub year: Vec<u32>,
    pub equity_price: Vec<f64>,
    pub benchmark_rate: Vec<f64>,
    pub house_value: Vec<f64>,
    pub portfolio_value: Vec<f64>,
    pub reinvestment_balance: Vec<f64>,
    pub units_held: Vec<f64>,
    pub units_sold: Vec<f64>,
    pub cumulative_units_sold: Vec<f64>,
    pub annuity_reserve: Vec<f64>,
    pub loan_balance: Vec<f64>,
    pub interest_accrued: Vec<f64>,
    pub interest_paid: Vec<f64>,
    pub principal_paid: Vec<f64>,
    pub interest_deficit: Vec<f64>,
    pub cumulative_interest_paid: Vec<f64>,
    pub annuity_income: Vec<f64>,
    pub cumulative_annuity_income: Vec<f64>,
    pub net_equity: Vec<f64>,
    pub insured_shortfall: Vec<f64>,
    pub in_holiday: Vec<bool>,
    pub status: Vec<LoanStatus>,
    pub holiday_quarters_counter: Vec<u32>,
    pub deferred_amount: Vec<f64>,
}

impl PathFrame {
    pub fn from_rows(rows: &[PeriodRow]) -> Self {
        let mut frame = Self::with_capacity(rows.len());
        for row in rows {
            frame.push(row);
        }
        frame
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            period: Vec::with_capacity(n),
            year: Vec::with_capacity(n),
            equity_price: Vec::with_capacity(n),
            benchmark_rate: Vec::with_capacity(n),
            house_value: Vec::with_capacity(n),
            portfolio_value: Vec::with_capacity(n),
            reinvestment_balance: Vec::with_capacity(n),
            units_held: Vec::with_capacity(n),
            units_sold: Vec::with_capacity(n),
            cumulative_units_sold: Vec::with_capacity(n),
            annuity_reserve: Vec::with_capacity(n),
            loan_balance: Vec::with_capacity(n),
            interest_accrued: Vec::with_capacity(n),
            interest_paid: Vec::with_capacity(n),
            principal_paid: Vec::with_capacity(n),
            interest_deficit: Vec::with_capacity(n),
            cumulative_interest_paid: Vec::with_capacity(n),
            annuity_income: Vec::with_capacity(n),
            cumulative_annuity_income: Vec::with_capacity(n),
            net_equity: Vec::with_capacity(n),
            insured_shortfall: Vec::with_capacity(n),
            in_holiday: Vec::with_capacity(n),
            status: Vec::with_capacity(n),
            holiday_quarters_counter: Vec::with_capacity(n),
            deferred_amount: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, row: &PeriodRow) {
        self.period.push(row.period);
        self.year.push(row.year);
        self.equity_price.push(row.equity_price);
        self.benchmark_rate.push(row.benchmark_rate);
        self.house_value.push(row.house_value);
        self.portfolio_value.push(row.portfolio_value);
        self.reinvestment_balance.push(row.reinvestment_balance);
        self.units_held.push(row.units_held);
        self.units_sold.push(row.units_sold);
        self.cumulative_units_sold.push(row.cumulative_units_sold);
        self.annuity_reserve.push(row.annuity_reserve);
        self.loan_balance.push(row.loan_balance);
        self.interest_accrued.push(row.interest_accrued);
        self.interest_paid.push(row.interest_paid);
        self.principal_paid.push(row.principal_paid);
        self.interest_deficit.push(row.interest_deficit);
        self.cumulative_interest_paid.push(row.cumulative_interest_paid);
        self.annuity_income.push(row.annuity_income);
        self.cumulative_annuity_income.push(row.cumulative_annuity_income);
        self.net_equity.push(row.net_equity);
        self.insured_shortfall.push(row.insured_shortfall);
        self.in_holiday.push(row.in_holiday);
        self.status.push(row.status);
        self.holiday_quarters_counter.push(row.holiday_quarters_counter);
        self.deferred_amount.push(row.deferred_amount);
    }

    /// Number of periods in the table
    pub fn len(&self) -> usize {
        self.period.len()
    }

    pub fn is_empty(&self) -> bool {
        self.period.is_empty()
    }

    /// Reassemble the row at `index`
    pub fn row(&self, index: usize) -> Option<PeriodRow> {
        if index >= self.len() {
            return None;
        }
        Some(PeriodRow {
            period: self.period[index],
            year: self.year[index],
            equity_price: self.equity_price[index],
            benchmark_rate: self.benchmark_rate[index],
            house_value: self.house_value[index],
            portfolio_value: self.portfolio_value[index],
            reinvestment_balance: self.reinvestment_balance[index],
            units_held: self.units_held[index],
            units_sold: self.units_sold[index],
            cumulative_units_sold: self.cumulative_units_sold[index],
            annuity_reserve: self.annuity_reserve[index],
            loan_balance: self.loan_balance[index],
            interest_accrued: self.interest_accrued[index],
            interest_paid: self.interest_paid[index],
            principal_paid: self.principal_paid[index],
            interest_deficit: self.interest_deficit[index],
            cumulative_interest_paid: self.cumulative_interest_paid[index],
            annuity_income: self.annuity_income[index],
            cumulative_annuity_income: self.cumulative_annuity_income[index],
            net_equity: self.net_equity[index],
            insured_shortfall: self.insured_shortfall[index],
            in_holiday: self.in_holiday[index],
            status: self.status[index],
            holiday_quarters_counter: self.holiday_quarters_counter[index],
            deferred_amount: self.deferred_amount[index],
        })
    }

    /// Iterate over reassembled rows in period order
    pub fn rows(&self) -> impl Iterator<Item = PeriodRow> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    /// Write one CSV row per period, with a header
    pub fn write_csv<W: Write>(&self, writer: W) -> EngineResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in self.rows() {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
