//! Reduction of a finished run into the output payload

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cashflows::{PathFrame, PeriodRow};
use super::engine::AmortizationRun;
use super::irr::annualized_irr;
use super::terms::LoanTerms;
use crate::params::{Frequency, SimulationParameters};
use crate::pricing::{MarketScenario, PricePath};

/// Named end-of-loan totals for each party
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountsSummary {
    // Lender
    pub lender_total_interest_paid: f64,
    pub lender_total_principal_repaid: f64,
    pub lender_outstanding_deficit: f64,
    pub lender_ending_loan_balance: f64,
    /// Amount owed at maturity, settled from the account and the insurer
    pub lender_terminal_recovery: f64,
    pub lender_irr: Option<f64>,

    // Insurer
    pub insurer_premium: f64,
    pub insurer_claim: f64,
    pub insurer_profit: f64,

    // Borrower
    pub borrower_total_annuity: f64,
    pub borrower_ending_net_equity: f64,
    pub borrower_ending_house_value: f64,
    pub borrower_at_risk_loss: f64,

    // Run
    pub total_units_sold: f64,
    pub holiday_periods: u32,
    pub holiday_episodes: u32,
    pub subperforming: bool,
    pub ending_portfolio_value: f64,
}

impl AccountsSummary {
    /// Flatten into the label-to-number accounts table
    ///
    /// `lender_irr` is left out when the IRR is undefined.
    pub fn to_table(&self) -> BTreeMap<String, f64> {
        let mut table = BTreeMap::new();
        let mut put = |label: &str, value: f64| {
            table.insert(label.to_string(), value);
        };

        put("lender_total_interest_paid", self.lender_total_interest_paid);
        put("lender_total_principal_repaid", self.lender_total_principal_repaid);
        put("lender_outstanding_deficit", self.lender_outstanding_deficit);
        put("lender_ending_loan_balance", self.lender_ending_loan_balance);
        put("lender_terminal_recovery", self.lender_terminal_recovery);
        if let Some(irr) = self.lender_irr {
            put("lender_irr", irr);
        }

        put("insurer_premium", self.insurer_premium);
        put("insurer_claim", self.insurer_claim);
        put("insurer_profit", self.insurer_profit);

        put("borrower_total_annuity", self.borrower_total_annuity);
        put("borrower_ending_net_equity", self.borrower_ending_net_equity);
        put("borrower_ending_house_value", self.borrower_ending_house_value);
        put("borrower_at_risk_loss", self.borrower_at_risk_loss);

        put("total_units_sold", self.total_units_sold);
        put("holiday_periods", self.holiday_periods as f64);
        put("holiday_episodes", self.holiday_episodes as f64);
        put("subperforming", if self.subperforming { 1.0 } else { 0.0 });
        put("ending_portfolio_value", self.ending_portfolio_value);
        table
    }
}

/// Output contract of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub price_paths: Vec<PricePath>,
    pub pathdf: PathFrame,
    pub accounts_table: BTreeMap<String, f64>,
    pub debug_msgs: Vec<String>,
}

impl SimulationOutput {
    /// Look up an accounts-table entry
    pub fn account(&self, label: &str) -> Option<f64> {
        self.accounts_table.get(label).copied()
    }
}

/// Assembles the period table, accounts and diagnostics for a run
pub struct ResultAggregator<'a> {
    params: &'a SimulationParameters,
    terms: &'a LoanTerms,
    frequency: Frequency,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(params: &'a SimulationParameters, terms: &'a LoanTerms, frequency: Frequency) -> Self {
        Self {
            params,
            terms,
            frequency,
        }
    }

    pub fn assemble(&self, scenario: &MarketScenario, run: &AmortizationRun) -> SimulationOutput {
        let summary = self.summarize(run);

        let mut debug_msgs = scenario.debug_msgs.to_vec();
        for msg in self.terms.diagnostics() {
            log::warn!("{}", msg);
            debug_msgs.push(msg);
        }
        if summary.subperforming {
            debug_msgs.push(format!(
                "loan was subperforming; {} holiday periods over {} episodes",
                summary.holiday_periods, summary.holiday_episodes
            ));
        }

        SimulationOutput {
            price_paths: vec![scenario.price_path.clone()],
            pathdf: PathFrame::from_rows(&run.rows),
            accounts_table: summary.to_table(),
            debug_msgs,
        }
    }

    /// Reduce final-period and cumulative fields into named totals
    pub fn summarize(&self, run: &AmortizationRun) -> AccountsSummary {
        let Some(last) = run.rows.last() else {
            return AccountsSummary::default();
        };

        let owed = last.loan_balance + last.interest_deficit;
        let raw_equity = last.portfolio_value + last.annuity_reserve - owed;
        let at_risk_loss = if raw_equity < 0.0 {
            -raw_equity * self.params.at_risk_capital_fraction
        } else {
            0.0
        };
        let insurer_premium = self.terms.insurance_premium;

        AccountsSummary {
            lender_total_interest_paid: last.cumulative_interest_paid,
            lender_total_principal_repaid: run.rows.iter().map(|r| r.principal_paid).sum(),
            lender_outstanding_deficit: last.interest_deficit,
            lender_ending_loan_balance: last.loan_balance,
            lender_terminal_recovery: owed,
            lender_irr: annualized_irr(
                &self.lender_cashflows(&run.rows, owed),
                self.frequency.periods_per_year(),
            ),
            insurer_premium,
            insurer_claim: last.insured_shortfall,
            insurer_profit: insurer_premium - last.insured_shortfall,
            borrower_total_annuity: last.cumulative_annuity_income,
            borrower_ending_net_equity: last.net_equity,
            borrower_ending_house_value: last.house_value,
            borrower_at_risk_loss: at_risk_loss,
            total_units_sold: last.cumulative_units_sold,
            holiday_periods: run.total_holiday_periods,
            holiday_episodes: run.holiday_episodes,
            subperforming: run.ever_subperforming,
            ending_portfolio_value: last.portfolio_value,
        }
    }

    /// Advance at origination, debt service each period, settlement at maturity
    fn lender_cashflows(&self, rows: &[PeriodRow], terminal_recovery: f64) -> Vec<f64> {
        let mut flows = Vec::with_capacity(rows.len() + 1);
        flows.push(-self.terms.total_loan);
        flows.extend(rows.iter().map(|r| r.interest_paid + r.principal_paid));
        if let Some(last) = flows.last_mut() {
            *last += terminal_recovery;
        }
        flows
    }
}
