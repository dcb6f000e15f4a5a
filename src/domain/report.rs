//! Weekly rebalance summary handed to report adapters.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;

use super::error::Side;
use super::execution::ExecutionReport;
use super::portfolio::PortfolioState;
use super::rebalance::RebalancePlan;

/// One `name(code): shares @ price` line. `price` is `None` for a sell
/// submitted without a quote or a holding with no quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub name: String,
    pub code: String,
    pub shares: u64,
    pub price: Option<f64>,
    pub amount: f64,
}

/// Summary of one cycle, consistent with the state that gets saved:
/// `sells`/`buys` only hold orders that went through, failed orders are
/// listed apart, and holdings are valued at the quotes behind
/// `portfolio_value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub generated_at: NaiveDateTime,
    pub portfolio_value: f64,
    pub initial_value: f64,
    pub cash: f64,
    pub sells: Vec<ReportLine>,
    pub buys: Vec<ReportLine>,
    pub failed_sells: Vec<ReportLine>,
    pub failed_buys: Vec<ReportLine>,
    pub holdings: Vec<ReportLine>,
}

impl WeeklyReport {
    /// `execution` is `None` for a plan that was never submitted (dry run);
    /// every planned order is then listed as-is.
    pub fn build(
        plan: &RebalancePlan,
        execution: Option<&ExecutionReport>,
        state: &PortfolioState,
        prices: &HashMap<String, f64>,
        initial_value: f64,
        generated_at: NaiveDateTime,
    ) -> Self {
        let failed = |side: Side, code: &str| execution.is_some_and(|e| e.failed(side, code));

        let (failed_sells, sells): (Vec<ReportLine>, Vec<ReportLine>) = plan
            .sells
            .iter()
            .map(|s| ReportLine {
                name: s.name.clone(),
                code: s.code.clone(),
                shares: s.shares,
                price: s.price,
                amount: s.proceeds,
            })
            .partition(|line| failed(Side::Sell, &line.code));

        let (failed_buys, buys): (Vec<ReportLine>, Vec<ReportLine>) = plan
            .buys
            .iter()
            .map(|b| ReportLine {
                name: b.name.clone(),
                code: b.code.clone(),
                shares: b.shares,
                price: Some(b.price),
                amount: b.cost,
            })
            .partition(|line| failed(Side::Buy, &line.code));

        let holdings = state
            .holdings
            .iter()
            .map(|(code, h)| {
                let price = prices.get(code).copied();
                ReportLine {
                    name: h.name.clone(),
                    code: code.clone(),
                    shares: h.shares,
                    price,
                    amount: price.map(|p| h.market_value(p)).unwrap_or(0.0),
                }
            })
            .collect();

        WeeklyReport {
            generated_at,
            portfolio_value: state.total_value,
            initial_value,
            cash: state.cash,
            sells,
            buys,
            failed_sells,
            failed_buys,
            holdings,
        }
    }

    pub fn cumulative_gain(&self) -> f64 {
        self.portfolio_value - self.initial_value
    }

    /// Cumulative return as a fraction of the initial value; 0 when the
    /// initial value is not positive.
    pub fn cumulative_return(&self) -> f64 {
        if self.initial_value <= 0.0 {
            return 0.0;
        }
        self.cumulative_gain() / self.initial_value
    }
}
