//! Order submission for a rebalance plan.
//!
//! Sells go out before buys. Every order is sent as a market order; a
//! rejected or failed order is recorded and the rest of the plan continues.
//! Nothing is retried.

use tracing::{info, warn};

use super::error::{Side, TraderError};
use super::rebalance::RebalancePlan;
use crate::ports::broker_port::OrderPort;

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub sells_submitted: usize,
    pub buys_submitted: usize,
    pub failures: Vec<TraderError>,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn submitted(&self) -> usize {
        self.sells_submitted + self.buys_submitted
    }

    /// Whether the `side` order for `code` was rejected or errored.
    pub fn failed(&self, side: Side, code: &str) -> bool {
        self.failures.iter().any(|f| {
            matches!(f, TraderError::OrderFailure { code: c, side: s, .. } if *s == side && c == code)
        })
    }
}

fn submit(
    orders: &dyn OrderPort,
    side: Side,
    code: &str,
    shares: u64,
) -> Result<(), TraderError> {
    let accepted = match side {
        Side::Sell => orders.order_sell(code, shares, None),
        Side::Buy => orders.order_buy(code, shares, None),
    }
    .map_err(|e| TraderError::OrderFailure {
        code: code.to_string(),
        side,
        reason: e.to_string(),
    })?;

    if accepted {
        Ok(())
    } else {
        Err(TraderError::OrderFailure {
            code: code.to_string(),
            side,
            reason: "rejected".to_string(),
        })
    }
}

pub fn execute_plan(plan: &RebalancePlan, orders: &dyn OrderPort) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for sell in &plan.sells {
        match submit(orders, Side::Sell, &sell.code, sell.shares) {
            Ok(()) => {
                info!(code = %sell.code, shares = sell.shares, "sell submitted");
                report.sells_submitted += 1;
            }
            Err(e) => {
                warn!(error = %e, "sell failed");
                report.failures.push(e);
            }
        }
    }

    for buy in &plan.buys {
        match submit(orders, Side::Buy, &buy.code, buy.shares) {
            Ok(()) => {
                info!(code = %buy.code, shares = buy.shares, "buy submitted");
                report.buys_submitted += 1;
            }
            Err(e) => {
                warn!(error = %e, "buy failed");
                report.failures.push(e);
            }
        }
    }

    report
}
