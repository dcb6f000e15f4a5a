//! Period-by-period performance ledger.
//!
//! Lifecycle: `Initialized -> Active* -> Finalized`. [`Ledger::record_period`]
//! and its variants are the only mutators of capital, cumulative return and
//! history. Periods
//! must be recorded in chronological order since each one compounds on the
//! previous capital.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use super::allocation::TargetAllocation;
use super::error::TraderError;
use super::metrics::{self, Metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    Initialized,
    Active,
    Finalized,
}

/// Settled result of one period. Never mutated after being appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRecord {
    pub period_label: String,
    pub allocation: TargetAllocation,
    pub period_return: f64,
    pub benchmark_return: f64,
    pub cumulative_return: f64,
    pub capital: f64,
    pub strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub period_label: String,
    pub strategy: String,
    pub period_return: f64,
    pub benchmark_return: f64,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_capital: f64,
    capital: f64,
    current_strategy: String,
    history: Vec<WeeklyRecord>,
    strategy_history: Vec<StrategyRecord>,
    status: LedgerStatus,
}

impl Ledger {
    pub fn new(initial_capital: f64, strategy: &str) -> Self {
        Ledger {
            initial_capital,
            capital: initial_capital,
            current_strategy: strategy.to_string(),
            history: Vec::new(),
            strategy_history: Vec::new(),
            status: LedgerStatus::Initialized,
        }
    }

    /// Rebuild a ledger from persisted records, continuing from the last
    /// recorded capital.
    pub fn resume(initial_capital: f64, strategy: &str, history: Vec<WeeklyRecord>) -> Self {
        let capital = history.last().map(|r| r.capital).unwrap_or(initial_capital);
        let strategy_history = history.iter().map(strategy_record).collect();
        let status = if history.is_empty() {
            LedgerStatus::Initialized
        } else {
            LedgerStatus::Active
        };

        Ledger {
            initial_capital,
            capital,
            current_strategy: strategy.to_string(),
            history,
            strategy_history,
            status,
        }
    }

    /// Settle one period and return its portfolio return.
    ///
    /// Assets without an observed return contribute 0.
    pub fn record_period(
        &mut self,
        label: &str,
        allocation: &TargetAllocation,
        per_asset_returns: &HashMap<String, f64>,
        benchmark_return: f64,
    ) -> Result<f64, TraderError> {
        if self.status == LedgerStatus::Finalized {
            return Err(TraderError::LedgerFinalized);
        }

        let period_return: f64 = allocation
            .items
            .iter()
            .map(|item| match per_asset_returns.get(&item.code) {
                Some(r) => item.weight * r,
                None => {
                    warn!(period = label, code = %item.code, "no return observed, counted as 0");
                    0.0
                }
            })
            .sum();

        self.settle(label, allocation, period_return, benchmark_return)
    }

    /// Settle a period whose portfolio return was observed directly, as in
    /// live trading where it is the change in account value between two
    /// rebalances.
    pub fn record_realized_period(
        &mut self,
        label: &str,
        allocation: &TargetAllocation,
        period_return: f64,
        benchmark_return: f64,
    ) -> Result<f64, TraderError> {
        if self.status == LedgerStatus::Finalized {
            return Err(TraderError::LedgerFinalized);
        }
        let period_return = if period_return.is_finite() {
            period_return
        } else {
            warn!(period = label, period_return, "non-finite period return, counted as 0");
            0.0
        };
        self.settle(label, allocation, period_return, benchmark_return)
    }

    fn settle(
        &mut self,
        label: &str,
        allocation: &TargetAllocation,
        period_return: f64,
        benchmark_return: f64,
    ) -> Result<f64, TraderError> {
        self.capital *= 1.0 + period_return;

        let cumulative_return = match self.history.last() {
            Some(prev) => (1.0 + prev.cumulative_return) * (1.0 + period_return) - 1.0,
            None => period_return,
        };

        let record = WeeklyRecord {
            period_label: label.to_string(),
            allocation: allocation.clone(),
            period_return,
            benchmark_return,
            cumulative_return,
            capital: self.capital,
            strategy: self.current_strategy.clone(),
        };
        self.strategy_history.push(strategy_record(&record));
        self.history.push(record);
        self.status = LedgerStatus::Active;

        info!(
            period = label,
            period_return = format_args!("{:+.2}%", period_return * 100.0),
            benchmark = format_args!("{:+.2}%", benchmark_return * 100.0),
            cumulative = format_args!("{:+.2}%", cumulative_return * 100.0),
            capital = format_args!("{:.0}", self.capital),
            "period settled"
        );

        Ok(period_return)
    }

    /// Record a period whose data could not be obtained as a zero return,
    /// held entirely in cash.
    pub fn record_failed_period(&mut self, label: &str) -> Result<f64, TraderError> {
        warn!(period = label, "period data unavailable, assuming zero return");
        self.record_period(label, &TargetAllocation::all_cash(), &HashMap::new(), 0.0)
    }

    pub fn update_strategy(&mut self, strategy: &str) {
        self.current_strategy = strategy.to_string();
    }

    pub fn current_strategy(&self) -> &str {
        &self.current_strategy
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn cumulative_return(&self) -> f64 {
        self.history.last().map(|r| r.cumulative_return).unwrap_or(0.0)
    }

    pub fn status(&self) -> LedgerStatus {
        self.status
    }

    pub fn history(&self) -> &[WeeklyRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<WeeklyRecord> {
        self.history
    }

    pub fn strategy_history(&self) -> &[StrategyRecord] {
        &self.strategy_history
    }

    pub fn recent_strategy_history(&self, n: usize) -> &[StrategyRecord] {
        let start = self.strategy_history.len().saturating_sub(n);
        &self.strategy_history[start..]
    }

    pub fn period_returns(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.period_return).collect()
    }

    pub fn benchmark_returns(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.benchmark_return).collect()
    }

    /// Close the ledger and score the full run.
    pub fn finalize(&mut self) -> Metrics {
        self.status = LedgerStatus::Finalized;
        metrics::evaluate_all(&self.period_returns())
    }
}

fn strategy_record(record: &WeeklyRecord) -> StrategyRecord {
    StrategyRecord {
        period_label: record.period_label.clone(),
        strategy: record.strategy.clone(),
        period_return: record.period_return,
        benchmark_return: record.benchmark_return,
    }
}

/// Equal-weight mean return across the universe; 0 when nothing was observed.
pub fn market_average_return(per_asset_returns: &HashMap<String, f64>) -> f64 {
    if per_asset_returns.is_empty() {
        return 0.0;
    }
    per_asset_returns.values().sum::<f64>() / per_asset_returns.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::AllocationItem;
    use approx::assert_relative_eq;

    fn allocation(items: &[(&str, f64)]) -> TargetAllocation {
        let items: Vec<AllocationItem> = items
            .iter()
            .map(|(code, weight)| AllocationItem {
                code: code.to_string(),
                name: code.to_string(),
                weight: *weight,
            })
            .collect();
        let invested: f64 = items.iter().map(|i| i.weight).sum();
        TargetAllocation {
            items,
            cash_weight: 1.0 - invested,
        }
    }

    fn returns(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(c, r)| (c.to_string(), *r)).collect()
    }

    #[test]
    fn new_ledger_is_initialized() {
        let ledger = Ledger::new(100.0, "Balanced");
        assert_eq!(ledger.status(), LedgerStatus::Initialized);
        assert_eq!(ledger.capital(), 100.0);
        assert_eq!(ledger.cumulative_return(), 0.0);
    }

    #[test]
    fn period_return_is_weighted_sum() {
        let mut ledger = Ledger::new(1_000.0, "s");
        let alloc = allocation(&[("A", 0.5), ("B", 0.3)]);
        let r = ledger
            .record_period("W1", &alloc, &returns(&[("A", 0.10), ("B", -0.05)]), 0.01)
            .unwrap();
        assert_relative_eq!(r, 0.05 - 0.015, epsilon = 1e-12);
        assert_eq!(ledger.status(), LedgerStatus::Active);
    }

    #[test]
    fn missing_asset_return_contributes_zero() {
        let mut ledger = Ledger::new(1_000.0, "s");
        let alloc = allocation(&[("A", 0.5), ("B", 0.5)]);
        let r = ledger
            .record_period("W1", &alloc, &returns(&[("A", 0.02)]), 0.0)
            .unwrap();
        assert_relative_eq!(r, 0.01, epsilon = 1e-12);
    }

    #[test]
    fn capital_compounds_multiplicatively() {
        let mut ledger = Ledger::new(1_000_000.0, "s");
        let alloc = allocation(&[("A", 1.0)]);
        for r in [0.05, -0.03, 0.02] {
            let before = ledger.capital();
            let period_return = ledger
                .record_period("W", &alloc, &returns(&[("A", r)]), 0.0)
                .unwrap();
            assert_eq!(ledger.capital(), before * (1.0 + period_return));
        }
    }

    #[test]
    fn cumulative_return_chains() {
        let mut ledger = Ledger::new(100.0, "s");
        let alloc = allocation(&[("A", 1.0)]);
        ledger
            .record_period("W1", &alloc, &returns(&[("A", 0.10)]), 0.0)
            .unwrap();
        assert_relative_eq!(ledger.cumulative_return(), 0.10, epsilon = 1e-12);
        ledger
            .record_period("W2", &alloc, &returns(&[("A", -0.10)]), 0.0)
            .unwrap();
        assert_relative_eq!(ledger.cumulative_return(), 1.1 * 0.9 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(ledger.capital(), 99.0, epsilon = 1e-9);
    }

    #[test]
    fn records_snapshot_strategy_and_parallel_log() {
        let mut ledger = Ledger::new(100.0, "Value");
        let alloc = allocation(&[("A", 0.4)]);
        ledger
            .record_period("W1", &alloc, &returns(&[("A", 0.1)]), 0.02)
            .unwrap();
        ledger.update_strategy("Momentum");
        ledger
            .record_period("W2", &alloc, &returns(&[("A", 0.1)]), 0.03)
            .unwrap();

        assert_eq!(ledger.history()[0].strategy, "Value");
        assert_eq!(ledger.history()[1].strategy, "Momentum");
        assert_eq!(ledger.history()[0].allocation, alloc);
        assert_eq!(ledger.strategy_history().len(), 2);
        assert_eq!(ledger.recent_strategy_history(1)[0].period_label, "W2");
        assert_eq!(ledger.recent_strategy_history(10).len(), 2);
        assert_eq!(ledger.benchmark_returns(), vec![0.02, 0.03]);
    }

    #[test]
    fn failed_period_records_zero_return() {
        let mut ledger = Ledger::new(500.0, "s");
        let r = ledger.record_failed_period("W1").unwrap();
        assert_eq!(r, 0.0);
        assert_eq!(ledger.capital(), 500.0);
        assert_eq!(ledger.history().len(), 1);
        assert!(ledger.history()[0].allocation.is_all_cash());
    }

    #[test]
    fn finalized_ledger_rejects_periods() {
        let mut ledger = Ledger::new(100.0, "s");
        let alloc = allocation(&[("A", 1.0)]);
        ledger
            .record_period("W1", &alloc, &returns(&[("A", 0.1)]), 0.0)
            .unwrap();
        let m = ledger.finalize();
        assert_relative_eq!(m.accumulated_return, 0.1, epsilon = 1e-12);
        assert_eq!(ledger.status(), LedgerStatus::Finalized);
        assert!(matches!(
            ledger.record_period("W2", &alloc, &HashMap::new(), 0.0),
            Err(TraderError::LedgerFinalized)
        ));
    }

    #[test]
    fn resume_continues_from_last_record() {
        let mut ledger = Ledger::new(100.0, "s");
        let alloc = allocation(&[("A", 1.0)]);
        ledger
            .record_period("W1", &alloc, &returns(&[("A", 0.2)]), 0.0)
            .unwrap();

        let mut resumed = Ledger::resume(100.0, "s", ledger.into_history());
        assert_eq!(resumed.status(), LedgerStatus::Active);
        assert_relative_eq!(resumed.capital(), 120.0, epsilon = 1e-9);
        resumed
            .record_period("W2", &alloc, &returns(&[("A", 0.5)]), 0.0)
            .unwrap();
        assert_relative_eq!(resumed.cumulative_return(), 0.8, epsilon = 1e-12);
        assert_eq!(resumed.strategy_history().len(), 2);
    }

    #[test]
    fn realized_period_compounds_like_a_weighted_one() {
        let mut ledger = Ledger::new(1_000.0, "s");
        let alloc = allocation(&[("A", 0.5)]);
        let r = ledger
            .record_realized_period("2024-03-04", &alloc, 0.1, 0.0)
            .unwrap();
        assert_eq!(r, 0.1);
        assert_relative_eq!(ledger.capital(), 1_100.0, epsilon = 1e-9);
        ledger
            .record_realized_period("2024-03-11", &alloc, f64::NAN, 0.0)
            .unwrap();
        assert_eq!(ledger.history()[1].period_return, 0.0);
        assert_relative_eq!(ledger.cumulative_return(), 0.1, epsilon = 1e-12);

        ledger.finalize();
        assert!(matches!(
            ledger.record_realized_period("2024-03-18", &alloc, 0.0, 0.0),
            Err(TraderError::LedgerFinalized)
        ));
    }

    #[test]
    fn market_average_is_equal_weight() {
        assert_eq!(market_average_return(&HashMap::new()), 0.0);
        let avg = market_average_return(&returns(&[("A", 0.1), ("B", -0.05), ("C", 0.01)]));
        assert_relative_eq!(avg, 0.02, epsilon = 1e-12);
    }
}
