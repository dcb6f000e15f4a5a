//! Portfolio state: cash, integer-share holdings and period history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::ledger::WeeklyRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub name: String,
    pub shares: u64,
    pub avg_price: f64,
}

impl Holding {
    pub fn market_value(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }
}

/// Persisted portfolio state.
///
/// Every entry in `holdings` has `shares > 0`; positions that reach zero
/// are removed. `total_value` is only meaningful as of the last
/// [`PortfolioState::revalue`]. `revision` grows by one with every saved
/// cycle so copies held by different stores can be ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub total_value: f64,
    pub strategy: String,
    #[serde(default)]
    pub history: Vec<WeeklyRecord>,
    #[serde(default)]
    pub revision: u64,
}

impl PortfolioState {
    pub fn new(initial_cash: f64, strategy: &str) -> Self {
        PortfolioState {
            cash: initial_cash,
            holdings: BTreeMap::new(),
            total_value: initial_cash,
            strategy: strategy.to_string(),
            history: Vec::new(),
            revision: 0,
        }
    }

    pub fn holding(&self, code: &str) -> Option<&Holding> {
        self.holdings.get(code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.holdings.contains_key(code)
    }

    pub fn position_count(&self) -> usize {
        self.holdings.len()
    }

    pub fn shares_held(&self, code: &str) -> u64 {
        self.holdings.get(code).map(|h| h.shares).unwrap_or(0)
    }

    pub fn remove_position(&mut self, code: &str) -> Option<Holding> {
        self.holdings.remove(code)
    }

    /// Add shares bought at `price`, averaging the cost basis into an
    /// existing position. Zero-share purchases are ignored.
    pub fn add_shares(&mut self, code: &str, name: &str, shares: u64, price: f64) {
        if shares == 0 {
            return;
        }
        match self.holdings.get_mut(code) {
            Some(holding) => {
                let total = holding.shares + shares;
                holding.avg_price = (holding.avg_price * holding.shares as f64
                    + price * shares as f64)
                    / total as f64;
                holding.shares = total;
            }
            None => {
                self.holdings.insert(
                    code.to_string(),
                    Holding {
                        name: name.to_string(),
                        shares,
                        avg_price: price,
                    },
                );
            }
        }
    }

    /// Cash plus holdings at the given prices. Holdings without a price
    /// contribute nothing.
    pub fn market_value(&self, prices: &HashMap<String, f64>) -> f64 {
        let positions: f64 = self
            .holdings
            .iter()
            .filter_map(|(code, h)| prices.get(code).map(|&p| h.market_value(p)))
            .sum();
        self.cash + positions
    }

    pub fn revalue(&mut self, prices: &HashMap<String, f64>) -> f64 {
        self.total_value = self.market_value(prices);
        self.total_value
    }
}
