#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use threes_trader::domain::allocation::{AllocationItem, TargetAllocation};
use threes_trader::domain::error::{Side, TraderError};
use threes_trader::domain::portfolio::{Holding, PortfolioState};
use threes_trader::ports::broker_port::{Balance, MarketDataPort, OrderPort};
use threes_trader::ports::store_port::StateStore;

pub struct MockMarketData {
    pub prices: HashMap<String, f64>,
    pub errors: HashSet<String>,
    pub balance: Balance,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
            errors: HashSet::new(),
            balance: Balance::default(),
        }
    }

    pub fn with_price(mut self, code: &str, price: f64) -> Self {
        self.prices.insert(code.to_string(), price);
        self
    }

    pub fn with_error(mut self, code: &str) -> Self {
        self.errors.insert(code.to_string());
        self
    }

    pub fn with_balance(mut self, cash: f64, holdings: &[(&str, &str, u64, f64)]) -> Self {
        let mut map = BTreeMap::new();
        for (code, name, shares, avg_price) in holdings {
            map.insert(
                code.to_string(),
                Holding {
                    name: name.to_string(),
                    shares: *shares,
                    avg_price: *avg_price,
                },
            );
        }
        self.balance = Balance {
            cash,
            holdings: map,
        };
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn current_price(&self, code: &str) -> Result<Option<f64>, TraderError> {
        if self.errors.contains(code) {
            return Err(TraderError::DataUnavailable {
                code: code.to_string(),
                reason: "quote feed timeout".to_string(),
            });
        }
        Ok(self.prices.get(code).copied())
    }

    fn balance(&self) -> Result<Balance, TraderError> {
        Ok(self.balance.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub side: Side,
    pub code: String,
    pub shares: u64,
    pub price: Option<f64>,
}

#[derive(Default)]
pub struct MockOrderPort {
    pub placed: RefCell<Vec<PlacedOrder>>,
    pub rejected: HashSet<String>,
}

impl MockOrderPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, code: &str) -> Self {
        self.rejected.insert(code.to_string());
        self
    }

    fn place(&self, side: Side, code: &str, shares: u64, price: Option<f64>) -> bool {
        self.placed.borrow_mut().push(PlacedOrder {
            side,
            code: code.to_string(),
            shares,
            price,
        });
        !self.rejected.contains(code)
    }
}

impl OrderPort for MockOrderPort {
    fn order_buy(&self, code: &str, shares: u64, price: Option<f64>) -> Result<bool, TraderError> {
        Ok(self.place(Side::Buy, code, shares, price))
    }

    fn order_sell(&self, code: &str, shares: u64, price: Option<f64>) -> Result<bool, TraderError> {
        Ok(self.place(Side::Sell, code, shares, price))
    }
}

/// State store whose every operation fails.
pub struct BrokenStore;

impl StateStore for BrokenStore {
    fn load(&self) -> Result<Option<PortfolioState>, TraderError> {
        Err(TraderError::Database {
            reason: "connection refused".to_string(),
        })
    }

    fn save(&self, _state: &PortfolioState) -> Result<(), TraderError> {
        Err(TraderError::Database {
            reason: "connection refused".to_string(),
        })
    }
}

pub fn target(items: &[(&str, f64)]) -> TargetAllocation {
    let items: Vec<AllocationItem> = items
        .iter()
        .map(|(code, weight)| AllocationItem {
            code: code.to_string(),
            name: format!("{code} Co"),
            weight: *weight,
        })
        .collect();
    let invested: f64 = items.iter().map(|i| i.weight).sum();
    TargetAllocation {
        items,
        cash_weight: (1.0 - invested).max(0.0),
    }
}

pub fn returns(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(c, r)| (c.to_string(), *r)).collect()
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn same_exit(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}
