//! In-memory paper broker over a fixed quote book.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{debug, warn};

use crate::adapters::csv_adapter::read_quotes;
use crate::domain::error::TraderError;
use crate::domain::portfolio::{Holding, PortfolioState};
use crate::ports::broker_port::{Balance, MarketDataPort, OrderPort};
use crate::ports::security_port::SecurityNamePort;

/// Fills market orders at the quoted price. Orders without a quote, buys
/// beyond available cash, and sells beyond held shares are rejected.
pub struct PaperBroker {
    quotes: HashMap<String, f64>,
    names: HashMap<String, String>,
    account: RefCell<Balance>,
}

impl PaperBroker {
    pub fn new(quotes: HashMap<String, f64>, cash: f64) -> Self {
        Self {
            quotes,
            names: HashMap::new(),
            account: RefCell::new(Balance {
                cash,
                holdings: BTreeMap::new(),
            }),
        }
    }

    /// Load quotes (and names, when present) from a `code,price[,name]` CSV.
    pub fn from_quotes_csv(path: &Path, cash: f64) -> Result<Self, TraderError> {
        let mut broker = Self::new(HashMap::new(), cash);
        for row in read_quotes(path)? {
            if let Some(name) = row.name.filter(|n| !n.is_empty()) {
                broker.names.insert(row.code.clone(), name);
            }
            broker.quotes.insert(row.code, row.price);
        }
        Ok(broker)
    }

    /// Seed the account with an existing portfolio.
    pub fn with_state(self, state: &PortfolioState) -> Self {
        {
            let mut account = self.account.borrow_mut();
            account.cash = state.cash;
            account.holdings = state.holdings.clone();
        }
        self
    }

    pub fn cash(&self) -> f64 {
        self.account.borrow().cash
    }

    pub fn shares_held(&self, code: &str) -> u64 {
        self.account
            .borrow()
            .holdings
            .get(code)
            .map(|h| h.shares)
            .unwrap_or(0)
    }

    fn fill_price(&self, code: &str, limit: Option<f64>) -> Option<f64> {
        limit.or_else(|| self.quotes.get(code).copied())
    }
}

impl MarketDataPort for PaperBroker {
    fn current_price(&self, code: &str) -> Result<Option<f64>, TraderError> {
        Ok(self.quotes.get(code).copied())
    }

    fn balance(&self) -> Result<Balance, TraderError> {
        Ok(self.account.borrow().clone())
    }
}

impl OrderPort for PaperBroker {
    fn order_buy(&self, code: &str, shares: u64, price: Option<f64>) -> Result<bool, TraderError> {
        let Some(fill) = self.fill_price(code, price) else {
            warn!(code, "buy rejected: no quote");
            return Ok(false);
        };
        let cost = shares as f64 * fill;

        let mut account = self.account.borrow_mut();
        if shares == 0 || cost > account.cash {
            warn!(code, shares, cost, cash = account.cash, "buy rejected");
            return Ok(false);
        }

        account.cash -= cost;
        let name = self
            .names
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string());
        let holding = account.holdings.entry(code.to_string()).or_insert(Holding {
            name,
            shares: 0,
            avg_price: fill,
        });
        let total = holding.shares + shares;
        holding.avg_price =
            (holding.avg_price * holding.shares as f64 + fill * shares as f64) / total as f64;
        holding.shares = total;

        debug!(code, shares, price = fill, "paper buy filled");
        Ok(true)
    }

    fn order_sell(&self, code: &str, shares: u64, price: Option<f64>) -> Result<bool, TraderError> {
        let Some(fill) = self.fill_price(code, price) else {
            warn!(code, "sell rejected: no quote");
            return Ok(false);
        };

        let mut account = self.account.borrow_mut();
        let held = account.holdings.get(code).map(|h| h.shares).unwrap_or(0);
        if shares == 0 || shares > held {
            warn!(code, shares, held, "sell rejected");
            return Ok(false);
        }

        account.cash += shares as f64 * fill;
        if shares == held {
            account.holdings.remove(code);
        } else if let Some(holding) = account.holdings.get_mut(code) {
            holding.shares -= shares;
        }

        debug!(code, shares, price = fill, "paper sell filled");
        Ok(true)
    }
}

impl SecurityNamePort for PaperBroker {
    fn stock_name(&self, code: &str) -> Option<String> {
        self.names.get(code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn broker() -> PaperBroker {
        let quotes = HashMap::from([("A".to_string(), 100.0), ("B".to_string(), 50.0)]);
        PaperBroker::new(quotes, 1_000.0)
    }

    #[test]
    fn buy_fills_at_quote_and_debits_cash() {
        let b = broker();
        assert!(b.order_buy("A", 3, None).unwrap());
        assert_eq!(b.cash(), 700.0);
        assert_eq!(b.shares_held("A"), 3);
    }

    #[test]
    fn buy_without_quote_or_cash_is_rejected() {
        let b = broker();
        assert!(!b.order_buy("ZZZ", 1, None).unwrap());
        assert!(!b.order_buy("A", 11, None).unwrap());
        assert_eq!(b.cash(), 1_000.0);
    }

    #[test]
    fn sell_more_than_held_is_rejected() {
        let b = broker();
        b.order_buy("B", 4, None).unwrap();
        assert!(!b.order_sell("B", 5, None).unwrap());
        assert!(b.order_sell("B", 4, None).unwrap());
        assert_eq!(b.shares_held("B"), 0);
        assert!(b.balance().unwrap().holdings.is_empty());
        assert_eq!(b.cash(), 1_000.0);
    }

    #[test]
    fn partial_sell_keeps_position() {
        let b = broker();
        b.order_buy("B", 4, None).unwrap();
        assert!(b.order_sell("B", 1, None).unwrap());
        assert_eq!(b.shares_held("B"), 3);
    }

    #[test]
    fn seeded_state_is_reported_in_balance() {
        let mut state = PortfolioState::new(500.0, "s");
        state.add_shares("A", "Alpha", 2, 90.0);
        let b = broker().with_state(&state);
        let balance = b.balance().unwrap();
        assert_eq!(balance.cash, 500.0);
        assert_eq!(balance.holdings["A"].shares, 2);
    }

    #[test]
    fn loads_quotes_and_names_from_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotes.csv");
        fs::write(&path, "code,price,name\n005930,71000,Samsung Electronics\n035420,180000,\n").unwrap();

        let b = PaperBroker::from_quotes_csv(&path, 0.0).unwrap();
        assert_eq!(b.current_price("005930").unwrap(), Some(71_000.0));
        assert_eq!(b.stock_name("005930").as_deref(), Some("Samsung Electronics"));
        assert_eq!(b.stock_name("035420"), None);
        assert_eq!(b.current_price("999999").unwrap(), None);
    }
}
