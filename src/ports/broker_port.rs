//! Market data and order execution ports.

use std::collections::BTreeMap;

use crate::domain::error::TraderError;
use crate::domain::portfolio::Holding;

/// Account snapshot as reported by the broker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Balance {
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
}

pub trait MarketDataPort {
    /// Latest quote for `code`; `Ok(None)` when the feed has no price.
    fn current_price(&self, code: &str) -> Result<Option<f64>, TraderError>;

    fn balance(&self) -> Result<Balance, TraderError>;
}

/// Order submission. `price == None` means a market order.
///
/// `Ok(false)` is a rejection by the counterparty; `Err` is a transport or
/// client failure. Both are treated as a failed order by callers.
pub trait OrderPort {
    fn order_buy(&self, code: &str, shares: u64, price: Option<f64>) -> Result<bool, TraderError>;

    fn order_sell(&self, code: &str, shares: u64, price: Option<f64>)
    -> Result<bool, TraderError>;
}
