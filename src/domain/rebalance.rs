//! Rebalancing engine: turns current state plus a target allocation into
//! sell/buy instructions and the resulting portfolio state.
//!
//! Steps:
//! 1. Value the portfolio at current quotes (unpriced holdings count as 0)
//! 2. Sell every holding that is not in the target, in full
//! 3. Size buy candidates as `floor(total_value * weight / price)` minus
//!    shares already held; drop unpriced and sub-one-share candidates
//! 4. Buy cheapest first within `cash * (1 - cash_reserve_fraction)`, up to
//!    `max_positions` buys
//!
//! Sell proceeds are credited to cash immediately and are available to the
//! same cycle's buys, even though the sells may not have settled yet. Any
//! per-ticker failure skips that ticker only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::allocation::{DEFAULT_MAX_POSITIONS, TargetAllocation};
use super::portfolio::PortfolioState;
use crate::ports::broker_port::{Balance, MarketDataPort};

pub const DEFAULT_CASH_RESERVE_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceConfig {
    pub max_positions: usize,
    /// Share of post-sell cash kept back to absorb quote-to-fill drift.
    pub cash_reserve_fraction: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        RebalanceConfig {
            max_positions: DEFAULT_MAX_POSITIONS,
            cash_reserve_fraction: DEFAULT_CASH_RESERVE_FRACTION,
        }
    }
}

/// Full-position sale. `price == None` leaves pricing to the executor and
/// books zero proceeds until the fill is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellOrder {
    pub code: String,
    pub name: String,
    pub shares: u64,
    pub price: Option<f64>,
    pub proceeds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub code: String,
    pub name: String,
    pub shares: u64,
    pub price: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub sells: Vec<SellOrder>,
    pub buys: Vec<BuyOrder>,
    pub value_before: f64,
    pub value_after: f64,
}

impl RebalancePlan {
    pub fn is_empty(&self) -> bool {
        self.sells.is_empty() && self.buys.is_empty()
    }

    pub fn total_proceeds(&self) -> f64 {
        self.sells.iter().map(|s| s.proceeds).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.buys.iter().map(|b| b.cost).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceOutcome {
    pub plan: RebalancePlan,
    pub state: PortfolioState,
    /// Usable quotes seen while planning, keyed by code.
    pub prices: HashMap<String, f64>,
}

struct BuyCandidate<'a> {
    code: &'a str,
    name: &'a str,
    shares: u64,
    price: f64,
}

/// Caches one quote per ticker for the duration of a rebalance call.
struct QuoteBook<'a> {
    market: &'a dyn MarketDataPort,
    quotes: HashMap<String, Option<f64>>,
}

impl<'a> QuoteBook<'a> {
    fn new(market: &'a dyn MarketDataPort) -> Self {
        QuoteBook {
            market,
            quotes: HashMap::new(),
        }
    }

    fn price(&mut self, code: &str) -> Option<f64> {
        if let Some(cached) = self.quotes.get(code) {
            return *cached;
        }
        let price = match self.market.current_price(code) {
            Ok(Some(p)) if p.is_finite() && p > 0.0 => Some(p),
            Ok(Some(p)) => {
                warn!(code, price = p, "unusable quote ignored");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(code, error = %e, "price lookup failed");
                None
            }
        };
        self.quotes.insert(code.to_string(), price);
        price
    }

    fn known_prices(&self) -> HashMap<String, f64> {
        self.quotes
            .iter()
            .filter_map(|(code, p)| p.map(|p| (code.clone(), p)))
            .collect()
    }
}

/// Plan a rebalance of `current` toward `target`.
///
/// `current` is left untouched; the returned state reflects the plan as if
/// every order filled at its quote.
pub fn rebalance(
    current: &PortfolioState,
    target: &TargetAllocation,
    market: &dyn MarketDataPort,
    config: &RebalanceConfig,
) -> RebalanceOutcome {
    let mut book = QuoteBook::new(market);
    let mut state = current.clone();

    let mut total_value = current.cash;
    for (code, holding) in &current.holdings {
        match book.price(code) {
            Some(price) => total_value += holding.market_value(price),
            None => warn!(
                code = %code,
                shares = holding.shares,
                "no price for held position, valued at 0"
            ),
        }
    }
    info!(cash = current.cash, total_value, "portfolio valued");

    let mut sells = Vec::new();
    for (code, holding) in &current.holdings {
        if target.contains(code) {
            continue;
        }
        let price = book.price(code);
        let proceeds = price.map(|p| holding.market_value(p)).unwrap_or(0.0);
        if price.is_none() {
            warn!(code = %code, "selling at market without a quote, proceeds pending");
        }

        state.cash += proceeds;
        state.remove_position(code);
        sells.push(SellOrder {
            code: code.clone(),
            name: holding.name.clone(),
            shares: holding.shares,
            price,
            proceeds,
        });
    }

    let mut candidates = Vec::new();
    for item in &target.items {
        let Some(price) = book.price(&item.code) else {
            warn!(code = %item.code, name = %item.name, "no price, buy skipped");
            continue;
        };

        let target_shares = (total_value * item.weight / price).floor();
        if !target_shares.is_finite() || target_shares < 1.0 {
            debug!(code = %item.code, price, "target below one share, buy skipped");
            continue;
        }
        let shares = (target_shares as u64).saturating_sub(state.shares_held(&item.code));
        if shares == 0 {
            debug!(code = %item.code, "already held at target size");
            continue;
        }

        candidates.push(BuyCandidate {
            code: &item.code,
            name: &item.name,
            shares,
            price,
        });
    }

    // Cheapest first fills the most positions from integer share counts.
    candidates.sort_by(|a, b| a.price.total_cmp(&b.price));

    let budget = state.cash * (1.0 - config.cash_reserve_fraction);
    let mut used_cash = 0.0;
    let mut buys: Vec<BuyOrder> = Vec::new();

    for candidate in candidates {
        if buys.len() >= config.max_positions {
            break;
        }
        let cost = candidate.shares as f64 * candidate.price;
        if used_cash + cost > budget {
            debug!(
                code = candidate.code,
                cost,
                remaining = budget - used_cash,
                "over cash budget, buy skipped"
            );
            continue;
        }

        used_cash += cost;
        state.cash -= cost;
        state.add_shares(candidate.code, candidate.name, candidate.shares, candidate.price);
        buys.push(BuyOrder {
            code: candidate.code.to_string(),
            name: candidate.name.to_string(),
            shares: candidate.shares,
            price: candidate.price,
            cost,
        });
    }

    let prices = book.known_prices();
    let value_after = state.revalue(&prices);
    info!(
        sells = sells.len(),
        buys = buys.len(),
        value_before = total_value,
        value_after,
        "rebalance planned"
    );

    RebalanceOutcome {
        plan: RebalancePlan {
            sells,
            buys,
            value_before: total_value,
            value_after,
        },
        state,
        prices,
    }
}

/// Build a state from a broker balance, valued at its cost basis.
pub fn snapshot_from_balance(balance: &Balance, strategy: &str) -> PortfolioState {
    let mut state = PortfolioState::new(balance.cash, strategy);
    for (code, holding) in &balance.holdings {
        state.add_shares(code, &holding.name, holding.shares, holding.avg_price);
    }
    let cost_basis: HashMap<String, f64> = state
        .holdings
        .iter()
        .map(|(code, h)| (code.clone(), h.avg_price))
        .collect();
    state.revalue(&cost_basis);
    state
}
