//! Performance metrics over a chronological series of period returns.
//!
//! Every function is total: empty input, a single observation, zero
//! variance and a drawdown-free series all yield `0.0` rather than NaN.

use serde::{Deserialize, Serialize};

/// The four headline metrics reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accumulated_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
}

impl Metrics {
    pub fn summary(&self) -> String {
        let rule = "=".repeat(50);
        format!(
            "{rule}\nPerformance report\n{rule}\n\
             Accumulated return (AR): {ar:+.2}%\n\
             Sharpe ratio (SR):       {sr:.4}\n\
             Max drawdown (MDD):      {mdd:.2}%\n\
             Calmar ratio (CR):       {cr:.4}\n{rule}",
            rule = rule,
            ar = self.accumulated_return * 100.0,
            sr = self.sharpe_ratio,
            mdd = self.max_drawdown * 100.0,
            cr = self.calmar_ratio,
        )
    }
}

/// Total compounded return: `Π(1 + r) − 1`.
pub fn accumulated_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Mean over Bessel-corrected sample standard deviation, risk-free rate 0.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev == 0.0 {
        return 0.0;
    }
    mean / stddev
}

/// Most negative peak-to-trough decline of the wealth curve starting at 1.
///
/// Returns a value `<= 0`.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut mdd = 0.0_f64;

    for r in returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        }
        if peak > 0.0 {
            let drawdown = (wealth - peak) / peak;
            if drawdown < mdd {
                mdd = drawdown;
            }
        }
    }

    mdd
}

/// Accumulated return over the absolute max drawdown.
pub fn calmar_ratio(returns: &[f64]) -> f64 {
    let mdd = max_drawdown(returns);
    if mdd == 0.0 {
        return 0.0;
    }
    accumulated_return(returns) / mdd.abs()
}

pub fn evaluate_all(returns: &[f64]) -> Metrics {
    Metrics {
        accumulated_return: accumulated_return(returns),
        sharpe_ratio: sharpe_ratio(returns),
        max_drawdown: max_drawdown(returns),
        calmar_ratio: calmar_ratio(returns),
    }
}

/// Cumulative return after each period, same length as `returns`.
pub fn cumulative_curve(returns: &[f64]) -> Vec<f64> {
    let mut wealth = 1.0_f64;
    returns
        .iter()
        .map(|r| {
            wealth *= 1.0 + r;
            wealth - 1.0
        })
        .collect()
}
