//! CSV readers for quote snapshots and return series.
//!
//! Formats (header row required):
//! - quotes: `code,price[,name]`
//! - period returns: `date,code,return`, one row per asset per week, keyed
//!   by the week's Monday
//! - return series: a `return` column, one row per period

use crate::domain::error::TraderError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteRow {
    pub code: String,
    pub price: f64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeriodReturnRow {
    date: String,
    code: String,
    #[serde(rename = "return")]
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ReturnRow {
    #[serde(rename = "return")]
    value: f64,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, TraderError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TraderError::DataUnavailable {
            code: path.display().to_string(),
            reason: format!("failed to open: {}", e),
        })
}

fn parse_err(path: &Path, e: impl std::fmt::Display) -> TraderError {
    TraderError::DataUnavailable {
        code: path.display().to_string(),
        reason: format!("CSV parse error: {}", e),
    }
}

pub fn read_quotes(path: &Path) -> Result<Vec<QuoteRow>, TraderError> {
    let mut rdr = reader(path)?;
    let mut quotes = Vec::new();
    for result in rdr.deserialize() {
        let row: QuoteRow = result.map_err(|e| parse_err(path, e))?;
        quotes.push(row);
    }
    Ok(quotes)
}

/// Per-asset returns grouped by week. Unparseable dates are skipped with a
/// warning so one bad row does not sink a whole backtest.
pub fn read_period_returns(
    path: &Path,
) -> Result<BTreeMap<NaiveDate, HashMap<String, f64>>, TraderError> {
    let mut rdr = reader(path)?;
    let mut periods: BTreeMap<NaiveDate, HashMap<String, f64>> = BTreeMap::new();

    for result in rdr.deserialize() {
        let row: PeriodReturnRow = result.map_err(|e| parse_err(path, e))?;
        let Ok(date) = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") else {
            warn!(date = %row.date, code = %row.code, "invalid date in returns file, row skipped");
            continue;
        };
        if !row.value.is_finite() {
            warn!(date = %row.date, code = %row.code, "non-finite return, row skipped");
            continue;
        }
        periods.entry(date).or_default().insert(row.code, row.value);
    }
    Ok(periods)
}

pub fn read_returns_series(path: &Path) -> Result<Vec<f64>, TraderError> {
    let mut rdr = reader(path)?;
    let mut returns = Vec::new();
    for result in rdr.deserialize() {
        let row: ReturnRow = result.map_err(|e| parse_err(path, e))?;
        returns.push(row.value);
    }
    Ok(returns)
}
