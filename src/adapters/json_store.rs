//! JSON file persistence for portfolio state and backtest exports.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::domain::error::TraderError;
use crate::domain::ledger::WeeklyRecord;
use crate::domain::metrics::cumulative_curve;
use crate::domain::portfolio::PortfolioState;
use crate::ports::store_port::StateStore;

/// Portfolio state as a single pretty-printed JSON document.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<PortfolioState>, TraderError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, state: &PortfolioState) -> Result<(), TraderError> {
        write_json_atomic(&self.path, state)?;
        debug!(path = %self.path.display(), "state written");
        Ok(())
    }
}

/// Write `value` to a sibling temp file, then rename it over `path`, so
/// readers never observe a partial document.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), TraderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let json = serde_json::to_string_pretty(value)?;
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Write the full period history to `<dir>/history.json`.
pub fn write_history_json(dir: &Path, records: &[WeeklyRecord]) -> Result<PathBuf, TraderError> {
    let path = dir.join("history.json");
    write_json_atomic(&path, records)?;
    Ok(path)
}

#[derive(Serialize)]
struct CurveRow<'a> {
    period: &'a str,
    period_return: f64,
    benchmark_return: f64,
    cumulative_return: f64,
    benchmark_cumulative: f64,
}

/// Write strategy and benchmark cumulative curves to `<dir>/curves.csv`.
pub fn write_curves_csv(dir: &Path, records: &[WeeklyRecord]) -> Result<PathBuf, TraderError> {
    fs::create_dir_all(dir)?;
    let path = dir.join("curves.csv");

    let strategy: Vec<f64> = records.iter().map(|r| r.period_return).collect();
    let benchmark: Vec<f64> = records.iter().map(|r| r.benchmark_return).collect();
    let strategy_curve = cumulative_curve(&strategy);
    let benchmark_curve = cumulative_curve(&benchmark);

    let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
    for (i, record) in records.iter().enumerate() {
        writer
            .serialize(CurveRow {
                period: &record.period_label,
                period_return: record.period_return,
                benchmark_return: record.benchmark_return,
                cumulative_return: strategy_curve[i],
                benchmark_cumulative: benchmark_curve[i],
            })
            .map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(path)
}

fn csv_err(e: csv::Error) -> TraderError {
    TraderError::Io(std::io::Error::other(e))
}
