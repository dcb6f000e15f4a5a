//! Domain error types.

use std::fmt;

/// Direction of an order, used when reporting execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Top-level error type for threes-trader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("data unavailable for {code}: {reason}")]
    DataUnavailable { code: String, reason: String },

    #[error("malformed allocation: {reason}")]
    AllocationMalformed { reason: String },

    #[error("{side} order failed for {code}: {reason}")]
    OrderFailure {
        code: String,
        side: Side,
        reason: String,
    },

    #[error("persistence failure: {reason} (fallback saved: {fallback_saved})")]
    Persistence { reason: String, fallback_saved: bool },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("ledger is finalized; no further periods can be recorded")]
    LedgerFinalized,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) | TraderError::Json(_) | TraderError::LedgerFinalized => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Persistence { .. }
            | TraderError::Database { .. }
            | TraderError::DatabaseQuery { .. } => 3,
            TraderError::AllocationMalformed { .. } => 4,
            TraderError::DataUnavailable { .. } => 5,
            TraderError::OrderFailure { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
