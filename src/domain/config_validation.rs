//! Configuration validation.
//!
//! Every check runs before any state is loaded or written.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_trading_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_max_positions(config)?;
    validate_cash_reserve(config)?;
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_positive(config, "portfolio", "initial_cash", 10_000_000.0)?;
    match config.get_string("portfolio", "state_path") {
        Some(s) if s.trim().is_empty() => Err(TraderError::ConfigInvalid {
            section: "portfolio".to_string(),
            key: "state_path".to_string(),
            reason: "state_path must not be empty".to_string(),
        }),
        _ => Ok(()),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_trading_config(config)?;
    validate_positive(config, "backtest", "initial_capital", 100_000_000.0)?;
    validate_dates(config)?;
    Ok(())
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_int("trading", "max_positions", 5);
    if value < 1 {
        return Err(TraderError::ConfigInvalid {
            section: "trading".to_string(),
            key: "max_positions".to_string(),
            reason: "max_positions must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_cash_reserve(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_double("trading", "cash_reserve", 0.2);
    if !(0.0..1.0).contains(&value) {
        return Err(TraderError::ConfigInvalid {
            section: "trading".to_string(),
            key: "cash_reserve".to_string(),
            reason: "cash_reserve must be in [0, 1)".to_string(),
        });
    }
    Ok(())
}

fn validate_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), TraderError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be positive"),
        });
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let (start_date, end_date) = backtest_dates(config)?;
    if start_date > end_date {
        return Err(TraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "start_date".to_string(),
            reason: "start_date must not be after end_date".to_string(),
        });
    }
    Ok(())
}

/// Parse `[backtest] start_date` and `end_date`.
pub fn backtest_dates(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), TraderError> {
    let start = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;
    Ok((start, end))
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, TraderError> {
    match value {
        None => Err(TraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| TraderError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[trading]
max_positions = 5
cash_reserve = 0.2

[backtest]
initial_capital = 100000000
start_date = 2024-01-01
end_date = 2024-06-30
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn empty_trading_section_uses_defaults() {
        let config = make_config("[trading]\n");
        assert!(validate_trading_config(&config).is_ok());
        assert!(validate_portfolio_config(&config).is_ok());
    }

    #[test]
    fn max_positions_zero_fails() {
        let config = make_config("[trading]\nmax_positions = 0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "max_positions"));
    }

    #[test]
    fn cash_reserve_of_one_fails() {
        let config = make_config("[trading]\ncash_reserve = 1.0\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "cash_reserve"));
    }

    #[test]
    fn negative_cash_reserve_fails() {
        let config = make_config("[trading]\ncash_reserve = -0.1\n");
        let err = validate_trading_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "cash_reserve"));
    }

    #[test]
    fn zero_reserve_is_allowed() {
        let config = make_config("[trading]\ncash_reserve = 0\n");
        assert!(validate_trading_config(&config).is_ok());
    }

    #[test]
    fn initial_cash_must_be_positive() {
        let config = make_config("[portfolio]\ninitial_cash = 0\n");
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "initial_cash"));
    }

    #[test]
    fn initial_capital_negative_fails() {
        let config = make_config("[backtest]\ninitial_capital = -100\nstart_date = 2024-01-01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "initial_capital"));
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2024/01/01\nend_date = 2024-12-31\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_after_end_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2024-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, TraderError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn single_day_range_is_valid() {
        let config = make_config("[backtest]\nstart_date = 2024-01-01\nend_date = 2024-01-01\n");
        assert!(validate_backtest_config(&config).is_ok());
    }
}
