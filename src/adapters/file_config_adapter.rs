//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::TraderError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[trading]
max_positions = 5
cash_reserve = 0.2

[portfolio]
state_path = data/portfolio_state.json
initial_strategy = Balanced approach
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("portfolio", "state_path"),
            Some("data/portfolio_state.json".to_string())
        );
        assert_eq!(
            adapter.get_string("portfolio", "initial_strategy"),
            Some("Balanced approach".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[trading]\nmax_positions = 5\n").unwrap();
        assert_eq!(adapter.get_string("trading", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn require_string_reports_missing_key() {
        let adapter = FileConfigAdapter::from_string("[sqlite]\npool_size = 2\n").unwrap();
        let err = adapter.require_string("sqlite", "path").unwrap_err();
        assert!(matches!(
            err,
            TraderError::ConfigMissing { section, key } if section == "sqlite" && key == "path"
        ));
    }

    #[test]
    fn require_string_returns_present_value() {
        let adapter = FileConfigAdapter::from_string("[sqlite]\npath = trader.db\n").unwrap();
        assert_eq!(adapter.require_string("sqlite", "path").unwrap(), "trader.db");
    }

    #[test]
    fn get_int_returns_value() {
        let adapter = FileConfigAdapter::from_string("[trading]\nmax_positions = 3\n").unwrap();
        assert_eq!(adapter.get_int("trading", "max_positions", 0), 3);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[trading]\n").unwrap();
        assert_eq!(adapter.get_int("trading", "missing", 42), 42);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[trading]\nmax_positions = abc\n").unwrap();
        assert_eq!(adapter.get_int("trading", "max_positions", 5), 5);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter = FileConfigAdapter::from_string("[trading]\ncash_reserve = 0.15\n").unwrap();
        assert_eq!(adapter.get_double("trading", "cash_reserve", 0.0), 0.15);
    }

    #[test]
    fn get_double_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "initial_capital", 99.9), 99.9);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = lots\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "initial_capital", 99.9), 99.9);
    }

    #[test]
    fn get_bool_returns_true_values() {
        let adapter = FileConfigAdapter::from_string("[run]\na = true\nb = yes\nc = 1\n").unwrap();
        assert!(adapter.get_bool("run", "a", false));
        assert!(adapter.get_bool("run", "b", false));
        assert!(adapter.get_bool("run", "c", false));
    }

    #[test]
    fn get_bool_returns_false_values() {
        let adapter = FileConfigAdapter::from_string("[run]\na = false\nb = no\nc = 0\n").unwrap();
        assert!(!adapter.get_bool("run", "a", true));
        assert!(!adapter.get_bool("run", "b", true));
        assert!(!adapter.get_bool("run", "c", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[backtest]\noutput_dir = /tmp/results\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "output_dir"),
            Some("/tmp/results".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
