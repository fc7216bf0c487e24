use config::{Config, Environment, File};
use exchange_core::SessionConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::{path::Path, time::Duration};

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("Failed to load settings: {}", source))]
    Load { source: config::ConfigError },
}

type Result<T> = std::result::Result<T, SettingsError>;

/// Session timings and the fee reserve. Read from an optional TOML file, then
/// `EXCHANGE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debounce_ms: u64,
    pub success_display_secs: u64,
    pub network_timeout_secs: u64,
    pub fee_reserve: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            debounce_ms: defaults.debounce.as_millis() as u64,
            success_display_secs: defaults.success_display.as_secs(),
            network_timeout_secs: defaults.network_timeout.as_secs(),
            fee_reserve: defaults.fee_reserve,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(Environment::with_prefix("EXCHANGE").try_parsing(true))
            .build()
            .context(LoadSnafu)?
            .try_deserialize()
            .context(LoadSnafu)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            success_display: Duration::from_secs(self.success_display_secs),
            network_timeout: Duration::from_secs(self.network_timeout_secs),
            fee_reserve: self.fee_reserve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults_match_session_config() {
        let config = Settings::default().session_config();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.success_display, Duration::from_secs(5));
        assert_eq!(config.network_timeout, Duration::from_secs(30));
        assert_eq!(config.fee_reserve, dec!(0.01));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "debounce_ms = 250\nfee_reserve = \"0.02\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.debounce_ms, 250);
        assert_eq!(settings.fee_reserve, dec!(0.02));
        assert_eq!(settings.network_timeout_secs, 30);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/exchange.toml")));
        assert!(matches!(result, Err(SettingsError::Load { .. })));
    }
}
