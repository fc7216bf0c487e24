use rust_decimal::Decimal;
use snafu::{ensure, Snafu};
use std::time::Duration;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("{} must be greater than zero", field))]
    ZeroDuration { field: &'static str },

    #[snafu(display("Fee reserve cannot be negative: {}", reserve))]
    NegativeReserve { reserve: Decimal },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiet period after the last amount edit before a quote is requested.
    pub debounce: Duration,
    /// How long a successful settlement stays on screen before the session resets.
    pub success_display: Duration,
    /// Applied to quote, initiate, and confirm calls. Never to signing.
    pub network_timeout: Duration,
    /// Base crypto held back from "max" to pay settlement fees.
    pub fee_reserve: Decimal,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            success_display: Duration::from_secs(5),
            network_timeout: Duration::from_secs(30),
            fee_reserve: Decimal::new(1, 2), // 0.01
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.network_timeout.is_zero(),
            ZeroDurationSnafu {
                field: "network_timeout"
            }
        );
        ensure!(
            !self.success_display.is_zero(),
            ZeroDurationSnafu {
                field: "success_display"
            }
        );
        ensure!(
            !self.fee_reserve.is_sign_negative(),
            NegativeReserveSnafu {
                reserve: self.fee_reserve
            }
        );
        Ok(())
    }
}
