use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// The unit shown next to the fiat input for this side: what the user
    /// spends when buying, what the user gives up when selling.
    pub fn paired_unit(&self) -> Unit {
        match self {
            Side::Buy => Unit::BaseCrypto,
            Side::Sell => Unit::Token,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denomination of an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Fiat,
    BaseCrypto,
    Token,
}

impl Unit {
    /// Decimal places shown and kept for amounts in this unit.
    pub const fn precision(self) -> u32 {
        match self {
            Unit::Fiat => 2,
            Unit::BaseCrypto => 6,
            Unit::Token => 2,
        }
    }

    pub fn round(self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.precision(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Rounds toward zero, so the result never exceeds `amount`.
    pub fn floor(self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.precision(), RoundingStrategy::ToZero)
    }

    /// Fixed-precision rendering, e.g. `25.00` for fiat.
    pub fn format(self, amount: Decimal) -> String {
        format!("{:.*}", self.precision() as usize, self.round(amount))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::Fiat => "USD",
            Unit::BaseCrypto => "SOL",
            Unit::Token => "sGOLD",
        };
        f.write_str(label)
    }
}
