use exchange_models::{PriceSnapshot, Side, Unit, NOMINAL_TOKEN_FIAT_VALUE};
use rust_decimal::Decimal;
use snafu::{ensure, ResultExt, Snafu};
use std::str::FromStr;
use tracing::debug;

/// Why an amount typed by the user was treated as zero. Never leaves this module
/// as an error: invalid input clamps.
#[derive(Debug, Snafu)]
pub enum InvalidAmount {
    #[snafu(display("{:?} is not a number", input))]
    NotANumber {
        input: String,
        source: rust_decimal::Error,
    },

    #[snafu(display("{:?} is negative", input))]
    Negative { input: String },
}

pub fn parse_amount(input: &str) -> Result<Decimal, InvalidAmount> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = Decimal::from_str(trimmed).context(NotANumberSnafu { input: trimmed })?;
    ensure!(!value.is_sign_negative(), NegativeSnafu { input: trimmed });
    Ok(value)
}

/// Paired amounts as shown next to each other in the exchange form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountPair {
    pub primary_input: String,
    pub derived_display: String,
    /// Paired units per primary unit. Display only.
    pub conversion_rate: Decimal,

    pub primary_unit: Unit,
    pub primary_value: Decimal,
    pub derived_unit: Unit,
    pub derived_value: Decimal,
}

impl AmountPair {
    pub fn empty(primary_unit: Unit, derived_unit: Unit) -> Self {
        Self {
            primary_input: String::new(),
            derived_display: String::new(),
            conversion_rate: Decimal::ZERO,
            primary_unit,
            primary_value: Decimal::ZERO,
            derived_unit,
            derived_value: Decimal::ZERO,
        }
    }

    /// The amount a quote is requested for. Zero when it cannot be determined.
    pub fn fiat_value(&self) -> Decimal {
        if self.primary_unit == Unit::Fiat {
            self.primary_value
        } else if self.derived_unit == Unit::Fiat {
            self.derived_value
        } else {
            Decimal::ZERO
        }
    }
}

/// Display-only prices used to fill in the paired amount while typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRates {
    /// Fiat per unit of base crypto. Unknown until prices are fetched.
    pub base_crypto_price: Option<Decimal>,
    /// Fiat per token.
    pub token_fiat_value: Decimal,
}

impl Default for DisplayRates {
    fn default() -> Self {
        Self {
            base_crypto_price: None,
            token_fiat_value: NOMINAL_TOKEN_FIAT_VALUE,
        }
    }
}

impl DisplayRates {
    pub fn from_prices(prices: &PriceSnapshot) -> Self {
        Self {
            base_crypto_price: Some(prices.base_crypto_price).filter(|p| p.is_sign_positive()),
            token_fiat_value: prices.token_fiat_value,
        }
    }

    /// Fiat value of one `unit`.
    pub fn fiat_price(&self, unit: Unit) -> Option<Decimal> {
        match unit {
            Unit::Fiat => Some(Decimal::ONE),
            Unit::BaseCrypto => self.base_crypto_price,
            Unit::Token => Some(self.token_fiat_value),
        }
    }
}

/// Converts between a fiat amount and one non-fiat unit at a display rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountLinker {
    primary_unit: Unit,
    paired_unit: Unit,
    /// Fiat value of one unit of whichever side is not fiat.
    fiat_price: Decimal,
}

impl AmountLinker {
    pub fn new(primary_unit: Unit, paired_unit: Unit, fiat_price: Decimal) -> Self {
        Self {
            primary_unit,
            paired_unit,
            fiat_price: fiat_price.max(Decimal::ZERO),
        }
    }

    /// The linker for an exchange form on `side` where the user types in `input_unit`.
    pub fn for_side(side: Side, input_unit: Unit, rates: &DisplayRates) -> Self {
        let (paired_unit, priced_unit) = if input_unit == Unit::Fiat {
            (side.paired_unit(), side.paired_unit())
        } else {
            (Unit::Fiat, input_unit)
        };
        let fiat_price = rates.fiat_price(priced_unit).unwrap_or(Decimal::ZERO);
        Self::new(input_unit, paired_unit, fiat_price)
    }

    pub fn primary_unit(&self) -> Unit {
        self.primary_unit
    }

    pub fn paired_unit(&self) -> Unit {
        self.paired_unit
    }

    /// The same conversion read the other way round.
    pub fn inverse(&self) -> Self {
        Self {
            primary_unit: self.paired_unit,
            paired_unit: self.primary_unit,
            fiat_price: self.fiat_price,
        }
    }

    pub fn set_primary(&self, input: &str) -> AmountPair {
        let value = parse_amount(input).unwrap_or_else(|error| {
            debug!(%error, "Treating invalid amount as zero");
            Decimal::ZERO
        });
        let primary_value = self.primary_unit.round(value);

        let derived_value = self
            .to_paired(primary_value)
            .map(|amount| self.paired_unit.round(amount))
            .unwrap_or(Decimal::ZERO);
        let derived_display = if primary_value.is_zero() || derived_value.is_zero() {
            String::new()
        } else {
            self.paired_unit.format(derived_value)
        };

        AmountPair {
            primary_input: input.trim().to_string(),
            derived_display,
            conversion_rate: self.to_paired(Decimal::ONE).unwrap_or(Decimal::ZERO),
            primary_unit: self.primary_unit,
            primary_value,
            derived_unit: self.paired_unit,
            derived_value,
        }
    }

    /// Largest primary amount covered by `available` (denominated in `unit`)
    /// after holding back `reserve` of the same unit. Never negative, and
    /// rounded toward zero so it never overshoots the balance.
    pub fn max_amount(&self, available: Decimal, reserve: Decimal, unit: Unit) -> Decimal {
        let spendable = (available - reserve.max(Decimal::ZERO)).max(Decimal::ZERO);
        let primary = if unit == self.primary_unit {
            Some(spendable)
        } else if unit == self.paired_unit {
            self.inverse().to_paired(spendable)
        } else {
            None
        };
        primary
            .map(|amount| self.primary_unit.floor(amount))
            .unwrap_or(Decimal::ZERO)
    }

    fn to_paired(&self, amount: Decimal) -> Option<Decimal> {
        if self.fiat_price.is_zero() {
            return None;
        }
        match (self.primary_unit, self.paired_unit) {
            (Unit::Fiat, Unit::Fiat) => Some(amount),
            (Unit::Fiat, _) => amount.checked_div(self.fiat_price),
            (_, Unit::Fiat) => amount.checked_mul(self.fiat_price),
            _ => None,
        }
    }
}
