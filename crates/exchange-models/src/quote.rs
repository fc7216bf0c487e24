use crate::{Side, Unit};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-issued quote identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(String);

impl QuoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub fiat_amount: Decimal,
    pub side: Side,
    pub unit: Unit,
}

impl QuoteRequest {
    /// Quote requests are always denominated in fiat.
    pub fn in_fiat(fiat_amount: Decimal, side: Side) -> Self {
        Self {
            fiat_amount,
            side,
            unit: Unit::Fiat,
        }
    }
}

/// Reference prices the quote was computed with. Display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPrices {
    pub token_reference_price: Decimal,
    pub base_crypto_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeItem {
    pub name: String,
    pub amount: Decimal,
}

/// Fees in base crypto.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub items: Vec<FeeItem>,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: QuoteId,
    pub side: Side,

    // Amounts
    pub fiat_amount: Decimal,
    pub crypto_amount: Decimal, // spent on buy, received on sell
    pub token_amount: Decimal,  // received on buy, spent on sell

    pub unit_prices: UnitPrices,
    pub fees: FeeBreakdown,

    /// TTL at issuance. Expiry is counted down locally from this value.
    pub expires_in_seconds: i64,
    pub issued_at: DateTime<Utc>,
}

impl Quote {
    /// Tokens per unit of base crypto implied by this quote, if defined.
    pub fn token_per_crypto(&self) -> Option<Decimal> {
        if self.crypto_amount.is_zero() {
            return None;
        }
        self.token_amount.checked_div(self.crypto_amount)
    }
}
