use crate::{AccountId, RecordStatus, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fiat value of one token used for display estimates. The authoritative
/// price always comes from a quote.
pub const NOMINAL_TOKEN_FIAT_VALUE: Decimal = Decimal::TEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account: AccountId,
    pub base_crypto_balance: Decimal,
    pub token_balance: Decimal,
    pub estimated_fiat_value: Decimal,
    /// False until the token mint has been configured on the backend.
    pub system_initialized: bool,
    pub recent_transactions: Vec<ExchangeRecord>,
}

/// A past exchange as listed in the balance response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub id: u64,
    pub side: Side,
    pub crypto_amount: Decimal,
    pub token_amount: Decimal,
    pub fees_collected: Decimal,
    pub tx_signature: Option<String>,
    pub status: RecordStatus,
    pub status_message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub token_reference_price: Decimal,
    pub base_crypto_price: Decimal,
    pub token_fiat_value: Decimal,
    pub token_value_in_crypto: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
    pub system_initialized: bool,
}
