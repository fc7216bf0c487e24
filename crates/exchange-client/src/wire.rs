//! JSON bodies of the gold exchange REST API.

use chrono::{DateTime, Utc};
use exchange_core::BackendError;
use exchange_models::{
    AccountId, Balance, Confirmation, ExchangeId, ExchangeRecord, FeeBreakdown, FeeItem,
    Initiated, PriceSnapshot, Quote, QuoteId, QuoteRequest, RecordStatus, SettledAmounts, Side,
    TransactionSignature, UnitPrices, UnsignedPayload,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TOTAL_FEE_KEY: &str = "total_fee_sol";

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct QuoteRequestBody {
    pub usd_amount: Decimal,
    pub action: Side,
    pub amount_type: &'static str,
}

impl From<&QuoteRequest> for QuoteRequestBody {
    fn from(request: &QuoteRequest) -> Self {
        Self {
            usd_amount: request.fiat_amount,
            action: request.side,
            amount_type: "usd",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    pub quote_id: String,
    pub sol_amount: Decimal,
    pub sgold_amount: Decimal,
    pub gold_price_usd: Decimal,
    pub sol_price_usd: Decimal,
    #[serde(default)]
    pub usd_amount: Option<Decimal>,
    #[serde(default)]
    pub fees: BTreeMap<String, Decimal>,
    pub expires_in: i64,
}

impl QuoteResponse {
    pub fn into_quote(self, request: &QuoteRequest) -> Quote {
        let mut fees = self.fees;
        let total = fees.remove(TOTAL_FEE_KEY);
        let items: Vec<FeeItem> = fees
            .into_iter()
            .map(|(name, amount)| FeeItem { name, amount })
            .collect();
        let total = total.unwrap_or_else(|| items.iter().map(|item| item.amount).sum());

        Quote {
            quote_id: QuoteId::new(self.quote_id),
            side: request.side,
            fiat_amount: self.usd_amount.unwrap_or(request.fiat_amount),
            crypto_amount: self.sol_amount,
            token_amount: self.sgold_amount,
            unit_prices: UnitPrices {
                token_reference_price: self.gold_price_usd,
                base_crypto_price: self.sol_price_usd,
            },
            fees: FeeBreakdown { items, total },
            expires_in_seconds: self.expires_in,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitiateBody<'a> {
    pub wallet_address: &'a str,
    pub quote_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct InitiateResponse {
    pub exchange_id: u64,
    pub serialized_transaction: String,
}

impl From<InitiateResponse> for Initiated {
    fn from(response: InitiateResponse) -> Self {
        Initiated {
            exchange_id: ExchangeId(response.exchange_id),
            unsigned_payload: UnsignedPayload::from_base64(response.serialized_transaction),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmBody<'a> {
    pub exchange_id: u64,
    pub tx_signature: &'a str,
}

/// Buy and sell confirmations share the signature and message; the settled
/// quantities depend on the side.
#[derive(Debug, Deserialize)]
pub struct ConfirmResponse {
    pub tx_signature: String,
    #[serde(default)]
    pub sgold_minted: Option<Decimal>,
    #[serde(default)]
    pub sgold_burned: Option<Decimal>,
    #[serde(default)]
    pub sol_received: Option<Decimal>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ConfirmResponse {
    pub fn into_confirmation(self, side: Side) -> Result<Confirmation, BackendError> {
        let amounts = match (side, self.sgold_minted, self.sgold_burned, self.sol_received) {
            (Side::Buy, Some(token_minted), _, _) => SettledAmounts::Buy { token_minted },
            (Side::Sell, _, Some(token_burned), Some(base_crypto_received)) => {
                SettledAmounts::Sell {
                    token_burned,
                    base_crypto_received,
                }
            }
            _ => {
                return Err(BackendError::Malformed {
                    message: format!("{side} confirmation is missing settled amounts"),
                })
            }
        };
        Ok(Confirmation {
            receipt_signature: TransactionSignature::new(self.tx_signature),
            amounts,
            message: self.message,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub transaction_type: Side,
    pub sol_amount: Decimal,
    pub token_amount: Decimal,
    #[serde(default)]
    pub fees_collected: Decimal,
    #[serde(default)]
    pub tx_signature: Option<String>,
    pub status: RecordStatus,
    #[serde(default)]
    pub status_message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<TransactionRecord> for ExchangeRecord {
    fn from(record: TransactionRecord) -> Self {
        ExchangeRecord {
            id: record.id,
            side: record.transaction_type,
            crypto_amount: record.sol_amount,
            token_amount: record.token_amount,
            fees_collected: record.fees_collected,
            tx_signature: record.tx_signature,
            status: record.status,
            status_message: record.status_message,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    pub sgold_balance: Decimal,
    #[serde(alias = "estimated_usd_value")]
    pub usd_value: Decimal,
    pub sol_balance: Decimal,
    #[serde(default)]
    pub recent_transactions: Vec<TransactionRecord>,
    #[serde(default = "default_true")]
    pub system_initialized: bool,
}

impl BalanceResponse {
    pub fn into_balance(self, account: &AccountId) -> Balance {
        Balance {
            account: account.clone(),
            base_crypto_balance: self.sol_balance,
            token_balance: self.sgold_balance,
            estimated_fiat_value: self.usd_value,
            system_initialized: self.system_initialized,
            recent_transactions: self
                .recent_transactions
                .into_iter()
                .map(ExchangeRecord::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceResponse {
    pub gold_price_usd: Decimal,
    pub sol_price_usd: Decimal,
    #[serde(default)]
    pub sgold_value_sol: Option<Decimal>,
    pub sgold_rate: Decimal,
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub system_initialized: bool,
}

impl From<PriceResponse> for PriceSnapshot {
    fn from(response: PriceResponse) -> Self {
        PriceSnapshot {
            token_reference_price: response.gold_price_usd,
            base_crypto_price: response.sol_price_usd,
            token_fiat_value: response.sgold_rate,
            token_value_in_crypto: response.sgold_value_sol,
            last_updated: response.last_updated,
            system_initialized: response.system_initialized,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_fees_split_total_from_items() {
        let body = r#"{
            "quote_id": "4f0c8a52-8a8d-4d0e-9f5b-1f2b3c4d5e6f",
            "sol_amount": "0.166667",
            "sgold_amount": "2.50",
            "gold_price_usd": "2400.00",
            "sol_price_usd": "150.00",
            "fees": {"treasury": 0.005, "profit": 0.003, "transaction": 0.000005, "total_fee_sol": 0.008005},
            "net_sol_to_liquidity": "0.158662",
            "exchange_rate": "1 SOL = 15.00 sGOLD",
            "expires_in": 30,
            "expires_at": "2026-10-17T12:00:30Z"
        }"#;
        let response: QuoteResponse = serde_json::from_str(body).unwrap();
        let quote = response.into_quote(&QuoteRequest::in_fiat(dec!(25.00), Side::Buy));

        assert_eq!(quote.fiat_amount, dec!(25.00));
        assert_eq!(quote.token_amount, dec!(2.50));
        assert_eq!(quote.expires_in_seconds, 30);
        assert_eq!(quote.fees.total, dec!(0.008005));
        let names: Vec<_> = quote.fees.items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["profit", "transaction", "treasury"]);
    }

    #[test]
    fn test_confirm_requires_side_amounts() {
        let buy: ConfirmResponse = serde_json::from_str(
            r#"{"status": "completed", "tx_signature": "5sig", "mint_tx_signature": "6sig", "sgold_minted": 2.5, "message": "Successfully purchased 2.50 sGOLD tokens"}"#,
        )
        .unwrap();
        let confirmation = buy.into_confirmation(Side::Buy).unwrap();
        assert_eq!(
            confirmation.amounts,
            SettledAmounts::Buy {
                token_minted: dec!(2.5)
            }
        );

        let sell: ConfirmResponse =
            serde_json::from_str(r#"{"tx_signature": "5sig", "sgold_burned": "2.50"}"#).unwrap();
        assert!(matches!(
            sell.into_confirmation(Side::Sell),
            Err(BackendError::Malformed { .. })
        ));
    }

    #[test]
    fn test_balance_and_price_defaults() {
        let balance: BalanceResponse = serde_json::from_str(
            r#"{"wallet_address": "x", "sgold_balance": 12.5, "usd_value": 125.0, "sol_balance": 2.0}"#,
        )
        .unwrap();
        assert!(balance.system_initialized);
        assert!(balance.recent_transactions.is_empty());

        let price: PriceResponse = serde_json::from_str(
            r#"{"gold_price_usd": 2400.0, "sol_price_usd": 150.0, "sgold_rate": 10.0, "last_updated": "2026-10-17T12:00:00.123456Z", "system_initialized": false}"#,
        )
        .unwrap();
        let snapshot = PriceSnapshot::from(price);
        assert_eq!(snapshot.base_crypto_price, dec!(150));
        assert_eq!(snapshot.token_value_in_crypto, None);
        assert!(!snapshot.system_initialized);
    }
}
