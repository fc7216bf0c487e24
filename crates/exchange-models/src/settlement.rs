use crate::{AccountId, Failure, Quote, SettlementPhase};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Backend identifier of an exchange, assigned when it is initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base64 serialized transaction built by the backend, waiting for the user's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnsignedPayload(String);

impl UnsignedPayload {
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }
}

/// Ledger signature returned by the signer after submitting the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionSignature(String);

impl TransactionSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response to the initiate phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiated {
    pub exchange_id: ExchangeId,
    pub unsigned_payload: UnsignedPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "lowercase")]
pub enum SettledAmounts {
    Buy {
        token_minted: Decimal,
    },
    Sell {
        token_burned: Decimal,
        base_crypto_received: Decimal,
    },
}

/// Response to the confirm phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub receipt_signature: TransactionSignature,
    pub amounts: SettledAmounts,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub exchange_id: ExchangeId,
    pub receipt_signature: TransactionSignature,
    pub amounts: SettledAmounts,
    pub message: Option<String>,
    pub settled_at: DateTime<Utc>,
}

impl SettlementReceipt {
    pub fn new(exchange_id: ExchangeId, confirmation: Confirmation) -> Self {
        Self {
            exchange_id,
            receipt_signature: confirmation.receipt_signature,
            amounts: confirmation.amounts,
            message: confirmation.message,
            settled_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementResult {
    Settled(SettlementReceipt),
    Failed(Failure),
}

/// One attempt at turning a quote into a settled exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSession {
    pub id: Uuid,
    pub quote: Quote,
    pub account: AccountId,

    pub phase: SettlementPhase,

    // Filled in as phases complete
    pub exchange_id: Option<ExchangeId>,
    pub unsigned_payload: Option<UnsignedPayload>,
    pub signed_payload_ref: Option<TransactionSignature>,
    pub result: Option<SettlementResult>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementSession {
    pub fn new(quote: Quote, account: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            quote,
            account,
            phase: SettlementPhase::Idle,
            exchange_id: None,
            unsigned_payload: None,
            signed_payload_ref: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn receipt(&self) -> Option<&SettlementReceipt> {
        match &self.result {
            Some(SettlementResult::Settled(receipt)) => Some(receipt),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.result {
            Some(SettlementResult::Failed(failure)) => Some(failure),
            _ => None,
        }
    }
}
