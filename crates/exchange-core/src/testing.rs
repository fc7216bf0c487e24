//! In-memory collaborators for the session tests.

use crate::{
    backend::{self, BackendError, ExchangeBackend},
    signer::{SignerError, TransactionSigner},
};
use async_trait::async_trait;
use chrono::Utc;
use exchange_models::{
    AccountId, Balance, Confirmation, ExchangeId, FeeBreakdown, FeeItem, Initiated,
    PriceSnapshot, Quote, QuoteId, QuoteRequest, SettledAmounts, Side, TransactionSignature,
    Unit, UnitPrices, UnsignedPayload, NOMINAL_TOKEN_FIAT_VALUE,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

pub const TEST_ACCOUNT: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

pub fn test_account() -> AccountId {
    AccountId::parse(TEST_ACCOUNT).unwrap()
}

/// Prices every quote at 150 fiat per base crypto and the nominal token value.
pub struct FakeBackend {
    pub base_crypto_price: Decimal,
    pub expires_in: AtomicI64,
    pub fail_quotes: AtomicBool,
    pub fail_initiate: AtomicBool,
    pub fail_confirm: AtomicBool,

    pub quote_latency: Mutex<Duration>,
    /// Latency override keyed by requested fiat amount.
    pub quote_latency_for: Mutex<HashMap<Decimal, Duration>>,
    pub phase_latency: Mutex<Duration>,

    pub quote_requests: Mutex<Vec<QuoteRequest>>,
    pub initiate_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,

    pub base_crypto_balance: Mutex<Decimal>,
    pub token_balance: Mutex<Decimal>,

    next_id: AtomicU64,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            base_crypto_price: dec!(150),
            expires_in: AtomicI64::new(30),
            fail_quotes: AtomicBool::new(false),
            fail_initiate: AtomicBool::new(false),
            fail_confirm: AtomicBool::new(false),
            quote_latency: Mutex::new(Duration::from_millis(50)),
            quote_latency_for: Mutex::new(HashMap::new()),
            phase_latency: Mutex::new(Duration::from_millis(50)),
            quote_requests: Mutex::new(Vec::new()),
            initiate_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            base_crypto_balance: Mutex::new(dec!(2.0)),
            token_balance: Mutex::new(dec!(12.50)),
            next_id: AtomicU64::new(41),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_requests.lock().unwrap().len()
    }

    pub fn requested_amounts(&self) -> Vec<Decimal> {
        self.quote_requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.fiat_amount)
            .collect()
    }

    pub fn set_quote_latency(&self, fiat_amount: Decimal, latency: Duration) {
        self.quote_latency_for
            .lock()
            .unwrap()
            .insert(fiat_amount, latency);
    }

    fn build_quote(&self, request: &QuoteRequest) -> Quote {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let crypto_amount = Unit::BaseCrypto.round(request.fiat_amount / self.base_crypto_price);
        let token_amount = Unit::Token.round(request.fiat_amount / NOMINAL_TOKEN_FIAT_VALUE);
        let fee = Unit::BaseCrypto.round(crypto_amount * dec!(0.01));
        Quote {
            quote_id: QuoteId::new(format!("quote-{id}")),
            side: request.side,
            fiat_amount: request.fiat_amount,
            crypto_amount,
            token_amount,
            unit_prices: UnitPrices {
                token_reference_price: dec!(2400),
                base_crypto_price: self.base_crypto_price,
            },
            fees: FeeBreakdown {
                items: vec![FeeItem {
                    name: "treasury".to_string(),
                    amount: fee,
                }],
                total: fee,
            },
            expires_in_seconds: self.expires_in.load(Ordering::SeqCst),
            issued_at: Utc::now(),
        }
    }

    fn rejected(message: &str) -> BackendError {
        BackendError::Rejected {
            status: 400,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ExchangeBackend for FakeBackend {
    async fn request_quote(&self, request: &QuoteRequest) -> backend::Result<Quote> {
        self.quote_requests.lock().unwrap().push(request.clone());
        let latency = self
            .quote_latency_for
            .lock()
            .unwrap()
            .get(&request.fiat_amount)
            .copied()
            .unwrap_or(*self.quote_latency.lock().unwrap());
        tokio::time::sleep(latency).await;

        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(Self::rejected("Price feed unavailable"));
        }
        Ok(self.build_quote(request))
    }

    async fn initiate(
        &self,
        _side: Side,
        _account: &AccountId,
        quote_id: &QuoteId,
    ) -> backend::Result<Initiated> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.phase_latency.lock().unwrap();
        tokio::time::sleep(latency).await;

        if self.fail_initiate.load(Ordering::SeqCst) {
            return Err(Self::rejected("Quote expired. Please enter amount again."));
        }
        Ok(Initiated {
            exchange_id: ExchangeId(quote_id.as_str().len() as u64 + 100),
            unsigned_payload: UnsignedPayload::from_base64("AQIDBA=="),
        })
    }

    async fn confirm(
        &self,
        side: Side,
        _exchange_id: ExchangeId,
        signature: &TransactionSignature,
    ) -> backend::Result<Confirmation> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.phase_latency.lock().unwrap();
        tokio::time::sleep(latency).await;

        if self.fail_confirm.load(Ordering::SeqCst) {
            return Err(Self::rejected("Transaction not found on chain"));
        }
        // The fake settles the amount of the last quote it issued
        let last = self.quote_requests.lock().unwrap().last().cloned();
        let fiat = last.map(|request| request.fiat_amount).unwrap_or_default();
        let amounts = match side {
            Side::Buy => SettledAmounts::Buy {
                token_minted: Unit::Token.round(fiat / NOMINAL_TOKEN_FIAT_VALUE),
            },
            Side::Sell => SettledAmounts::Sell {
                token_burned: Unit::Token.round(fiat / NOMINAL_TOKEN_FIAT_VALUE),
                base_crypto_received: Unit::BaseCrypto.round(fiat / self.base_crypto_price),
            },
        };
        Ok(Confirmation {
            receipt_signature: signature.clone(),
            amounts,
            message: None,
        })
    }

    async fn balance(&self, account: &AccountId) -> backend::Result<Balance> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let base_crypto_balance = *self.base_crypto_balance.lock().unwrap();
        let token_balance = *self.token_balance.lock().unwrap();
        Ok(Balance {
            account: account.clone(),
            base_crypto_balance,
            token_balance,
            estimated_fiat_value: token_balance * NOMINAL_TOKEN_FIAT_VALUE,
            system_initialized: true,
            recent_transactions: Vec::new(),
        })
    }

    async fn prices(&self) -> backend::Result<PriceSnapshot> {
        Ok(PriceSnapshot {
            token_reference_price: dec!(2400),
            base_crypto_price: self.base_crypto_price,
            token_fiat_value: NOMINAL_TOKEN_FIAT_VALUE,
            token_value_in_crypto: Some(NOMINAL_TOKEN_FIAT_VALUE / self.base_crypto_price),
            last_updated: Utc::now(),
            system_initialized: true,
        })
    }
}

#[derive(Debug, Clone)]
pub enum SignerBehavior {
    Approve,
    ApproveAfter(Duration),
    Reject,
    Fail,
}

pub struct ScriptedSigner {
    behavior: SignerBehavior,
    pub calls: AtomicUsize,
}

impl ScriptedSigner {
    pub fn new(behavior: SignerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TransactionSigner for ScriptedSigner {
    async fn sign_and_submit(
        &self,
        payload: &UnsignedPayload,
    ) -> Result<TransactionSignature, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let signature = TransactionSignature::new(format!("sig-{}", payload.as_base64()));
        match &self.behavior {
            SignerBehavior::Approve => Ok(signature),
            SignerBehavior::ApproveAfter(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(signature)
            }
            SignerBehavior::Reject => Err(SignerError::Rejected {
                reason: "User rejected the request".to_string(),
            }),
            SignerBehavior::Fail => Err(SignerError::Failed {
                message: "Wallet disconnected".to_string(),
            }),
        }
    }
}
