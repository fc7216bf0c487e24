use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use ctor::ctor;
use exchange_core::{
    ExchangeSession, SessionSnapshot, SessionState, SignerError, TransactionSigner,
};
use exchange_models::{Side, TransactionSignature, UnsignedPayload};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const TEST_ACCOUNT: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const INTEGRATION_TEST_TIMEOUT_SECS: u64 = 10;

pub const SOL_PRICE: Decimal = dec!(150);
pub const GOLD_PRICE: Decimal = dec!(2400);
pub const SGOLD_RATE: Decimal = dec!(10);

pub async fn get_free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("Should be able to bind to port");

    listener
        .local_addr()
        .expect("Should have a local address")
        .port()
}

#[ctor]
fn init_test_tracing() {
    let has_nocapture = std::env::args().any(|arg| arg == "--nocapture" || arg == "--show-output");
    if has_nocapture {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init()
            .ok();
    }
}

/// Knobs and counters of the mock gold exchange.
pub struct MockState {
    pub expires_in: AtomicI64,
    pub reject_initiate: AtomicBool,
    pub quote_calls: AtomicUsize,
    pub initiate_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    quotes: Mutex<HashMap<String, (Side, Decimal)>>,
    exchanges: Mutex<HashMap<u64, (Side, Decimal)>>,
    next_id: AtomicU64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            expires_in: AtomicI64::new(30),
            reject_initiate: AtomicBool::new(false),
            quote_calls: AtomicUsize::new(0),
            initiate_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            quotes: Mutex::new(HashMap::new()),
            exchanges: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

pub struct MockExchange {
    pub state: Arc<MockState>,
    pub base_url: String,
    server: JoinHandle<()>,
}

impl Drop for MockExchange {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockExchange {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/v1/gold/quote", post(quote_handler))
            .route("/api/v1/gold/:side/initiate", post(initiate_handler))
            .route("/api/v1/gold/:side/confirm", post(confirm_handler))
            .route("/api/v1/gold/balance/:wallet", get(balance_handler))
            .route("/api/v1/gold/price", get(price_handler))
            .with_state(state.clone());

        let port = get_free_port().await;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("Should be able to bind mock exchange");
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Mock exchange should serve");
        });
        info!(port, "Mock exchange listening");

        Self {
            state,
            base_url: format!("http://127.0.0.1:{port}/api/v1/gold"),
            server,
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, error: &str) -> ApiError {
    (status, Json(json!({ "error": error })))
}

fn parse_side(side: &str) -> Result<Side, ApiError> {
    match side {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        _ => Err(api_error(StatusCode::NOT_FOUND, "Unknown action")),
    }
}

#[derive(Deserialize)]
struct QuoteBody {
    usd_amount: Decimal,
    action: Side,
}

async fn quote_handler(
    State(state): State<Arc<MockState>>,
    Json(body): Json<QuoteBody>,
) -> Result<Json<Value>, ApiError> {
    state.quote_calls.fetch_add(1, Ordering::SeqCst);
    if body.usd_amount <= Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "usd_amount": ["Ensure this value is greater than 0."] })),
        ));
    }

    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let quote_id = format!("quote-{id:04}");
    let sol_amount = (body.usd_amount / SOL_PRICE).round_dp(9);
    let sgold_amount = (body.usd_amount / SGOLD_RATE).round_dp(2);
    let treasury = (sol_amount * dec!(0.03)).round_dp(9);
    let profit = (sol_amount * dec!(0.02)).round_dp(9);
    let transaction = dec!(0.000005);
    state
        .quotes
        .lock()
        .unwrap()
        .insert(quote_id.clone(), (body.action, sgold_amount));

    let expires_in = state.expires_in.load(Ordering::SeqCst);
    Ok(Json(json!({
        "quote_id": quote_id,
        "sol_amount": sol_amount,
        "sgold_amount": sgold_amount,
        "usd_amount": body.usd_amount,
        "gold_price_usd": GOLD_PRICE,
        "sol_price_usd": SOL_PRICE,
        "fees": {
            "treasury": treasury,
            "profit": profit,
            "transaction": transaction,
            "total_fee_sol": treasury + profit + transaction,
        },
        "net_sol_to_liquidity": sol_amount - treasury - profit,
        "exchange_rate": format!("1 SOL = {} sGOLD", (SOL_PRICE / SGOLD_RATE).round_dp(2)),
        "expires_in": expires_in,
        "expires_at": (Utc::now() + chrono::Duration::seconds(expires_in)).to_rfc3339(),
    })))
}

#[derive(Deserialize)]
struct InitiateBody {
    wallet_address: String,
    quote_id: String,
}

async fn initiate_handler(
    State(state): State<Arc<MockState>>,
    Path(side): Path<String>,
    Json(body): Json<InitiateBody>,
) -> Result<Json<Value>, ApiError> {
    state.initiate_calls.fetch_add(1, Ordering::SeqCst);
    let side = parse_side(&side)?;
    if !(32..=44).contains(&body.wallet_address.len()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid Solana wallet address",
        ));
    }
    if state.reject_initiate.load(Ordering::SeqCst) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Quote has expired or already been used",
        ));
    }

    let Some((quoted_side, sgold_amount)) = state.quotes.lock().unwrap().remove(&body.quote_id)
    else {
        return Err(api_error(StatusCode::NOT_FOUND, "Quote not found"));
    };
    if quoted_side != side {
        return Err(api_error(StatusCode::BAD_REQUEST, "Quote action mismatch"));
    }

    let exchange_id = state.next_id.fetch_add(1, Ordering::SeqCst);
    state
        .exchanges
        .lock()
        .unwrap()
        .insert(exchange_id, (side, sgold_amount));

    Ok(Json(json!({
        "exchange_id": exchange_id,
        "serialized_transaction": "AQABAgMEBQYHCAkKCwwNDg8=",
        "total_sol": (sgold_amount * SGOLD_RATE / SOL_PRICE).round_dp(9),
        "expected_sgold": sgold_amount,
        "expires_at": Utc::now().to_rfc3339(),
    })))
}

#[derive(Deserialize)]
struct ConfirmBody {
    exchange_id: u64,
    tx_signature: String,
}

async fn confirm_handler(
    State(state): State<Arc<MockState>>,
    Path(side): Path<String>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<Value>, ApiError> {
    state.confirm_calls.fetch_add(1, Ordering::SeqCst);
    let side = parse_side(&side)?;
    let Some((_, sgold_amount)) = state.exchanges.lock().unwrap().remove(&body.exchange_id) else {
        return Err(api_error(StatusCode::NOT_FOUND, "Transaction not found"));
    };

    let response = match side {
        Side::Buy => json!({
            "status": "completed",
            "tx_signature": body.tx_signature,
            "mint_tx_signature": format!("mint-{}", body.tx_signature),
            "sgold_minted": sgold_amount,
            "user_ata": "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM",
            "message": format!("Successfully purchased {sgold_amount} sGOLD tokens"),
        }),
        Side::Sell => json!({
            "status": "completed",
            "tx_signature": body.tx_signature,
            "sgold_burned": sgold_amount,
            "sol_received": (sgold_amount * SGOLD_RATE / SOL_PRICE).round_dp(9),
            "message": format!("Successfully sold {sgold_amount} sGOLD tokens"),
        }),
    };
    Ok(Json(response))
}

async fn balance_handler(Path(wallet): Path<String>) -> Result<Json<Value>, ApiError> {
    if !(32..=44).contains(&wallet.len()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid Solana wallet address",
        ));
    }
    Ok(Json(json!({
        "wallet_address": wallet,
        "sgold_balance": 12.5,
        "usd_value": 125.0,
        "sol_balance": 2.0,
        "recent_transactions": [{
            "id": 7,
            "user_wallet": wallet,
            "transaction_type": "buy",
            "transaction_type_display": "Buy",
            "sol_amount": "0.166666667",
            "token_amount": "2.50",
            "gold_price_usd": "2400.00",
            "sol_price_usd": "150.00",
            "fees_collected": "0.008338333",
            "tx_signature": "5sig",
            "status": "completed",
            "status_display": "Completed",
            "status_message": "",
            "created_at": "2026-10-17T09:30:00Z",
            "updated_at": "2026-10-17T09:30:05Z",
            "completed_at": "2026-10-17T09:30:05Z"
        }],
        "system_initialized": true,
    })))
}

async fn price_handler() -> Json<Value> {
    Json(json!({
        "gold_price_usd": 2400.0,
        "sol_price_usd": 150.0,
        "sgold_value_sol": 0.066666667,
        "sgold_rate": 10.0,
        "last_updated": Utc::now().to_rfc3339(),
        "system_initialized": true,
    }))
}

/// Signs instantly, or rejects, as told.
pub struct TestSigner {
    pub reject: bool,
    pub calls: AtomicUsize,
}

impl TestSigner {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self {
            reject: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TransactionSigner for TestSigner {
    async fn sign_and_submit(
        &self,
        payload: &UnsignedPayload,
    ) -> Result<TransactionSignature, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(SignerError::Rejected {
                reason: "User rejected the request".to_string(),
            });
        }
        Ok(TransactionSignature::new(format!(
            "sig{}",
            payload.as_base64().len()
        )))
    }
}

/// Poll-free wait on the session's change notifications.
pub async fn wait_for_state(session: &ExchangeSession, expected: SessionState) -> SessionSnapshot {
    let mut changes = session.subscribe();
    let wait = async {
        loop {
            let snapshot = session.snapshot().await;
            if snapshot.state == expected {
                return snapshot;
            }
            changes
                .changed()
                .await
                .expect("Session notifier should stay open");
        }
    };

    tokio::time::timeout(Duration::from_secs(INTEGRATION_TEST_TIMEOUT_SECS), wait)
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for session state {expected:?}"))
}
