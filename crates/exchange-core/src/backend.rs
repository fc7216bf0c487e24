use async_trait::async_trait;
use exchange_models::{
    AccountId, Balance, Confirmation, ExchangeId, Initiated, PriceSnapshot, Quote, QuoteId,
    QuoteRequest, Side, TransactionSignature,
};
use snafu::Snafu;
use std::{future::Future, time::Duration};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BackendError {
    #[snafu(display("Request failed: {}", message))]
    Transport { message: String },

    #[snafu(display("Backend rejected request ({}): {}", status, message))]
    Rejected { status: u16, message: String },

    #[snafu(display("Malformed backend response: {}", message))]
    Malformed { message: String },

    #[snafu(display("{} timed out after {}s", operation, timeout.as_secs()))]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl BackendError {
    /// The message to show the user: the backend's own wording when it gave one.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Run a backend call under the session's network timeout.
pub async fn with_deadline<T, F>(timeout: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { operation, timeout }.fail(),
    }
}

/// The exchange backend as seen by a session. Injected at construction.
#[async_trait]
pub trait ExchangeBackend: Send + Sync {
    /// Price a trade. The request is always in fiat.
    async fn request_quote(&self, request: &QuoteRequest) -> Result<Quote>;

    /// Build the unsigned transaction for a quote.
    async fn initiate(&self, side: Side, account: &AccountId, quote_id: &QuoteId)
        -> Result<Initiated>;

    /// Submit the signer's output and wait for the backend to settle.
    async fn confirm(
        &self,
        side: Side,
        exchange_id: ExchangeId,
        signature: &TransactionSignature,
    ) -> Result<Confirmation>;

    async fn balance(&self, account: &AccountId) -> Result<Balance>;

    async fn prices(&self) -> Result<PriceSnapshot>;
}
