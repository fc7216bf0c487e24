use async_trait::async_trait;
use exchange_core::{backend, BackendError, ExchangeBackend};
use exchange_models::{
    AccountId, Balance, Confirmation, ExchangeId, Initiated, PriceSnapshot, Quote, QuoteId,
    QuoteRequest, Side, TransactionSignature,
};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

pub mod wire;

use wire::{
    BalanceResponse, ConfirmBody, ConfirmResponse, ErrorBody, InitiateBody, InitiateResponse,
    PriceResponse, QuoteRequestBody, QuoteResponse,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to build HTTP client: {source}"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("Invalid base URL: {source}"))]
    InvalidUrl { source: url::ParseError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// [`ExchangeBackend`] over the gold exchange REST API.
#[derive(Debug, Clone)]
pub struct HttpExchangeClient {
    client: Client,
    base_url: Url,
}

impl HttpExchangeClient {
    /// `base_url` points at the API root, e.g. `https://host/api/v1/gold/`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let client = Client::builder().build().context(BuildClientSnafu)?;

        // Url::join drops the last path segment unless it ends with a slash
        let mut base = base_url.as_ref().trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context(InvalidUrlSnafu)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> backend::Result<Url> {
        self.base_url
            .join(path)
            .map_err(|error| BackendError::Transport {
                message: format!("Invalid endpoint {path}: {error}"),
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> backend::Result<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> backend::Result<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    BackendError::Transport {
        message: error.to_string(),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> backend::Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(rejection(status, &body));
    }
    serde_json::from_str(&body).map_err(|error| BackendError::Malformed {
        message: error.to_string(),
    })
}

/// Error bodies look like `{"error": "...", "detail": "..."}`; validation
/// failures may be any JSON at all.
fn rejection(status: StatusCode, body: &str) -> BackendError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error, detail }) => {
            if let Some(detail) = detail {
                warn!(status = status.as_u16(), %error, %detail, "Backend rejected request");
            }
            error
        }
        Err(_) if !body.trim().is_empty() && body.len() <= 512 => body.trim().to_string(),
        Err(_) => format!("Request failed with status {status}"),
    };
    BackendError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ExchangeBackend for HttpExchangeClient {
    async fn request_quote(&self, request: &QuoteRequest) -> backend::Result<Quote> {
        let response: QuoteResponse = self
            .post("quote", &QuoteRequestBody::from(request))
            .await?;
        Ok(response.into_quote(request))
    }

    async fn initiate(
        &self,
        side: Side,
        account: &AccountId,
        quote_id: &QuoteId,
    ) -> backend::Result<Initiated> {
        let body = InitiateBody {
            wallet_address: account.as_str(),
            quote_id: quote_id.as_str(),
        };
        let response: InitiateResponse = self
            .post(&format!("{}/initiate", side.as_str()), &body)
            .await?;
        Ok(response.into())
    }

    async fn confirm(
        &self,
        side: Side,
        exchange_id: ExchangeId,
        signature: &TransactionSignature,
    ) -> backend::Result<Confirmation> {
        let body = ConfirmBody {
            exchange_id: exchange_id.0,
            tx_signature: signature.as_str(),
        };
        let response: ConfirmResponse = self
            .post(&format!("{}/confirm", side.as_str()), &body)
            .await?;
        response.into_confirmation(side)
    }

    async fn balance(&self, account: &AccountId) -> backend::Result<Balance> {
        let response: BalanceResponse = self.get(&format!("balance/{account}")).await?;
        Ok(response.into_balance(account))
    }

    async fn prices(&self) -> backend::Result<PriceSnapshot> {
        let response: PriceResponse = self.get("price").await?;
        Ok(response.into())
    }
}
