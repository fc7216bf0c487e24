use async_trait::async_trait;
use exchange_models::{TransactionSignature, UnsignedPayload};
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum SignerError {
    #[snafu(display("Signature request rejected: {}", reason))]
    Rejected { reason: String },

    #[snafu(display("Signer failed: {}", message))]
    Failed { message: String },
}

/// The user's wallet. Signs and submits the backend-built transaction.
///
/// May take arbitrarily long: the user decides when (and whether) to approve.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_and_submit(
        &self,
        payload: &UnsignedPayload,
    ) -> Result<TransactionSignature, SignerError>;
}
