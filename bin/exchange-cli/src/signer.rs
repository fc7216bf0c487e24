use async_trait::async_trait;
use dialoguer::Input;
use exchange_core::{SignerError, TransactionSigner};
use exchange_models::{TransactionSignature, UnsignedPayload};

/// Asks the operator to sign the payload with their wallet and paste back the
/// resulting transaction signature.
pub struct PromptSigner;

#[async_trait]
impl TransactionSigner for PromptSigner {
    async fn sign_and_submit(
        &self,
        payload: &UnsignedPayload,
    ) -> Result<TransactionSignature, SignerError> {
        let payload = payload.as_base64().to_string();
        let answer = tokio::task::spawn_blocking(move || {
            println!("\nUnsigned transaction (base64):\n{payload}\n");
            Input::<String>::new()
                .with_prompt("Signature after submitting (empty or \"reject\" to reject)")
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|error| SignerError::Failed {
            message: error.to_string(),
        })?
        .map_err(|error| SignerError::Failed {
            message: error.to_string(),
        })?;

        parse_answer(&answer)
    }
}

fn parse_answer(answer: &str) -> Result<TransactionSignature, SignerError> {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("reject") {
        return Err(SignerError::Rejected {
            reason: "Rejected at the prompt".to_string(),
        });
    }
    Ok(TransactionSignature::new(answer))
}
