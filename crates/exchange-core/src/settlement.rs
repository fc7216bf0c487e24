//! The initiate / sign / confirm pipeline.
//!
//! The orchestrator only talks to the backend and the signer. Recording each
//! completed phase is left to a [`PhaseObserver`] (the session), which can
//! refuse an update once the settlement it belongs to has been cancelled.

use crate::{
    backend::{with_deadline, ExchangeBackend},
    signer::{SignerError, TransactionSigner},
};
use async_trait::async_trait;
use exchange_models::{
    AccountId, Failure, FailureKind, Initiated, Quote, SettlementReceipt, TransactionSignature,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

pub struct SettlementTicket {
    /// Session generation the settlement was started under.
    pub generation: u64,
    pub quote: Quote,
    pub account: AccountId,
    pub signer: Arc<dyn TransactionSigner>,
}

#[derive(Debug, Clone)]
pub enum PhaseUpdate {
    Initiated(Initiated),
    Signed(TransactionSignature),
}

#[async_trait]
pub trait PhaseObserver: Send + Sync {
    /// Record a completed phase. Returning false abandons the settlement.
    async fn advance(&self, generation: u64, update: PhaseUpdate) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Settled(SettlementReceipt),
    Failed(Failure),
    /// The observer refused an update; nothing more was sent.
    Abandoned,
}

#[derive(Clone)]
pub struct SettlementOrchestrator {
    backend: Arc<dyn ExchangeBackend>,
    network_timeout: Duration,
}

impl SettlementOrchestrator {
    pub fn new(backend: Arc<dyn ExchangeBackend>, network_timeout: Duration) -> Self {
        Self {
            backend,
            network_timeout,
        }
    }

    pub async fn execute(
        &self,
        ticket: SettlementTicket,
        observer: &dyn PhaseObserver,
    ) -> SettlementOutcome {
        let SettlementTicket {
            generation,
            quote,
            account,
            signer,
        } = ticket;
        let side = quote.side;

        info!(generation, quote_id = %quote.quote_id, %side, account = %account, "Initiating settlement");
        let initiated = match with_deadline(
            self.network_timeout,
            "Initiate",
            self.backend.initiate(side, &account, &quote.quote_id),
        )
        .await
        {
            Ok(initiated) => initiated,
            Err(error) => {
                warn!(generation, %error, "Initiate failed");
                return SettlementOutcome::Failed(Failure::new(
                    FailureKind::InitiateFailed,
                    error.user_message(),
                ));
            }
        };

        let exchange_id = initiated.exchange_id;
        let payload = initiated.unsigned_payload.clone();
        if !observer
            .advance(generation, PhaseUpdate::Initiated(initiated))
            .await
        {
            debug!(generation, %exchange_id, "Settlement abandoned after initiate");
            return SettlementOutcome::Abandoned;
        }

        // No deadline: the user takes as long as they take
        info!(generation, %exchange_id, "Awaiting signature");
        let signature = match signer.sign_and_submit(&payload).await {
            Ok(signature) => signature,
            Err(SignerError::Rejected { reason }) => {
                info!(generation, %exchange_id, %reason, "Signature rejected");
                return SettlementOutcome::Failed(Failure::new(
                    FailureKind::SigningRejected,
                    reason,
                ));
            }
            Err(error) => {
                warn!(generation, %exchange_id, %error, "Signer failed");
                return SettlementOutcome::Failed(Failure::new(
                    FailureKind::SigningFailed,
                    error.to_string(),
                ));
            }
        };

        if !observer
            .advance(generation, PhaseUpdate::Signed(signature.clone()))
            .await
        {
            debug!(generation, %exchange_id, "Settlement abandoned after signing");
            return SettlementOutcome::Abandoned;
        }

        info!(generation, %exchange_id, %signature, "Confirming settlement");
        match with_deadline(
            self.network_timeout,
            "Confirm",
            self.backend.confirm(side, exchange_id, &signature),
        )
        .await
        {
            Ok(confirmation) => {
                SettlementOutcome::Settled(SettlementReceipt::new(exchange_id, confirmation))
            }
            Err(error) => {
                warn!(generation, %exchange_id, %error, "Confirm failed");
                SettlementOutcome::Failed(Failure::new(
                    FailureKind::ConfirmFailed,
                    error.user_message(),
                ))
            }
        }
    }
}
