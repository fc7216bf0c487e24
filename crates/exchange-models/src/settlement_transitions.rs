use crate::{
    Failure, Initiated, SettlementPhase, SettlementReceipt, SettlementResult, SettlementSession,
    TransactionSignature,
};
use chrono::Utc;
use snafu::{ensure, Snafu};

#[derive(Debug, Snafu)]
pub enum TransitionError {
    #[snafu(display("Invalid settlement transition from {:?} to {:?}", from, to))]
    InvalidTransition {
        from: SettlementPhase,
        to: SettlementPhase,
    },

    #[snafu(display("Failure {} cannot end a settlement in phase {:?}", failure, phase))]
    MismatchedFailure {
        failure: Failure,
        phase: SettlementPhase,
    },
}

pub type TransitionResult = Result<(), TransitionError>;

impl SettlementSession {
    /// Start the initiate phase
    pub fn begin(&mut self) -> TransitionResult {
        ensure!(
            self.phase == SettlementPhase::Idle,
            InvalidTransitionSnafu {
                from: self.phase,
                to: SettlementPhase::Initiating,
            }
        );

        self.phase = SettlementPhase::Initiating;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the backend-built transaction and hand it to the signer
    pub fn initiated(&mut self, initiated: Initiated) -> TransitionResult {
        ensure!(
            self.phase == SettlementPhase::Initiating,
            InvalidTransitionSnafu {
                from: self.phase,
                to: SettlementPhase::AwaitingSignature,
            }
        );

        self.exchange_id = Some(initiated.exchange_id);
        self.unsigned_payload = Some(initiated.unsigned_payload);
        self.phase = SettlementPhase::AwaitingSignature;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the signer's output and move on to confirmation
    pub fn signed(&mut self, signature: TransactionSignature) -> TransitionResult {
        ensure!(
            self.phase == SettlementPhase::AwaitingSignature,
            InvalidTransitionSnafu {
                from: self.phase,
                to: SettlementPhase::Confirming,
            }
        );

        self.signed_payload_ref = Some(signature);
        self.phase = SettlementPhase::Confirming;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Complete the settlement
    pub fn confirmed(&mut self, receipt: SettlementReceipt) -> TransitionResult {
        ensure!(
            self.phase == SettlementPhase::Confirming,
            InvalidTransitionSnafu {
                from: self.phase,
                to: SettlementPhase::Succeeded,
            }
        );

        self.result = Some(SettlementResult::Settled(receipt));
        self.phase = SettlementPhase::Succeeded;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// End the settlement with a failure belonging to the current phase.
    /// Whatever was recorded so far (exchange id, payload) is kept.
    pub fn fail(&mut self, failure: Failure) -> TransitionResult {
        ensure!(
            self.phase.is_in_flight(),
            InvalidTransitionSnafu {
                from: self.phase,
                to: SettlementPhase::Failed,
            }
        );
        ensure!(
            failure.kind.settlement_phase() == Some(self.phase),
            MismatchedFailureSnafu {
                failure,
                phase: self.phase,
            }
        );

        self.result = Some(SettlementResult::Failed(failure));
        self.phase = SettlementPhase::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase.is_in_flight()
    }
}
