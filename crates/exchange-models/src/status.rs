use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPhase {
    Idle,              // Created, nothing sent yet
    Initiating,        // Backend building the unsigned transaction
    AwaitingSignature, // Payload handed to the user's signer
    Confirming,        // Signature submitted, waiting on the backend
    Succeeded,
    Failed,
}

impl SettlementPhase {
    /// Whether a settlement in this phase blocks a new one from starting.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SettlementPhase::Initiating
                | SettlementPhase::AwaitingSignature
                | SettlementPhase::Confirming
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementPhase::Succeeded | SettlementPhase::Failed)
    }
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Status of a past exchange as recorded by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}
