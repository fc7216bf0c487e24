use crate::SettlementPhase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of everything that can go wrong between entering an amount
/// and receiving a settlement confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    QuoteFetchFailed,
    QuoteExpired,
    InitiateFailed,
    SigningRejected,
    SigningFailed,
    ConfirmFailed,
    /// Classification only. Unparseable or negative input is clamped to zero
    /// by the amount linker and never reported as a failure.
    InvalidAmount,
}

impl FailureKind {
    /// The settlement phase a failure of this kind can end, if any.
    pub fn settlement_phase(&self) -> Option<SettlementPhase> {
        match self {
            FailureKind::InitiateFailed => Some(SettlementPhase::Initiating),
            FailureKind::SigningRejected | FailureKind::SigningFailed => {
                Some(SettlementPhase::AwaitingSignature)
            }
            FailureKind::ConfirmFailed => Some(SettlementPhase::Confirming),
            FailureKind::QuoteFetchFailed
            | FailureKind::QuoteExpired
            | FailureKind::InvalidAmount => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::QuoteFetchFailed => "quote fetch failed",
            FailureKind::QuoteExpired => "quote expired",
            FailureKind::InitiateFailed => "initiate failed",
            FailureKind::SigningRejected => "signing rejected",
            FailureKind::SigningFailed => "signing failed",
            FailureKind::ConfirmFailed => "confirm failed",
            FailureKind::InvalidAmount => "invalid amount",
        };
        f.write_str(label)
    }
}

/// A classified failure with the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn quote_expired() -> Self {
        Self::new(
            FailureKind::QuoteExpired,
            "Quote expired. Please enter amount again.",
        )
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
