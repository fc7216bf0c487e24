pub mod amount_linker;
pub mod backend;
pub mod config;
pub mod notifier;
pub mod quote_lifecycle;
pub mod scheduler;
pub mod session;
pub mod settlement;
pub mod signer;

#[cfg(test)]
mod testing;

pub use amount_linker::{AmountLinker, AmountPair, DisplayRates};
pub use backend::{BackendError, ExchangeBackend};
pub use config::{ConfigError, SessionConfig};
pub use quote_lifecycle::{QuoteLifecycleManager, QuoteSnapshot, QuoteStatus, QuoteUnavailable};
pub use session::{ExchangeSession, SessionError, SessionSnapshot, SessionState};
pub use settlement::{
    PhaseObserver, PhaseUpdate, SettlementOrchestrator, SettlementOutcome, SettlementTicket,
};
pub use signer::{SignerError, TransactionSigner};
