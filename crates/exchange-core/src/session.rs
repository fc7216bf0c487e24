//! The exchange form as a state machine.
//!
//! [`ExchangeSession`] owns the amount pair, the quote lifecycle, and at most
//! one settlement. Every settlement runs under a generation number; cancelling
//! or starting over bumps the generation, and whatever a stale settlement task
//! reports afterwards is dropped.

use crate::{
    amount_linker::{AmountLinker, AmountPair, DisplayRates},
    backend::{with_deadline, BackendError, ExchangeBackend},
    config::{ConfigError, SessionConfig},
    notifier::StateNotifier,
    quote_lifecycle::{QuoteLifecycleManager, QuoteStatus, QuoteUnavailable},
    scheduler::{TimerKind, TimerSlot},
    settlement::{
        PhaseObserver, PhaseUpdate, SettlementOrchestrator, SettlementOutcome, SettlementTicket,
    },
    signer::TransactionSigner,
};
use async_trait::async_trait;
use exchange_models::{
    AccountId, Failure, PriceSnapshot, Quote, SettlementPhase, SettlementSession, Side,
    TransitionError, Unit,
};
use rust_decimal::Decimal;
use serde::Serialize;
use snafu::{ensure, ResultExt, Snafu};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Quoting,
    ReadyToSettle,
    Initiating,
    AwaitingSignature,
    Confirming,
    Succeeded,
    Failed,
}

impl SessionState {
    fn derive(settlement: Option<&SettlementSession>, quote: &QuoteStatus) -> Self {
        if let Some(settlement) = settlement {
            match settlement.phase {
                SettlementPhase::Initiating => return SessionState::Initiating,
                SettlementPhase::AwaitingSignature => return SessionState::AwaitingSignature,
                SettlementPhase::Confirming => return SessionState::Confirming,
                SettlementPhase::Succeeded => return SessionState::Succeeded,
                SettlementPhase::Failed => return SessionState::Failed,
                SettlementPhase::Idle => {}
            }
        }
        match quote {
            QuoteStatus::Debouncing { .. } | QuoteStatus::Fetching { .. } => SessionState::Quoting,
            QuoteStatus::Active { .. } => SessionState::ReadyToSettle,
            QuoteStatus::NoQuote | QuoteStatus::Expired => SessionState::Idle,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("A settlement is already in progress ({})", phase))]
    SettlementInFlight { phase: SettlementPhase },

    #[snafu(display("No active quote to settle"))]
    NoActiveQuote,

    #[snafu(display("Quote expired. Please enter amount again."))]
    QuoteExpired,

    #[snafu(display("Amounts for a {} order cannot be entered in {}", side, unit))]
    UnsupportedUnit { unit: Unit, side: Side },

    #[snafu(display("Nothing to dismiss"))]
    NothingToDismiss,

    #[snafu(display("Invalid session config: {}", source))]
    Config { source: ConfigError },

    #[snafu(display("{}", source))]
    Backend { source: BackendError },

    #[snafu(display("Settlement state error: {}", source))]
    Transition { source: TransitionError },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Everything an observer needs to render the session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub side: Side,
    pub amounts: AmountPair,
    pub quote: Option<Quote>,
    pub remaining_seconds: Option<i64>,
    pub settlement: Option<SettlementSession>,
    pub error: Option<Failure>,
    pub revision: u64,
}

#[derive(Clone)]
pub struct ExchangeSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    backend: Arc<dyn ExchangeBackend>,
    orchestrator: SettlementOrchestrator,
    quotes: QuoteLifecycleManager,
    notifier: StateNotifier,
    core: Mutex<SessionCore>,
}

struct SessionCore {
    side: Side,
    input_unit: Unit,
    rates: DisplayRates,
    amounts: AmountPair,
    settlement: Option<SettlementSession>,
    generation: u64,
    reset_timer: TimerSlot,
}

impl SessionCore {
    fn linker(&self) -> AmountLinker {
        AmountLinker::for_side(self.side, self.input_unit, &self.rates)
    }

    fn ensure_idle(&self) -> Result<()> {
        if let Some(settlement) = &self.settlement {
            ensure!(
                !settlement.is_in_flight(),
                SettlementInFlightSnafu {
                    phase: settlement.phase
                }
            );
        }
        Ok(())
    }

    /// Drop a finished settlement so the form can be used again.
    fn clear_terminal_settlement(&mut self) -> bool {
        let terminal = self
            .settlement
            .as_ref()
            .is_some_and(|settlement| settlement.phase.is_terminal());
        if terminal {
            self.settlement = None;
            self.reset_timer.cancel();
        }
        terminal
    }

    fn clear_amounts(&mut self) {
        let linker = self.linker();
        self.amounts = AmountPair::empty(linker.primary_unit(), linker.paired_unit());
    }
}

impl ExchangeSession {
    pub fn new(backend: Arc<dyn ExchangeBackend>, config: SessionConfig) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;

        let notifier = StateNotifier::new();
        let quotes = QuoteLifecycleManager::new(backend.clone(), &config, notifier.clone());
        let orchestrator = SettlementOrchestrator::new(backend.clone(), config.network_timeout);
        let side = Side::Buy;

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                backend,
                orchestrator,
                quotes,
                notifier,
                core: Mutex::new(SessionCore {
                    side,
                    input_unit: Unit::Fiat,
                    rates: DisplayRates::default(),
                    amounts: AmountPair::empty(Unit::Fiat, side.paired_unit()),
                    settlement: None,
                    generation: 0,
                    reset_timer: TimerSlot::default(),
                }),
            }),
        })
    }

    /// Record a user edit of the primary amount and requote.
    pub async fn set_amount(&self, input: &str) -> Result<AmountPair> {
        let mut core = self.inner.core.lock().await;
        core.ensure_idle()?;
        core.clear_terminal_settlement();

        let pair = core.linker().set_primary(input);
        core.amounts = pair.clone();
        self.inner
            .quotes
            .on_amount_changed(pair.fiat_value(), core.side)
            .await;
        drop(core);

        self.inner.notifier.bump();
        Ok(pair)
    }

    /// Switch between typing fiat and typing the side's paired unit. The
    /// current amount is carried over; the quote is left alone.
    pub async fn set_input_unit(&self, unit: Unit) -> Result<AmountPair> {
        let mut core = self.inner.core.lock().await;
        core.ensure_idle()?;
        let side = core.side;
        ensure!(
            unit == Unit::Fiat || unit == side.paired_unit(),
            UnsupportedUnitSnafu { unit, side }
        );
        if unit == core.input_unit {
            return Ok(core.amounts.clone());
        }

        let carried = core.amounts.derived_display.clone();
        core.input_unit = unit;
        let pair = core.linker().set_primary(&carried);
        core.amounts = pair.clone();
        drop(core);

        debug!(%unit, "Input unit changed");
        self.inner.notifier.bump();
        Ok(pair)
    }

    /// Replace the display rates and recompute the paired amount. While a
    /// settlement is in flight the amounts being settled stay as they are.
    pub async fn set_display_rates(&self, rates: DisplayRates) {
        let mut core = self.inner.core.lock().await;
        core.rates = rates;
        if core.ensure_idle().is_err() {
            drop(core);
            debug!("Display rates updated mid-settlement; amounts kept");
            return;
        }
        let previous = core.amounts.fiat_value();
        let pair = core.linker().set_primary(&core.amounts.primary_input);
        core.amounts = pair;

        // Typing in a non-fiat unit: the fiat value moved with the rate
        if core.amounts.fiat_value() != previous {
            core.clear_terminal_settlement();
            self.inner
                .quotes
                .on_amount_changed(core.amounts.fiat_value(), core.side)
                .await;
        }
        drop(core);
        self.inner.notifier.bump();
    }

    pub async fn refresh_prices(&self) -> Result<PriceSnapshot> {
        let prices = with_deadline(
            self.inner.config.network_timeout,
            "Price request",
            self.inner.backend.prices(),
        )
        .await
        .context(BackendSnafu)?;

        debug!(base_crypto_price = %prices.base_crypto_price, "Display prices refreshed");
        self.set_display_rates(DisplayRates::from_prices(&prices))
            .await;
        Ok(prices)
    }

    /// Change sides. Clears the amounts, the quote, and any finished settlement.
    pub async fn switch_side(&self, side: Side) -> Result<()> {
        let mut core = self.inner.core.lock().await;
        core.ensure_idle()?;
        if core.side == side {
            return Ok(());
        }

        core.side = side;
        core.input_unit = Unit::Fiat;
        core.settlement = None;
        core.reset_timer.cancel();
        core.clear_amounts();
        self.inner.quotes.cancel().await;
        drop(core);

        info!(%side, "Switched side");
        self.inner.notifier.bump();
        Ok(())
    }

    /// Largest amount the account can trade on the current side, in the
    /// current input unit. Buys keep the configured fee reserve back.
    pub async fn max_amount(&self, account: &AccountId) -> Result<Decimal> {
        let balance = with_deadline(
            self.inner.config.network_timeout,
            "Balance request",
            self.inner.backend.balance(account),
        )
        .await
        .context(BackendSnafu)?;

        let core = self.inner.core.lock().await;
        let (available, reserve, unit) = match core.side {
            Side::Buy => (
                balance.base_crypto_balance,
                self.inner.config.fee_reserve,
                Unit::BaseCrypto,
            ),
            Side::Sell => (balance.token_balance, Decimal::ZERO, Unit::Token),
        };
        Ok(core.linker().max_amount(available, reserve, unit))
    }

    /// Start settling the active quote. Returns the settlement's generation.
    ///
    /// Rejected without side effects while another settlement is in flight,
    /// and before any network call when there is no live quote.
    pub async fn confirm_settlement(
        &self,
        account: AccountId,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<u64> {
        let mut core = self.inner.core.lock().await;
        core.ensure_idle()?;

        let quote = match self.inner.quotes.take_active_quote().await {
            Ok(quote) => quote,
            Err(QuoteUnavailable::Expired) => return QuoteExpiredSnafu.fail(),
            Err(QuoteUnavailable::Missing) => return NoActiveQuoteSnafu.fail(),
        };

        core.reset_timer.cancel();
        core.generation += 1;
        let generation = core.generation;

        let mut settlement = SettlementSession::new(quote.clone(), account.clone());
        settlement.begin().context(TransitionSnafu)?;
        info!(
            generation,
            settlement_id = %settlement.id,
            quote_id = %quote.quote_id,
            "Settlement started"
        );
        core.settlement = Some(settlement);

        let ticket = SettlementTicket {
            generation,
            quote,
            account,
            signer,
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.orchestrator.execute(ticket, inner.as_ref()).await;
            inner.finish(generation, outcome).await;
        });
        drop(core);

        self.inner.notifier.bump();
        Ok(generation)
    }

    /// Acknowledge a finished settlement or a quote error and return to Idle.
    pub async fn dismiss(&self) -> Result<()> {
        let mut core = self.inner.core.lock().await;
        core.ensure_idle()?;

        let cleared_settlement = core.clear_terminal_settlement();
        if cleared_settlement {
            core.clear_amounts();
        }
        let cleared_error = self.inner.quotes.clear_error().await;
        drop(core);

        ensure!(cleared_settlement || cleared_error, NothingToDismissSnafu);
        self.inner.notifier.bump();
        Ok(())
    }

    /// Tear the session down. A settlement in flight is detached: its task
    /// keeps running but nothing it reports is applied.
    pub async fn cancel(&self) {
        let mut core = self.inner.core.lock().await;
        core.generation += 1;
        if let Some(settlement) = core.settlement.take() {
            if settlement.is_in_flight() {
                warn!(
                    settlement_id = %settlement.id,
                    phase = %settlement.phase,
                    exchange_id = ?settlement.exchange_id,
                    "Cancelling settlement in flight"
                );
            }
        }
        core.reset_timer.cancel();
        core.clear_amounts();
        self.inner.quotes.cancel().await;
        drop(core);

        self.inner.notifier.bump();
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let core = self.inner.core.lock().await;
        let quote = self.inner.quotes.snapshot().await;

        let settlement_failure = core
            .settlement
            .as_ref()
            .and_then(|settlement| settlement.failure().cloned());

        SessionSnapshot {
            state: SessionState::derive(core.settlement.as_ref(), &quote.status),
            side: core.side,
            amounts: core.amounts.clone(),
            quote: quote.status.quote().cloned(),
            remaining_seconds: quote.status.remaining_seconds(),
            settlement: core.settlement.clone(),
            error: settlement_failure.or(quote.last_error),
            revision: self.inner.notifier.revision(),
        }
    }

    /// Changes to the session bump the watched revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.notifier.subscribe()
    }
}

impl SessionInner {
    async fn finish(self: &Arc<Self>, generation: u64, outcome: SettlementOutcome) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            debug!(generation, current = core.generation, "Dropping outcome of cancelled settlement");
            return;
        }
        let Some(settlement) = core.settlement.as_mut() else {
            return;
        };

        let applied = match outcome {
            SettlementOutcome::Settled(receipt) => {
                info!(
                    generation,
                    exchange_id = %receipt.exchange_id,
                    signature = %receipt.receipt_signature,
                    "Settlement succeeded"
                );
                settlement.confirmed(receipt)
            }
            SettlementOutcome::Failed(failure) => {
                warn!(
                    generation,
                    exchange_id = ?settlement.exchange_id,
                    %failure,
                    "Settlement failed"
                );
                settlement.fail(failure)
            }
            SettlementOutcome::Abandoned => return,
        };
        if let Err(error) = applied {
            error!(generation, %error, "Could not record settlement outcome");
            return;
        }

        if core
            .settlement
            .as_ref()
            .is_some_and(|settlement| settlement.phase == SettlementPhase::Succeeded)
        {
            let inner = Arc::downgrade(self);
            let display = self.config.success_display;
            core.reset_timer.arm(TimerKind::SuccessDisplay, async move {
                tokio::time::sleep(display).await;
                if let Some(inner) = inner.upgrade() {
                    inner.reset_after_success(generation).await;
                }
            });
        }
        drop(core);
        self.notifier.bump();
    }

    async fn reset_after_success(&self, generation: u64) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        core.reset_timer.release();
        if core
            .settlement
            .as_ref()
            .is_some_and(|settlement| settlement.phase == SettlementPhase::Succeeded)
        {
            core.settlement = None;
            core.clear_amounts();
            drop(core);
            debug!(generation, "Success display elapsed");
            self.notifier.bump();
        }
    }
}

#[async_trait]
impl PhaseObserver for SessionInner {
    async fn advance(&self, generation: u64, update: PhaseUpdate) -> bool {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            debug!(generation, current = core.generation, "Ignoring update for cancelled settlement");
            return false;
        }
        let Some(settlement) = core.settlement.as_mut() else {
            return false;
        };

        let applied = match update {
            PhaseUpdate::Initiated(initiated) => settlement.initiated(initiated),
            PhaseUpdate::Signed(signature) => settlement.signed(signature),
        };
        if let Err(error) = applied {
            warn!(generation, %error, "Rejected settlement update");
            return false;
        }
        drop(core);

        self.notifier.bump();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_account, FakeBackend, ScriptedSigner, SignerBehavior};
    use exchange_models::{ExchangeId, FailureKind, SettledAmounts};
    use rust_decimal_macros::dec;
    use std::{sync::atomic::Ordering, time::Duration};

    fn session(backend: Arc<FakeBackend>) -> ExchangeSession {
        ExchangeSession::new(backend, SessionConfig::default()).unwrap()
    }

    async fn advance(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn state(session: &ExchangeSession) -> SessionState {
        session.snapshot().await.state
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_buy() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        let signer = ScriptedSigner::new(SignerBehavior::ApproveAfter(Duration::from_secs(1)));

        session.set_amount("25.00").await.unwrap();
        assert_eq!(state(&session).await, SessionState::Quoting);

        advance(Duration::from_millis(600)).await;
        assert_eq!(backend.quote_calls(), 1);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::ReadyToSettle);
        let quote = snapshot.quote.unwrap();
        assert_eq!(quote.expires_in_seconds, 30);

        session
            .confirm_settlement(test_account(), signer.clone())
            .await
            .unwrap();
        assert_eq!(state(&session).await, SessionState::Initiating);

        advance(Duration::from_millis(60)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::AwaitingSignature);
        assert!(snapshot.settlement.unwrap().exchange_id.is_some());

        advance(Duration::from_secs(1)).await;
        assert_eq!(state(&session).await, SessionState::Confirming);

        advance(Duration::from_millis(60)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Succeeded);
        let receipt = snapshot.settlement.unwrap().receipt().cloned().unwrap();
        assert_eq!(
            receipt.amounts,
            SettledAmounts::Buy {
                token_minted: quote.token_amount
            }
        );

        advance(Duration::from_secs(5)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.settlement.is_none());
        assert!(snapshot.quote.is_none());
        assert!(snapshot.error.is_none());
        assert!(snapshot.amounts.primary_input.is_empty());
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_expiry_returns_to_idle() {
        let backend = FakeBackend::new();
        backend.expires_in.store(3, Ordering::SeqCst);
        let session = session(backend.clone());

        session.set_amount("25.00").await.unwrap();
        advance(Duration::from_millis(600)).await;
        assert_eq!(state(&session).await, SessionState::ReadyToSettle);

        advance(Duration::from_secs(4)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.error.unwrap().kind, FailureKind::QuoteExpired);
        assert_eq!(backend.initiate_calls.load(Ordering::SeqCst), 0);

        let signer = ScriptedSigner::new(SignerBehavior::Approve);
        let result = session.confirm_settlement(test_account(), signer).await;
        assert!(matches!(result, Err(SessionError::QuoteExpired)));
        assert_eq!(backend.initiate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signer_rejection_keeps_exchange_id() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());

        session.set_amount("25.00").await.unwrap();
        advance(Duration::from_millis(600)).await;
        session
            .confirm_settlement(test_account(), ScriptedSigner::new(SignerBehavior::Reject))
            .await
            .unwrap();
        advance(Duration::from_millis(200)).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Failed);
        assert_eq!(snapshot.error.unwrap().kind, FailureKind::SigningRejected);
        let settlement = snapshot.settlement.unwrap();
        assert!(settlement.exchange_id.is_some());
        assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 0);

        // Failed stays until dismissed
        advance(Duration::from_secs(30)).await;
        assert_eq!(state(&session).await, SessionState::Failed);
        session.dismiss().await.unwrap();
        assert_eq!(state(&session).await, SessionState::Idle);
        assert!(matches!(
            session.dismiss().await,
            Err(SessionError::NothingToDismiss)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_amount_holds_back_fee_reserve() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        session.refresh_prices().await.unwrap();

        let max = session.max_amount(&test_account()).await.unwrap();
        assert_eq!(max, dec!(298.50));

        session.set_input_unit(Unit::BaseCrypto).await.unwrap();
        let max = session.max_amount(&test_account()).await.unwrap();
        assert_eq!(max, dec!(1.99));

        // Sells spend the whole token balance
        session.switch_side(Side::Sell).await.unwrap();
        let max = session.max_amount(&test_account()).await.unwrap();
        assert_eq!(max, dec!(125.00));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_confirm_is_rejected_while_in_flight() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        let signer = ScriptedSigner::new(SignerBehavior::ApproveAfter(Duration::from_secs(10)));

        session.set_amount("25.00").await.unwrap();
        advance(Duration::from_millis(600)).await;
        let generation = session
            .confirm_settlement(test_account(), signer.clone())
            .await
            .unwrap();

        let second = session
            .confirm_settlement(test_account(), signer.clone())
            .await;
        assert!(matches!(
            second,
            Err(SessionError::SettlementInFlight {
                phase: SettlementPhase::Initiating
            })
        ));

        advance(Duration::from_millis(100)).await;
        let edit = session.set_amount("30").await;
        assert!(matches!(edit, Err(SessionError::SettlementInFlight { .. })));
        let switch = session.switch_side(Side::Sell).await;
        assert!(matches!(switch, Err(SessionError::SettlementInFlight { .. })));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::AwaitingSignature);
        assert_eq!(snapshot.side, Side::Buy);
        assert_eq!(snapshot.amounts.primary_input, "25.00");
        assert_eq!(backend.initiate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_without_quote_is_rejected() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        let signer = ScriptedSigner::new(SignerBehavior::Approve);

        let result = session.confirm_settlement(test_account(), signer.clone()).await;
        assert!(matches!(result, Err(SessionError::NoActiveQuote)));

        // Still debouncing
        session.set_amount("25").await.unwrap();
        let result = session.confirm_settlement(test_account(), signer).await;
        assert!(matches!(result, Err(SessionError::NoActiveQuote)));
        assert_eq!(backend.initiate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_signing_discards_result() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        let signer = ScriptedSigner::new(SignerBehavior::ApproveAfter(Duration::from_secs(3)));

        session.set_amount("25.00").await.unwrap();
        advance(Duration::from_millis(600)).await;
        session
            .confirm_settlement(test_account(), signer.clone())
            .await
            .unwrap();
        advance(Duration::from_millis(100)).await;
        assert_eq!(state(&session).await, SessionState::AwaitingSignature);

        session.cancel().await;
        assert_eq!(state(&session).await, SessionState::Idle);

        advance(Duration::from_secs(10)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.settlement.is_none());
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_side_clears_quote_and_amounts() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());

        session.set_amount("25.00").await.unwrap();
        advance(Duration::from_millis(600)).await;
        assert_eq!(state(&session).await, SessionState::ReadyToSettle);

        session.switch_side(Side::Sell).await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.side, Side::Sell);
        assert!(snapshot.quote.is_none());
        assert_eq!(snapshot.amounts.derived_unit, Unit::Token);
        assert!(snapshot.amounts.primary_input.is_empty());

        assert!(matches!(
            session.set_input_unit(Unit::BaseCrypto).await,
            Err(SessionError::UnsupportedUnit { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_failure_is_classified() {
        let backend = FakeBackend::new();
        backend.fail_confirm.store(true, Ordering::SeqCst);
        let session = session(backend.clone());

        session.switch_side(Side::Sell).await.unwrap();
        session.set_amount("25.00").await.unwrap();
        advance(Duration::from_millis(600)).await;
        session
            .confirm_settlement(test_account(), ScriptedSigner::new(SignerBehavior::Approve))
            .await
            .unwrap();
        advance(Duration::from_millis(200)).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Failed);
        let failure = snapshot.error.unwrap();
        assert_eq!(failure.kind, FailureKind::ConfirmFailed);
        assert_eq!(failure.message, "Transaction not found on chain");
        assert_eq!(
            snapshot.settlement.unwrap().exchange_id,
            Some(ExchangeId(108))
        );

        // Editing after a failure starts over
        session.set_amount("10").await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Quoting);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_failure_returns_to_idle_with_error() {
        let backend = FakeBackend::new();
        backend.fail_quotes.store(true, Ordering::SeqCst);
        let session = session(backend.clone());

        session.set_amount("25").await.unwrap();
        assert_eq!(state(&session).await, SessionState::Quoting);

        advance(Duration::from_secs(1)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.quote.is_none());
        let failure = snapshot.error.unwrap();
        assert_eq!(failure.kind, FailureKind::QuoteFetchFailed);
        assert_eq!(failure.message, "Price feed unavailable");

        session.dismiss().await.unwrap();
        assert!(session.snapshot().await.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_amount_clamps_without_error() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());

        for input in ["-5", "abc"] {
            let pair = session.set_amount(input).await.unwrap();
            assert!(pair.fiat_value().is_zero());
        }
        advance(Duration::from_secs(1)).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.error.is_none());
        assert_eq!(backend.quote_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_change_mid_settlement_keeps_amounts() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        session.refresh_prices().await.unwrap();
        let signer = ScriptedSigner::new(SignerBehavior::ApproveAfter(Duration::from_secs(2)));

        session.set_amount("25").await.unwrap();
        advance(Duration::from_millis(600)).await;
        session
            .confirm_settlement(test_account(), signer)
            .await
            .unwrap();
        advance(Duration::from_millis(60)).await;
        let before = session.snapshot().await;
        assert_eq!(before.state, SessionState::AwaitingSignature);
        assert_eq!(before.amounts.derived_display, "0.166667");

        session
            .set_display_rates(DisplayRates {
                base_crypto_price: Some(dec!(300)),
                token_fiat_value: dec!(10),
            })
            .await;
        let during = session.snapshot().await;
        assert_eq!(during.amounts, before.amounts);
        assert_eq!(backend.quote_calls(), 1);

        advance(Duration::from_secs(3)).await;
        assert_eq!(state(&session).await, SessionState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_cancels_reset_timer() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());

        session.set_amount("25").await.unwrap();
        advance(Duration::from_millis(600)).await;
        session
            .confirm_settlement(test_account(), ScriptedSigner::new(SignerBehavior::Approve))
            .await
            .unwrap();
        advance(Duration::from_millis(500)).await;
        assert_eq!(state(&session).await, SessionState::Succeeded);

        let inner = Arc::downgrade(&session.inner);
        let notifier = session.inner.notifier.clone();
        drop(session);
        assert!(inner.upgrade().is_none());

        let revision = notifier.revision();
        advance(Duration::from_secs(10)).await;
        assert_eq!(notifier.revision(), revision);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_changes() {
        let backend = FakeBackend::new();
        let session = session(backend.clone());
        let mut changes = session.subscribe();
        let before = *changes.borrow_and_update();

        session.set_amount("25").await.unwrap();
        assert!(changes.has_changed().unwrap());
        assert!(*changes.borrow_and_update() > before);
    }
}
