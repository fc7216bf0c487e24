//! Quote acquisition and expiry.
//!
//! Every amount edit takes a new sequence number. A fetch or countdown only
//! touches state while the sequence it was started with is still current, so a
//! late response to an older edit is dropped instead of overwriting the newer
//! one.

use crate::{
    backend::{with_deadline, BackendError, ExchangeBackend},
    config::SessionConfig,
    notifier::StateNotifier,
    scheduler::{TimerKind, TimerSlot},
};
use exchange_models::{Failure, FailureKind, Quote, QuoteRequest, Side};
use rust_decimal::Decimal;
use snafu::Snafu;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::Mutex,
    time::{interval_at, Instant},
};
use tracing::{debug, info, warn};

pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteStatus {
    NoQuote,
    /// Waiting out the debounce window before fetching.
    Debouncing {
        fiat_amount: Decimal,
    },
    Fetching {
        fiat_amount: Decimal,
    },
    Active {
        quote: Quote,
        remaining_seconds: i64,
    },
    Expired,
}

impl QuoteStatus {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            QuoteStatus::Debouncing { .. } | QuoteStatus::Fetching { .. }
        )
    }

    pub fn quote(&self) -> Option<&Quote> {
        match self {
            QuoteStatus::Active { quote, .. } => Some(quote),
            _ => None,
        }
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        match self {
            QuoteStatus::Active {
                remaining_seconds, ..
            } => Some(*remaining_seconds),
            _ => None,
        }
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum QuoteUnavailable {
    #[snafu(display("No active quote"))]
    Missing,

    #[snafu(display("Quote expired"))]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSnapshot {
    pub status: QuoteStatus,
    pub sequence: u64,
    pub last_error: Option<Failure>,
}

#[derive(Clone)]
pub struct QuoteLifecycleManager {
    inner: Arc<QuoteInner>,
}

struct QuoteInner {
    backend: Arc<dyn ExchangeBackend>,
    debounce: Duration,
    network_timeout: Duration,
    notifier: StateNotifier,
    core: Mutex<QuoteCore>,
}

struct QuoteCore {
    status: QuoteStatus,
    sequence: u64,
    /// Hard deadline of the active quote, independent of countdown ticks.
    expires_at: Option<Instant>,
    timer: TimerSlot,
    last_error: Option<Failure>,
}

impl QuoteLifecycleManager {
    pub fn new(
        backend: Arc<dyn ExchangeBackend>,
        config: &SessionConfig,
        notifier: StateNotifier,
    ) -> Self {
        Self {
            inner: Arc::new(QuoteInner {
                backend,
                debounce: config.debounce,
                network_timeout: config.network_timeout,
                notifier,
                core: Mutex::new(QuoteCore {
                    status: QuoteStatus::NoQuote,
                    sequence: 0,
                    expires_at: None,
                    timer: TimerSlot::default(),
                    last_error: None,
                }),
            }),
        }
    }

    /// Drop the current quote and schedule a fetch for `fiat_amount` once the
    /// debounce window passes without another edit. Returns the edit's sequence.
    pub async fn on_amount_changed(&self, fiat_amount: Decimal, side: Side) -> u64 {
        let mut core = self.inner.core.lock().await;
        core.sequence += 1;
        let sequence = core.sequence;

        core.timer.cancel();
        core.expires_at = None;
        core.last_error = None;

        if fiat_amount > Decimal::ZERO {
            core.status = QuoteStatus::Debouncing { fiat_amount };
            let inner = Arc::downgrade(&self.inner);
            let debounce = self.inner.debounce;
            let request = QuoteRequest::in_fiat(fiat_amount, side);
            core.timer.arm(TimerKind::Debounce, async move {
                tokio::time::sleep(debounce).await;
                if let Some(inner) = inner.upgrade() {
                    inner.fetch(sequence, request).await;
                }
            });
        } else {
            core.status = QuoteStatus::NoQuote;
        }
        drop(core);

        debug!(sequence, %fiat_amount, %side, "Amount changed");
        self.inner.notifier.bump();
        sequence
    }

    /// Tear down timers and forget the current quote. Any fetch still in
    /// flight is discarded when it lands.
    pub async fn cancel(&self) {
        let mut core = self.inner.core.lock().await;
        core.sequence += 1;
        let cancelled = core.timer.cancel();
        core.status = QuoteStatus::NoQuote;
        core.expires_at = None;
        core.last_error = None;
        drop(core);

        debug!(?cancelled, "Quote lifecycle cancelled");
        self.inner.notifier.bump();
    }

    /// Hand the active quote over to a settlement. The quote is consumed: the
    /// countdown stops and the manager goes back to `NoQuote`.
    pub async fn take_active_quote(&self) -> Result<Quote, QuoteUnavailable> {
        let mut core = self.inner.core.lock().await;
        let status = std::mem::replace(&mut core.status, QuoteStatus::NoQuote);
        let quote = match status {
            QuoteStatus::Active { quote, .. } => quote,
            QuoteStatus::Expired => {
                core.status = QuoteStatus::Expired;
                return Err(QuoteUnavailable::Expired);
            }
            other => {
                core.status = other;
                return Err(QuoteUnavailable::Missing);
            }
        };

        core.sequence += 1;
        core.timer.cancel();
        let expired = core.expires_at.take().is_some_and(|at| Instant::now() >= at);
        if expired {
            core.status = QuoteStatus::Expired;
            core.last_error = Some(Failure::quote_expired());
            drop(core);
            info!(quote_id = %quote.quote_id, "Quote expired before settlement");
            self.inner.notifier.bump();
            return Err(QuoteUnavailable::Expired);
        }
        drop(core);

        debug!(quote_id = %quote.quote_id, "Quote taken for settlement");
        self.inner.notifier.bump();
        Ok(quote)
    }

    /// Forget the last quote error. Returns whether there was one.
    pub async fn clear_error(&self) -> bool {
        let mut core = self.inner.core.lock().await;
        let had_error = core.last_error.take().is_some();
        if core.status == QuoteStatus::Expired {
            core.status = QuoteStatus::NoQuote;
        }
        drop(core);
        if had_error {
            self.inner.notifier.bump();
        }
        had_error
    }

    pub async fn snapshot(&self) -> QuoteSnapshot {
        let core = self.inner.core.lock().await;
        QuoteSnapshot {
            status: core.status.clone(),
            sequence: core.sequence,
            last_error: core.last_error.clone(),
        }
    }
}

impl QuoteInner {
    async fn fetch(self: Arc<Self>, sequence: u64, request: QuoteRequest) {
        {
            let mut core = self.core.lock().await;
            if core.sequence != sequence {
                return;
            }
            // The debounce timer has fired; the fetch no longer occupies the slot
            core.timer.release();
            core.status = QuoteStatus::Fetching {
                fiat_amount: request.fiat_amount,
            };
        }
        self.notifier.bump();

        debug!(sequence, fiat_amount = %request.fiat_amount, side = %request.side, "Requesting quote");
        let result = with_deadline(
            self.network_timeout,
            "Quote request",
            self.backend.request_quote(&request),
        )
        .await;

        let mut core = self.core.lock().await;
        if core.sequence != sequence {
            debug!(
                sequence,
                current = core.sequence,
                "Discarding stale quote response"
            );
            return;
        }

        let result = result.and_then(|quote| match expiry_deadline(&quote) {
            Some(expires_at) => Ok((quote, expires_at)),
            None => Err(BackendError::Malformed {
                message: format!("Quote expiry of {}s is out of range", quote.expires_in_seconds),
            }),
        });

        match result {
            Ok((quote, Some(expires_at))) => {
                let remaining_seconds = quote.expires_in_seconds;
                info!(
                    sequence,
                    quote_id = %quote.quote_id,
                    expires_in = remaining_seconds,
                    "Quote active"
                );
                core.expires_at = Some(expires_at);
                core.status = QuoteStatus::Active {
                    quote,
                    remaining_seconds,
                };
                core.timer.arm(
                    TimerKind::Countdown,
                    Self::countdown(Arc::downgrade(&self), sequence),
                );
            }
            Ok((quote, None)) => {
                warn!(quote_id = %quote.quote_id, "Quote arrived already expired");
                core.status = QuoteStatus::Expired;
                core.last_error = Some(Failure::quote_expired());
            }
            Err(error) => {
                warn!(sequence, %error, "Quote request failed");
                core.status = QuoteStatus::NoQuote;
                core.last_error = Some(Failure::new(
                    FailureKind::QuoteFetchFailed,
                    error.user_message(),
                ));
            }
        }
        drop(core);
        self.notifier.bump();
    }

    async fn countdown(this: Weak<Self>, sequence: u64) {
        let mut ticks = interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
        loop {
            ticks.tick().await;

            let Some(inner) = this.upgrade() else {
                return;
            };
            let mut core = inner.core.lock().await;
            if core.sequence != sequence {
                return;
            }
            let remaining = match &mut core.status {
                QuoteStatus::Active {
                    remaining_seconds, ..
                } => {
                    *remaining_seconds -= 1;
                    *remaining_seconds
                }
                _ => return,
            };

            if remaining <= 0 {
                core.status = QuoteStatus::Expired;
                core.expires_at = None;
                core.last_error = Some(Failure::quote_expired());
                core.timer.release();
                drop(core);

                info!(sequence, "Quote expired");
                inner.notifier.bump();
                return;
            }
            drop(core);
            inner.notifier.bump();
        }
    }
}

/// Deadline of a freshly fetched quote: `Some(None)` when it arrived already
/// expired, `None` when its lifetime does not fit on the clock.
fn expiry_deadline(quote: &Quote) -> Option<Option<Instant>> {
    if quote.expires_in_seconds <= 0 {
        return Some(None);
    }
    let lifetime = Duration::from_secs(u64::try_from(quote.expires_in_seconds).ok()?);
    Instant::now().checked_add(lifetime).map(Some)
}
