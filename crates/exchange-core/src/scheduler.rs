//! Single-slot timer ownership.
//!
//! Every component owns its timers through a [`TimerSlot`]. A slot holds at
//! most one pending timer task, so arming one kind of timer always tears down
//! whatever the slot held before. Timers run on the tokio clock, which tests
//! pause and advance by hand.

use std::future::Future;
use tokio::task::AbortHandle;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Debounce,
    Countdown,
    SuccessDisplay,
}

#[derive(Debug, Default)]
pub struct TimerSlot {
    pending: Option<(TimerKind, AbortHandle)>,
}

impl TimerSlot {
    /// Spawn `task` as the slot's timer, aborting any timer already armed.
    pub fn arm<F>(&mut self, kind: TimerKind, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let handle = tokio::spawn(task);
        trace!(?kind, "Timer armed");
        self.pending = Some((kind, handle.abort_handle()));
    }

    /// Abort the pending timer, if any. Returns what was cancelled.
    pub fn cancel(&mut self) -> Option<TimerKind> {
        let (kind, handle) = self.pending.take()?;
        handle.abort();
        trace!(?kind, "Timer cancelled");
        Some(kind)
    }

    /// Forget the pending timer without aborting it. Called by the timer task
    /// itself once it has fired and carries on with non-timer work.
    pub fn release(&mut self) {
        self.pending = None;
    }

    pub fn kind(&self) -> Option<TimerKind> {
        self.pending.as_ref().map(|(kind, _)| *kind)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
