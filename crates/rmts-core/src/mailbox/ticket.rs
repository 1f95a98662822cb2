//! Completion tickets for queued invocations.
//!
//! A [`Ticket`] is shared between the caller and the mailbox entry it
//! describes. The draining thread moves it through
//!
//! ```text
//! Enqueued ──► Executing ──► Done
//!     │
//!     └──────────────────────► Abandoned   (mailbox closed before drain)
//! ```
//!
//! Blocking callers poll the state with back-off instead of parking on a
//! condition variable, so a waiting caller never holds anything the
//! draining thread needs.

use crate::command::ExecError;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of one mailbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Enqueued,
    Executing,
    Done,
    Abandoned,
}

impl EntryState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Enqueued,
            1 => Self::Executing,
            2 => Self::Done,
            _ => Self::Abandoned,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Enqueued => 0,
            Self::Executing => 1,
            Self::Done => 2,
            Self::Abandoned => 3,
        }
    }

    /// `Done` or `Abandoned`.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Done | Self::Abandoned)
    }
}

struct TicketInner {
    state: AtomicU8,
    outcome: Mutex<Option<Result<Value, ExecError>>>,
}

/// Handle on the outcome of one invocation.
///
/// Direct (non-queued) invocations return an already finished ticket.
#[derive(Clone)]
pub struct Ticket {
    inner: Arc<TicketInner>,
}

impl Ticket {
    pub(crate) fn pending() -> Self {
        Self {
            inner: Arc::new(TicketInner {
                state: AtomicU8::new(EntryState::Enqueued.as_u8()),
                outcome: Mutex::new(None),
            }),
        }
    }

    /// A ticket that is already `Done` with `result`.
    #[must_use]
    pub fn completed(result: Result<Value, ExecError>) -> Self {
        Self {
            inner: Arc::new(TicketInner {
                state: AtomicU8::new(EntryState::Done.as_u8()),
                outcome: Mutex::new(Some(result)),
            }),
        }
    }

    /// Current entry state.
    #[must_use]
    pub fn state(&self) -> EntryState {
        EntryState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns `true` once the entry is `Done` or `Abandoned`.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_final()
    }

    pub(crate) fn mark_executing(&self) {
        self.inner
            .state
            .store(EntryState::Executing.as_u8(), Ordering::Release);
    }

    pub(crate) fn complete(&self, result: Result<Value, ExecError>) {
        *self.inner.outcome.lock() = Some(result);
        self.inner
            .state
            .store(EntryState::Done.as_u8(), Ordering::Release);
    }

    pub(crate) fn abandon(&self, reason: ExecError) {
        *self.inner.outcome.lock() = Some(Err(reason));
        self.inner
            .state
            .store(EntryState::Abandoned.as_u8(), Ordering::Release);
    }

    /// Outcome if finished, `None` while still pending.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<Value, ExecError>> {
        if !self.is_finished() {
            return None;
        }
        self.inner.outcome.lock().clone()
    }

    /// Polls until the entry finishes or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - the callable's own error when it failed on the provider's thread
    /// - [`ExecError::Disconnected`] when the entry was abandoned
    /// - [`ExecError::Timeout`] when the provider did not drain in time
    pub fn wait(&self, timeout: Duration) -> Result<Value, ExecError> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();
        loop {
            if let Some(result) = self.try_result() {
                return result;
            }
            if Instant::now() >= deadline {
                return Err(ExecError::Timeout {
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            backoff.snooze();
        }
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").field("state", &self.state()).finish()
    }
}

/// Spin briefly, then sleep with exponential growth up to 2 ms.
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const MAX_SLEEP: Duration = Duration::from_millis(2);

    pub(crate) const fn new() -> Self {
        Self { step: 0 }
    }

    pub(crate) fn snooze(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            std::thread::yield_now();
        } else {
            let exp = (self.step - Self::SPIN_LIMIT).min(6);
            let sleep = Duration::from_micros(50u64 << exp).min(Self::MAX_SLEEP);
            std::thread::sleep(sleep);
        }
        self.step = self.step.saturating_add(1);
    }
}
