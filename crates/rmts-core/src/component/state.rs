//! Component lifecycle state.
//!
//! # Lifecycle
//!
//! ```text
//! Constructed → Initializing → Ready → Active → Stopping → Finished
//!                                 │                 ▲
//!                                 └─────────────────┘ (stop before start)
//! ```

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Where a component is in its lifecycle.
///
/// | Category | States |
/// |----------|--------|
/// | Setup | `Constructed`, `Initializing`, `Ready` |
/// | Active | `Active` |
/// | Terminal | `Stopping`, `Finished` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ComponentState {
    /// Built, not yet registered with a manager.
    #[default]
    Constructed,
    /// Registered; interfaces sealed, connections may be made.
    Initializing,
    /// Startup hook completed; the task loop is about to run.
    Ready,
    /// The task loop is running.
    Active,
    /// Stop requested; final drain and cleanup in progress.
    Stopping,
    /// Task thread joined.
    Finished,
}

impl ComponentState {
    /// Returns `true` while the task loop runs.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` once a stop has been requested.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopping | Self::Finished)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state cell with change notification.
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    state: Mutex<ComponentState>,
    changed: Condvar,
}

impl StateCell {
    pub(crate) fn get(&self) -> ComponentState {
        *self.state.lock()
    }

    pub(crate) fn set(&self, next: ComponentState) {
        *self.state.lock() = next;
        self.changed.notify_all();
    }

    /// Waits until the state reaches at least `target`.
    pub(crate) fn wait_for(&self, target: ComponentState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state < target {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state >= target;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn categories() {
        assert!(ComponentState::Active.is_active());
        assert!(!ComponentState::Ready.is_active());
        assert!(ComponentState::Stopping.is_terminal());
        assert!(ComponentState::Finished.is_terminal());
        assert!(!ComponentState::Initializing.is_terminal());
    }

    #[test]
    fn lifecycle_order() {
        assert!(ComponentState::Constructed < ComponentState::Initializing);
        assert!(ComponentState::Active < ComponentState::Finished);
    }

    #[test]
    fn wait_for_observes_later_state() {
        let cell = Arc::new(StateCell::default());
        let writer = Arc::clone(&cell);
        let handle = thread::spawn(move || {
            writer.set(ComponentState::Ready);
            writer.set(ComponentState::Active);
        });
        assert!(cell.wait_for(ComponentState::Active, Duration::from_secs(2)));
        handle.join().expect("writer thread");
    }

    #[test]
    fn wait_for_times_out() {
        let cell = StateCell::default();
        assert!(!cell.wait_for(ComponentState::Active, Duration::from_millis(10)));
    }
}
