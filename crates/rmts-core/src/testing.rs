//! Test helpers shared across rmts crates.

use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe recorder of execution order.
///
/// Clones share one log, so a clone can be moved into a callable while
/// the test keeps another to inspect.
///
/// ```
/// use rmts_core::testing::CallLog;
///
/// let log = CallLog::new();
/// let sink = log.clone();
/// sink.record("first");
/// log.record("second");
/// assert_eq!(log.entries(), vec!["first", "second"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
