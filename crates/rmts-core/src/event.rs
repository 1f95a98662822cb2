//! Event generators: multicast commands with an observer list.
//!
//! An [`EventGenerator`] is owned by an original provided interface and
//! shared, by reference, with every end-user clone. Observers are handler
//! commands owned by the *requiring* side; each handler's own dispatch
//! decides whether it runs inline during [`EventGenerator::fire`] or is
//! deferred into its owner's mailbox.
//!
//! ```text
//! fire(payload)
//!    │
//!    ├──► handler 1 (Direct)  ── runs now
//!    ├──► handler 2 (Queued)  ── enqueued into requirer's mailbox
//!    └──► handler 3 (Queued)  ── mailbox full → reported, others unaffected
//! ```

use crate::command::{Command, ExecError};
use crate::interface::InterfaceError;
use parking_lot::RwLock;
use rmts_types::{EventKind, Prototype};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one firing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FireReport {
    /// Handlers that ran or were enqueued.
    pub delivered: usize,
    /// Handlers that refused the event, with the reason.
    pub failed: Vec<(String, ExecError)>,
}

impl FireReport {
    /// Returns `true` if every observer accepted the event.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Multicast command fanning out to subscribed handlers.
///
/// # Example
///
/// ```
/// use rmts_core::command::{Callable, Command};
/// use rmts_core::EventGenerator;
/// use rmts_types::Prototype;
/// use std::sync::Arc;
///
/// let reached = EventGenerator::void("GoalReached");
/// assert_eq!(reached.fire().delivered, 0);
///
/// let handler = Arc::new(Command::direct(
///     "OnGoalReached",
///     Callable::void(|| {}),
///     Prototype::unit(),
///     Prototype::unit(),
/// ));
/// reached.add_observer(Arc::clone(&handler)).expect("void handler");
/// assert_eq!(reached.fire().delivered, 1);
/// ```
#[derive(Debug)]
pub struct EventGenerator {
    name: String,
    kind: EventKind,
    argument: Prototype,
    observers: RwLock<Vec<Arc<Command>>>,
}

impl EventGenerator {
    /// Creates a Void event.
    #[must_use]
    pub fn void(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EventKind::Void,
            argument: Prototype::unit(),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Creates a Write event carrying values of `argument`.
    #[must_use]
    pub fn write(name: impl Into<String>, argument: Prototype) -> Self {
        Self {
            name: name.into(),
            kind: EventKind::Write,
            argument,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload shape.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Payload schema (unit for Void events).
    #[must_use]
    pub fn argument_prototype(&self) -> &Prototype {
        &self.argument
    }

    /// Number of subscribed handlers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Subscribes `handler`; it fires after all earlier subscribers.
    ///
    /// # Errors
    ///
    /// - [`InterfaceError::ObserverKindMismatch`] if the handler is not a
    ///   Void (Void event) or Write (Write event) command
    /// - [`InterfaceError::DuplicateObserver`] if already subscribed
    pub fn add_observer(&self, handler: Arc<Command>) -> Result<(), InterfaceError> {
        let expected = self.kind.handler_kind();
        if handler.kind() != expected {
            warn!(event = %self.name, handler = handler.name(), "Observer kind mismatch");
            return Err(InterfaceError::ObserverKindMismatch {
                event: self.name.clone(),
                expected,
                actual: handler.kind(),
            });
        }

        let mut observers = self.observers.write();
        if observers.iter().any(|o| Arc::ptr_eq(o, &handler)) {
            return Err(InterfaceError::DuplicateObserver {
                event: self.name.clone(),
                handler: handler.name().to_string(),
            });
        }
        debug!(event = %self.name, handler = handler.name(), "Observer added");
        observers.push(handler);
        Ok(())
    }

    /// Unsubscribes `handler`.
    ///
    /// # Errors
    ///
    /// [`InterfaceError::ObserverNotFound`] if it was never subscribed.
    pub fn remove_observer(&self, handler: &Arc<Command>) -> Result<(), InterfaceError> {
        let mut observers = self.observers.write();
        let Some(pos) = observers.iter().position(|o| Arc::ptr_eq(o, handler)) else {
            warn!(event = %self.name, handler = handler.name(), "Removing unknown observer");
            return Err(InterfaceError::ObserverNotFound {
                event: self.name.clone(),
                handler: handler.name().to_string(),
            });
        };
        observers.remove(pos);
        debug!(event = %self.name, handler = handler.name(), "Observer removed");
        Ok(())
    }

    /// Fires a Void event.
    ///
    /// A Write event needs a payload: no handler runs and every observer is
    /// reported failed with [`ExecError::ArgumentMismatch`]. Use
    /// [`fire_write`](Self::fire_write) instead.
    pub fn fire(&self) -> FireReport {
        match self.kind {
            EventKind::Void => self.fan_out(|handler| handler.execute_void().map(drop)),
            EventKind::Write => self.fan_out(|_| {
                Err(ExecError::ArgumentMismatch {
                    command: self.name.clone(),
                    expected: self.argument.type_name().to_string(),
                })
            }),
        }
    }

    /// Fires a Write event with `payload`.
    ///
    /// # Errors
    ///
    /// [`ExecError::ArgumentMismatch`] if `payload` does not match the
    /// event prototype; no handler runs in that case.
    pub fn fire_write(&self, payload: &Value) -> Result<FireReport, ExecError> {
        if self.kind != EventKind::Write || !self.argument.conforms(payload) {
            return Err(ExecError::ArgumentMismatch {
                command: self.name.clone(),
                expected: self.argument.type_name().to_string(),
            });
        }
        Ok(self.fan_out(|handler| handler.execute_write(payload.clone()).map(drop)))
    }

    fn fan_out(&self, deliver: impl Fn(&Command) -> Result<(), ExecError>) -> FireReport {
        let observers: Vec<Arc<Command>> = self.observers.read().clone();
        let mut report = FireReport::default();
        for handler in &observers {
            match deliver(handler.as_ref()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(event = %self.name, handler = handler.name(), error = %e, "Event delivery failed");
                    report.failed.push((handler.name().to_string(), e));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Callable;
    use crate::mailbox::Mailbox;
    use crate::testing::CallLog;
    use serde_json::json;

    fn void_handler(log: &CallLog, tag: &str) -> Arc<Command> {
        let log = log.clone();
        let tag = tag.to_string();
        Arc::new(Command::direct(
            "handler",
            Callable::void(move || log.record(tag.clone())),
            Prototype::unit(),
            Prototype::unit(),
        ))
    }

    #[test]
    fn zero_observers_is_noop() {
        let event = EventGenerator::void("Tick");
        assert_eq!(event.fire(), FireReport::default());
    }

    #[test]
    fn handlers_fire_in_subscription_order() {
        let log = CallLog::new();
        let event = EventGenerator::void("Tick");
        for tag in ["first", "second", "third"] {
            event.add_observer(void_handler(&log, tag)).expect("add");
        }

        let report = event.fire();
        assert_eq!(report.delivered, 3);
        assert_eq!(log.entries(), vec!["first", "second", "third"]);
    }

    #[test]
    fn remove_unknown_observer_fails() {
        let log = CallLog::new();
        let event = EventGenerator::void("Tick");
        let handler = void_handler(&log, "x");

        let err = event.remove_observer(&handler).expect_err("not subscribed");
        assert!(matches!(err, InterfaceError::ObserverNotFound { .. }));

        event.add_observer(Arc::clone(&handler)).expect("add");
        event.remove_observer(&handler).expect("remove");
        assert_eq!(event.observer_count(), 0);
    }

    #[test]
    fn duplicate_observer_rejected() {
        let event = EventGenerator::void("Tick");
        let handler = void_handler(&CallLog::new(), "x");
        event.add_observer(Arc::clone(&handler)).expect("add");
        let err = event.add_observer(handler).expect_err("duplicate");
        assert!(matches!(err, InterfaceError::DuplicateObserver { .. }));
    }

    #[test]
    fn write_event_requires_write_handler() {
        let event = EventGenerator::write("Moved", Prototype::of::<f64>());
        let err = event
            .add_observer(void_handler(&CallLog::new(), "x"))
            .expect_err("void handler on write event");
        assert!(matches!(err, InterfaceError::ObserverKindMismatch { .. }));
    }

    #[test]
    fn write_event_checks_payload() {
        let log = CallLog::new();
        let sink = log.clone();
        let event = EventGenerator::write("Moved", Prototype::of::<f64>());
        event
            .add_observer(Arc::new(Command::direct(
                "OnMoved",
                Callable::write("OnMoved", move |x: f64| sink.record(format!("{x}"))),
                Prototype::of::<f64>(),
                Prototype::unit(),
            )))
            .expect("add");

        assert!(event.fire_write(&json!("far")).is_err());
        assert!(log.is_empty());

        let report = event.fire_write(&json!(1.5)).expect("fires");
        assert_eq!(report.delivered, 1);
        assert_eq!(log.entries(), vec!["1.5"]);
    }

    #[test]
    fn write_event_refuses_payloadless_fire() {
        let log = CallLog::new();
        let sink = log.clone();
        let event = EventGenerator::write("Moved", Prototype::of::<f64>());
        event
            .add_observer(Arc::new(Command::direct(
                "OnMoved",
                Callable::write("OnMoved", move |x: f64| sink.record(format!("{x}"))),
                Prototype::of::<f64>(),
                Prototype::unit(),
            )))
            .expect("add");

        let report = event.fire();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "OnMoved");
        assert!(matches!(
            &report.failed[0].1,
            ExecError::ArgumentMismatch { command, expected } if command == "Moved" && expected == "f64"
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn full_handler_mailbox_does_not_stop_fanout() {
        let log = CallLog::new();
        let mailbox = Arc::new(Mailbox::new("requirer", 1));
        let queued = Arc::new(Command::queued(
            "OnTick",
            Callable::void(|| {}),
            Prototype::unit(),
            Prototype::unit(),
            &mailbox,
            1,
        ));
        let event = EventGenerator::void("Tick");
        event.add_observer(queued).expect("add");
        event.add_observer(void_handler(&log, "direct")).expect("add");

        assert!(event.fire().all_delivered());
        let report = event.fire();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(log.entries(), vec!["direct", "direct"]);
    }
}
