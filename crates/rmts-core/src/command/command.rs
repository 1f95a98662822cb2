//! The command object.

use super::{Callable, ExecError};
use crate::mailbox::{Mailbox, Ticket};
use rmts_types::{CommandKind, Prototype};
use serde_json::Value;
use std::sync::Arc;

/// How a command reaches its callable.
///
/// Decided once, at registration or clone time.
#[derive(Clone, Debug)]
pub enum Dispatch {
    /// Runs on the caller's thread.
    Direct,
    /// Registered as queued on an original (factory) interface. Not
    /// invocable until cloned into an end-user interface.
    Deferred,
    /// Appends to a private mailbox drained by the provider's thread.
    Queued(QueueBinding),
}

/// Mailbox (and argument ring, for writes) a queued command feeds.
#[derive(Clone, Debug)]
pub struct QueueBinding {
    mailbox: Arc<Mailbox>,
    argument_queue: Option<usize>,
}

impl QueueBinding {
    /// The mailbox this command enqueues into.
    #[must_use]
    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }
}

/// A named, bound operation of one [`CommandKind`].
///
/// Each kind has exactly one valid `execute_*` method; calling another
/// fails with [`ExecError::KindMismatch`]. Arguments are type-checked
/// against the registered prototype before anything is executed or
/// enqueued.
///
/// # Example
///
/// ```
/// use rmts_core::command::{Callable, Command};
/// use rmts_types::Prototype;
/// use serde_json::json;
///
/// let get = Command::direct(
///     "GetPosition",
///     Callable::read("GetPosition", || 1.5_f64),
///     Prototype::unit(),
///     Prototype::of::<f64>(),
/// );
/// assert_eq!(get.execute_read().expect("read"), json!(1.5));
/// assert!(get.execute_void().is_err());
/// ```
#[derive(Debug)]
pub struct Command {
    name: String,
    callable: Callable,
    argument: Prototype,
    result: Prototype,
    dispatch: Dispatch,
}

impl Command {
    /// Creates a command that runs on the caller's thread.
    #[must_use]
    pub fn direct(
        name: impl Into<String>,
        callable: Callable,
        argument: Prototype,
        result: Prototype,
    ) -> Self {
        Self::with_dispatch(name, callable, argument, result, Dispatch::Direct)
    }

    pub(crate) fn with_dispatch(
        name: impl Into<String>,
        callable: Callable,
        argument: Prototype,
        result: Prototype,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            name: name.into(),
            callable,
            argument,
            result,
            dispatch,
        }
    }

    /// Creates a command queued into `mailbox`.
    ///
    /// Write-shaped commands get their own argument ring of
    /// `argument_queue_size` slots in that mailbox.
    #[must_use]
    pub fn queued(
        name: impl Into<String>,
        callable: Callable,
        argument: Prototype,
        result: Prototype,
        mailbox: &Arc<Mailbox>,
        argument_queue_size: usize,
    ) -> Self {
        let argument_queue = callable
            .kind()
            .takes_argument()
            .then(|| mailbox.register_argument_queue(argument_queue_size));
        Self::with_dispatch(
            name,
            callable,
            argument,
            result,
            Dispatch::Queued(QueueBinding {
                mailbox: Arc::clone(mailbox),
                argument_queue,
            }),
        )
    }

    /// Deep copy of a deferred command bound to a caller's mailbox.
    ///
    /// Direct and already-queued commands are copied unchanged.
    pub(crate) fn bind_to(&self, mailbox: &Arc<Mailbox>, argument_queue_size: usize) -> Self {
        match self.dispatch {
            Dispatch::Deferred => Self::queued(
                self.name.clone(),
                self.callable.clone(),
                self.argument.clone(),
                self.result.clone(),
                mailbox,
                argument_queue_size,
            ),
            Dispatch::Direct | Dispatch::Queued(_) => Self::with_dispatch(
                self.name.clone(),
                self.callable.clone(),
                self.argument.clone(),
                self.result.clone(),
                self.dispatch.clone(),
            ),
        }
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invocation shape.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.callable.kind()
    }

    /// Argument schema.
    #[must_use]
    pub fn argument_prototype(&self) -> &Prototype {
        &self.argument
    }

    /// Result schema.
    #[must_use]
    pub fn result_prototype(&self) -> &Prototype {
        &self.result
    }

    /// How the command is dispatched.
    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Returns `true` if invocations go through a mailbox.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self.dispatch, Dispatch::Queued(_))
    }

    /// Returns `true` for queued commands of an original interface.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self.dispatch, Dispatch::Deferred)
    }

    /// Mailbox this command feeds, if queued.
    #[must_use]
    pub fn mailbox(&self) -> Option<&Arc<Mailbox>> {
        match &self.dispatch {
            Dispatch::Queued(binding) => Some(binding.mailbox()),
            Dispatch::Direct | Dispatch::Deferred => None,
        }
    }

    /// Invokes a Void command.
    pub fn execute_void(&self) -> Result<Ticket, ExecError> {
        self.expect_kind(CommandKind::Void)?;
        self.submit(Value::Null)
    }

    /// Invokes a Write command with `arg`.
    pub fn execute_write(&self, arg: Value) -> Result<Ticket, ExecError> {
        self.expect_kind(CommandKind::Write)?;
        self.check_argument(&arg)?;
        self.submit(arg)
    }

    /// Invokes a VoidReturn command; the result arrives on the ticket.
    pub fn execute_void_return(&self) -> Result<Ticket, ExecError> {
        self.expect_kind(CommandKind::VoidReturn)?;
        self.submit(Value::Null)
    }

    /// Invokes a WriteReturn command; the result arrives on the ticket.
    pub fn execute_write_return(&self, arg: Value) -> Result<Ticket, ExecError> {
        self.expect_kind(CommandKind::WriteReturn)?;
        self.check_argument(&arg)?;
        self.submit(arg)
    }

    /// Invokes a Read command on the caller's thread.
    pub fn execute_read(&self) -> Result<Value, ExecError> {
        self.expect_kind(CommandKind::Read)?;
        self.callable.invoke(&Value::Null)
    }

    /// Invokes a QualifiedRead command on the caller's thread.
    pub fn execute_qualified_read(&self, arg: &Value) -> Result<Value, ExecError> {
        self.expect_kind(CommandKind::QualifiedRead)?;
        self.check_argument(arg)?;
        self.callable.invoke(arg)
    }

    fn expect_kind(&self, expected: CommandKind) -> Result<(), ExecError> {
        let actual = self.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(ExecError::KindMismatch {
                command: self.name.clone(),
                expected,
                actual,
            })
        }
    }

    fn check_argument(&self, arg: &Value) -> Result<(), ExecError> {
        if self.argument.conforms(arg) {
            Ok(())
        } else {
            Err(ExecError::ArgumentMismatch {
                command: self.name.clone(),
                expected: self.argument.type_name().to_string(),
            })
        }
    }

    fn submit(&self, arg: Value) -> Result<Ticket, ExecError> {
        match &self.dispatch {
            Dispatch::Direct => {
                let value = self.callable.invoke(&arg)?;
                Ok(Ticket::completed(Ok(value)))
            }
            Dispatch::Deferred => Err(ExecError::CallableUnavailable {
                command: self.name.clone(),
            }),
            Dispatch::Queued(binding) => binding.mailbox.enqueue(
                &self.name,
                self.callable.clone(),
                binding.argument_queue.map(|queue| (queue, arg)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::EntryState;
    use crate::testing::CallLog;
    use serde_json::json;

    fn set_goal(log: &CallLog) -> Callable {
        let log = log.clone();
        Callable::write("SetGoal", move |x: f64| log.record(format!("goal {x}")))
    }

    #[test]
    fn direct_write_runs_immediately() {
        let log = CallLog::new();
        let cmd = Command::direct(
            "SetGoal",
            set_goal(&log),
            Prototype::of::<f64>(),
            Prototype::unit(),
        );

        let ticket = cmd.execute_write(json!(1.0)).expect("runs");
        assert_eq!(ticket.state(), EntryState::Done);
        assert_eq!(log.entries(), vec!["goal 1"]);
    }

    #[test]
    fn argument_checked_before_enqueue() {
        let log = CallLog::new();
        let mailbox = Arc::new(Mailbox::new("m", 4));
        let cmd = Command::queued(
            "SetGoal",
            set_goal(&log),
            Prototype::of::<f64>(),
            Prototype::unit(),
            &mailbox,
            4,
        );

        let err = cmd.execute_write(json!("north")).expect_err("mismatch");
        assert!(matches!(err, ExecError::ArgumentMismatch { .. }));
        assert!(mailbox.is_empty());
    }

    #[test]
    fn queued_write_waits_for_drain() {
        let log = CallLog::new();
        let mailbox = Arc::new(Mailbox::new("m", 4));
        let cmd = Command::queued(
            "SetGoal",
            set_goal(&log),
            Prototype::of::<f64>(),
            Prototype::unit(),
            &mailbox,
            4,
        );

        let ticket = cmd.execute_write(json!(2.0)).expect("enqueued");
        assert_eq!(ticket.state(), EntryState::Enqueued);
        assert!(log.is_empty());

        mailbox.drain();
        assert_eq!(ticket.state(), EntryState::Done);
        assert_eq!(log.entries(), vec!["goal 2"]);
    }

    #[test]
    fn queued_write_return_delivers_result() {
        let mailbox = Arc::new(Mailbox::new("m", 4));
        let cmd = Command::queued(
            "Double",
            Callable::write_return("Double", |x: f64| x * 2.0),
            Prototype::of::<f64>(),
            Prototype::of::<f64>(),
            &mailbox,
            4,
        );

        let ticket = cmd.execute_write_return(json!(4.0)).expect("enqueued");
        mailbox.drain();
        assert_eq!(ticket.try_result(), Some(Ok(json!(8.0))));
    }

    #[test]
    fn wrong_shape_is_kind_mismatch() {
        let cmd = Command::direct(
            "Stop",
            Callable::void(|| {}),
            Prototype::unit(),
            Prototype::unit(),
        );
        let err = cmd.execute_write(json!(1)).expect_err("not a write");
        assert_eq!(
            err,
            ExecError::KindMismatch {
                command: "Stop".into(),
                expected: CommandKind::Write,
                actual: CommandKind::Void,
            }
        );
    }

    #[test]
    fn deferred_command_is_unavailable() {
        let cmd = Command::with_dispatch(
            "Stop",
            Callable::void(|| {}),
            Prototype::unit(),
            Prototype::unit(),
            Dispatch::Deferred,
        );
        let err = cmd.execute_void().expect_err("factory command");
        assert!(matches!(err, ExecError::CallableUnavailable { .. }));
    }

    #[test]
    fn bind_to_gives_each_clone_its_own_ring() {
        let template = Command::with_dispatch(
            "SetGoal",
            set_goal(&CallLog::new()),
            Prototype::of::<f64>(),
            Prototype::unit(),
            Dispatch::Deferred,
        );
        let a = Arc::new(Mailbox::new("a", 4));
        let b = Arc::new(Mailbox::new("b", 4));
        let on_a = template.bind_to(&a, 2);
        let on_b = template.bind_to(&b, 2);

        on_a.execute_write(json!(1.0)).expect("a");
        on_a.execute_write(json!(2.0)).expect("a");
        on_b.execute_write(json!(3.0)).expect("b");
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert!(template.is_deferred());
        assert!(on_a.is_queued());
    }
}
