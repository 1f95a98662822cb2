//! Required interfaces: the caller side of a connection.
//!
//! A required interface lists the provider commands a component calls
//! ([`Function`]s) and the provider events it handles. Binding resolves
//! every function against a provider end-user interface and subscribes
//! every handler to the provider's events.
//!
//! Handlers registered as queued are deferred until [`RequiredInterface::seal`]
//! allocates the interface's own mailbox; from then on a firing only
//! enqueues, and the requiring component drains via
//! [`RequiredInterface::process_mailbox`].

use super::{Function, InterfaceError, ProvidedInterface, Requirement};
use crate::command::{Callable, Command, Dispatch};
use crate::config::DEFAULT_MAIL_BOX_SIZE;
use crate::mailbox::{Mailbox, PostQueuedHook};
use parking_lot::Mutex;
use rmts_types::{CommandKind, CommandQueueing, Prototype};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Handler {
    event: String,
    command: Arc<Command>,
}

struct Binding {
    provider: Arc<ProvidedInterface>,
    subscribed: Vec<(String, Arc<Command>)>,
}

/// Caller-side bundle of functions and event handlers.
pub struct RequiredInterface {
    name: String,
    component_queues: bool,
    functions: Vec<Arc<Function>>,
    handlers: Vec<Handler>,
    mailbox_size: usize,
    argument_queue_size: usize,
    sized_explicitly: bool,
    hooks: Vec<PostQueuedHook>,
    mailbox: Option<Arc<Mailbox>>,
    sealed: bool,
    binding: Mutex<Option<Binding>>,
}

impl RequiredInterface {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_queues: true,
            functions: Vec::new(),
            handlers: Vec::new(),
            mailbox_size: DEFAULT_MAIL_BOX_SIZE,
            argument_queue_size: DEFAULT_MAIL_BOX_SIZE,
            sized_explicitly: false,
            hooks: Vec::new(),
            mailbox: None,
            sealed: false,
            binding: Mutex::new(None),
        }
    }

    /// Sets whether handlers registered with `InterfacePolicy` are queued.
    #[must_use]
    pub fn with_component_default(mut self, queued: bool) -> Self {
        self.component_queues = queued;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_configurable(&self, name: &str) -> Result<(), InterfaceError> {
        if self.sealed {
            warn!(interface = %self.name, item = name, "Required interface is sealed; registration refused");
            return Err(InterfaceError::Sealed {
                interface: self.name.clone(),
            });
        }
        if name.is_empty() {
            return Err(InterfaceError::InvalidCommand {
                interface: self.name.clone(),
                name: String::new(),
                reason: "name must not be empty".into(),
            });
        }
        Ok(())
    }

    // === Functions ===

    /// Declares a function the provider must (or may) offer.
    ///
    /// # Errors
    ///
    /// [`InterfaceError::DuplicateFunction`] if `(name, kind)` is declared.
    pub fn add_function(
        &mut self,
        name: &str,
        kind: CommandKind,
        requirement: Requirement,
    ) -> Result<Arc<Function>, InterfaceError> {
        self.ensure_configurable(name)?;
        if self.function_of(kind, name).is_some() {
            return Err(InterfaceError::DuplicateFunction {
                interface: self.name.clone(),
                name: name.to_string(),
            });
        }
        let function = Arc::new(Function::new(name, kind, requirement));
        self.functions.push(Arc::clone(&function));
        debug!(interface = %self.name, function = name, %kind, ?requirement, "Function added");
        Ok(function)
    }

    /// First function named `name`, of any kind.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.iter().find(|f| f.name() == name).cloned()
    }

    /// Function of `kind` named `name`.
    #[must_use]
    pub fn function_of(&self, kind: CommandKind, name: &str) -> Option<Arc<Function>> {
        self.functions
            .iter()
            .find(|f| f.kind() == kind && f.name() == name)
            .cloned()
    }

    /// Declared functions, in declaration order.
    #[must_use]
    pub fn functions(&self) -> &[Arc<Function>] {
        &self.functions
    }

    // === Event handlers ===

    /// Handles the provider's Void event `event` with `f`.
    pub fn add_event_handler_void(
        &mut self,
        event: &str,
        f: impl Fn() + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError> {
        self.add_handler(event, Callable::void(f), Prototype::unit(), queueing)
    }

    /// Handles the provider's Write event `event` with `f`.
    pub fn add_event_handler_write<T>(
        &mut self,
        event: &str,
        f: impl Fn(T) + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.add_handler(event, Callable::write(event, f), Prototype::of::<T>(), queueing)
    }

    fn add_handler(
        &mut self,
        event: &str,
        callable: Callable,
        argument: Prototype,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError> {
        self.ensure_configurable(event)?;
        if self.handler(event).is_some() {
            return Err(InterfaceError::DuplicateFunction {
                interface: self.name.clone(),
                name: event.to_string(),
            });
        }
        let queued = match queueing {
            CommandQueueing::Queued => true,
            CommandQueueing::NotQueued => false,
            CommandQueueing::InterfacePolicy => self.component_queues,
        };
        let dispatch = if queued {
            Dispatch::Deferred
        } else {
            Dispatch::Direct
        };
        let command = Arc::new(Command::with_dispatch(
            event,
            callable,
            argument,
            Prototype::unit(),
            dispatch,
        ));
        self.handlers.push(Handler {
            event: event.to_string(),
            command: Arc::clone(&command),
        });
        debug!(interface = %self.name, event, queued, "Event handler added");
        Ok(command)
    }

    /// Handler command for `event`.
    #[must_use]
    pub fn handler(&self, event: &str) -> Option<Arc<Command>> {
        self.handlers
            .iter()
            .find(|h| h.event == event)
            .map(|h| Arc::clone(&h.command))
    }

    // === Mailbox ===

    /// Sets the handler mailbox capacity; effective at [`seal`](Self::seal).
    pub fn set_mailbox_size(&mut self, size: usize) {
        self.sized_explicitly = true;
        self.mailbox_size = size.max(1);
        self.argument_queue_size = self.argument_queue_size.min(self.mailbox_size);
    }

    pub(crate) fn apply_default_sizes(&mut self, mailbox: usize, argument_queue: usize) {
        if !self.sized_explicitly {
            self.mailbox_size = mailbox.max(1);
            self.argument_queue_size = argument_queue.max(1);
        }
    }

    /// Adds a hook run after every enqueue into the handler mailbox.
    pub fn add_post_queued_hook(&mut self, hook: PostQueuedHook) {
        self.hooks.push(hook);
    }

    /// Ends the configuration phase and binds queued handlers to this
    /// interface's own mailbox.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        self.sealed = true;
        if !self.handlers.iter().any(|h| h.command.is_deferred()) {
            return;
        }

        let hooks = self.hooks.clone();
        let hook: Option<PostQueuedHook> = (!hooks.is_empty())
            .then(|| Arc::new(move || hooks.iter().for_each(|hook| hook())) as PostQueuedHook);
        let mailbox = Arc::new(Mailbox::new(self.name.clone(), self.mailbox_size).with_hook(hook));
        for handler in &mut self.handlers {
            if handler.command.is_deferred() {
                handler.command = Arc::new(handler.command.bind_to(&mailbox, self.argument_queue_size));
            }
        }
        debug!(interface = %self.name, capacity = self.mailbox_size, "Handler mailbox allocated");
        self.mailbox = Some(mailbox);
    }

    /// The handler mailbox, once sealed with queued handlers.
    #[must_use]
    pub fn mailbox(&self) -> Option<&Arc<Mailbox>> {
        self.mailbox.as_ref()
    }

    /// Executes pending queued handler invocations.
    ///
    /// Must be called from the owning component's thread.
    pub fn process_mailbox(&self) -> usize {
        self.mailbox.as_ref().map_or(0, |mailbox| mailbox.drain())
    }

    // === Binding ===

    /// Name of the provider interface this is bound to.
    #[must_use]
    pub fn provider_name(&self) -> Option<String> {
        self.binding
            .lock()
            .as_ref()
            .map(|b| b.provider.name().to_string())
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// Binds every function and handler against `provider`.
    ///
    /// Nothing changes if any step fails. Handlers for events the provider
    /// does not offer are skipped. A previous binding is released first.
    ///
    /// # Errors
    ///
    /// - [`InterfaceError::FunctionNotFound`] if a Required function has no
    ///   command of the same kind and name in `provider`
    /// - observer errors from [`EventGenerator::add_observer`](crate::EventGenerator::add_observer)
    pub fn bind(&self, provider: &Arc<ProvidedInterface>) -> Result<(), InterfaceError> {
        if !self.sealed {
            warn!(interface = %self.name, "Binding an unsealed required interface; queued handlers stay unavailable");
        }
        self.unbind();

        let mut resolved = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            match provider.command(function.kind(), function.name()) {
                Ok(command) => resolved.push((Arc::clone(function), command)),
                Err(e) if function.requirement() == Requirement::Required => {
                    warn!(interface = %self.name, provider = %provider.name(), function = function.name(), error = %e, "Required function not provided");
                    return Err(InterfaceError::FunctionNotFound {
                        interface: self.name.clone(),
                        kind: function.kind(),
                        name: function.name().to_string(),
                    });
                }
                Err(_) => {
                    debug!(interface = %self.name, function = function.name(), "Optional function left unbound");
                }
            }
        }

        let mut subscribed: Vec<(String, Arc<Command>)> = Vec::new();
        for handler in &self.handlers {
            if provider.event(&handler.event).is_none() {
                debug!(interface = %self.name, event = %handler.event, "Provider has no such event; handler skipped");
                continue;
            }
            if let Err(e) = provider.add_observer(&handler.event, Arc::clone(&handler.command)) {
                for (event, command) in &subscribed {
                    let _ = provider.remove_observer(event, command);
                }
                return Err(e);
            }
            subscribed.push((handler.event.clone(), Arc::clone(&handler.command)));
        }

        for (function, command) in resolved {
            function.bind(command);
        }
        info!(
            interface = %self.name,
            provider = %provider.name(),
            functions = self.functions.iter().filter(|f| f.is_bound()).count(),
            handlers = subscribed.len(),
            "Required interface bound"
        );
        *self.binding.lock() = Some(Binding {
            provider: Arc::clone(provider),
            subscribed,
        });
        Ok(())
    }

    /// Releases the current binding, if any.
    pub fn unbind(&self) {
        let Some(binding) = self.binding.lock().take() else {
            return;
        };
        for (event, command) in &binding.subscribed {
            if let Err(e) = binding.provider.remove_observer(event, command) {
                debug!(interface = %self.name, error = %e, "Observer already gone");
            }
        }
        for function in &self.functions {
            function.unbind();
        }
        info!(interface = %self.name, provider = %binding.provider.name(), "Required interface unbound");
    }
}

impl std::fmt::Debug for RequiredInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequiredInterface")
            .field("name", &self.name)
            .field("functions", &self.functions)
            .field("handlers", &self.handlers.len())
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExecError;
    use crate::testing::CallLog;
    use rmts_types::InterfaceQueueing;
    use serde_json::json;

    fn provider(log: &CallLog) -> Arc<ProvidedInterface> {
        let mut robot = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        let sink = log.clone();
        robot
            .add_command_write(
                "SetGoal",
                move |x: f64| sink.record(format!("goal {x}")),
                CommandQueueing::InterfacePolicy,
            )
            .expect("SetGoal");
        robot
            .add_command_read("GetPosition", || 3.5_f64)
            .expect("GetPosition");
        robot.add_event_void("GoalReached").expect("event");
        robot.seal();
        Arc::new(robot)
    }

    #[test]
    fn bind_resolves_functions_against_clone() {
        let log = CallLog::new();
        let robot = provider(&log);
        let mut req = RequiredInterface::new("Robot");
        let set = req
            .add_function("SetGoal", CommandKind::Write, Requirement::Required)
            .expect("SetGoal");
        let get = req
            .add_function("GetPosition", CommandKind::Read, Requirement::Required)
            .expect("GetPosition");
        req.seal();

        let clone = robot.get_end_user_interface("Planner");
        req.bind(&clone).expect("bind");
        assert_eq!(req.provider_name().as_deref(), Some("RobotForPlanner"));

        set.execute_write(json!(1.0)).expect("enqueued");
        assert_eq!(get.execute_read().expect("read"), json!(3.5));
        assert_eq!(robot.process_mailboxes(), 1);
        assert_eq!(log.entries(), vec!["goal 1"]);
    }

    #[test]
    fn missing_required_function_fails_without_side_effects() {
        let robot = provider(&CallLog::new());
        let mut req = RequiredInterface::new("Robot");
        let get = req
            .add_function("GetPosition", CommandKind::Read, Requirement::Required)
            .expect("GetPosition");
        req.add_function("Fly", CommandKind::Void, Requirement::Required)
            .expect("Fly");
        req.seal();

        let err = req
            .bind(&robot.get_end_user_interface("Planner"))
            .expect_err("Fly missing");
        assert!(matches!(err, InterfaceError::FunctionNotFound { .. }));
        assert!(!get.is_bound());
        assert!(!req.is_bound());
    }

    #[test]
    fn optional_function_may_stay_unbound() {
        let robot = provider(&CallLog::new());
        let mut req = RequiredInterface::new("Robot");
        let fly = req
            .add_function("Fly", CommandKind::Void, Requirement::Optional)
            .expect("Fly");
        req.seal();
        req.bind(&robot.get_end_user_interface("Planner"))
            .expect("optional");
        assert!(matches!(
            fly.execute_void(),
            Err(ExecError::CallableUnavailable { .. })
        ));
    }

    #[test]
    fn queued_handler_runs_on_drain() {
        let log = CallLog::new();
        let robot = provider(&CallLog::new());
        let mut req = RequiredInterface::new("Robot");
        let sink = log.clone();
        req.add_event_handler_void(
            "GoalReached",
            move || sink.record("reached"),
            CommandQueueing::Queued,
        )
        .expect("handler");
        req.seal();
        req.bind(&robot.get_end_user_interface("Planner"))
            .expect("bind");

        let report = robot.event_void("GoalReached").expect("event").fire();
        assert_eq!(report.delivered, 1);
        assert!(log.is_empty());
        assert_eq!(req.process_mailbox(), 1);
        assert_eq!(log.entries(), vec!["reached"]);
    }

    #[test]
    fn unbind_unsubscribes_handlers() {
        let log = CallLog::new();
        let robot = provider(&CallLog::new());
        let mut req = RequiredInterface::new("Robot");
        let sink = log.clone();
        req.add_event_handler_void(
            "GoalReached",
            move || sink.record("reached"),
            CommandQueueing::NotQueued,
        )
        .expect("handler");
        req.seal();
        req.bind(&robot.get_end_user_interface("Planner"))
            .expect("bind");
        let event = robot.event_void("GoalReached").expect("event");
        assert_eq!(event.observer_count(), 1);

        req.unbind();
        assert_eq!(event.observer_count(), 0);
        assert_eq!(event.fire().delivered, 0);
        assert!(log.is_empty());
    }

    #[test]
    fn duplicate_function_rejected() {
        let mut req = RequiredInterface::new("Robot");
        req.add_function("Stop", CommandKind::Void, Requirement::Required)
            .expect("first");
        let err = req
            .add_function("Stop", CommandKind::Void, Requirement::Optional)
            .expect_err("duplicate");
        assert!(matches!(err, InterfaceError::DuplicateFunction { .. }));
        req.add_function("Stop", CommandKind::VoidReturn, Requirement::Optional)
            .expect("other kind");
    }
}
