//! Provided interfaces: named command registries and their end-user clones.
//!
//! # Factory and Clones
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │ original "Robot" (factory)   │  Read/QualifiedRead ─┐
//!                 │  Void/Write… : Deferred      │  events ─────────────┤ shared
//!                 └──────┬───────────────┬───────┘                      │
//!   get_end_user_interface("Planner")    get_end_user_interface("Ui")   │
//!                        ▼               ▼                              │
//!        ┌──────────────────────┐ ┌──────────────────────┐              │
//!        │ "RobotForPlanner"    │ │ "RobotForUi"         │ ◄────────────┘
//!        │  Void/Write… Queued  │ │  Void/Write… Queued  │
//!        │  mailbox (private)   │ │  mailbox (private)   │
//!        └──────────────────────┘ └──────────────────────┘
//!                  ▲                        ▲
//!                  └── process_mailboxes() on the provider's thread
//! ```
//!
//! An interface whose policy does not queue is its own end-user interface:
//! [`ProvidedInterface::get_end_user_interface`] returns it unchanged.
//!
//! # Configuration Phase
//!
//! Commands and events are added through `&mut self` while the owning
//! component is being built. Once sealed (when the component is added to
//! a manager) the maps never change; lookups need no locking. Only the
//! clone list and event observer lists are mutable afterwards.

use super::InterfaceError;
use crate::command::{Callable, Command, Dispatch};
use crate::config::DEFAULT_MAIL_BOX_SIZE;
use crate::event::EventGenerator;
use crate::mailbox::{Mailbox, PostQueuedHook};
use parking_lot::Mutex;
use rmts_types::{
    CommandKind, CommandQueueing, EventKind, InterfaceId, InterfaceQueueing, Prototype,
    QueueingDecision,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type CommandMap = BTreeMap<String, Arc<Command>>;
type EventMap = BTreeMap<String, Arc<EventGenerator>>;

const fn slot(kind: CommandKind) -> usize {
    kind as usize
}

enum Origin {
    Original,
    EndUser {
        original: String,
        user: String,
        serial: u64,
        mailbox: Arc<Mailbox>,
    },
}

#[derive(Default)]
struct EndUsers {
    counter: u64,
    clones: Vec<Arc<ProvidedInterface>>,
}

/// A named bundle of commands and events exposed by a component.
///
/// # Example
///
/// ```
/// use rmts_core::ProvidedInterface;
/// use rmts_types::{CommandQueueing, InterfaceQueueing};
/// use std::sync::Arc;
///
/// let mut robot = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
/// robot
///     .add_command_write("SetGoal", |_goal: f64| {}, CommandQueueing::InterfacePolicy)
///     .expect("first registration");
/// assert!(robot
///     .add_command_write("SetGoal", |_goal: f64| {}, CommandQueueing::InterfacePolicy)
///     .is_err());
///
/// let robot = Arc::new(robot);
/// let planner = robot.get_end_user_interface("Planner");
/// assert_eq!(planner.name(), "RobotForPlanner");
/// assert!(planner.command_write("SetGoal").is_ok());
/// assert!(robot.command_write("SetGoal").is_err()); // factory
/// ```
pub struct ProvidedInterface {
    name: String,
    id: Option<InterfaceId>,
    policy: InterfaceQueueing,
    component_queues: bool,
    commands: [CommandMap; 6],
    internal: CommandMap,
    events_void: EventMap,
    events_write: EventMap,
    mailbox_size: usize,
    argument_queue_size: usize,
    sized_explicitly: bool,
    hooks: Vec<PostQueuedHook>,
    sealed: bool,
    origin: Origin,
    end_users: Mutex<EndUsers>,
}

impl ProvidedInterface {
    /// Creates an empty original interface.
    ///
    /// Under [`InterfaceQueueing::ComponentPolicy`] commands queue unless
    /// [`with_component_default`](Self::with_component_default) says the
    /// owner is a passive device.
    #[must_use]
    pub fn new(name: impl Into<String>, policy: InterfaceQueueing) -> Self {
        Self {
            name: name.into(),
            id: None,
            policy,
            component_queues: true,
            commands: std::array::from_fn(|_| CommandMap::new()),
            internal: CommandMap::new(),
            events_void: EventMap::new(),
            events_write: EventMap::new(),
            mailbox_size: DEFAULT_MAIL_BOX_SIZE,
            argument_queue_size: DEFAULT_MAIL_BOX_SIZE,
            sized_explicitly: false,
            hooks: Vec::new(),
            sealed: false,
            origin: Origin::Original,
            end_users: Mutex::new(EndUsers::default()),
        }
    }

    /// Sets the owning component's default for `ComponentPolicy` commands.
    #[must_use]
    pub fn with_component_default(mut self, queued: bool) -> Self {
        self.component_queues = queued;
        self
    }

    // === Identity ===

    /// Interface name (`"{original}For{user}"` on clones).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arena address, once the owning component is registered.
    #[must_use]
    pub const fn id(&self) -> Option<InterfaceId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: InterfaceId) {
        self.id = Some(id);
    }

    /// Declared queueing policy.
    #[must_use]
    pub const fn policy(&self) -> InterfaceQueueing {
        self.policy
    }

    /// Returns `true` for clones and for originals that never queue.
    #[must_use]
    pub fn is_end_user(&self) -> bool {
        match self.origin {
            Origin::EndUser { .. } => true,
            Origin::Original => !self.queues_commands(),
        }
    }

    /// Returns `true` for clones created by
    /// [`get_end_user_interface`](Self::get_end_user_interface).
    #[must_use]
    pub const fn is_clone(&self) -> bool {
        matches!(self.origin, Origin::EndUser { .. })
    }

    /// Original interface name (own name on originals).
    #[must_use]
    pub fn original_name(&self) -> &str {
        match &self.origin {
            Origin::Original => &self.name,
            Origin::EndUser { original, .. } => original,
        }
    }

    /// Caller this clone was created for.
    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        match &self.origin {
            Origin::Original => None,
            Origin::EndUser { user, .. } => Some(user),
        }
    }

    /// Position of this clone in its original's creation sequence.
    #[must_use]
    pub const fn serial(&self) -> Option<u64> {
        match &self.origin {
            Origin::Original => None,
            Origin::EndUser { serial, .. } => Some(*serial),
        }
    }

    /// The private mailbox of a clone.
    #[must_use]
    pub fn mailbox(&self) -> Option<&Arc<Mailbox>> {
        match &self.origin {
            Origin::Original => None,
            Origin::EndUser { mailbox, .. } => Some(mailbox),
        }
    }

    fn queues_commands(&self) -> bool {
        self.policy == InterfaceQueueing::Queued || self.all_commands().any(|c| c.is_deferred())
    }

    // === Configuration ===

    /// Returns `true` once the configuration phase is over.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Ends the configuration phase.
    pub fn seal(&mut self) {
        if !self.sealed {
            debug!(interface = %self.name, commands = self.all_commands().count(), "Interface sealed");
        }
        self.sealed = true;
    }

    /// Sets the mailbox capacity of clones created from now on.
    pub fn set_mailbox_size(&mut self, size: usize) {
        self.sized_explicitly = true;
        self.mailbox_size = size.max(1);
        self.check_sizes();
    }

    /// Sets the argument ring capacity of clones created from now on.
    pub fn set_argument_queue_size(&mut self, size: usize) {
        self.sized_explicitly = true;
        self.argument_queue_size = size.max(1);
        self.check_sizes();
    }

    /// Sets both capacities at once.
    pub fn set_mailbox_and_argument_queues_size(&mut self, size: usize) {
        self.sized_explicitly = true;
        self.mailbox_size = size.max(1);
        self.argument_queue_size = size.max(1);
        self.check_sizes();
    }

    /// Current `(mailbox, argument queue)` capacities for new clones.
    #[must_use]
    pub const fn queue_sizes(&self) -> (usize, usize) {
        (self.mailbox_size, self.argument_queue_size)
    }

    pub(crate) fn apply_default_sizes(&mut self, mailbox: usize, argument_queue: usize) {
        if !self.sized_explicitly {
            self.mailbox_size = mailbox.max(1);
            self.argument_queue_size = argument_queue.max(1);
        }
    }

    fn check_sizes(&self) {
        if !self.queues_commands() {
            warn!(interface = %self.name, "Interface does not queue commands; mailbox size has no effect");
        }
        if self.argument_queue_size > self.mailbox_size {
            warn!(
                interface = %self.name,
                mailbox = self.mailbox_size,
                argument_queue = self.argument_queue_size,
                "Argument queue larger than mailbox; extra slots are never used"
            );
        }
    }

    /// Adds a hook run after every successful enqueue on any clone.
    pub fn add_post_queued_hook(&mut self, hook: PostQueuedHook) {
        self.hooks.push(hook);
    }

    fn combined_hook(&self) -> Option<PostQueuedHook> {
        match self.hooks.as_slice() {
            [] => None,
            [single] => Some(Arc::clone(single)),
            many => {
                let hooks = many.to_vec();
                Some(Arc::new(move || hooks.iter().for_each(|hook| hook())))
            }
        }
    }

    fn ensure_configurable(&self, name: &str) -> Result<(), InterfaceError> {
        if self.sealed {
            error_sealed(&self.name, name);
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

    // === Command registration ===

    /// Registers a command of `callable.kind()` under `name`.
    ///
    /// All typed `add_command_*` helpers funnel into this.
    ///
    /// # Errors
    ///
    /// - [`InterfaceError::Sealed`] after the configuration phase
    /// - [`InterfaceError::DuplicateCommand`] if `name` exists for the kind
    /// - [`InterfaceError::InvalidCommand`] for an empty name or a prototype
    ///   that contradicts the callable's shape
    pub fn add_command(
        &mut self,
        name: &str,
        callable: Callable,
        argument: Prototype,
        result: Prototype,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError> {
        self.ensure_configurable(name)?;
        let kind = callable.kind();

        if !kind.takes_argument() && argument != Prototype::unit() {
            return Err(self.invalid(name, "argument prototype given for an argument-less kind"));
        }
        if !kind.returns_value() && result != Prototype::unit() {
            return Err(self.invalid(name, "result prototype given for a kind without result"));
        }
        if self.commands[slot(kind)].contains_key(name) {
            warn!(interface = %self.name, command = name, %kind, "Duplicate command name");
            return Err(InterfaceError::DuplicateCommand {
                interface: self.name.clone(),
                kind,
                name: name.to_string(),
            });
        }

        let dispatch = self.resolve_dispatch(name, kind, queueing);
        let command = Arc::new(Command::with_dispatch(
            name, callable, argument, result, dispatch,
        ));
        self.commands[slot(kind)].insert(name.to_string(), Arc::clone(&command));
        debug!(interface = %self.name, command = name, %kind, queued = command.is_deferred(), "Command added");
        Ok(command)
    }

    /// Registers a Void command.
    pub fn add_command_void(
        &mut self,
        name: &str,
        f: impl Fn() + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError> {
        self.add_command(
            name,
            Callable::void(f),
            Prototype::unit(),
            Prototype::unit(),
            queueing,
        )
    }

    /// Registers a VoidReturn command.
    pub fn add_command_void_return<R>(
        &mut self,
        name: &str,
        f: impl Fn() -> R + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        R: Serialize + DeserializeOwned + Default,
    {
        self.add_command(
            name,
            Callable::void_return(name, f),
            Prototype::unit(),
            Prototype::of::<R>(),
            queueing,
        )
    }

    /// Registers a Write command.
    pub fn add_command_write<A>(
        &mut self,
        name: &str,
        f: impl Fn(A) + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        A: Serialize + DeserializeOwned + Default,
    {
        self.add_command(
            name,
            Callable::write(name, f),
            Prototype::of::<A>(),
            Prototype::unit(),
            queueing,
        )
    }

    /// Registers a WriteReturn command.
    pub fn add_command_write_return<A, R>(
        &mut self,
        name: &str,
        f: impl Fn(A) -> R + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        A: Serialize + DeserializeOwned + Default,
        R: Serialize + DeserializeOwned + Default,
    {
        self.add_command(
            name,
            Callable::write_return(name, f),
            Prototype::of::<A>(),
            Prototype::of::<R>(),
            queueing,
        )
    }

    /// Registers a Read command. Reads always run on the caller's thread.
    pub fn add_command_read<R>(
        &mut self,
        name: &str,
        f: impl Fn() -> R + Send + Sync + 'static,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        R: Serialize + DeserializeOwned + Default,
    {
        self.add_command(
            name,
            Callable::read(name, f),
            Prototype::unit(),
            Prototype::of::<R>(),
            CommandQueueing::InterfacePolicy,
        )
    }

    /// Registers a QualifiedRead command.
    pub fn add_command_qualified_read<A, R>(
        &mut self,
        name: &str,
        f: impl Fn(A) -> R + Send + Sync + 'static,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        A: Serialize + DeserializeOwned + Default,
        R: Serialize + DeserializeOwned + Default,
    {
        self.add_command(
            name,
            Callable::qualified_read(name, f),
            Prototype::of::<A>(),
            Prototype::of::<R>(),
            CommandQueueing::InterfacePolicy,
        )
    }

    /// Registers a filtered write under `name`.
    ///
    /// The filter is stored in the internal map under `name` and the
    /// target under `"{name}Write"`; the composite Write command is
    /// registered under `name`. Any failure leaves no trace.
    pub fn add_command_filtered_write<Raw, Validated>(
        &mut self,
        name: &str,
        filter: impl Fn(Raw) -> Option<Validated> + Send + Sync + 'static,
        target: impl Fn(Validated) + Send + Sync + 'static,
        queueing: CommandQueueing,
    ) -> Result<Arc<Command>, InterfaceError>
    where
        Raw: Serialize + DeserializeOwned + Default,
        Validated: Serialize + DeserializeOwned + Default,
    {
        self.ensure_configurable(name)?;
        let target_name = format!("{name}Write");
        for (key, kind) in [
            (name, CommandKind::QualifiedRead),
            (target_name.as_str(), CommandKind::Write),
        ] {
            if self.internal.contains_key(key) {
                return Err(InterfaceError::DuplicateCommand {
                    interface: self.name.clone(),
                    kind,
                    name: key.to_string(),
                });
            }
        }

        let filter = Callable::filter(name, filter);
        let target = Callable::write(&target_name, target);
        let Some(composite) = Callable::filtered_write(&filter, &target) else {
            return Err(self.invalid(name, "filter and target shapes do not compose"));
        };

        self.internal.insert(
            name.to_string(),
            Arc::new(Command::direct(
                name,
                filter,
                Prototype::of::<Raw>(),
                Prototype::of::<Validated>(),
            )),
        );
        self.internal.insert(
            target_name.clone(),
            Arc::new(Command::direct(
                target_name.clone(),
                target,
                Prototype::of::<Validated>(),
                Prototype::unit(),
            )),
        );

        match self.add_command(
            name,
            composite,
            Prototype::of::<Raw>(),
            Prototype::unit(),
            queueing,
        ) {
            Ok(command) => Ok(command),
            Err(e) => {
                self.internal.remove(name);
                self.internal.remove(&target_name);
                Err(e)
            }
        }
    }

    /// Decides how a newly registered command is dispatched.
    ///
    /// Explicit requests win under `ComponentPolicy`; a request that
    /// contradicts a fixed policy is refused with a warning and the
    /// interface policy applies.
    fn resolve_dispatch(&self, name: &str, kind: CommandKind, request: CommandQueueing) -> Dispatch {
        if !kind.is_queueable() {
            if request == CommandQueueing::Queued {
                warn!(interface = %self.name, command = name, %kind, "Reads always run on the caller's thread; queueing request ignored");
            }
            return Dispatch::Direct;
        }

        let decision = self.policy.resolve(request, self.component_queues);
        match decision {
            QueueingDecision::Rejected { queued } => warn!(
                interface = %self.name,
                command = name,
                requested = ?request,
                policy = ?self.policy,
                queued,
                "Queueing request conflicts with interface policy; interface policy applies"
            ),
            QueueingDecision::Redundant { .. } => debug!(
                interface = %self.name,
                command = name,
                "Queueing request repeats interface policy"
            ),
            QueueingDecision::Accepted { .. } => {}
        }

        if decision.queued() {
            Dispatch::Deferred
        } else {
            Dispatch::Direct
        }
    }

    fn invalid(&self, name: &str, reason: &str) -> InterfaceError {
        warn!(interface = %self.name, command = name, reason, "Invalid command");
        InterfaceError::InvalidCommand {
            interface: self.name.clone(),
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    // === Events ===

    /// Registers a Void event.
    ///
    /// # Errors
    ///
    /// Fails if sealed, if `name` is a Void event already, or if `name` is
    /// taken by a Write event.
    pub fn add_event_void(&mut self, name: &str) -> Result<Arc<EventGenerator>, InterfaceError> {
        self.add_event(EventGenerator::void(name))
    }

    /// Registers a Write event carrying `T`.
    pub fn add_event_write<T>(&mut self, name: &str) -> Result<Arc<EventGenerator>, InterfaceError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.add_event(EventGenerator::write(name, Prototype::of::<T>()))
    }

    fn add_event(&mut self, event: EventGenerator) -> Result<Arc<EventGenerator>, InterfaceError> {
        let name = event.name().to_string();
        self.ensure_configurable(&name)?;
        let kind = event.kind();
        let (same, opposite, opposite_kind) = match kind {
            EventKind::Void => (&self.events_void, &self.events_write, EventKind::Write),
            EventKind::Write => (&self.events_write, &self.events_void, EventKind::Void),
        };
        if same.contains_key(&name) {
            warn!(interface = %self.name, event = %name, %kind, "Duplicate event name");
            return Err(InterfaceError::DuplicateEvent {
                interface: self.name.clone(),
                kind,
                name,
            });
        }
        if opposite.contains_key(&name) {
            warn!(interface = %self.name, event = %name, existing = %opposite_kind, "Event name taken by the other kind");
            return Err(InterfaceError::OppositeEventKind {
                interface: self.name.clone(),
                name,
                existing: opposite_kind,
            });
        }

        let event = Arc::new(event);
        let map = match kind {
            EventKind::Void => &mut self.events_void,
            EventKind::Write => &mut self.events_write,
        };
        map.insert(name.clone(), Arc::clone(&event));
        debug!(interface = %self.name, event = %name, %kind, "Event added");
        Ok(event)
    }

    /// Void event by name.
    #[must_use]
    pub fn event_void(&self, name: &str) -> Option<Arc<EventGenerator>> {
        self.events_void.get(name).cloned()
    }

    /// Write event by name.
    #[must_use]
    pub fn event_write(&self, name: &str) -> Option<Arc<EventGenerator>> {
        self.events_write.get(name).cloned()
    }

    /// Event of either kind by name.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<Arc<EventGenerator>> {
        self.event_void(name).or_else(|| self.event_write(name))
    }

    /// All events, Void first.
    pub fn events(&self) -> impl Iterator<Item = &Arc<EventGenerator>> {
        self.events_void.values().chain(self.events_write.values())
    }

    /// Subscribes `handler` to event `event_name`.
    pub fn add_observer(&self, event_name: &str, handler: Arc<Command>) -> Result<(), InterfaceError> {
        self.lookup_event(event_name)?.add_observer(handler)
    }

    /// Unsubscribes `handler` from event `event_name`.
    pub fn remove_observer(
        &self,
        event_name: &str,
        handler: &Arc<Command>,
    ) -> Result<(), InterfaceError> {
        self.lookup_event(event_name)?.remove_observer(handler)
    }

    fn lookup_event(&self, name: &str) -> Result<Arc<EventGenerator>, InterfaceError> {
        self.event(name).ok_or_else(|| {
            warn!(interface = %self.name, event = name, "Unknown event");
            InterfaceError::EventNotFound {
                interface: self.name.clone(),
                name: name.to_string(),
            }
        })
    }

    // === Lookup ===

    /// Command of `kind` named `name`.
    ///
    /// # Errors
    ///
    /// - [`InterfaceError::NotEndUser`] for queueable kinds on a factory
    /// - [`InterfaceError::CommandNotFound`] for unknown names
    pub fn command(&self, kind: CommandKind, name: &str) -> Result<Arc<Command>, InterfaceError> {
        if kind.is_queueable() && !self.is_end_user() {
            warn!(interface = %self.name, command = name, %kind, "Queueable command requested from factory interface");
            return Err(InterfaceError::NotEndUser {
                interface: self.name.clone(),
                name: name.to_string(),
            });
        }
        self.commands[slot(kind)].get(name).cloned().ok_or_else(|| {
            debug!(interface = %self.name, command = name, %kind, "Unknown command");
            InterfaceError::CommandNotFound {
                interface: self.name.clone(),
                kind,
                name: name.to_string(),
            }
        })
    }

    /// Void command lookup.
    pub fn command_void(&self, name: &str) -> Result<Arc<Command>, InterfaceError> {
        self.command(CommandKind::Void, name)
    }

    /// VoidReturn command lookup.
    pub fn command_void_return(&self, name: &str) -> Result<Arc<Command>, InterfaceError> {
        self.command(CommandKind::VoidReturn, name)
    }

    /// Write command lookup.
    pub fn command_write(&self, name: &str) -> Result<Arc<Command>, InterfaceError> {
        self.command(CommandKind::Write, name)
    }

    /// WriteReturn command lookup.
    pub fn command_write_return(&self, name: &str) -> Result<Arc<Command>, InterfaceError> {
        self.command(CommandKind::WriteReturn, name)
    }

    /// Read command lookup.
    pub fn command_read(&self, name: &str) -> Result<Arc<Command>, InterfaceError> {
        self.command(CommandKind::Read, name)
    }

    /// QualifiedRead command lookup.
    pub fn command_qualified_read(&self, name: &str) -> Result<Arc<Command>, InterfaceError> {
        self.command(CommandKind::QualifiedRead, name)
    }

    /// Filter helper or filter target from the internal map.
    #[must_use]
    pub fn internal_command(&self, name: &str) -> Option<Arc<Command>> {
        self.internal.get(name).cloned()
    }

    /// Every registered command, grouped by kind.
    pub fn all_commands(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.iter().flat_map(BTreeMap::values)
    }

    /// Names of every command, grouped by kind.
    #[must_use]
    pub fn names_of_commands(&self) -> Vec<String> {
        self.commands.iter().flat_map(BTreeMap::keys).cloned().collect()
    }

    /// Names of the commands of one kind, sorted.
    #[must_use]
    pub fn names_of(&self, kind: CommandKind) -> Vec<String> {
        self.commands[slot(kind)].keys().cloned().collect()
    }

    /// Names of Void events, sorted.
    #[must_use]
    pub fn names_of_events_void(&self) -> Vec<String> {
        self.events_void.keys().cloned().collect()
    }

    /// Names of Write events, sorted.
    #[must_use]
    pub fn names_of_events_write(&self) -> Vec<String> {
        self.events_write.keys().cloned().collect()
    }

    // === End-user clones ===

    /// Returns a private end-user interface for `user`.
    ///
    /// On an interface that is already an end-user interface (a clone, or
    /// an original that never queues) this returns `self`. Otherwise every
    /// call allocates a new clone, named `"{original}For{user}"`, even for
    /// a repeated `user`.
    pub fn get_end_user_interface(self: &Arc<Self>, user: &str) -> Arc<Self> {
        if self.is_end_user() {
            debug!(interface = %self.name, user, "Interface is its own end-user interface");
            return Arc::clone(self);
        }

        let mut end_users = self.end_users.lock();
        end_users.counter += 1;
        let serial = end_users.counter;
        let clone_name = format!("{}For{}", self.name, user);

        let mailbox = Arc::new(
            Mailbox::new(clone_name.clone(), self.mailbox_size).with_hook(self.combined_hook()),
        );
        let commands: [CommandMap; 6] = std::array::from_fn(|i| {
            self.commands[i]
                .iter()
                .map(|(name, command)| {
                    let command = if command.is_deferred() {
                        Arc::new(command.bind_to(&mailbox, self.argument_queue_size))
                    } else {
                        Arc::clone(command)
                    };
                    (name.clone(), command)
                })
                .collect()
        });

        let clone = Arc::new(Self {
            name: clone_name,
            id: self.id,
            policy: self.policy,
            component_queues: self.component_queues,
            commands,
            internal: self.internal.clone(),
            events_void: self.events_void.clone(),
            events_write: self.events_write.clone(),
            mailbox_size: self.mailbox_size,
            argument_queue_size: self.argument_queue_size,
            sized_explicitly: self.sized_explicitly,
            hooks: self.hooks.clone(),
            sealed: true,
            origin: Origin::EndUser {
                original: self.name.clone(),
                user: user.to_string(),
                serial,
                mailbox,
            },
            end_users: Mutex::new(EndUsers::default()),
        });
        end_users.clones.push(Arc::clone(&clone));
        info!(
            interface = %self.name,
            end_user = %clone.name,
            serial,
            mailbox_size = self.mailbox_size,
            "Created end-user interface"
        );
        clone
    }

    /// Detaches `clone` and closes its mailbox.
    ///
    /// Returns the number of pending entries that were abandoned. The clone
    /// itself is freed once the last holder (for example a drain pass in
    /// progress) drops it.
    ///
    /// # Errors
    ///
    /// [`InterfaceError::NotAClone`] unless `clone` was created by this
    /// interface and is still attached.
    pub fn remove_end_user_interface(&self, clone: &Arc<Self>) -> Result<usize, InterfaceError> {
        let not_a_clone = || {
            warn!(interface = %self.name, candidate = %clone.name, "Not an end-user interface of this interface");
            InterfaceError::NotAClone {
                interface: self.name.clone(),
                candidate: clone.name.clone(),
            }
        };
        if !clone.is_clone() {
            return Err(not_a_clone());
        }

        let removed = {
            let mut end_users = self.end_users.lock();
            let pos = end_users
                .clones
                .iter()
                .position(|c| Arc::ptr_eq(c, clone))
                .ok_or_else(not_a_clone)?;
            end_users.clones.remove(pos)
        };

        let abandoned = removed.mailbox().map_or(0, |mailbox| mailbox.close());
        info!(interface = %self.name, end_user = %removed.name, abandoned, "Removed end-user interface");
        Ok(abandoned)
    }

    /// First live end-user interface created for `user`.
    ///
    /// An original that is its own end-user interface returns itself.
    #[must_use]
    pub fn find_end_user_interface(self: &Arc<Self>, user: &str) -> Option<Arc<Self>> {
        if !self.is_clone() && self.is_end_user() {
            return Some(Arc::clone(self));
        }
        let wanted = format!("{}For{}", self.name, user);
        self.end_users
            .lock()
            .clones
            .iter()
            .find(|c| c.name == wanted)
            .cloned()
    }

    /// Live clones, in creation order.
    #[must_use]
    pub fn end_user_interfaces(&self) -> Vec<Arc<Self>> {
        self.end_users.lock().clones.clone()
    }

    /// Executes every pending entry of every clone.
    ///
    /// Must be called from the owning component's thread. Clones are
    /// visited in creation order; each clone's mailbox is drained in FIFO
    /// order before the next is visited. On a clone, drains its own
    /// mailbox. Returns the number of entries executed.
    pub fn process_mailboxes(&self) -> usize {
        if let Some(mailbox) = self.mailbox() {
            return mailbox.drain();
        }
        let snapshot = self.end_user_interfaces();
        snapshot
            .iter()
            .filter_map(|clone| clone.mailbox())
            .map(|mailbox| mailbox.drain())
            .sum()
    }
}

fn error_sealed(interface: &str, name: &str) {
    warn!(interface, item = name, "Interface is sealed; registration refused");
}

impl std::fmt::Debug for ProvidedInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidedInterface")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("commands", &self.names_of_commands())
            .field("end_user", &self.is_end_user())
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExecError;
    use crate::mailbox::EntryState;
    use crate::testing::CallLog;
    use serde_json::json;

    fn robot(policy: InterfaceQueueing, log: &CallLog) -> ProvidedInterface {
        let mut iface = ProvidedInterface::new("Robot", policy);
        let sink = log.clone();
        iface
            .add_command_write(
                "SetGoal",
                move |x: f64| sink.record(format!("goal {x}")),
                CommandQueueing::InterfacePolicy,
            )
            .expect("SetGoal");
        iface
            .add_command_read("GetPosition", || 0.5_f64)
            .expect("GetPosition");
        iface
    }

    // === Registration ===

    #[test]
    fn duplicate_name_fails_and_keeps_first() {
        let log = CallLog::new();
        let mut iface = robot(InterfaceQueueing::NotQueued, &log);
        let err = iface
            .add_command_write("SetGoal", |_: f64| {}, CommandQueueing::InterfacePolicy)
            .expect_err("duplicate");
        assert!(matches!(err, InterfaceError::DuplicateCommand { .. }));

        iface
            .command_write("SetGoal")
            .expect("first still registered")
            .execute_write(json!(1.0))
            .expect("runs");
        assert_eq!(log.entries(), vec!["goal 1"]);
    }

    #[test]
    fn same_name_different_kind_is_allowed() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::NotQueued);
        iface
            .add_command_read("Position", || 1.0_f64)
            .expect("read");
        iface
            .add_command_write("Position", |_: f64| {}, CommandQueueing::InterfacePolicy)
            .expect("write with same name");
        assert_eq!(iface.names_of_commands().len(), 2);
    }

    #[test]
    fn sealed_interface_refuses_registration() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        iface.seal();
        let err = iface
            .add_command_void("Stop", || {}, CommandQueueing::InterfacePolicy)
            .expect_err("sealed");
        assert_eq!(
            err,
            InterfaceError::Sealed {
                interface: "Robot".into()
            }
        );
        assert!(iface.add_event_void("Stopped").is_err());
    }

    #[test]
    fn empty_name_is_invalid() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        let err = iface
            .add_command_void("", || {}, CommandQueueing::InterfacePolicy)
            .expect_err("empty");
        assert!(matches!(err, InterfaceError::InvalidCommand { .. }));
    }

    #[test]
    fn prototype_must_match_shape() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        let err = iface
            .add_command(
                "Stop",
                Callable::void(|| {}),
                Prototype::of::<f64>(),
                Prototype::unit(),
                CommandQueueing::InterfacePolicy,
            )
            .expect_err("void with argument prototype");
        assert!(matches!(err, InterfaceError::InvalidCommand { .. }));
    }

    // === Queueing policy ===

    #[test]
    fn fixed_policy_prevails_over_conflicting_request() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::NotQueued);
        let cmd = iface
            .add_command_void("Stop", || {}, CommandQueueing::Queued)
            .expect("registered with interface policy");
        assert!(!cmd.is_deferred());

        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        let cmd = iface
            .add_command_void("Stop", || {}, CommandQueueing::NotQueued)
            .expect("registered with interface policy");
        assert!(cmd.is_deferred());
    }

    #[test]
    fn component_policy_honours_explicit_request() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::ComponentPolicy)
            .with_component_default(false);
        let direct = iface
            .add_command_void("A", || {}, CommandQueueing::InterfacePolicy)
            .expect("A");
        let queued = iface
            .add_command_void("B", || {}, CommandQueueing::Queued)
            .expect("B");
        assert!(!direct.is_deferred());
        assert!(queued.is_deferred());
        assert!(!iface.is_end_user(), "one queued command makes it a factory");
    }

    // === Filtered write ===

    #[test]
    fn filtered_write_populates_internal_map() {
        let log = CallLog::new();
        let sink = log.clone();
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::NotQueued);
        iface
            .add_command_filtered_write(
                "SetSpeed",
                |raw: f64| (raw >= 0.0).then_some(raw.min(2.0)),
                move |v: f64| sink.record(format!("{v}")),
                CommandQueueing::InterfacePolicy,
            )
            .expect("filtered write");

        assert!(iface.internal_command("SetSpeed").is_some());
        assert!(iface.internal_command("SetSpeedWrite").is_some());

        let cmd = iface.command_write("SetSpeed").expect("composite");
        cmd.execute_write(json!(5.0)).expect("accepted");
        let err = cmd.execute_write(json!(-1.0)).expect_err("rejected");
        assert!(matches!(err, ExecError::FilterRejected { .. }));
        assert_eq!(log.entries(), vec!["2"]);
    }

    #[test]
    fn filtered_write_rolls_back_on_duplicate() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::NotQueued);
        iface
            .add_command_write("SetSpeed", |_: f64| {}, CommandQueueing::InterfacePolicy)
            .expect("plain write");

        let err = iface
            .add_command_filtered_write(
                "SetSpeed",
                |raw: f64| Some(raw),
                |_: f64| {},
                CommandQueueing::InterfacePolicy,
            )
            .expect_err("name taken");
        assert!(matches!(err, InterfaceError::DuplicateCommand { .. }));
        assert!(iface.internal_command("SetSpeed").is_none());
        assert!(iface.internal_command("SetSpeedWrite").is_none());
    }

    #[test]
    fn queued_filtered_write_defers_whole_composite() {
        let log = CallLog::new();
        let sink = log.clone();
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        iface
            .add_command_filtered_write(
                "SetSpeed",
                |raw: f64| Some(raw * 10.0),
                move |v: f64| sink.record(format!("{v}")),
                CommandQueueing::InterfacePolicy,
            )
            .expect("filtered write");
        let iface = Arc::new(iface);
        let user = iface.get_end_user_interface("Ui");

        user.command_write("SetSpeed")
            .expect("queued composite")
            .execute_write(json!(0.5))
            .expect("enqueued");
        assert!(log.is_empty());
        assert_eq!(iface.process_mailboxes(), 1);
        assert_eq!(log.entries(), vec!["5"]);
    }

    // === Events ===

    #[test]
    fn event_names_exclusive_across_kinds() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        iface.add_event_void("Moved").expect("void event");
        let err = iface
            .add_event_write::<f64>("Moved")
            .expect_err("opposite kind");
        assert!(matches!(
            err,
            InterfaceError::OppositeEventKind {
                existing: EventKind::Void,
                ..
            }
        ));
        let err = iface.add_event_void("Moved").expect_err("same kind");
        assert!(matches!(err, InterfaceError::DuplicateEvent { .. }));
        assert_eq!(iface.names_of_events_void(), vec!["Moved"]);
        assert!(iface.names_of_events_write().is_empty());
    }

    #[test]
    fn observer_on_unknown_event_fails() {
        let iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        let handler = Arc::new(Command::direct(
            "h",
            Callable::void(|| {}),
            Prototype::unit(),
            Prototype::unit(),
        ));
        let err = iface.add_observer("Nope", handler).expect_err("unknown");
        assert!(matches!(err, InterfaceError::EventNotFound { .. }));
    }

    // === Clones ===

    #[test]
    fn two_requests_yield_two_distinct_clones() {
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &CallLog::new()));
        let a = iface.get_end_user_interface("Planner");
        let b = iface.get_end_user_interface("Planner");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "RobotForPlanner");
        assert_eq!(a.serial(), Some(1));
        assert_eq!(b.serial(), Some(2));
        assert_eq!(iface.end_user_interfaces().len(), 2);
    }

    #[test]
    fn not_queued_returns_same_object() {
        let iface = Arc::new(robot(InterfaceQueueing::NotQueued, &CallLog::new()));
        let a = iface.get_end_user_interface("Planner");
        let b = iface.get_end_user_interface("Planner");
        assert!(Arc::ptr_eq(&a, &iface));
        assert!(Arc::ptr_eq(&b, &iface));
        assert!(iface.end_user_interfaces().is_empty());
    }

    #[test]
    fn clone_of_clone_is_itself() {
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &CallLog::new()));
        let a = iface.get_end_user_interface("Planner");
        assert!(Arc::ptr_eq(&a.get_end_user_interface("Other"), &a));
    }

    #[test]
    fn reads_and_events_are_shared_writes_are_private() {
        let mut iface = robot(InterfaceQueueing::Queued, &CallLog::new());
        iface.add_event_void("GoalReached").expect("event");
        let iface = Arc::new(iface);
        let a = iface.get_end_user_interface("A");
        let b = iface.get_end_user_interface("B");

        let read_a = a.command_read("GetPosition").expect("read");
        let read_b = b.command_read("GetPosition").expect("read");
        assert!(Arc::ptr_eq(&read_a, &read_b));
        assert!(Arc::ptr_eq(
            &a.event_void("GoalReached").expect("event"),
            &b.event_void("GoalReached").expect("event"),
        ));

        let write_a = a.command_write("SetGoal").expect("write");
        let write_b = b.command_write("SetGoal").expect("write");
        assert!(!Arc::ptr_eq(&write_a, &write_b));
        assert!(!Arc::ptr_eq(
            write_a.mailbox().expect("queued"),
            write_b.mailbox().expect("queued"),
        ));
    }

    #[test]
    fn factory_refuses_queueable_lookup_but_serves_reads() {
        let iface = robot(InterfaceQueueing::Queued, &CallLog::new());
        let err = iface.command_write("SetGoal").expect_err("factory");
        assert!(matches!(err, InterfaceError::NotEndUser { .. }));
        assert_eq!(
            iface
                .command_read("GetPosition")
                .expect("read")
                .execute_read()
                .expect("value"),
            json!(0.5)
        );
    }

    #[test]
    fn per_clone_fifo_across_drain() {
        let log = CallLog::new();
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &log));
        let a = iface.get_end_user_interface("A");
        let b = iface.get_end_user_interface("B");
        let set_a = a.command_write("SetGoal").expect("a");
        let set_b = b.command_write("SetGoal").expect("b");

        set_b.execute_write(json!(10.0)).expect("b1");
        set_a.execute_write(json!(1.0)).expect("a1");
        set_b.execute_write(json!(20.0)).expect("b2");
        set_a.execute_write(json!(2.0)).expect("a2");
        set_a.execute_write(json!(3.0)).expect("a3");

        assert_eq!(iface.process_mailboxes(), 5);
        // Clone-enumeration order: all of A, then all of B.
        assert_eq!(
            log.entries(),
            vec!["goal 1", "goal 2", "goal 3", "goal 10", "goal 20"]
        );
        assert_eq!(iface.process_mailboxes(), 0);
    }

    #[test]
    fn clone_sizes_follow_setters() {
        let mut iface = robot(InterfaceQueueing::Queued, &CallLog::new());
        iface.set_mailbox_and_argument_queues_size(2);
        let iface = Arc::new(iface);
        let user = iface.get_end_user_interface("A");
        let set = user.command_write("SetGoal").expect("write");

        set.execute_write(json!(1.0)).expect("1");
        set.execute_write(json!(2.0)).expect("2");
        let err = set.execute_write(json!(3.0)).expect_err("full");
        assert!(err.to_string().contains("RobotForA"));
        assert_eq!(user.mailbox().expect("mailbox").capacity(), 2);
    }

    #[test]
    fn find_end_user_interface_by_user() {
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &CallLog::new()));
        let planner = iface.get_end_user_interface("Planner");
        let found = iface
            .find_end_user_interface("Planner")
            .expect("exists");
        assert!(Arc::ptr_eq(&found, &planner));
        assert!(iface.find_end_user_interface("Nobody").is_none());

        let shared = Arc::new(robot(InterfaceQueueing::NotQueued, &CallLog::new()));
        let found = shared.find_end_user_interface("Anyone").expect("itself");
        assert!(Arc::ptr_eq(&found, &shared));
    }

    #[test]
    fn remove_requires_genuine_clone() {
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &CallLog::new()));
        let other = Arc::new(robot(InterfaceQueueing::Queued, &CallLog::new()));
        let foreign = other.get_end_user_interface("A");

        let err = iface
            .remove_end_user_interface(&foreign)
            .expect_err("foreign clone");
        assert!(matches!(err, InterfaceError::NotAClone { .. }));
        let err = iface
            .remove_end_user_interface(&other)
            .expect_err("an original");
        assert!(matches!(err, InterfaceError::NotAClone { .. }));
    }

    #[test]
    fn remove_abandons_pending_and_refuses_new_work() {
        let log = CallLog::new();
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &log));
        let user = iface.get_end_user_interface("A");
        let set = user.command_write("SetGoal").expect("write");
        let ticket = set.execute_write(json!(1.0)).expect("enqueued");

        assert_eq!(iface.remove_end_user_interface(&user).expect("removed"), 1);
        assert_eq!(ticket.state(), EntryState::Abandoned);
        assert!(matches!(
            set.execute_write(json!(2.0)),
            Err(ExecError::Disconnected { .. })
        ));
        assert_eq!(iface.process_mailboxes(), 0);
        assert!(log.is_empty());

        let err = iface
            .remove_end_user_interface(&user)
            .expect_err("already removed");
        assert!(matches!(err, InterfaceError::NotAClone { .. }));
    }

    #[test]
    fn post_queued_hook_fires_per_enqueue() {
        let log = CallLog::new();
        let mut iface = robot(InterfaceQueueing::Queued, &CallLog::new());
        let sink = log.clone();
        iface.add_post_queued_hook(Arc::new(move || sink.record("wake")));
        let iface = Arc::new(iface);
        let user = iface.get_end_user_interface("A");

        let set = user.command_write("SetGoal").expect("write");
        set.execute_write(json!(1.0)).expect("1");
        set.execute_write(json!(2.0)).expect("2");
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn names_on_clone_match_original() {
        let iface = Arc::new(robot(InterfaceQueueing::Queued, &CallLog::new()));
        let user = iface.get_end_user_interface("A");
        assert_eq!(user.names_of_commands(), iface.names_of_commands());
        assert_eq!(user.names_of(CommandKind::Read), vec!["GetPosition"]);
        assert_eq!(user.original_name(), "Robot");
        assert_eq!(user.user_name(), Some("A"));
    }
}
