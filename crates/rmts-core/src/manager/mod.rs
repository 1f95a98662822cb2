//! The component registry.
//!
//! [`ComponentManager`] is an explicit registry object: construct one,
//! pass it by reference to whoever needs it (including a proxy server).
//! Components live in an arena addressed by [`ComponentId`]; removed
//! slots are never reused.
//!
//! # Connection Sequence
//!
//! ```text
//! connect(client, required, server, provided)
//!   1. provided.get_end_user_interface(client)   // private clone
//!   2. required.bind(clone)                      // functions + observers
//!   3. record Connection                         // rollback clone on failure
//! ```
//!
//! # Lifecycle
//!
//! | Operation | From | To |
//! |-----------|------|----|
//! | [`add_component`](ComponentManager::add_component) | Constructed | Initializing |
//! | [`start_all`](ComponentManager::start_all) | Initializing | Ready → Active |
//! | [`stop_all`](ComponentManager::stop_all) | Active | Stopping → Finished |

mod error;

pub use error::ManagerError;

use crate::component::{
    Component, ComponentState, LoopSettings, StateCell, TaskBody, TaskContext, TaskMode,
    TaskRunner, Wakeup,
};
use crate::config::RuntimeConfig;
use crate::interface::{ProvidedInterface, RequiredInterface};
use parking_lot::{Mutex, RwLock};
use rmts_types::{ComponentId, InterfaceId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A registered component.
pub struct ComponentHandle {
    id: ComponentId,
    name: String,
    mode: TaskMode,
    provided: Vec<Arc<ProvidedInterface>>,
    required: Vec<Arc<RequiredInterface>>,
    state: Arc<StateCell>,
    wakeup: Arc<Wakeup>,
    stop: Arc<AtomicBool>,
    body: Mutex<Option<Box<dyn TaskBody>>>,
    runner: Mutex<Option<TaskRunner>>,
}

impl ComponentHandle {
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mode(&self) -> TaskMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> ComponentState {
        self.state.get()
    }

    #[must_use]
    pub fn provided_interfaces(&self) -> &[Arc<ProvidedInterface>] {
        &self.provided
    }

    #[must_use]
    pub fn required_interfaces(&self) -> &[Arc<RequiredInterface>] {
        &self.required
    }

    #[must_use]
    pub fn provided_interface(&self, name: &str) -> Option<Arc<ProvidedInterface>> {
        self.provided.iter().find(|p| p.name() == name).cloned()
    }

    #[must_use]
    pub fn required_interface(&self, name: &str) -> Option<Arc<RequiredInterface>> {
        self.required.iter().find(|r| r.name() == name).cloned()
    }

    /// Drains this component's mailboxes on the calling thread.
    ///
    /// Only meaningful for passive components; a running task drains its
    /// own mailboxes and must remain their single consumer.
    pub fn process_mailboxes(&self) -> usize {
        if self.mode.has_thread() && self.state().is_active() {
            warn!(component = %self.name, "Draining a running task's mailboxes from outside is refused");
            return 0;
        }
        self.context().process_mailboxes()
    }

    fn context(&self) -> TaskContext {
        TaskContext::new(
            self.name.clone(),
            self.provided.clone(),
            self.required.clone(),
            Arc::clone(&self.stop),
        )
    }
}

impl std::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// An established connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub client: String,
    pub required: String,
    pub server: String,
    pub provided: String,
    /// Name of the end-user interface the client is bound to.
    pub end_user: String,
}

struct ConnectionRecord {
    info: Connection,
    required: Arc<RequiredInterface>,
    provider: Arc<ProvidedInterface>,
    end_user: Arc<ProvidedInterface>,
}

#[derive(Default)]
struct Registry {
    components: Vec<Option<Arc<ComponentHandle>>>,
    by_name: HashMap<String, ComponentId>,
    connections: Vec<ConnectionRecord>,
}

impl Registry {
    fn get(&self, name: &str) -> Result<Arc<ComponentHandle>, ManagerError> {
        self.by_name
            .get(name)
            .and_then(|id| self.components.get(id.index() as usize))
            .and_then(Option::clone)
            .ok_or_else(|| ManagerError::ComponentNotFound {
                name: name.to_string(),
            })
    }

    fn live(&self) -> Vec<Arc<ComponentHandle>> {
        self.components.iter().flatten().cloned().collect()
    }
}

/// Explicit registry of components and their connections.
///
/// # Example
///
/// ```
/// use rmts_core::{Component, ComponentManager, TaskMode};
/// use rmts_core::interface::Requirement;
/// use rmts_types::{CommandKind, CommandQueueing, InterfaceQueueing};
/// use serde_json::json;
///
/// let manager = ComponentManager::new();
///
/// let mut robot = Component::device("robot");
/// robot
///     .add_provided_interface("Robot", InterfaceQueueing::NotQueued)
///     .add_command_read("GetPosition", || 1.5_f64)
///     .expect("GetPosition");
/// manager.add_component(robot).expect("robot");
///
/// let mut planner = Component::device("planner");
/// planner
///     .add_required_interface("Robot")
///     .add_function("GetPosition", CommandKind::Read, Requirement::Required)
///     .expect("function");
/// manager.add_component(planner).expect("planner");
///
/// manager.connect("planner", "Robot", "robot", "Robot").expect("connect");
/// let get = manager
///     .component("planner")
///     .and_then(|c| c.required_interface("Robot"))
///     .and_then(|r| r.function("GetPosition"))
///     .expect("bound function");
/// assert_eq!(get.execute_read().expect("read"), json!(1.5));
/// ```
pub struct ComponentManager {
    config: RuntimeConfig,
    registry: RwLock<Registry>,
}

impl Default for ComponentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentManager {
    /// Creates a manager with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    /// Creates a manager whose mailbox and task defaults come from `config`.
    #[must_use]
    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self {
            config: config.clone(),
            registry: RwLock::new(Registry::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // === Registry ===

    /// Registers `component`, sealing its interfaces.
    ///
    /// Provided and required interfaces without explicit sizes get the
    /// configured mailbox defaults; event-driven components get a wake-up
    /// hook on every interface.
    pub fn add_component(&self, component: Component) -> Result<ComponentId, ManagerError> {
        let (name, mode, provided, required, body) = component.into_parts();

        let mut seen = HashSet::new();
        for iface in provided.iter().map(ProvidedInterface::name) {
            if !seen.insert(iface.to_string()) {
                return Err(ManagerError::DuplicateInterface {
                    component: name,
                    interface: iface.to_string(),
                });
            }
        }
        let mut seen = HashSet::new();
        for iface in required.iter().map(RequiredInterface::name) {
            if !seen.insert(iface.to_string()) {
                return Err(ManagerError::DuplicateInterface {
                    component: name,
                    interface: iface.to_string(),
                });
            }
        }

        let mut registry = self.registry.write();
        if registry.by_name.contains_key(&name) {
            warn!(component = %name, "Duplicate component name");
            return Err(ManagerError::DuplicateComponent { name });
        }

        let index = u32::try_from(registry.components.len()).unwrap_or(u32::MAX);
        let id = ComponentId::new(index);
        let wakeup = Arc::new(Wakeup::default());
        let sizes = (self.config.mailbox.size, self.config.mailbox.argument_queue_size);

        let provided = provided
            .into_iter()
            .enumerate()
            .map(|(slot, mut iface)| {
                iface.set_id(InterfaceId::new(id, u32::try_from(slot).unwrap_or(u32::MAX)));
                iface.apply_default_sizes(sizes.0, sizes.1);
                if mode == TaskMode::EventDriven {
                    iface.add_post_queued_hook(wakeup.hook());
                }
                iface.seal();
                Arc::new(iface)
            })
            .collect();
        let required = required
            .into_iter()
            .map(|mut iface| {
                iface.apply_default_sizes(sizes.0, sizes.1);
                if mode == TaskMode::EventDriven {
                    iface.add_post_queued_hook(wakeup.hook());
                }
                iface.seal();
                Arc::new(iface)
            })
            .collect();

        let handle = Arc::new(ComponentHandle {
            id,
            name: name.clone(),
            mode,
            provided,
            required,
            state: Arc::new(StateCell::default()),
            wakeup,
            stop: Arc::new(AtomicBool::new(false)),
            body: Mutex::new(Some(body)),
            runner: Mutex::new(None),
        });
        handle.state.set(ComponentState::Initializing);
        info!(
            component = %name,
            %id,
            ?mode,
            provided = handle.provided.len(),
            required = handle.required.len(),
            "Component added"
        );
        registry.components.push(Some(handle));
        registry.by_name.insert(name, id);
        Ok(id)
    }

    /// Registered component by name.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<Arc<ComponentHandle>> {
        self.registry.read().get(name).ok()
    }

    /// Registered component by arena id.
    #[must_use]
    pub fn component_by_id(&self, id: ComponentId) -> Option<Arc<ComponentHandle>> {
        self.registry
            .read()
            .components
            .get(id.index() as usize)
            .and_then(Option::clone)
    }

    /// Names of registered components, in registration order.
    #[must_use]
    pub fn component_names(&self) -> Vec<String> {
        self.registry
            .read()
            .live()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Provided interfaces of `component`, in declaration order.
    pub fn provided_interfaces(
        &self,
        component: &str,
    ) -> Result<Vec<Arc<ProvidedInterface>>, ManagerError> {
        Ok(self.registry.read().get(component)?.provided.clone())
    }

    /// One provided interface.
    pub fn provided_interface(
        &self,
        component: &str,
        interface: &str,
    ) -> Result<Arc<ProvidedInterface>, ManagerError> {
        self.registry
            .read()
            .get(component)?
            .provided_interface(interface)
            .ok_or_else(|| ManagerError::InterfaceNotFound {
                component: component.to_string(),
                interface: interface.to_string(),
            })
    }

    /// Unregisters a component that is not running.
    ///
    /// Its connections, in either direction, are disconnected first.
    pub fn remove_component(&self, name: &str) -> Result<(), ManagerError> {
        let handle = self.registry.read().get(name)?;
        let state = handle.state();
        if matches!(
            state,
            ComponentState::Ready | ComponentState::Active | ComponentState::Stopping
        ) {
            return Err(ManagerError::InvalidState {
                component: name.to_string(),
                state,
                operation: "remove",
            });
        }

        let involved: Vec<(String, String)> = self
            .registry
            .read()
            .connections
            .iter()
            .filter(|c| c.info.client == name || c.info.server == name)
            .map(|c| (c.info.client.clone(), c.info.required.clone()))
            .collect();
        for (client, required) in involved {
            self.disconnect(&client, &required)?;
        }

        let mut registry = self.registry.write();
        if let Some(id) = registry.by_name.remove(name) {
            if let Some(slot) = registry.components.get_mut(id.index() as usize) {
                *slot = None;
            }
        }
        info!(component = name, "Component removed");
        Ok(())
    }

    // === Connections ===

    /// Connects `client.required` to `server.provided`.
    ///
    /// The client gets a private end-user interface of the provider
    /// (named `"{provided}For{client}"`), and its required interface is
    /// bound to it. On failure the clone is removed again.
    pub fn connect(
        &self,
        client: &str,
        required: &str,
        server: &str,
        provided: &str,
    ) -> Result<Connection, ManagerError> {
        let mut registry = self.registry.write();
        let client_handle = registry.get(client)?;
        let server_handle = registry.get(server)?;
        let required_iface =
            client_handle
                .required_interface(required)
                .ok_or_else(|| ManagerError::InterfaceNotFound {
                    component: client.to_string(),
                    interface: required.to_string(),
                })?;
        let provider =
            server_handle
                .provided_interface(provided)
                .ok_or_else(|| ManagerError::InterfaceNotFound {
                    component: server.to_string(),
                    interface: provided.to_string(),
                })?;

        if registry
            .connections
            .iter()
            .any(|c| c.info.client == client && c.info.required == required)
        {
            warn!(client, required, "Required interface already connected");
            return Err(ManagerError::AlreadyConnected {
                client: client.to_string(),
                required: required.to_string(),
            });
        }

        let end_user = provider.get_end_user_interface(client);
        if let Err(e) = required_iface.bind(&end_user) {
            error!(client, required, server, provided, error = %e, "Connect failed");
            if end_user.is_clone() {
                if let Err(cleanup) = provider.remove_end_user_interface(&end_user) {
                    warn!(error = %cleanup, "Clone rollback failed");
                }
            }
            return Err(e.into());
        }

        let info = Connection {
            client: client.to_string(),
            required: required.to_string(),
            server: server.to_string(),
            provided: provided.to_string(),
            end_user: end_user.name().to_string(),
        };
        info!(client, required, server, provided, end_user = %info.end_user, "Connected");
        registry.connections.push(ConnectionRecord {
            info: info.clone(),
            required: required_iface,
            provider,
            end_user,
        });
        Ok(info)
    }

    /// Tears down the connection of `client.required`.
    ///
    /// The required interface is unbound, and the end-user clone is
    /// detached with its mailbox closed. Returns the number of pending
    /// entries that were abandoned.
    pub fn disconnect(&self, client: &str, required: &str) -> Result<usize, ManagerError> {
        let record = {
            let mut registry = self.registry.write();
            let pos = registry
                .connections
                .iter()
                .position(|c| c.info.client == client && c.info.required == required)
                .ok_or_else(|| ManagerError::NotConnected {
                    client: client.to_string(),
                    required: required.to_string(),
                })?;
            registry.connections.remove(pos)
        };

        record.required.unbind();
        let abandoned = if record.end_user.is_clone() {
            record.provider.remove_end_user_interface(&record.end_user)?
        } else {
            0
        };
        info!(client, required, end_user = %record.info.end_user, abandoned, "Disconnected");
        Ok(abandoned)
    }

    /// Established connections, in connection order.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.registry
            .read()
            .connections
            .iter()
            .map(|c| c.info.clone())
            .collect()
    }

    // === Lifecycle ===

    /// Starts every component still initializing.
    ///
    /// Stops at the first failure; components started before it keep
    /// running.
    pub fn start_all(&self) -> Result<(), ManagerError> {
        let pending: Vec<_> = self
            .registry
            .read()
            .live()
            .into_iter()
            .filter(|c| c.state() == ComponentState::Initializing)
            .collect();
        for handle in pending {
            self.start(&handle)?;
        }
        Ok(())
    }

    /// Starts one component.
    pub fn start_component(&self, name: &str) -> Result<(), ManagerError> {
        let handle = self.registry.read().get(name)?;
        self.start(&handle)
    }

    fn start(&self, handle: &ComponentHandle) -> Result<(), ManagerError> {
        let state = handle.state();
        let body = match state {
            ComponentState::Initializing => handle.body.lock().take(),
            _ => None,
        };
        let Some(mut body) = body else {
            return Err(ManagerError::InvalidState {
                component: handle.name.clone(),
                state,
                operation: "start",
            });
        };

        let ctx = handle.context();
        let period = match handle.mode {
            TaskMode::Passive => {
                if let Err(e) = body.startup(&ctx) {
                    *handle.body.lock() = Some(body);
                    return Err(ManagerError::Startup {
                        component: handle.name.clone(),
                        message: e.to_string(),
                    });
                }
                *handle.body.lock() = Some(body);
                handle.state.set(ComponentState::Ready);
                handle.state.set(ComponentState::Active);
                info!(component = %handle.name, "Device active");
                return Ok(());
            }
            TaskMode::Periodic(p) if p.is_zero() => self.config.task.default_period(),
            TaskMode::Periodic(p) => p,
            TaskMode::EventDriven => Duration::ZERO,
        };

        let settings = LoopSettings {
            mode: handle.mode,
            period,
            idle_wait: self.config.task.idle_wait(),
        };
        let runner = TaskRunner::spawn(
            ctx,
            body,
            settings,
            Arc::clone(&handle.state),
            Arc::clone(&handle.wakeup),
        )
        .map_err(|e| ManagerError::Spawn {
            component: handle.name.clone(),
            message: e.to_string(),
        })?;
        *handle.runner.lock() = Some(runner);
        debug!(component = %handle.name, ?period, "Task thread spawned");
        Ok(())
    }

    /// Stops every started component and joins its thread.
    ///
    /// Each task performs a final best-effort drain before cleanup. Threads
    /// that do not finish within `task.shutdown_timeout_ms` are detached and
    /// reported.
    pub fn stop_all(&self) -> Result<(), ManagerError> {
        let handles = self.registry.read().live();
        for handle in &handles {
            if let Some(runner) = handle.runner.lock().as_ref() {
                handle.stop.store(true, Ordering::Release);
                runner.request_stop();
            }
        }

        let deadline = Instant::now() + self.config.task.shutdown_timeout();
        let mut timed_out = Vec::new();
        for handle in &handles {
            if !self.finish(handle, deadline) {
                timed_out.push(handle.name.clone());
            }
        }

        if timed_out.is_empty() {
            info!(components = handles.len(), "All components stopped");
            Ok(())
        } else {
            error!(components = ?timed_out, "Components did not stop in time");
            Err(ManagerError::ShutdownTimeout {
                components: timed_out,
            })
        }
    }

    /// Stops one component.
    pub fn stop_component(&self, name: &str) -> Result<(), ManagerError> {
        let handle = self.registry.read().get(name)?;
        if let Some(runner) = handle.runner.lock().as_ref() {
            handle.stop.store(true, Ordering::Release);
            runner.request_stop();
        }
        let deadline = Instant::now() + self.config.task.shutdown_timeout();
        if self.finish(&handle, deadline) {
            Ok(())
        } else {
            Err(ManagerError::ShutdownTimeout {
                components: vec![name.to_string()],
            })
        }
    }

    /// Waits for a stop request to complete; returns `false` on timeout.
    fn finish(&self, handle: &ComponentHandle, deadline: Instant) -> bool {
        let runner = handle.runner.lock().take();
        if let Some(runner) = runner {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !handle.state.wait_for(ComponentState::Finished, remaining) && !runner.is_finished() {
                warn!(component = %handle.name, "Task thread still running; detaching");
                return false;
            }
            if !runner.join() {
                error!(component = %handle.name, "Task thread panicked");
                handle.state.set(ComponentState::Finished);
            }
            return true;
        }

        if handle.mode == TaskMode::Passive && handle.state() == ComponentState::Active {
            handle.state.set(ComponentState::Stopping);
            let ctx = handle.context();
            let drained = ctx.process_mailboxes();
            if let Some(body) = handle.body.lock().as_mut() {
                body.cleanup(&ctx);
            }
            handle.state.set(ComponentState::Finished);
            debug!(component = %handle.name, drained, "Device stopped");
        }
        true
    }

    /// Waits until `component` reaches `state` (or a later one).
    pub fn wait_for_state(
        &self,
        component: &str,
        state: ComponentState,
        timeout: Duration,
    ) -> Result<bool, ManagerError> {
        let handle = self.registry.read().get(component)?;
        Ok(handle.state.wait_for(state, timeout))
    }
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.component_names())
            .field("connections", &self.connections())
            .finish_non_exhaustive()
    }
}
