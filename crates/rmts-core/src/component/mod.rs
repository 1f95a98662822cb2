//! Components: execution units owning interfaces and one task thread.
//!
//! A [`Component`] is assembled single-threaded (interfaces, commands,
//! events, task body) and then handed to a
//! [`ComponentManager`](crate::ComponentManager), which seals its
//! interfaces, connects it to others and runs its task.
//!
//! # Example
//!
//! ```
//! use rmts_core::{Component, TaskMode};
//! use rmts_types::{CommandQueueing, InterfaceQueueing};
//! use std::time::Duration;
//!
//! let mut robot = Component::new("robot", TaskMode::Periodic(Duration::from_millis(10)));
//! let provided = robot.add_provided_interface("Robot", InterfaceQueueing::ComponentPolicy);
//! provided
//!     .add_command_void("Stop", || {}, CommandQueueing::InterfacePolicy)
//!     .expect("Stop");
//! assert!(provided.add_command_read("GetPosition", || 0.0_f64).is_ok());
//! ```

mod state;
mod task;

pub use state::ComponentState;
pub use task::{IdleBody, TaskBody, TaskContext, TaskError, TaskMode};

pub(crate) use state::StateCell;
pub(crate) use task::{LoopSettings, TaskRunner, Wakeup};

use crate::interface::{ProvidedInterface, RequiredInterface};
use rmts_types::InterfaceQueueing;

/// A component under construction.
pub struct Component {
    name: String,
    mode: TaskMode,
    provided: Vec<ProvidedInterface>,
    required: Vec<RequiredInterface>,
    body: Box<dyn TaskBody>,
}

impl Component {
    #[must_use]
    pub fn new(name: impl Into<String>, mode: TaskMode) -> Self {
        Self {
            name: name.into(),
            mode,
            provided: Vec::new(),
            required: Vec::new(),
            body: Box::new(IdleBody),
        }
    }

    /// Passive device component.
    #[must_use]
    pub fn device(name: impl Into<String>) -> Self {
        Self::new(name, TaskMode::Passive)
    }

    /// Sets the user behaviour run on the task thread.
    #[must_use]
    pub fn with_body(mut self, body: impl TaskBody + 'static) -> Self {
        self.body = Box::new(body);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mode(&self) -> TaskMode {
        self.mode
    }

    /// Adds a provided interface and returns it for registration.
    ///
    /// `ComponentPolicy` commands queue unless this is a passive device.
    /// Duplicate interface names are reported when the component is added
    /// to a manager.
    pub fn add_provided_interface(
        &mut self,
        name: impl Into<String>,
        policy: InterfaceQueueing,
    ) -> &mut ProvidedInterface {
        let iface =
            ProvidedInterface::new(name, policy).with_component_default(self.mode.queues_by_default());
        self.provided.push(iface);
        let last = self.provided.len() - 1;
        &mut self.provided[last]
    }

    /// Adds a required interface and returns it for registration.
    pub fn add_required_interface(&mut self, name: impl Into<String>) -> &mut RequiredInterface {
        let iface = RequiredInterface::new(name).with_component_default(self.mode.queues_by_default());
        self.required.push(iface);
        let last = self.required.len() - 1;
        &mut self.required[last]
    }

    /// Provided interface under construction.
    pub fn provided_interface_mut(&mut self, name: &str) -> Option<&mut ProvidedInterface> {
        self.provided.iter_mut().find(|p| p.name() == name)
    }

    /// Required interface under construction.
    pub fn required_interface_mut(&mut self, name: &str) -> Option<&mut RequiredInterface> {
        self.required.iter_mut().find(|r| r.name() == name)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        TaskMode,
        Vec<ProvidedInterface>,
        Vec<RequiredInterface>,
        Box<dyn TaskBody>,
    ) {
        (self.name, self.mode, self.provided, self.required, self.body)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("provided", &self.provided)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}
