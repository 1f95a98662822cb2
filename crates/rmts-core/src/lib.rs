//! rmts core runtime.
//!
//! Components expose named operations through provided interfaces; other
//! components call them through required interfaces, on any thread, and
//! the provider decides where each call actually runs.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runtime Layer (THIS CRATE)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  command/    : Command, Callable, Dispatch, ExecError       │
//! │  mailbox/    : Mailbox, Ticket, argument rings              │
//! │  event       : EventGenerator, FireReport                   │
//! │  interface/  : ProvidedInterface, RequiredInterface         │
//! │  component/  : Component, TaskBody, ComponentState          │
//! │  manager/    : ComponentManager, Connection                 │
//! │  config/     : RuntimeConfig, ConfigLoader                  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  rmts-proxy  : the same contract across a network link      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Call Path
//!
//! ```text
//! caller thread                         provider thread
//! ─────────────                         ───────────────
//! Function::execute_write(v)
//!   └─► Command (clone, Queued)
//!         └─► Mailbox::enqueue ──────►  process_mailboxes()
//!               (never blocks)            └─► Callable(v)
//! Function::execute_read()
//!   └─► Command (shared, Direct) ──► Callable() on the caller's thread
//! ```
//!
//! # Example
//!
//! ```
//! use rmts_core::{Component, ComponentManager};
//! use rmts_core::interface::Requirement;
//! use rmts_types::{CommandKind, CommandQueueing, InterfaceQueueing};
//! use serde_json::json;
//!
//! let manager = ComponentManager::new();
//!
//! let mut robot = Component::device("robot");
//! robot
//!     .add_provided_interface("Robot", InterfaceQueueing::Queued)
//!     .add_command_write("SetGoal", |_goal: f64| {}, CommandQueueing::InterfacePolicy)
//!     .expect("SetGoal");
//! manager.add_component(robot).expect("robot");
//!
//! let mut planner = Component::device("planner");
//! planner
//!     .add_required_interface("Robot")
//!     .add_function("SetGoal", CommandKind::Write, Requirement::Required)
//!     .expect("SetGoal");
//! manager.add_component(planner).expect("planner");
//!
//! manager.connect("planner", "Robot", "robot", "Robot").expect("connect");
//! let set_goal = manager
//!     .component("planner")
//!     .and_then(|c| c.required_interface("Robot"))
//!     .and_then(|r| r.function("SetGoal"))
//!     .expect("function");
//! set_goal.execute_write(json!(1.0)).expect("enqueued");
//!
//! let robot = manager.component("robot").expect("robot");
//! assert_eq!(robot.process_mailboxes(), 1);
//! ```

pub mod command;
pub mod component;
pub mod config;
pub mod event;
pub mod interface;
pub mod mailbox;
pub mod manager;
pub mod testing;

pub use command::{Callable, Command, Dispatch, ExecError};
pub use component::{
    Component, ComponentState, IdleBody, TaskBody, TaskContext, TaskError, TaskMode,
};
pub use config::{ConfigError, ConfigLoader, RuntimeConfig};
pub use event::{EventGenerator, FireReport};
pub use interface::{Function, InterfaceError, ProvidedInterface, RequiredInterface, Requirement};
pub use mailbox::{EntryState, Mailbox, PostQueuedHook, Ticket};
pub use manager::{ComponentHandle, ComponentManager, Connection, ManagerError};
