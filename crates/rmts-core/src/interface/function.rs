//! Function objects of a required interface.

use crate::command::{Command, ExecError};
use crate::mailbox::Ticket;
use parking_lot::RwLock;
use rmts_types::CommandKind;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Whether a connection may leave a function unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requirement {
    /// Binding fails if the provider lacks the command.
    #[default]
    Required,
    /// Left unbound when the provider lacks the command.
    Optional,
}

/// A caller-side reference to one provider command.
///
/// Unbound until the owning required interface is connected; afterwards
/// the `execute_*` methods forward to the provider clone's command.
pub struct Function {
    name: String,
    kind: CommandKind,
    requirement: Requirement,
    binding: RwLock<Option<Arc<Command>>>,
}

impl Function {
    pub(crate) fn new(name: impl Into<String>, kind: CommandKind, requirement: Requirement) -> Self {
        Self {
            name: name.into(),
            kind,
            requirement,
            binding: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub const fn requirement(&self) -> Requirement {
        self.requirement
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.read().is_some()
    }

    /// The provider command this function is bound to.
    #[must_use]
    pub fn command(&self) -> Option<Arc<Command>> {
        self.binding.read().clone()
    }

    pub(crate) fn bind(&self, command: Arc<Command>) {
        *self.binding.write() = Some(command);
    }

    pub(crate) fn unbind(&self) {
        *self.binding.write() = None;
    }

    fn bound(&self) -> Result<Arc<Command>, ExecError> {
        self.command().ok_or_else(|| ExecError::CallableUnavailable {
            command: self.name.clone(),
        })
    }

    pub fn execute_void(&self) -> Result<Ticket, ExecError> {
        self.bound()?.execute_void()
    }

    pub fn execute_write(&self, arg: Value) -> Result<Ticket, ExecError> {
        self.bound()?.execute_write(arg)
    }

    pub fn execute_void_return(&self) -> Result<Ticket, ExecError> {
        self.bound()?.execute_void_return()
    }

    pub fn execute_write_return(&self, arg: Value) -> Result<Ticket, ExecError> {
        self.bound()?.execute_write_return(arg)
    }

    pub fn execute_read(&self) -> Result<Value, ExecError> {
        self.bound()?.execute_read()
    }

    pub fn execute_qualified_read(&self, arg: &Value) -> Result<Value, ExecError> {
        self.bound()?.execute_qualified_read(arg)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("requirement", &self.requirement)
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Callable;
    use rmts_types::Prototype;
    use serde_json::json;

    #[test]
    fn unbound_function_is_unavailable() {
        let f = Function::new("GetPosition", CommandKind::Read, Requirement::Required);
        let err = f.execute_read().expect_err("unbound");
        assert!(matches!(err, ExecError::CallableUnavailable { .. }));
    }

    #[test]
    fn bound_function_forwards() {
        let f = Function::new("GetPosition", CommandKind::Read, Requirement::Optional);
        f.bind(Arc::new(Command::direct(
            "GetPosition",
            Callable::read("GetPosition", || 2.0_f64),
            Prototype::unit(),
            Prototype::of::<f64>(),
        )));
        assert_eq!(f.execute_read().expect("bound"), json!(2.0));

        f.unbind();
        assert!(!f.is_bound());
    }
}
