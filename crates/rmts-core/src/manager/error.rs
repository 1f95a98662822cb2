//! Component manager errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ManagerError::DuplicateComponent`] | `MANAGER_DUPLICATE_COMPONENT` | No |
//! | [`ManagerError::ComponentNotFound`] | `MANAGER_COMPONENT_NOT_FOUND` | No |
//! | [`ManagerError::DuplicateInterface`] | `MANAGER_DUPLICATE_INTERFACE` | No |
//! | [`ManagerError::InterfaceNotFound`] | `MANAGER_INTERFACE_NOT_FOUND` | No |
//! | [`ManagerError::AlreadyConnected`] | `MANAGER_ALREADY_CONNECTED` | No |
//! | [`ManagerError::NotConnected`] | `MANAGER_NOT_CONNECTED` | No |
//! | [`ManagerError::InvalidState`] | `MANAGER_INVALID_STATE` | No |
//! | [`ManagerError::Spawn`] | `MANAGER_SPAWN` | Yes |
//! | [`ManagerError::Startup`] | `MANAGER_STARTUP` | No |
//! | [`ManagerError::ShutdownTimeout`] | `MANAGER_SHUTDOWN_TIMEOUT` | Yes |
//! | [`ManagerError::Interface`] | `MANAGER_INTERFACE` | No |

use crate::component::ComponentState;
use crate::interface::InterfaceError;
use rmts_types::ErrorCode;
use thiserror::Error;

/// Registry, connection and lifecycle errors.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    #[error("component '{name}' already registered")]
    DuplicateComponent { name: String },

    #[error("component '{name}' not registered")]
    ComponentNotFound { name: String },

    #[error("component '{component}' declares interface '{interface}' twice")]
    DuplicateInterface { component: String, interface: String },

    #[error("component '{component}' has no interface '{interface}'")]
    InterfaceNotFound { component: String, interface: String },

    /// A required interface can be connected to one provider only.
    #[error("'{client}.{required}' is already connected")]
    AlreadyConnected { client: String, required: String },

    #[error("'{client}.{required}' is not connected")]
    NotConnected { client: String, required: String },

    #[error("cannot {operation} component '{component}' while {state}")]
    InvalidState {
        component: String,
        state: ComponentState,
        operation: &'static str,
    },

    /// The OS refused to create the task thread.
    #[error("failed to spawn task thread for '{component}': {message}")]
    Spawn { component: String, message: String },

    #[error("startup of '{component}' failed: {message}")]
    Startup { component: String, message: String },

    /// Task threads that did not finish within the shutdown timeout.
    #[error("components did not stop in time: {}", components.join(", "))]
    ShutdownTimeout { components: Vec<String> },

    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

impl ErrorCode for ManagerError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateComponent { .. } => "MANAGER_DUPLICATE_COMPONENT",
            Self::ComponentNotFound { .. } => "MANAGER_COMPONENT_NOT_FOUND",
            Self::DuplicateInterface { .. } => "MANAGER_DUPLICATE_INTERFACE",
            Self::InterfaceNotFound { .. } => "MANAGER_INTERFACE_NOT_FOUND",
            Self::AlreadyConnected { .. } => "MANAGER_ALREADY_CONNECTED",
            Self::NotConnected { .. } => "MANAGER_NOT_CONNECTED",
            Self::InvalidState { .. } => "MANAGER_INVALID_STATE",
            Self::Spawn { .. } => "MANAGER_SPAWN",
            Self::Startup { .. } => "MANAGER_STARTUP",
            Self::ShutdownTimeout { .. } => "MANAGER_SHUTDOWN_TIMEOUT",
            Self::Interface(_) => "MANAGER_INTERFACE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::ShutdownTimeout { .. })
    }
}
