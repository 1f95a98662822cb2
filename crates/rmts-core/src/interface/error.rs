//! Interface registration and lookup errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`InterfaceError::DuplicateCommand`] | `INTERFACE_DUPLICATE_COMMAND` | No |
//! | [`InterfaceError::Sealed`] | `INTERFACE_SEALED` | No |
//! | [`InterfaceError::InvalidCommand`] | `INTERFACE_INVALID_COMMAND` | No |
//! | [`InterfaceError::CommandNotFound`] | `INTERFACE_COMMAND_NOT_FOUND` | No |
//! | [`InterfaceError::NotEndUser`] | `INTERFACE_NOT_END_USER` | No |
//! | [`InterfaceError::DuplicateEvent`] | `INTERFACE_DUPLICATE_EVENT` | No |
//! | [`InterfaceError::OppositeEventKind`] | `INTERFACE_OPPOSITE_EVENT_KIND` | No |
//! | [`InterfaceError::EventNotFound`] | `INTERFACE_EVENT_NOT_FOUND` | No |
//! | [`InterfaceError::ObserverKindMismatch`] | `INTERFACE_OBSERVER_KIND_MISMATCH` | No |
//! | [`InterfaceError::DuplicateObserver`] | `INTERFACE_DUPLICATE_OBSERVER` | No |
//! | [`InterfaceError::ObserverNotFound`] | `INTERFACE_OBSERVER_NOT_FOUND` | No |
//! | [`InterfaceError::NotAClone`] | `INTERFACE_NOT_A_CLONE` | No |
//! | [`InterfaceError::DuplicateFunction`] | `INTERFACE_DUPLICATE_FUNCTION` | No |
//! | [`InterfaceError::FunctionNotFound`] | `INTERFACE_FUNCTION_NOT_FOUND` | No |
//!
//! Registration errors are returned synchronously and leave the interface
//! exactly as it was before the call.

use rmts_types::{CommandKind, ErrorCode, EventKind};
use thiserror::Error;

/// Provided/required interface error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceError {
    /// A command with this name and kind already exists.
    #[error("interface '{interface}' already has a {kind} command named '{name}'")]
    DuplicateCommand {
        interface: String,
        kind: CommandKind,
        name: String,
    },

    /// The interface has left its configuration phase.
    #[error("interface '{interface}' is sealed; commands can only be added before start")]
    Sealed { interface: String },

    /// Empty name or mismatched callable/prototype.
    #[error("invalid command '{name}' on interface '{interface}': {reason}")]
    InvalidCommand {
        interface: String,
        name: String,
        reason: String,
    },

    /// No command with this name and kind.
    #[error("interface '{interface}' has no {kind} command named '{name}'")]
    CommandNotFound {
        interface: String,
        kind: CommandKind,
        name: String,
    },

    /// A queued command was requested from a factory interface.
    #[error("'{interface}' is a factory interface; get an end-user interface to use '{name}'")]
    NotEndUser { interface: String, name: String },

    /// An event with this name and kind already exists.
    #[error("interface '{interface}' already has a {kind} event named '{name}'")]
    DuplicateEvent {
        interface: String,
        kind: EventKind,
        name: String,
    },

    /// The name is taken by an event of the other kind.
    #[error("interface '{interface}' already has '{name}' as a {existing} event")]
    OppositeEventKind {
        interface: String,
        name: String,
        existing: EventKind,
    },

    /// No event with this name.
    #[error("interface '{interface}' has no event named '{name}'")]
    EventNotFound { interface: String, name: String },

    /// The handler's command kind does not match the event kind.
    #[error("event '{event}' needs a {expected} handler, got {actual}")]
    ObserverKindMismatch {
        event: String,
        expected: CommandKind,
        actual: CommandKind,
    },

    /// The handler is already subscribed.
    #[error("handler '{handler}' already observes event '{event}'")]
    DuplicateObserver { event: String, handler: String },

    /// The handler is not subscribed.
    #[error("handler '{handler}' does not observe event '{event}'")]
    ObserverNotFound { event: String, handler: String },

    /// The object passed for removal is not an end-user clone of this one.
    #[error("'{candidate}' is not an end-user interface of '{interface}'")]
    NotAClone { interface: String, candidate: String },

    /// A function or handler with this name already exists.
    #[error("required interface '{interface}' already has '{name}'")]
    DuplicateFunction { interface: String, name: String },

    /// A required function has no matching provider command.
    #[error("required function '{name}' ({kind}) of '{interface}' not provided")]
    FunctionNotFound {
        interface: String,
        kind: CommandKind,
        name: String,
    },
}

impl ErrorCode for InterfaceError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateCommand { .. } => "INTERFACE_DUPLICATE_COMMAND",
            Self::Sealed { .. } => "INTERFACE_SEALED",
            Self::InvalidCommand { .. } => "INTERFACE_INVALID_COMMAND",
            Self::CommandNotFound { .. } => "INTERFACE_COMMAND_NOT_FOUND",
            Self::NotEndUser { .. } => "INTERFACE_NOT_END_USER",
            Self::DuplicateEvent { .. } => "INTERFACE_DUPLICATE_EVENT",
            Self::OppositeEventKind { .. } => "INTERFACE_OPPOSITE_EVENT_KIND",
            Self::EventNotFound { .. } => "INTERFACE_EVENT_NOT_FOUND",
            Self::ObserverKindMismatch { .. } => "INTERFACE_OBSERVER_KIND_MISMATCH",
            Self::DuplicateObserver { .. } => "INTERFACE_DUPLICATE_OBSERVER",
            Self::ObserverNotFound { .. } => "INTERFACE_OBSERVER_NOT_FOUND",
            Self::NotAClone { .. } => "INTERFACE_NOT_A_CLONE",
            Self::DuplicateFunction { .. } => "INTERFACE_DUPLICATE_FUNCTION",
            Self::FunctionNotFound { .. } => "INTERFACE_FUNCTION_NOT_FOUND",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmts_types::assert_error_codes;

    fn all_variants() -> Vec<InterfaceError> {
        let interface = || "Robot".to_string();
        let name = || "SetGoal".to_string();
        vec![
            InterfaceError::DuplicateCommand {
                interface: interface(),
                kind: CommandKind::Write,
                name: name(),
            },
            InterfaceError::Sealed {
                interface: interface(),
            },
            InterfaceError::InvalidCommand {
                interface: interface(),
                name: name(),
                reason: "empty".into(),
            },
            InterfaceError::CommandNotFound {
                interface: interface(),
                kind: CommandKind::Read,
                name: name(),
            },
            InterfaceError::NotEndUser {
                interface: interface(),
                name: name(),
            },
            InterfaceError::DuplicateEvent {
                interface: interface(),
                kind: EventKind::Void,
                name: name(),
            },
            InterfaceError::OppositeEventKind {
                interface: interface(),
                name: name(),
                existing: EventKind::Write,
            },
            InterfaceError::EventNotFound {
                interface: interface(),
                name: name(),
            },
            InterfaceError::ObserverKindMismatch {
                event: name(),
                expected: CommandKind::Void,
                actual: CommandKind::Write,
            },
            InterfaceError::DuplicateObserver {
                event: name(),
                handler: "h".into(),
            },
            InterfaceError::ObserverNotFound {
                event: name(),
                handler: "h".into(),
            },
            InterfaceError::NotAClone {
                interface: interface(),
                candidate: "Other".into(),
            },
            InterfaceError::DuplicateFunction {
                interface: interface(),
                name: name(),
            },
            InterfaceError::FunctionNotFound {
                interface: interface(),
                kind: CommandKind::Void,
                name: name(),
            },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "INTERFACE_");
    }

    #[test]
    fn none_recoverable() {
        assert!(all_variants().iter().all(|e| !e.is_recoverable()));
    }

    #[test]
    fn duplicate_display_names_kind() {
        let err = InterfaceError::DuplicateCommand {
            interface: "Robot".into(),
            kind: CommandKind::Write,
            name: "SetGoal".into(),
        };
        assert_eq!(
            err.to_string(),
            "interface 'Robot' already has a write command named 'SetGoal'"
        );
    }
}
