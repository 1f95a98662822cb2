//! Command execution errors.
//!
//! Every failure of an `execute_*` call is a value of [`ExecError`]; none
//! of them panic, and none leave partial state in a mailbox.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ExecError::QueueFull`] | `EXEC_QUEUE_FULL` | Yes |
//! | [`ExecError::ArgumentQueueFull`] | `EXEC_ARGUMENT_QUEUE_FULL` | Yes |
//! | [`ExecError::ArgumentMismatch`] | `EXEC_ARGUMENT_MISMATCH` | No |
//! | [`ExecError::KindMismatch`] | `EXEC_KIND_MISMATCH` | No |
//! | [`ExecError::CallableUnavailable`] | `EXEC_CALLABLE_UNAVAILABLE` | No |
//! | [`ExecError::FilterRejected`] | `EXEC_FILTER_REJECTED` | No |
//! | [`ExecError::ResultEncoding`] | `EXEC_RESULT_ENCODING` | No |
//! | [`ExecError::Disconnected`] | `EXEC_DISCONNECTED` | No |
//! | [`ExecError::Timeout`] | `EXEC_TIMEOUT` | Yes |

use rmts_types::{CommandKind, ErrorCode};
use thiserror::Error;

/// Failure of a single command invocation.
///
/// # Example
///
/// ```
/// use rmts_core::ExecError;
/// use rmts_types::ErrorCode;
///
/// let err = ExecError::QueueFull { mailbox: "RobotForPlanner".into() };
/// assert_eq!(err.code(), "EXEC_QUEUE_FULL");
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The caller's mailbox has no free entry.
    #[error("mailbox '{mailbox}' is full")]
    QueueFull { mailbox: String },

    /// The argument ring of a queued write command has no free slot.
    #[error("argument queue of '{command}' in mailbox '{mailbox}' is full")]
    ArgumentQueueFull { mailbox: String, command: String },

    /// The argument does not decode as the registered prototype.
    #[error("argument for '{command}' does not match prototype '{expected}'")]
    ArgumentMismatch { command: String, expected: String },

    /// The invocation shape does not match the command kind.
    #[error("command '{command}' is {actual}, not {expected}")]
    KindMismatch {
        command: String,
        expected: CommandKind,
        actual: CommandKind,
    },

    /// No callable can run: an unbound function or a factory command.
    #[error("no callable available for '{command}'")]
    CallableUnavailable { command: String },

    /// A filtered write's filter refused the raw argument.
    #[error("filter of '{command}' rejected the argument")]
    FilterRejected { command: String },

    /// The callable's result could not be turned into a value.
    #[error("result of '{command}' could not be encoded: {message}")]
    ResultEncoding { command: String, message: String },

    /// The mailbox was closed by a disconnect.
    #[error("mailbox '{mailbox}' is disconnected")]
    Disconnected { mailbox: String },

    /// A blocking wait for a queued result gave up.
    #[error("no result after {after_ms} ms")]
    Timeout { after_ms: u64 },
}

impl ErrorCode for ExecError {
    fn code(&self) -> &'static str {
        match self {
            Self::QueueFull { .. } => "EXEC_QUEUE_FULL",
            Self::ArgumentQueueFull { .. } => "EXEC_ARGUMENT_QUEUE_FULL",
            Self::ArgumentMismatch { .. } => "EXEC_ARGUMENT_MISMATCH",
            Self::KindMismatch { .. } => "EXEC_KIND_MISMATCH",
            Self::CallableUnavailable { .. } => "EXEC_CALLABLE_UNAVAILABLE",
            Self::FilterRejected { .. } => "EXEC_FILTER_REJECTED",
            Self::ResultEncoding { .. } => "EXEC_RESULT_ENCODING",
            Self::Disconnected { .. } => "EXEC_DISCONNECTED",
            Self::Timeout { .. } => "EXEC_TIMEOUT",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::ArgumentQueueFull { .. } | Self::Timeout { .. }
        )
    }
}
